//! Persisted key-value store contract and change notification bus.
//!
//! The workflow lock persists its records as JSON strings under
//! workspace-scoped keys. The store itself is a synchronous string
//! key-value contract; change notification between views is a separate
//! in-process broadcast bus carrying whole-value snapshots, so a second
//! view of the same workspace can replace its in-memory records verbatim
//! without re-reading the store.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::StoreError;

/// Identifies one open view of a workspace. Events tagged with a view's
/// own id are skipped by its synchronizer.
pub type ViewId = Uuid;

/// Synchronous string key-value store. Implementations must be cheap
/// enough to call inline from event handlers and polling callbacks.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A whole-value snapshot of one key after a write or removal.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    /// `None` means the key was removed.
    pub value: Option<String>,
    /// The view that performed the write.
    pub origin: ViewId,
}

/// Buffered events retained per subscriber before the oldest are dropped.
const BUS_CAPACITY: usize = 256;

/// In-process publish/subscribe channel for store change events.
///
/// Cloning shares the underlying channel, so every view of a workspace
/// holds a clone of the same bus.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish a change. Lagging or absent subscribers are not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

/// Shared handle to a store implementation.
pub type SharedStore = Arc<dyn KeyValueStore>;
