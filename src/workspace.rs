//! Workspace identity and storage-key derivation.
//!
//! Every record the console persists is scoped to one workspace. The raw
//! workspace identifier (usually a filesystem path) is sanitized into a slug
//! so it can appear inside storage keys and filenames, and the three
//! well-known keys (lock, pending request, chat state) are derived from it.

use serde::{Deserialize, Serialize};

/// A workspace identity: the raw identifier plus its sanitized slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceId {
    raw: String,
    slug: String,
}

impl WorkspaceId {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            slug: sanitize(raw),
        }
    }

    /// The identifier as given (sent to the engine verbatim).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The sanitized form used inside storage keys.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Storage key for the workspace's `ExecutionLock` record.
    pub fn lock_key(&self) -> String {
        format!("cockpit:{}:lock", self.slug)
    }

    /// Storage key for the workspace's `PendingRequest` record.
    pub fn pending_key(&self) -> String {
        format!("cockpit:{}:pending", self.slug)
    }

    /// Storage key for the workspace's `ChatState` record.
    pub fn chat_key(&self) -> String {
        format!("cockpit:{}:chat", self.slug)
    }

    /// Whether a storage key belongs to this workspace.
    pub fn owns_key(&self, key: &str) -> bool {
        key == self.lock_key() || key == self.pending_key() || key == self.chat_key()
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Reduce a raw workspace identifier to a key-safe slug: lowercase
/// alphanumerics with single `-` separators. Empty input maps to "default".
pub fn sanitize(raw: &str) -> String {
    let slug: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}
