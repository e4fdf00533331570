//! Cross-view state synchronization.
//!
//! Every persisted write goes through the change bus tagged with the
//! writing view's id. A synchronizer subscribes each additional view of
//! the same workspace, drops its own echoes and other workspaces' keys,
//! and applies everything else verbatim as a whole-record replacement.
//! No merging: the last writer's snapshot wins, which keeps all views
//! convergent without any schema knowledge here.

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use crate::store::ChangeEvent;
use crate::workflow::lock::WorkflowLock;
use crate::workflow::poller::SharedWorkflow;

pub struct ViewSynchronizer {
    workflow: SharedWorkflow,
    receiver: Receiver<ChangeEvent>,
}

impl ViewSynchronizer {
    pub async fn new(workflow: SharedWorkflow) -> Self {
        let receiver = workflow.read().await.bus().subscribe();
        Self { workflow, receiver }
    }

    /// Apply all change events currently queued, without blocking.
    /// Lagged receivers skip to the live edge; whole-record replacement
    /// makes the latest snapshot sufficient.
    pub async fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let mut workflow = self.workflow.write().await;
                    if Self::applies(&workflow, &event) {
                        workflow.apply_external(&event.key, event.value.as_deref());
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "View synchronizer lagged; resuming at live edge");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Long-running variant: applies events as they arrive until the
    /// bus closes.
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    let mut workflow = self.workflow.write().await;
                    if Self::applies(&workflow, &event) {
                        workflow.apply_external(&event.key, event.value.as_deref());
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "View synchronizer lagged; resuming at live edge");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn applies(workflow: &WorkflowLock, event: &ChangeEvent) -> bool {
        event.origin != workflow.view_id() && workflow.workspace().owns_key(&event.key)
    }
}
