//! Execution workflow core: the lock state machine, status
//! normalization, crash recovery, run polling, and cross-view sync.

pub mod lock;
pub mod poller;
pub mod recovery;
pub mod status;
pub mod sync;

pub use lock::{
    ChatState, ExecutionLock, LockStatus, PendingRequest, PlanGate, ProgressSnapshot, RequestKind,
    WorkflowLock,
};
pub use poller::{RunPoller, SharedWorkflow};
pub use recovery::{RecoveryBudgets, RecoveryCoordinator, RecoveryOutcome};
pub use status::{classify, normalize, StatusClass};
pub use sync::ViewSynchronizer;
