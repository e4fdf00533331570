//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled               |
//! |-----------|--------------------------------|
//! | `plan`    | `Plan`                         |
//! | `confirm` | `Confirm`, `Watch`             |
//! | `review`  | `Apply`, `Discard`, `Cancel`   |
//! | `chat`    | `Chat`                         |
//! | `status`  | `Status`, `Unlock`, `Recover`  |

pub mod chat;
pub mod confirm;
pub mod plan;
pub mod review;
pub mod status;

pub use chat::cmd_chat;
pub use confirm::{cmd_confirm, cmd_watch};
pub use plan::cmd_plan;
pub use review::{cmd_apply, cmd_cancel, cmd_discard};
pub use status::{cmd_recover, cmd_status, cmd_unlock};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use cockpit::config::CockpitConfig;
use cockpit::engine::{EngineApi, HttpEngineClient};
use cockpit::store::{ChangeBus, FileStore, SharedStore};
use cockpit::workflow::{
    RecoveryCoordinator, RecoveryOutcome, SharedWorkflow, WorkflowLock,
};
use cockpit::workspace::WorkspaceId;

/// Everything a command needs for one workspace: config, the loaded
/// workflow lock, the engine client, and the recovery coordinator.
pub struct Session {
    pub config: CockpitConfig,
    pub workspace: WorkspaceId,
    pub workflow: SharedWorkflow,
    pub engine: Arc<dyn EngineApi>,
    /// Conclusion of the reconciliation pass run at open time.
    pub activation_recovery: Option<RecoveryOutcome>,
    coordinator: RecoveryCoordinator,
}

impl Session {
    /// Open the workspace rooted at `project_dir` and reconcile any
    /// pending request left over from a previous process before the
    /// command proper runs.
    pub async fn open(project_dir: &Path, engine_url: Option<&str>) -> Result<Self> {
        let config = CockpitConfig::load_or_default(project_dir)?;
        let root = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());
        let workspace = WorkspaceId::new(&root.display().to_string());

        let store: SharedStore = Arc::new(
            FileStore::open(&CockpitConfig::state_dir(project_dir))
                .context("Failed to open workflow state store")?,
        );
        let lock = WorkflowLock::load(workspace.clone(), store, ChangeBus::new())?;
        let workflow = Arc::new(RwLock::new(lock));

        let url = engine_url
            .map(str::to_string)
            .unwrap_or_else(|| config.engine_url());
        let engine: Arc<dyn EngineApi> =
            Arc::new(HttpEngineClient::new(&url, config.api_token()));

        let mut session = Session {
            coordinator: RecoveryCoordinator::new(config.recovery_budgets()),
            config,
            workspace,
            workflow,
            engine,
            activation_recovery: None,
        };
        // A failure here is an engine outage, not a reason to refuse the
        // command; the pending entry stays reconcilable.
        match session.recover().await {
            Ok(outcome) => session.activation_recovery = Some(outcome),
            Err(err) => {
                tracing::debug!(error = %err, "Activation recovery pass failed");
            }
        }
        Ok(session)
    }

    /// Run one reconciliation pass against the engine.
    pub async fn recover(&mut self) -> Result<RecoveryOutcome> {
        let mut workflow = self.workflow.write().await;
        self.coordinator
            .recover(&mut workflow, self.engine.as_ref())
            .await
    }
}
