//! Background run polling.
//!
//! While a run is executing, the poller asks the engine for a status
//! report on a fixed cadence and feeds it through the lock's normal
//! status application. It does nothing in any other lock state, and it
//! exits on its own once the lock leaves `running` (the terminal and
//! reviewing transitions happen inside `apply_run_status`).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::engine::EngineApi;
use crate::workflow::lock::{LockStatus, WorkflowLock};

pub type SharedWorkflow = Arc<RwLock<WorkflowLock>>;

pub struct RunPoller {
    workflow: SharedWorkflow,
    engine: Arc<dyn EngineApi>,
    interval: Duration,
}

impl RunPoller {
    pub fn new(workflow: SharedWorkflow, engine: Arc<dyn EngineApi>, interval: Duration) -> Self {
        Self {
            workflow,
            engine,
            interval,
        }
    }

    /// Spawn the polling loop. The task finishes when the lock is no
    /// longer `running`, so callers spawn a fresh poller each time a run
    /// starts.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                if !self.poll_once().await {
                    break;
                }
                ticker.tick().await;
            }
        })
    }

    /// One polling step. Returns false once polling should stop.
    pub async fn poll_once(&self) -> bool {
        let target = {
            let workflow = self.workflow.read().await;
            if workflow.lock().status != LockStatus::Running {
                return false;
            }
            match (&workflow.lock().run_id, &workflow.lock().plan_id) {
                (Some(run_id), Some(plan_id)) => (run_id.clone(), plan_id.clone()),
                _ => return false,
            }
        };

        let status = match self.engine.get_run(&target.0, &target.1).await {
            Ok(status) => status,
            Err(err) => {
                // Transient engine trouble; keep the lock as-is and try
                // again next tick.
                tracing::debug!(run_id = %target.0, error = %err, "Run poll failed");
                return true;
            }
        };

        let mut workflow = self.workflow.write().await;
        if workflow.lock().status != LockStatus::Running {
            return false;
        }
        if let (Some(current), Some(total)) = (status.current_step, status.total_steps)
            && let Err(err) = workflow.update_progress(current, total, status.current_step_title.as_deref())
        {
            tracing::warn!(error = %err, "Failed to record run progress");
        }
        match workflow.apply_run_status(&status.status) {
            Ok(_) => workflow.lock().status == LockStatus::Running,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to apply run status");
                true
            }
        }
    }
}
