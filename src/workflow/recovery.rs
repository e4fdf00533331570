//! Crash-consistency reconciliation for the workflow lock.
//!
//! Runs once when a workspace becomes active and whenever a persisted
//! `PendingRequest` has not yet been reconciled in this process
//! lifetime. The coordinator asks the engine what actually happened to
//! the interrupted operation and replays the answer through the lock's
//! ordinary transitions, so a reload during "create plan" or "confirm
//! plan" neither strands the UI in a false state nor forgets a plan or
//! run that did complete server-side.
//!
//! Remote lookup failures here mean "not yet known", never "terminal":
//! the attempt is simply repeated on the next activation until the
//! pending entry ages past its budget and is reclaimed.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;

use crate::engine::EngineApi;
use crate::workflow::lock::{LockStatus, PendingRequest, RequestKind, WorkflowLock};

/// Staleness budgets per request kind. A confirm spawns a full run and
/// legitimately takes longer than plan generation, so the two carry
/// separate budgets.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryBudgets {
    pub plan_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl Default for RecoveryBudgets {
    fn default() -> Self {
        Self {
            plan_timeout: Duration::from_secs(15),
            confirm_timeout: Duration::from_secs(45),
        }
    }
}

impl RecoveryBudgets {
    fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Plan => self.plan_timeout,
            RequestKind::Confirm => self.confirm_timeout,
        }
    }
}

/// What one recovery pass concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Nothing was pending; no reconciliation needed.
    NothingPending,
    /// This pending entry was already reconciled in this process, or a
    /// pass is currently in flight.
    AlreadyReconciled,
    /// The entry aged past its budget and was reclaimed. `collapsed` is
    /// set when the lock was also collapsed to idle.
    StaleReclaimed { collapsed: bool },
    /// The interrupted plan creation did land; the lock moved to
    /// confirming.
    PlanLanded,
    /// The interrupted confirm did spawn a run; the lock now reflects
    /// that run's live status.
    RunReconciled { status: String },
    /// The engine does not (yet) corroborate the operation; state was
    /// left untouched pending the staleness budget.
    Unresolved,
}

pub struct RecoveryCoordinator {
    budgets: RecoveryBudgets,
    reconciled: HashSet<String>,
    in_flight: bool,
}

impl RecoveryCoordinator {
    pub fn new(budgets: RecoveryBudgets) -> Self {
        Self {
            budgets,
            reconciled: HashSet::new(),
            in_flight: false,
        }
    }

    /// Reconcile the workspace's pending request (if any) against the
    /// engine's authoritative state. At most one attempt per loaded
    /// pending entry; re-entrant calls while an attempt is outstanding
    /// return immediately.
    pub async fn recover(
        &mut self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
    ) -> Result<RecoveryOutcome> {
        let Some(pending) = lock.pending().cloned() else {
            return Ok(RecoveryOutcome::NothingPending);
        };
        if self.in_flight || self.reconciled.contains(&pending.request_id) {
            return Ok(RecoveryOutcome::AlreadyReconciled);
        }
        self.in_flight = true;
        self.reconciled.insert(pending.request_id.clone());

        let outcome = self.reconcile(lock, engine, &pending).await;
        self.in_flight = false;

        // A lookup failure is "not yet known": allow a later pass to
        // retry this same entry.
        if outcome.is_err() {
            self.reconciled.remove(&pending.request_id);
        }
        outcome
    }

    async fn reconcile(
        &self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
        pending: &PendingRequest,
    ) -> Result<RecoveryOutcome> {
        let budget = self.budgets.timeout_for(pending.kind);
        let stale = pending
            .age()
            .to_std()
            .map(|age| age > budget)
            .unwrap_or(true); // a future started_at is clock skew; treat as stale

        if stale {
            return self.reclaim_stale(lock, engine, pending).await;
        }

        match pending.kind {
            RequestKind::Plan => self.reconcile_plan(lock, engine, pending).await,
            RequestKind::Confirm => self.reconcile_confirm(lock, engine, pending).await,
        }
    }

    /// Rule 1: discard an over-age entry. A `planning` lock with no
    /// corroborating plan collapses to idle — the creation almost
    /// certainly never completed, or its result is unrecoverable without
    /// re-asking.
    async fn reclaim_stale(
        &self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
        pending: &PendingRequest,
    ) -> Result<RecoveryOutcome> {
        // One last corroboration attempt before giving up on the result.
        if pending.kind == RequestKind::Plan
            && let Ok(Some(_)) = engine.get_plan(&pending.plan_id).await
        {
            lock.transition_to_confirming()?;
            return Ok(RecoveryOutcome::PlanLanded);
        }
        if pending.kind == RequestKind::Confirm
            && let Ok(runs) = engine.list_runs(lock.workspace().raw()).await
            && let Some(run) = runs.into_iter().find(|r| r.plan_id == pending.plan_id)
        {
            return self.adopt_run(lock, engine, &run.run_id, &pending.plan_id).await;
        }

        let collapsed = lock.lock().status == LockStatus::Planning;
        lock.discard_pending()?;
        if collapsed {
            lock.resolve_terminated()?;
        }
        tracing::info!(
            kind = %pending.kind,
            request_id = %pending.request_id,
            collapsed,
            "Reclaimed stale pending request"
        );
        Ok(RecoveryOutcome::StaleReclaimed { collapsed })
    }

    /// Rule 2: a pending plan creation. If the plan now exists the lock
    /// moves to confirming (which clears the entry); if the engine says
    /// it is missing, state is left untouched — a slow but in-flight
    /// creation may still land, and rule 1 reclaims it after timeout.
    async fn reconcile_plan(
        &self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
        pending: &PendingRequest,
    ) -> Result<RecoveryOutcome> {
        match engine.get_plan(&pending.plan_id).await? {
            Some(_) => {
                lock.transition_to_confirming()?;
                Ok(RecoveryOutcome::PlanLanded)
            }
            None => Ok(RecoveryOutcome::Unresolved),
        }
    }

    /// Rule 3: a pending confirm. Find the run spawned for this plan; if
    /// one exists, adopt it and map its live status into the lock by the
    /// same normalization used for polling. No matching run leaves state
    /// untouched pending timeout.
    async fn reconcile_confirm(
        &self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
        pending: &PendingRequest,
    ) -> Result<RecoveryOutcome> {
        let runs = engine.list_runs(lock.workspace().raw()).await?;
        match runs.into_iter().find(|r| r.plan_id == pending.plan_id) {
            Some(run) => self.adopt_run(lock, engine, &run.run_id, &pending.plan_id).await,
            None => Ok(RecoveryOutcome::Unresolved),
        }
    }

    /// The confirm did spawn a run: walk the lock forward along ordinary
    /// edges (confirming → running [→ reviewing]) and then apply the
    /// run's live status.
    async fn adopt_run(
        &self,
        lock: &mut WorkflowLock,
        engine: &dyn EngineApi,
        run_id: &str,
        plan_id: &str,
    ) -> Result<RecoveryOutcome> {
        let status = engine.get_run(run_id, plan_id).await?;

        if lock.lock().status == LockStatus::Confirming {
            lock.transition_to_running(run_id)?;
        }
        if let (Some(current), Some(total)) = (status.current_step, status.total_steps)
            && !lock.lock().status.is_idle()
        {
            lock.update_progress(current, total, status.current_step_title.as_deref())?;
        }
        lock.apply_run_status(&status.status)?;
        // transition_to_running already cleared the entry in the normal
        // path; this covers a run adopted while the lock was elsewhere.
        lock.discard_pending()?;
        Ok(RecoveryOutcome::RunReconciled {
            status: status.status,
        })
    }
}
