//! The execution workflow lock.
//!
//! One `WorkflowLock` exists per open view of a workspace and is the only
//! writer of the three persisted records: the `ExecutionLock` (what the
//! workspace is doing right now), the `PendingRequest` ledger entry (a
//! remote call issued but not yet observed to complete), and the
//! `ChatState`. All mutation funnels through this module; every
//! successful transition persists the new record and publishes a
//! whole-value snapshot on the change bus for other views.
//!
//! The transition graph only moves forward through the workflow or
//! collapses to idle:
//!
//! ```text
//! idle -> planning -> confirming -> running -> reviewing -> idle
//! ```
//!
//! Any other edge is rejected with `TransitionNotAllowed` and leaves
//! state unchanged. `force_unlock` is the operator override out of any
//! state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::errors::WorkflowError;
use crate::store::{ChangeBus, ChangeEvent, SharedStore, ViewId};
use crate::workflow::status::{StatusClass, classify};
use crate::workspace::WorkspaceId;

/// Lock status vocabulary. `Terminated` is a momentary marker applied
/// when a run reaches a terminal engine status; it collapses to `Idle`
/// before anything persists, so a stored record never holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    #[default]
    Idle,
    Planning,
    Confirming,
    Running,
    Reviewing,
    Terminated,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Confirming => "confirming",
            Self::Running => "running",
            Self::Reviewing => "reviewing",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot for the active run, updated by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_title: Option<String>,
}

/// The single source of truth for what a workspace is doing right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLock {
    pub status: LockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

/// Remote operation kinds a pending entry can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Plan,
    Confirm,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Confirm => "confirm",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for a remote call whose completion has not yet been
/// observed. Survives restarts so the recovery coordinator knows what an
/// interrupted process was waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl PendingRequest {
    pub fn new(kind: RequestKind, plan_id: &str, task: Option<&str>) -> Self {
        Self {
            kind,
            request_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            plan_id: plan_id.to_string(),
            task: task.map(str::to_string),
        }
    }

    /// Age of this entry against the current wall clock.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Standalone conversational exchange state, independent of the lock
/// except that chat is refused while a plan creation is in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Answer from the mutual-exclusion check: advisory to the caller, not a
/// lock primitive. A true-then-false race (another view locks first) is a
/// normal rejection, not an error.
#[derive(Debug, Clone)]
pub struct PlanGate {
    pub allowed: bool,
    pub reason: Option<String>,
    pub current: Option<ExecutionLock>,
}

pub struct WorkflowLock {
    workspace: WorkspaceId,
    store: SharedStore,
    bus: ChangeBus,
    view_id: ViewId,
    lock: ExecutionLock,
    pending: Option<PendingRequest>,
    chat: ChatState,
}

impl WorkflowLock {
    /// Load the workspace's persisted records, or defaults where nothing
    /// (or nothing readable) is stored. A corrupt record is logged and
    /// treated as absent rather than wedging the view.
    pub fn load(
        workspace: WorkspaceId,
        store: SharedStore,
        bus: ChangeBus,
    ) -> Result<Self, WorkflowError> {
        let lock = read_record::<ExecutionLock>(&store, &workspace.lock_key())?.unwrap_or_default();
        let pending = read_record::<PendingRequest>(&store, &workspace.pending_key())?;
        let chat = read_record::<ChatState>(&store, &workspace.chat_key())?.unwrap_or_default();

        Ok(Self {
            workspace,
            store,
            bus,
            view_id: Uuid::new_v4(),
            lock,
            pending,
            chat,
        })
    }

    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    // ── Mutual exclusion ─────────────────────────────────────────────

    /// Can a new plan start now? Allowed only when the lock is idle;
    /// otherwise the reason string is keyed off the current status.
    pub fn can_start_new_plan(&self) -> PlanGate {
        let reason = match self.lock.status {
            LockStatus::Idle => {
                return PlanGate {
                    allowed: true,
                    reason: None,
                    current: None,
                };
            }
            LockStatus::Planning => "plan generation in progress".to_string(),
            LockStatus::Confirming => "a plan is pending confirmation".to_string(),
            LockStatus::Running => "a task is currently executing".to_string(),
            LockStatus::Reviewing | LockStatus::Terminated => {
                // One lock tracks one run, so the review count is the
                // number of run ids currently held.
                let count = self.lock.run_id.iter().count().max(1);
                format!("{} run(s) awaiting review", count)
            }
        };
        PlanGate {
            allowed: false,
            reason: Some(reason),
            current: Some(self.lock.clone()),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// idle → planning. Acquires the lock for a new plan.
    pub fn lock_for_planning(&mut self, plan_id: &str, task: &str) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Idle, LockStatus::Planning)?;
        self.lock = ExecutionLock {
            status: LockStatus::Planning,
            plan_id: Some(plan_id.to_string()),
            run_id: None,
            task: Some(task.to_string()),
            progress: None,
            locked_at: Some(Utc::now()),
        };
        self.persist_lock()
    }

    /// planning → planning. Patches only the plan id, on both the lock
    /// and any pending plan entry (the engine may substitute its own id
    /// for the client-generated one).
    pub fn update_plan_id(&mut self, plan_id: &str) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Planning, LockStatus::Planning)?;
        self.lock.plan_id = Some(plan_id.to_string());
        self.persist_lock()?;
        if let Some(pending) = &mut self.pending
            && pending.kind == RequestKind::Plan
        {
            pending.plan_id = plan_id.to_string();
            self.persist_pending()?;
        }
        Ok(())
    }

    /// planning → confirming. Completes any pending plan request.
    pub fn transition_to_confirming(&mut self) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Planning, LockStatus::Confirming)?;
        self.lock.status = LockStatus::Confirming;
        self.persist_lock()?;
        self.complete_pending(RequestKind::Plan)
    }

    /// confirming → running. Records the spawned run id and completes any
    /// pending confirm request.
    pub fn transition_to_running(&mut self, run_id: &str) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Confirming, LockStatus::Running)?;
        self.lock.status = LockStatus::Running;
        self.lock.run_id = Some(run_id.to_string());
        self.persist_lock()?;
        self.complete_pending(RequestKind::Confirm)
    }

    /// running → reviewing.
    pub fn transition_to_reviewing(&mut self) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Running, LockStatus::Reviewing)?;
        self.lock.status = LockStatus::Reviewing;
        self.persist_lock()
    }

    /// reviewing → idle. The apply/discard decision has been made.
    pub fn release(&mut self) -> Result<(), WorkflowError> {
        self.require_status(LockStatus::Reviewing, LockStatus::Idle)?;
        self.lock = ExecutionLock::default();
        self.persist_lock()
    }

    /// Collapse a non-idle lock after its run reached a terminal engine
    /// status. Passes through the transient `terminated` marker, which
    /// never persists. Completion of the run also settles any pending
    /// entry.
    pub fn resolve_terminated(&mut self) -> Result<(), WorkflowError> {
        if self.lock.status.is_idle() {
            return Err(WorkflowError::TransitionNotAllowed {
                from: LockStatus::Idle,
                to: LockStatus::Terminated,
            });
        }
        self.lock.status = LockStatus::Terminated;
        tracing::debug!(run_id = ?self.lock.run_id, status = %self.lock.status, "Run finished");
        self.lock = ExecutionLock::default();
        self.persist_lock()?;
        if self.pending.is_some() {
            self.pending = None;
            self.persist_pending()?;
        }
        Ok(())
    }

    /// Operator override: always succeeds, clears lock, pending request,
    /// and chat state together.
    pub fn force_unlock(&mut self) -> Result<(), WorkflowError> {
        self.lock = ExecutionLock::default();
        self.pending = None;
        self.chat = ChatState::default();
        self.persist_lock()?;
        self.persist_pending()?;
        self.persist_chat()
    }

    /// Mutate only the progress snapshot. Valid in any non-idle status.
    pub fn update_progress(
        &mut self,
        current_step: u32,
        total_steps: u32,
        current_step_title: Option<&str>,
    ) -> Result<(), WorkflowError> {
        if self.lock.status.is_idle() {
            return Err(WorkflowError::NotLocked);
        }
        self.lock.progress = Some(ProgressSnapshot {
            current_step,
            total_steps,
            current_step_title: current_step_title.map(str::to_string),
        });
        self.persist_lock()
    }

    /// Apply a raw engine run status to the lock, using the normalization
    /// vocabulary: terminal collapses to idle, awaiting-review moves a
    /// running lock to reviewing, anything else holds state steady.
    /// Returns the classification so callers can stop polling on exit
    /// from `running`.
    pub fn apply_run_status(&mut self, raw: &str) -> Result<StatusClass, WorkflowError> {
        let class = classify(raw);
        match class {
            StatusClass::Terminal => self.resolve_terminated()?,
            StatusClass::AwaitingReview => {
                if self.lock.status == LockStatus::Running {
                    self.transition_to_reviewing()?;
                }
            }
            StatusClass::Running | StatusClass::Unknown => {}
        }
        Ok(class)
    }

    // ── Pending request ledger ───────────────────────────────────────

    /// Gate and record a new plan request: checks the mutual-exclusion
    /// policy and the one-outstanding-request rule, acquires the lock
    /// with a client-generated plan id, and persists the ledger entry.
    /// Call immediately before issuing the remote create-plan call.
    pub fn begin_plan_request(&mut self, task: &str) -> Result<PendingRequest, WorkflowError> {
        let gate = self.can_start_new_plan();
        if !gate.allowed {
            return Err(WorkflowError::PlanRefused {
                reason: gate.reason.unwrap_or_else(|| "workspace is busy".to_string()),
            });
        }
        self.require_no_pending()?;

        let plan_id = Uuid::new_v4().to_string();
        self.lock_for_planning(&plan_id, task)?;
        let pending = PendingRequest::new(RequestKind::Plan, &plan_id, Some(task));
        self.pending = Some(pending.clone());
        self.persist_pending()?;
        Ok(pending)
    }

    /// Record a confirm request for the plan currently awaiting
    /// confirmation. Call immediately before issuing the remote call.
    pub fn begin_confirm_request(&mut self) -> Result<PendingRequest, WorkflowError> {
        self.require_status(LockStatus::Confirming, LockStatus::Running)?;
        self.require_no_pending()?;

        let plan_id = self
            .lock
            .plan_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("confirming lock has no plan id"))?;
        let pending = PendingRequest::new(RequestKind::Confirm, &plan_id, self.lock.task.as_deref());
        self.pending = Some(pending.clone());
        self.persist_pending()?;
        Ok(pending)
    }

    /// Drop the pending entry without completing it (staleness reclaim).
    pub fn discard_pending(&mut self) -> Result<(), WorkflowError> {
        if self.pending.is_some() {
            self.pending = None;
            self.persist_pending()?;
        }
        Ok(())
    }

    fn require_no_pending(&self) -> Result<(), WorkflowError> {
        match &self.pending {
            Some(pending) => Err(WorkflowError::PendingOutstanding {
                kind: pending.kind,
                request_id: pending.request_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Clear the pending entry when a transition represents its expected
    /// completion.
    fn complete_pending(&mut self, kind: RequestKind) -> Result<(), WorkflowError> {
        if self.pending.as_ref().is_some_and(|p| p.kind == kind) {
            self.pending = None;
            self.persist_pending()?;
        }
        Ok(())
    }

    // ── Chat ─────────────────────────────────────────────────────────

    /// Begin a chat exchange. Chat may proceed alongside confirming,
    /// running, or reviewing, but not while a plan creation request is in
    /// flight, and not while another exchange is loading.
    pub fn begin_chat(&mut self) -> Result<String, WorkflowError> {
        if self.lock.status == LockStatus::Planning {
            return Err(WorkflowError::ChatBlocked);
        }
        if self.chat.is_loading {
            return Err(WorkflowError::ChatBusy);
        }
        let request_id = Uuid::new_v4().to_string();
        self.chat = ChatState {
            is_loading: true,
            request_id: Some(request_id.clone()),
            last_error: None,
        };
        self.persist_chat()?;
        Ok(request_id)
    }

    /// Settle the in-flight chat exchange, recording any error.
    pub fn finish_chat(&mut self, error: Option<&str>) -> Result<(), WorkflowError> {
        self.chat = ChatState {
            is_loading: false,
            request_id: None,
            last_error: error.map(str::to_string),
        };
        self.persist_chat()
    }

    // ── Cross-view application ───────────────────────────────────────

    /// Replace an in-memory record verbatim from another view's change
    /// event. No merge, no re-persist, no re-publish: the store already
    /// holds this value and the writing view already announced it.
    pub fn apply_external(&mut self, key: &str, value: Option<&str>) {
        if key == self.workspace.lock_key() {
            self.lock = parse_external(key, value).unwrap_or_default();
        } else if key == self.workspace.pending_key() {
            self.pending = parse_external(key, value);
        } else if key == self.workspace.chat_key() {
            self.chat = parse_external(key, value).unwrap_or_default();
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn require_status(&self, expected: LockStatus, to: LockStatus) -> Result<(), WorkflowError> {
        if self.lock.status == expected {
            Ok(())
        } else {
            Err(WorkflowError::TransitionNotAllowed {
                from: self.lock.status,
                to,
            })
        }
    }

    fn persist_lock(&mut self) -> Result<(), WorkflowError> {
        let json = serde_json::to_string(&self.lock)
            .map_err(|e| anyhow::Error::from(e).context("Failed to encode execution lock"))?;
        self.store.set(&self.workspace.lock_key(), &json)?;
        self.publish(self.workspace.lock_key(), Some(json));
        Ok(())
    }

    fn persist_pending(&mut self) -> Result<(), WorkflowError> {
        let key = self.workspace.pending_key();
        match &self.pending {
            Some(pending) => {
                let json = serde_json::to_string(pending)
                    .map_err(|e| anyhow::Error::from(e).context("Failed to encode pending request"))?;
                self.store.set(&key, &json)?;
                self.publish(key, Some(json));
            }
            None => {
                self.store.remove(&key)?;
                self.publish(key, None);
            }
        }
        Ok(())
    }

    fn persist_chat(&mut self) -> Result<(), WorkflowError> {
        let json = serde_json::to_string(&self.chat)
            .map_err(|e| anyhow::Error::from(e).context("Failed to encode chat state"))?;
        self.store.set(&self.workspace.chat_key(), &json)?;
        self.publish(self.workspace.chat_key(), Some(json));
        Ok(())
    }

    fn publish(&self, key: String, value: Option<String>) {
        self.bus.publish(ChangeEvent {
            key,
            value,
            origin: self.view_id,
        });
    }
}

fn read_record<T: DeserializeOwned>(
    store: &SharedStore,
    key: &str,
) -> Result<Option<T>, WorkflowError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable persisted record");
            Ok(None)
        }
    }
}

fn parse_external<T: DeserializeOwned>(key: &str, value: Option<&str>) -> Option<T> {
    let raw = value?;
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring unreadable cross-view record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn make_lock() -> WorkflowLock {
        let store: SharedStore = Arc::new(MemoryStore::new());
        WorkflowLock::load(WorkspaceId::new("/tmp/demo"), store, ChangeBus::new()).unwrap()
    }

    fn locked_to_running(lock: &mut WorkflowLock) {
        lock.lock_for_planning("p1", "add dark mode").unwrap();
        lock.transition_to_confirming().unwrap();
        lock.transition_to_running("r1").unwrap();
    }

    // ── State machine edges ──────────────────────────────────────────

    #[test]
    fn test_full_forward_walk() {
        let mut lock = make_lock();
        lock.lock_for_planning("p1", "add dark mode").unwrap();
        assert_eq!(lock.lock().status, LockStatus::Planning);
        assert_eq!(lock.lock().plan_id.as_deref(), Some("p1"));
        assert!(lock.lock().locked_at.is_some());

        lock.transition_to_confirming().unwrap();
        assert_eq!(lock.lock().status, LockStatus::Confirming);

        lock.transition_to_running("r1").unwrap();
        assert_eq!(lock.lock().status, LockStatus::Running);
        assert_eq!(lock.lock().run_id.as_deref(), Some("r1"));
        assert_eq!(lock.lock().plan_id.as_deref(), Some("p1"));

        lock.transition_to_reviewing().unwrap();
        assert_eq!(lock.lock().status, LockStatus::Reviewing);

        lock.release().unwrap();
        assert_eq!(lock.lock().status, LockStatus::Idle);
        assert!(lock.lock().plan_id.is_none());
        assert!(lock.lock().run_id.is_none());
    }

    #[test]
    fn test_invalid_edges_leave_state_unchanged() {
        let mut lock = make_lock();

        // idle cannot skip ahead
        assert!(matches!(
            lock.transition_to_confirming(),
            Err(WorkflowError::TransitionNotAllowed { .. })
        ));
        assert!(matches!(
            lock.transition_to_running("r1"),
            Err(WorkflowError::TransitionNotAllowed { .. })
        ));
        assert!(matches!(
            lock.release(),
            Err(WorkflowError::TransitionNotAllowed { .. })
        ));
        assert_eq!(lock.lock().status, LockStatus::Idle);

        // no path from reviewing back to planning without reaching idle
        locked_to_running(&mut lock);
        lock.transition_to_reviewing().unwrap();
        let before = lock.lock().clone();
        assert!(lock.lock_for_planning("p2", "other task").is_err());
        assert_eq!(lock.lock(), &before);
    }

    #[test]
    fn test_double_lock_is_rejected() {
        let mut lock = make_lock();
        lock.lock_for_planning("p1", "task").unwrap();
        let err = lock.lock_for_planning("p2", "task").unwrap_err();
        match err {
            WorkflowError::TransitionNotAllowed { from, to } => {
                assert_eq!(from, LockStatus::Planning);
                assert_eq!(to, LockStatus::Planning);
            }
            other => panic!("Expected TransitionNotAllowed, got {other}"),
        }
        assert_eq!(lock.lock().plan_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_update_plan_id_patches_only_plan_id() {
        let mut lock = make_lock();
        lock.lock_for_planning("local-id", "task").unwrap();
        let locked_at = lock.lock().locked_at;

        lock.update_plan_id("engine-id").unwrap();
        assert_eq!(lock.lock().status, LockStatus::Planning);
        assert_eq!(lock.lock().plan_id.as_deref(), Some("engine-id"));
        assert_eq!(lock.lock().task.as_deref(), Some("task"));
        assert_eq!(lock.lock().locked_at, locked_at);
    }

    #[test]
    fn test_update_plan_id_outside_planning_is_rejected() {
        let mut lock = make_lock();
        assert!(lock.update_plan_id("p1").is_err());
        locked_to_running(&mut lock);
        assert!(lock.update_plan_id("p2").is_err());
    }

    #[test]
    fn test_force_unlock_from_every_state() {
        for advance in 0..4 {
            let mut lock = make_lock();
            lock.lock_for_planning("p1", "task").unwrap();
            if advance >= 1 {
                lock.transition_to_confirming().unwrap();
            }
            if advance >= 2 {
                lock.transition_to_running("r1").unwrap();
            }
            if advance >= 3 {
                lock.transition_to_reviewing().unwrap();
            }
            lock.force_unlock().unwrap();
            assert_eq!(lock.lock().status, LockStatus::Idle);
            assert!(lock.pending().is_none());
            assert_eq!(lock.chat(), &ChatState::default());
        }
    }

    #[test]
    fn test_resolve_terminated_requires_non_idle() {
        let mut lock = make_lock();
        assert!(lock.resolve_terminated().is_err());
        locked_to_running(&mut lock);
        lock.resolve_terminated().unwrap();
        assert_eq!(lock.lock().status, LockStatus::Idle);
    }

    // ── Mutual exclusion ─────────────────────────────────────────────

    #[test]
    fn test_can_start_new_plan_only_when_idle() {
        let mut lock = make_lock();
        assert!(lock.can_start_new_plan().allowed);

        lock.lock_for_planning("p1", "task").unwrap();
        let gate = lock.can_start_new_plan();
        assert!(!gate.allowed);
        assert_eq!(gate.reason.as_deref(), Some("plan generation in progress"));
        assert_eq!(gate.current.as_ref().unwrap().status, LockStatus::Planning);

        lock.transition_to_confirming().unwrap();
        assert_eq!(
            lock.can_start_new_plan().reason.as_deref(),
            Some("a plan is pending confirmation")
        );

        lock.transition_to_running("r1").unwrap();
        assert_eq!(
            lock.can_start_new_plan().reason.as_deref(),
            Some("a task is currently executing")
        );

        lock.transition_to_reviewing().unwrap();
        assert_eq!(
            lock.can_start_new_plan().reason.as_deref(),
            Some("1 run(s) awaiting review")
        );

        lock.release().unwrap();
        assert!(lock.can_start_new_plan().allowed);
    }

    // ── Progress ─────────────────────────────────────────────────────

    #[test]
    fn test_update_progress_mutates_only_progress() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);

        lock.update_progress(1, 4, Some("write tests")).unwrap();
        lock.update_progress(2, 4, Some("apply edits")).unwrap();
        lock.update_progress(2, 4, Some("apply edits")).unwrap();

        assert_eq!(lock.lock().status, LockStatus::Running);
        assert_eq!(lock.lock().plan_id.as_deref(), Some("p1"));
        assert_eq!(lock.lock().run_id.as_deref(), Some("r1"));
        let progress = lock.lock().progress.as_ref().unwrap();
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.total_steps, 4);
        assert_eq!(progress.current_step_title.as_deref(), Some("apply edits"));
    }

    #[test]
    fn test_update_progress_rejected_when_idle() {
        let mut lock = make_lock();
        assert!(matches!(
            lock.update_progress(1, 2, None),
            Err(WorkflowError::NotLocked)
        ));
    }

    // ── Pending ledger ───────────────────────────────────────────────

    #[test]
    fn test_begin_plan_request_acquires_lock_and_ledger() {
        let mut lock = make_lock();
        let pending = lock.begin_plan_request("add dark mode").unwrap();
        assert_eq!(pending.kind, RequestKind::Plan);
        assert_eq!(pending.task.as_deref(), Some("add dark mode"));
        assert_eq!(lock.lock().status, LockStatus::Planning);
        assert_eq!(lock.lock().plan_id.as_deref(), Some(pending.plan_id.as_str()));
        assert_eq!(lock.pending(), Some(&pending));
    }

    #[test]
    fn test_begin_plan_request_refused_when_not_idle() {
        let mut lock = make_lock();
        lock.begin_plan_request("first").unwrap();
        match lock.begin_plan_request("second") {
            Err(WorkflowError::PlanRefused { reason }) => {
                assert_eq!(reason, "plan generation in progress");
            }
            other => panic!("Expected PlanRefused, got {other:?}"),
        }
    }

    #[test]
    fn test_second_pending_request_is_refused() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        // The plan landed but its pending entry was never cleared
        // (simulates an interrupted response): confirm must be refused.
        lock.lock.status = LockStatus::Confirming;
        assert!(matches!(
            lock.begin_confirm_request(),
            Err(WorkflowError::PendingOutstanding { .. })
        ));
    }

    #[test]
    fn test_transition_to_confirming_completes_plan_pending() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        lock.transition_to_confirming().unwrap();
        assert!(lock.pending().is_none());
    }

    #[test]
    fn test_transition_to_running_completes_confirm_pending() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        lock.transition_to_confirming().unwrap();
        let pending = lock.begin_confirm_request().unwrap();
        assert_eq!(pending.kind, RequestKind::Confirm);
        lock.transition_to_running("r1").unwrap();
        assert!(lock.pending().is_none());
    }

    #[test]
    fn test_transition_to_confirming_keeps_confirm_pending() {
        // A pending entry of the other kind is not this transition's
        // expected completion and must survive.
        let mut lock = make_lock();
        lock.lock_for_planning("p1", "task").unwrap();
        lock.pending = Some(PendingRequest::new(RequestKind::Confirm, "p1", None));
        lock.persist_pending().unwrap();
        lock.transition_to_confirming().unwrap();
        assert!(lock.pending().is_some());
    }

    #[test]
    fn test_update_plan_id_patches_pending_plan_entry() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        lock.update_plan_id("engine-id").unwrap();
        assert_eq!(lock.pending().unwrap().plan_id, "engine-id");
    }

    // ── Run status application ───────────────────────────────────────

    #[test]
    fn test_apply_terminal_status_collapses_to_idle() {
        for status in &["completed", "FAILED", "Cancelled", "applied", "discarded"] {
            let mut lock = make_lock();
            locked_to_running(&mut lock);
            let class = lock.apply_run_status(status).unwrap();
            assert_eq!(class, StatusClass::Terminal);
            assert_eq!(lock.lock().status, LockStatus::Idle, "status: {}", status);
        }
    }

    #[test]
    fn test_apply_awaiting_review_moves_to_reviewing() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);
        let class = lock.apply_run_status("AWAITING-REVIEW").unwrap();
        assert_eq!(class, StatusClass::AwaitingReview);
        assert_eq!(lock.lock().status, LockStatus::Reviewing);
        assert_eq!(lock.lock().run_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_apply_unknown_status_holds_state() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);
        let class = lock.apply_run_status("warming-up").unwrap();
        assert_eq!(class, StatusClass::Unknown);
        assert_eq!(lock.lock().status, LockStatus::Running);
    }

    #[test]
    fn test_apply_running_status_is_a_no_op() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);
        let class = lock.apply_run_status("queued").unwrap();
        assert_eq!(class, StatusClass::Running);
        assert_eq!(lock.lock().status, LockStatus::Running);
    }

    // ── Chat ─────────────────────────────────────────────────────────

    #[test]
    fn test_chat_blocked_while_planning() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        assert!(matches!(lock.begin_chat(), Err(WorkflowError::ChatBlocked)));
    }

    #[test]
    fn test_chat_allowed_alongside_running_and_reviewing() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);
        let request_id = lock.begin_chat().unwrap();
        assert!(lock.chat().is_loading);
        assert_eq!(lock.chat().request_id.as_deref(), Some(request_id.as_str()));
        lock.finish_chat(None).unwrap();
        assert!(!lock.chat().is_loading);
        assert!(lock.chat().last_error.is_none());

        lock.transition_to_reviewing().unwrap();
        assert!(lock.begin_chat().is_ok());
    }

    #[test]
    fn test_concurrent_chat_is_refused() {
        let mut lock = make_lock();
        lock.begin_chat().unwrap();
        assert!(matches!(lock.begin_chat(), Err(WorkflowError::ChatBusy)));
    }

    #[test]
    fn test_finish_chat_records_error() {
        let mut lock = make_lock();
        lock.begin_chat().unwrap();
        lock.finish_chat(Some("engine unreachable")).unwrap();
        assert_eq!(lock.chat().last_error.as_deref(), Some("engine unreachable"));
        assert!(lock.chat().request_id.is_none());
    }

    // ── Persistence round-trips ──────────────────────────────────────

    #[test]
    fn test_lock_survives_reload() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = ChangeBus::new();
        let ws = WorkspaceId::new("/tmp/demo");

        {
            let mut lock = WorkflowLock::load(ws.clone(), store.clone(), bus.clone()).unwrap();
            lock.lock_for_planning("p1", "add dark mode").unwrap();
            lock.transition_to_confirming().unwrap();
            lock.transition_to_running("r1").unwrap();
            lock.update_progress(2, 5, Some("apply edits")).unwrap();
        }

        let reloaded = WorkflowLock::load(ws, store, bus).unwrap();
        assert_eq!(reloaded.lock().status, LockStatus::Running);
        assert_eq!(reloaded.lock().plan_id.as_deref(), Some("p1"));
        assert_eq!(reloaded.lock().run_id.as_deref(), Some("r1"));
        assert_eq!(reloaded.lock().task.as_deref(), Some("add dark mode"));
        assert_eq!(reloaded.lock().progress.as_ref().unwrap().current_step, 2);
        assert!(reloaded.lock().locked_at.is_some());
    }

    #[test]
    fn test_persisted_lock_roundtrip_is_byte_identical() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = ChangeBus::new();
        let ws = WorkspaceId::new("/tmp/demo");

        let mut lock = WorkflowLock::load(ws.clone(), store.clone(), bus).unwrap();
        lock.lock_for_planning("p1", "task").unwrap();

        let stored = store.get(&ws.lock_key()).unwrap().unwrap();
        let parsed: ExecutionLock = serde_json::from_str(&stored).unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), stored);
    }

    #[test]
    fn test_pending_survives_reload() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = ChangeBus::new();
        let ws = WorkspaceId::new("/tmp/demo");

        let pending = {
            let mut lock = WorkflowLock::load(ws.clone(), store.clone(), bus.clone()).unwrap();
            lock.begin_plan_request("task").unwrap()
        };

        let reloaded = WorkflowLock::load(ws, store, bus).unwrap();
        assert_eq!(reloaded.pending(), Some(&pending));
    }

    #[test]
    fn test_corrupt_record_is_treated_as_absent() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let ws = WorkspaceId::new("/tmp/demo");
        store.set(&ws.lock_key(), "{definitely not json").unwrap();

        let lock = WorkflowLock::load(ws, store, ChangeBus::new()).unwrap();
        assert_eq!(lock.lock().status, LockStatus::Idle);
    }

    #[test]
    fn test_terminated_never_persists() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = ChangeBus::new();
        let ws = WorkspaceId::new("/tmp/demo");

        let mut lock = WorkflowLock::load(ws.clone(), store.clone(), bus).unwrap();
        lock.lock_for_planning("p1", "task").unwrap();
        lock.transition_to_confirming().unwrap();
        lock.transition_to_running("r1").unwrap();
        lock.apply_run_status("completed").unwrap();

        let stored = store.get(&ws.lock_key()).unwrap().unwrap();
        assert!(stored.contains(r#""status":"idle""#));
        assert!(!stored.contains("terminated"));
    }

    // ── Cross-view application ───────────────────────────────────────

    #[test]
    fn test_apply_external_replaces_record_verbatim() {
        let mut lock = make_lock();
        let external = ExecutionLock {
            status: LockStatus::Confirming,
            plan_id: Some("p9".to_string()),
            run_id: None,
            task: Some("other view's task".to_string()),
            progress: None,
            locked_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&external).unwrap();

        lock.apply_external(&lock.workspace().lock_key(), Some(&json));
        assert_eq!(lock.lock(), &external);
    }

    #[test]
    fn test_apply_external_removal_resets_record() {
        let mut lock = make_lock();
        lock.begin_plan_request("task").unwrap();
        lock.apply_external(&lock.workspace().pending_key(), None);
        assert!(lock.pending().is_none());
    }

    #[test]
    fn test_apply_external_ignores_foreign_keys() {
        let mut lock = make_lock();
        locked_to_running(&mut lock);
        let before = lock.lock().clone();
        lock.apply_external("cockpit:other-workspace:lock", Some("{\"status\":\"idle\"}"));
        assert_eq!(lock.lock(), &before);
    }

    // ── Serde contracts ──────────────────────────────────────────────

    #[test]
    fn test_lock_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LockStatus::Reviewing).unwrap(),
            "\"reviewing\""
        );
        assert_eq!(
            serde_json::from_str::<LockStatus>("\"confirming\"").unwrap(),
            LockStatus::Confirming
        );
    }

    #[test]
    fn test_request_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RequestKind::Plan).unwrap(), "\"plan\"");
        assert_eq!(
            serde_json::from_str::<RequestKind>("\"confirm\"").unwrap(),
            RequestKind::Confirm
        );
    }

    #[test]
    fn test_default_lock_is_idle_and_empty() {
        let lock = ExecutionLock::default();
        assert_eq!(lock.status, LockStatus::Idle);
        assert!(lock.plan_id.is_none());
        assert!(lock.run_id.is_none());
        assert!(lock.locked_at.is_none());
    }
}
