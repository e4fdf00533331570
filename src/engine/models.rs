//! Wire types for the engine HTTP API.
//!
//! Only the minimal response shapes the console depends on are modeled;
//! the engine is free to return more fields and they are ignored. Run
//! statuses arrive as free-form strings and are normalized by
//! `workflow::status`, never matched raw.

use serde::{Deserialize, Serialize};

/// Request body for plan creation. The console generates the plan id
/// client-side so an interrupted request can still be reconciled by id;
/// the engine may echo it back or substitute its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub plan_id: String,
    pub task: String,
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanResponse {
    pub plan_id: String,
}

/// A plan looked up by id. Existence of either field is the positive
/// signal that the plan landed server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

impl PlanEnvelope {
    pub fn exists(&self) -> bool {
        self.plan.is_some() || self.snapshot.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPlanRequest {
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPlanResponse {
    pub run_id: String,
}

/// Status report for one run. `status` is free-form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_title: Option<String>,
}

/// One entry from the workspace run listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub plan_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_envelope_exists_when_plan_present() {
        let envelope: PlanEnvelope =
            serde_json::from_str(r#"{"plan":{"steps":[]}}"#).unwrap();
        assert!(envelope.exists());
    }

    #[test]
    fn test_plan_envelope_exists_when_only_snapshot_present() {
        let envelope: PlanEnvelope =
            serde_json::from_str(r#"{"snapshot":{"files":[]}}"#).unwrap();
        assert!(envelope.exists());
    }

    #[test]
    fn test_plan_envelope_empty_does_not_exist() {
        let envelope: PlanEnvelope = serde_json::from_str("{}").unwrap();
        assert!(!envelope.exists());
    }

    #[test]
    fn test_run_status_response_tolerates_missing_progress() {
        let resp: RunStatusResponse =
            serde_json::from_str(r#"{"status":"AWAITING-REVIEW"}"#).unwrap();
        assert_eq!(resp.status, "AWAITING-REVIEW");
        assert!(resp.current_step.is_none());
        assert!(resp.total_steps.is_none());
    }

    #[test]
    fn test_run_status_response_with_progress() {
        let resp: RunStatusResponse = serde_json::from_str(
            r#"{"status":"running","current_step":2,"total_steps":5,"current_step_title":"apply edits"}"#,
        )
        .unwrap();
        assert_eq!(resp.current_step, Some(2));
        assert_eq!(resp.total_steps, Some(5));
        assert_eq!(resp.current_step_title.as_deref(), Some("apply edits"));
    }

    #[test]
    fn test_run_summary_deserialize() {
        let json = r#"[{"run_id":"r1","plan_id":"p1","status":"queued"}]"#;
        let runs: Vec<RunSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "r1");
        assert_eq!(runs[0].plan_id, "p1");
    }

    #[test]
    fn test_create_plan_request_carries_client_id() {
        let req = CreatePlanRequest {
            plan_id: "p-123".to_string(),
            task: "add dark mode".to_string(),
            workspace: "/tmp/demo".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""plan_id":"p-123""#));
    }
}
