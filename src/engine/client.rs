//! Engine API client.
//!
//! `EngineApi` is the seam between the workflow core and the remote
//! engine: the recovery coordinator and poller only see this trait, so
//! tests drive them with an in-memory engine. `HttpEngineClient` is the
//! production implementation over the engine's REST surface.

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::models::{
    ChatRequest, ChatResponse, ConfirmPlanRequest, ConfirmPlanResponse, CreatePlanRequest,
    CreatePlanResponse, PlanEnvelope, RunStatusResponse, RunSummary,
};

/// The engine operations the console consumes.
///
/// Lookup calls distinguish "the engine says it does not exist"
/// (`Ok(None)`) from "the call itself failed" (`Err`): recovery treats
/// the latter as not-yet-known and retries until timeout.
#[async_trait]
pub trait EngineApi: Send + Sync {
    async fn create_plan(&self, request: &CreatePlanRequest) -> Result<CreatePlanResponse>;

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PlanEnvelope>>;

    async fn confirm_plan(&self, plan_id: &str, workspace: &str) -> Result<ConfirmPlanResponse>;

    async fn get_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse>;

    async fn list_runs(&self, workspace: &str) -> Result<Vec<RunSummary>>;

    async fn cancel_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse>;

    async fn apply_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse>;

    async fn discard_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse>;

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// HTTP implementation of [`EngineApi`].
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpEngineClient {
    pub fn new(base_url: &str, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// POST a run action (`cancel`, `apply`, `discard`) and parse the
    /// status the engine reports afterwards.
    async fn run_action(
        &self,
        action: &str,
        run_id: &str,
        plan_id: &str,
    ) -> Result<RunStatusResponse> {
        let url = self.url(&format!("/runs/{}/{}", run_id, action));
        self.request(self.client.post(&url))
            .query(&[("plan_id", plan_id)])
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to engine", action))?
            .error_for_status()
            .with_context(|| format!("Engine {} endpoint returned error status", action))?
            .json::<RunStatusResponse>()
            .await
            .with_context(|| format!("Failed to parse {} response from engine", action))
    }
}

#[async_trait]
impl EngineApi for HttpEngineClient {
    async fn create_plan(&self, request: &CreatePlanRequest) -> Result<CreatePlanResponse> {
        self.request(self.client.post(self.url("/plans")))
            .json(request)
            .send()
            .await
            .context("Failed to send plan creation request to engine")?
            .error_for_status()
            .context("Engine plan creation endpoint returned error status")?
            .json::<CreatePlanResponse>()
            .await
            .context("Failed to parse plan creation response from engine")
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<PlanEnvelope>> {
        let url = self.url(&format!("/plans/{}", plan_id));
        let resp = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to send plan lookup request to engine")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope = resp
            .error_for_status()
            .context("Engine plan lookup endpoint returned error status")?
            .json::<PlanEnvelope>()
            .await
            .context("Failed to parse plan lookup response from engine")?;

        // Some engines answer 200 with an empty envelope instead of 404.
        Ok(envelope.exists().then_some(envelope))
    }

    async fn confirm_plan(&self, plan_id: &str, workspace: &str) -> Result<ConfirmPlanResponse> {
        let url = self.url(&format!("/plans/{}/confirm", plan_id));
        self.request(self.client.post(&url))
            .json(&ConfirmPlanRequest {
                workspace: workspace.to_string(),
            })
            .send()
            .await
            .context("Failed to send plan confirmation request to engine")?
            .error_for_status()
            .context("Engine plan confirmation endpoint returned error status")?
            .json::<ConfirmPlanResponse>()
            .await
            .context("Failed to parse plan confirmation response from engine")
    }

    async fn get_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse> {
        let url = self.url(&format!("/runs/{}", run_id));
        self.request(self.client.get(&url))
            .query(&[("plan_id", plan_id)])
            .send()
            .await
            .context("Failed to send run status request to engine")?
            .error_for_status()
            .context("Engine run status endpoint returned error status")?
            .json::<RunStatusResponse>()
            .await
            .context("Failed to parse run status response from engine")
    }

    async fn list_runs(&self, workspace: &str) -> Result<Vec<RunSummary>> {
        self.request(self.client.get(self.url("/runs")))
            .query(&[("workspace", workspace)])
            .send()
            .await
            .context("Failed to send run listing request to engine")?
            .error_for_status()
            .context("Engine run listing endpoint returned error status")?
            .json::<Vec<RunSummary>>()
            .await
            .context("Failed to parse run listing response from engine")
    }

    async fn cancel_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse> {
        self.run_action("cancel", run_id, plan_id).await
    }

    async fn apply_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse> {
        self.run_action("apply", run_id, plan_id).await
    }

    async fn discard_run(&self, run_id: &str, plan_id: &str) -> Result<RunStatusResponse> {
        self.run_action("discard", run_id, plan_id).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.request(self.client.post(self.url("/chat")))
            .json(request)
            .send()
            .await
            .context("Failed to send chat request to engine")?
            .error_for_status()
            .context("Engine chat endpoint returned error status")?
            .json::<ChatResponse>()
            .await
            .context("Failed to parse chat response from engine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpEngineClient::new("http://localhost:7878/", None);
        assert_eq!(client.url("/plans"), "http://localhost:7878/plans");
    }

    #[test]
    fn test_url_joins_run_paths() {
        let client = HttpEngineClient::new("http://localhost:7878", None);
        assert_eq!(
            client.url("/runs/r1/apply"),
            "http://localhost:7878/runs/r1/apply"
        );
    }
}
