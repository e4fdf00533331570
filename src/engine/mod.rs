//! Remote task-execution engine client.

pub mod client;
pub mod models;

pub use client::{EngineApi, HttpEngineClient};
pub use models::{
    ChatRequest, ChatResponse, ConfirmPlanRequest, ConfirmPlanResponse, CreatePlanRequest,
    CreatePlanResponse, PlanEnvelope, RunStatusResponse, RunSummary,
};
