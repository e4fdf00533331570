//! Plan request command — `cockpit plan`.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use cockpit::engine::CreatePlanRequest;
use cockpit::errors::WorkflowError;

use super::Session;

/// Ask the engine to draft a plan for `task`. Acquires the workflow
/// lock first; refuses with the gate's reason when another operation
/// holds it. The lock only advances past `planning` once the engine
/// confirms the plan landed.
pub async fn cmd_plan(session: &mut Session, task: &str) -> Result<()> {
    let pending = {
        let mut workflow = session.workflow.write().await;
        match workflow.begin_plan_request(task) {
            Ok(pending) => pending,
            Err(err) => {
                if let Some(reason) = explain_refusal(&err) {
                    anyhow::bail!("cannot start a new plan: {}", reason);
                }
                return Err(err.into());
            }
        }
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Drafting plan...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let request = CreatePlanRequest {
        plan_id: pending.plan_id.clone(),
        task: task.to_string(),
        workspace: session.workspace.raw().to_string(),
    };
    let response = match session.engine.create_plan(&request).await {
        Ok(response) => response,
        Err(err) => {
            // The lock and ledger stay put: the request may still land
            // server-side, and recovery reconciles or reclaims it.
            spinner.finish_and_clear();
            println!("Run `cockpit recover` once the engine is reachable again.");
            return Err(err.context("Plan request failed"));
        }
    };
    spinner.finish_and_clear();

    {
        let mut workflow = session.workflow.write().await;
        if response.plan_id != pending.plan_id {
            workflow.update_plan_id(&response.plan_id)?;
        }
        workflow.transition_to_confirming()?;
    }

    println!(
        "{} {}",
        style("Plan ready:").green().bold(),
        response.plan_id
    );
    println!("Review it, then run {} to execute.", style("cockpit confirm").cyan());
    Ok(())
}

/// Maps a refusal from the lock into operator-facing text; other errors
/// propagate.
pub fn explain_refusal(err: &WorkflowError) -> Option<String> {
    match err {
        WorkflowError::PlanRefused { reason } => Some(reason.clone()),
        WorkflowError::PendingOutstanding { kind, request_id } => Some(format!(
            "a {} request ({}) is still being reconciled",
            kind, request_id
        )),
        _ => None,
    }
}
