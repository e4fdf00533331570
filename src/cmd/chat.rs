//! Conversational side channel — `cockpit chat`.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use cockpit::engine::ChatRequest;
use cockpit::errors::WorkflowError;

use super::Session;

/// Send one chat message to the engine. Blocked while a plan is being
/// generated, and strictly one message in flight at a time.
pub async fn cmd_chat(session: &mut Session, message: &str) -> Result<()> {
    {
        let mut workflow = session.workflow.write().await;
        match workflow.begin_chat() {
            Ok(_) => {}
            Err(WorkflowError::ChatBlocked) => {
                anyhow::bail!("chat is unavailable while a plan is being generated");
            }
            Err(WorkflowError::ChatBusy) => {
                anyhow::bail!("a chat message is already in flight");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let request = ChatRequest {
        message: message.to_string(),
        workspace: session.workspace.raw().to_string(),
    };
    let result = session.engine.send_chat(&request).await;
    spinner.finish_and_clear();

    let mut workflow = session.workflow.write().await;
    match result {
        Ok(response) => {
            workflow.finish_chat(None)?;
            println!("{}", response.reply);
        }
        Err(err) => {
            workflow.finish_chat(Some(&format!("{:#}", err)))?;
            return Err(err.context("Chat failed"));
        }
    }
    Ok(())
}
