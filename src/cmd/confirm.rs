//! Plan confirmation and run watching — `cockpit confirm`, `cockpit watch`.

use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use cockpit::workflow::{LockStatus, RunPoller};

use super::Session;

/// Confirm the drafted plan and start its run, then watch it.
pub async fn cmd_confirm(session: &mut Session) -> Result<()> {
    let plan_id = {
        let mut workflow = session.workflow.write().await;
        if workflow.lock().status != LockStatus::Confirming {
            anyhow::bail!(
                "cannot confirm: nothing is awaiting confirmation (lock is {})",
                workflow.lock().status
            );
        }
        if let Err(err) = workflow.begin_confirm_request() {
            if let Some(reason) = super::plan::explain_refusal(&err) {
                anyhow::bail!("cannot confirm: {}", reason);
            }
            return Err(err.into());
        }
        workflow
            .lock()
            .plan_id
            .clone()
            .context("confirming lock has no plan id")?
    };

    let response = match session
        .engine
        .confirm_plan(&plan_id, session.workspace.raw())
        .await
    {
        Ok(response) => response,
        Err(err) => {
            // Same contract as plan: state holds until the engine
            // corroborates or the pending entry ages out.
            println!("Run `cockpit recover` once the engine is reachable again.");
            return Err(err.context("Confirm failed"));
        }
    };

    session
        .workflow
        .write()
        .await
        .transition_to_running(&response.run_id)?;
    println!(
        "{} run {}",
        style("Executing:").green().bold(),
        response.run_id
    );

    cmd_watch(session).await
}

/// Follow the active run until it leaves `running`, polling the engine
/// on the configured cadence.
pub async fn cmd_watch(session: &mut Session) -> Result<()> {
    {
        let workflow = session.workflow.read().await;
        match workflow.lock().status {
            LockStatus::Running => {}
            LockStatus::Reviewing => {
                println!(
                    "Run {} is awaiting review. Use {} or {}.",
                    workflow.lock().run_id.as_deref().unwrap_or("?"),
                    style("cockpit apply").cyan(),
                    style("cockpit discard").cyan()
                );
                return Ok(());
            }
            status => {
                println!("Nothing is running (lock is {}).", status);
                return Ok(());
            }
        }
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    bar.set_message("Executing...");
    bar.enable_steady_tick(Duration::from_millis(120));

    let interval = session.config.poll_interval();
    let poller = RunPoller::new(session.workflow.clone(), session.engine.clone(), interval);
    loop {
        let keep_going = poller.poll_once().await;
        {
            let workflow = session.workflow.read().await;
            if let Some(progress) = &workflow.lock().progress {
                bar.set_message(format!(
                    "Step {}/{}: {}",
                    progress.current_step,
                    progress.total_steps,
                    progress.current_step_title.as_deref().unwrap_or("working")
                ));
            }
        }
        if !keep_going {
            break;
        }
        tokio::time::sleep(interval).await;
    }
    bar.finish_and_clear();

    let workflow = session.workflow.read().await;
    match workflow.lock().status {
        LockStatus::Reviewing => println!(
            "{} run {} is awaiting review. Use {} or {}.",
            style("Done:").green().bold(),
            workflow.lock().run_id.as_deref().unwrap_or("?"),
            style("cockpit apply").cyan(),
            style("cockpit discard").cyan()
        ),
        LockStatus::Idle => println!("{}", style("Run finished.").green()),
        status => println!("Run stopped (lock is {}).", status),
    }
    Ok(())
}
