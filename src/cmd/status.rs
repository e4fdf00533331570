//! Workspace state commands — `cockpit status`, `cockpit unlock`,
//! `cockpit recover`.

use anyhow::Result;
use console::style;

use cockpit::workflow::{LockStatus, RecoveryOutcome};

use super::Session;

/// Print the workflow lock, pending request, and chat state.
pub async fn cmd_status(session: &Session) -> Result<()> {
    let workflow = session.workflow.read().await;
    let lock = workflow.lock();

    println!();
    println!("Workspace: {}", session.workspace.raw());
    println!();

    let status_label = match lock.status {
        LockStatus::Idle => style(lock.status.as_str()).dim(),
        LockStatus::Reviewing => style(lock.status.as_str()).yellow().bold(),
        _ => style(lock.status.as_str()).cyan().bold(),
    };
    println!("Lock:      {}", status_label);
    if let Some(task) = &lock.task {
        println!("Task:      {}", task);
    }
    if let Some(plan_id) = &lock.plan_id {
        println!("Plan:      {}", plan_id);
    }
    if let Some(run_id) = &lock.run_id {
        println!("Run:       {}", run_id);
    }
    if let Some(progress) = &lock.progress {
        println!(
            "Progress:  step {}/{}{}",
            progress.current_step,
            progress.total_steps,
            progress
                .current_step_title
                .as_deref()
                .map(|t| format!(" ({})", t))
                .unwrap_or_default()
        );
    }

    match workflow.pending() {
        Some(pending) => println!(
            "Pending:   {} request {} ({}s old)",
            pending.kind,
            pending.request_id,
            pending.age().num_seconds().max(0)
        ),
        None => println!("Pending:   {}", style("none").dim()),
    }

    let chat = workflow.chat();
    if chat.is_loading {
        println!("Chat:      {}", style("waiting for a reply").cyan());
    } else if let Some(error) = &chat.last_error {
        println!("Chat:      last message failed ({})", error);
    }

    let gate = workflow.can_start_new_plan();
    println!();
    if gate.allowed {
        println!("{}", style("Ready for a new plan.").green());
    } else {
        println!(
            "{} {}",
            style("New plans blocked:").yellow(),
            gate.reason.unwrap_or_else(|| "workspace is busy".to_string())
        );
    }
    println!();
    Ok(())
}

/// Operator escape hatch: clear the lock, the pending ledger, and chat
/// state unconditionally.
pub async fn cmd_unlock(session: &Session, force: bool) -> Result<()> {
    let mut workflow = session.workflow.write().await;
    if workflow.lock().status.is_idle() && workflow.pending().is_none() {
        println!("Workspace is already unlocked.");
        return Ok(());
    }
    if !force && workflow.lock().status == LockStatus::Running {
        anyhow::bail!(
            "a run appears to be executing; unlocking only forgets local state. \
             Use `cockpit cancel` to stop the run, or pass --force to unlock anyway"
        );
    }
    workflow.force_unlock()?;
    println!("{}", style("Workspace unlocked.").green());
    Ok(())
}

/// Manually reconcile the pending ledger against the engine.
pub async fn cmd_recover(session: &mut Session) -> Result<()> {
    // Session::open already ran one pass; report its conclusion, or
    // retry if that pass failed against an unreachable engine.
    let outcome = match session.recover().await {
        Ok(RecoveryOutcome::AlreadyReconciled) => session
            .activation_recovery
            .clone()
            .unwrap_or(RecoveryOutcome::AlreadyReconciled),
        Ok(outcome) => outcome,
        Err(err) => return Err(err.context("Recovery failed")),
    };
    match outcome {
        RecoveryOutcome::NothingPending => println!("Nothing to recover."),
        RecoveryOutcome::AlreadyReconciled => println!("Already reconciled in this session."),
        RecoveryOutcome::StaleReclaimed { collapsed } => {
            println!(
                "{} stale request discarded{}.",
                style("Recovered:").green(),
                if collapsed { "; lock released" } else { "" }
            );
        }
        RecoveryOutcome::PlanLanded => println!(
            "{} the interrupted plan completed; run {} to execute it.",
            style("Recovered:").green(),
            style("cockpit confirm").cyan()
        ),
        RecoveryOutcome::RunReconciled { status } => println!(
            "{} the interrupted confirm spawned a run (engine reports \"{}\").",
            style("Recovered:").green(),
            status
        ),
        RecoveryOutcome::Unresolved => println!(
            "The engine does not corroborate the pending request yet; it will be\n\
             discarded automatically if it stays unresolved past its timeout."
        ),
    }
    Ok(())
}
