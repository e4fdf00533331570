//! Review decisions and run cancellation — `cockpit apply`,
//! `cockpit discard`, `cockpit cancel`.

use anyhow::Result;
use console::style;

use cockpit::workflow::LockStatus;

use super::Session;

/// Accept the reviewed run's changes and release the lock.
pub async fn cmd_apply(session: &mut Session) -> Result<()> {
    decide(session, Decision::Apply).await
}

/// Reject the reviewed run's changes and release the lock.
pub async fn cmd_discard(session: &mut Session) -> Result<()> {
    decide(session, Decision::Discard).await
}

enum Decision {
    Apply,
    Discard,
}

async fn decide(session: &mut Session, decision: Decision) -> Result<()> {
    let target = {
        let workflow = session.workflow.read().await;
        if workflow.lock().status != LockStatus::Reviewing {
            anyhow::bail!(
                "no run is awaiting review (lock is {})",
                workflow.lock().status
            );
        }
        match (&workflow.lock().run_id, &workflow.lock().plan_id) {
            (Some(run_id), Some(plan_id)) => (run_id.clone(), plan_id.clone()),
            _ => anyhow::bail!("reviewing lock has no run; use `cockpit unlock`"),
        }
    };

    let result = match decision {
        Decision::Apply => session.engine.apply_run(&target.0, &target.1).await,
        Decision::Discard => session.engine.discard_run(&target.0, &target.1).await,
    };
    match result {
        Ok(_) => {
            session.workflow.write().await.release()?;
            let verb = match decision {
                Decision::Apply => "applied",
                Decision::Discard => "discarded",
            };
            println!("{} run {} {}.", style("Done:").green().bold(), target.0, verb);
        }
        Err(err) => {
            println!("The run is still awaiting review.");
            return Err(err.context("Decision failed"));
        }
    }
    Ok(())
}

/// Stop the active run. The engine reports the resulting status, which
/// collapses the lock through the usual terminal path.
pub async fn cmd_cancel(session: &mut Session) -> Result<()> {
    let target = {
        let workflow = session.workflow.read().await;
        if workflow.lock().status != LockStatus::Running {
            anyhow::bail!(
                "nothing to cancel: no run is executing (lock is {})",
                workflow.lock().status
            );
        }
        match (&workflow.lock().run_id, &workflow.lock().plan_id) {
            (Some(run_id), Some(plan_id)) => (run_id.clone(), plan_id.clone()),
            _ => anyhow::bail!("running lock has no run; use `cockpit unlock`"),
        }
    };

    match session.engine.cancel_run(&target.0, &target.1).await {
        Ok(status) => {
            session.workflow.write().await.apply_run_status(&status.status)?;
            println!("{} run {}.", style("Canceled").green().bold(), target.0);
        }
        Err(err) => {
            println!("The run may still be executing; `cockpit watch` to follow it.");
            return Err(err.context("Cancel failed"));
        }
    }
    Ok(())
}
