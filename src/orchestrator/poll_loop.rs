//! The per-job poll loop.
//!
//! One tick:
//! 1. Cancellation checkpoint
//! 2. Fetch and validate status; an unknown job gets its start request
//!    resubmitted, any other failure is logged and retried next tick
//! 3. Apply the status to the store before any artifact is fetched
//! 4. For each ready page, in payload order: claim, cancellation checkpoint,
//!    fetch artifacts
//! 5. Complete once every listed page is ready or processed
//!
//! Nothing in here returns an error to the caller. The loop ends only through
//! completion or cancellation.

use crate::error::Error;
use crate::schema::{StatusPayload, validate_status};
use crate::types::{JobEvent, JobOutcome, JobStatus};
use tokio::time::MissedTickBehavior;

use super::context::PollContext;
use super::page_fetch::fetch_page;

/// Result of one tick
enum Tick {
    Continue,
    Done(JobOutcome),
}

/// Run a job's poll loop until it completes or is cancelled
pub(crate) async fn run_poll_loop(ctx: PollContext) {
    tracing::info!(
        job_id = %ctx.job_id,
        interval_ms = ctx.polling.interval.as_millis() as u64,
        "Poll loop started"
    );

    let mut interval = tokio::time::interval(ctx.polling.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => break JobOutcome::Cancelled,
            _ = interval.tick() => {}
        }

        ticks += 1;
        match tick(&ctx).await {
            Tick::Continue => {}
            Tick::Done(outcome) => break outcome,
        }
    };

    finish(&ctx, outcome, ticks).await;
}

async fn tick(ctx: &PollContext) -> Tick {
    if ctx.is_cancelled() {
        return Tick::Done(JobOutcome::Cancelled);
    }

    let Some(status) = poll_status(ctx).await else {
        return Tick::Continue;
    };

    if !ctx.store.upsert_pages(&ctx.job_id, &status).await {
        // Job was deleted between ticks
        return Tick::Done(JobOutcome::Cancelled);
    }

    let mut failed_pages = 0usize;
    for (key, entry) in &status.pages {
        if !entry.status.has_artifacts() || !entry.has_artifact_ref() {
            continue;
        }
        if !ctx.registries.tracker.try_claim(&ctx.job_id, entry.page).await {
            continue;
        }
        if ctx.is_cancelled() {
            return Tick::Done(JobOutcome::Cancelled);
        }

        match fetch_page(ctx, entry).await {
            Ok(fetched) => {
                let handles = fetched.handles();
                match ctx.store.attach_artifacts(&ctx.job_id, key, fetched).await {
                    Some(superseded) => {
                        ctx.registries.resources.release_all(superseded).await;
                    }
                    None => {
                        // Job dropped while fetching; nobody owns these now
                        ctx.registries.resources.release_all(handles).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    page = entry.page,
                    error = %e,
                    "Page fetch failed, skipping page this tick"
                );
                ctx.store.emit(JobEvent::PageFetchFailed {
                    job_id: ctx.job_id.clone(),
                    page: entry.page,
                    error: e.to_string(),
                });

                if ctx.polling.reclaim_failed_pages {
                    ctx.registries.tracker.release(&ctx.job_id, entry.page).await;
                    failed_pages += 1;
                }
            }
        }
    }

    if status.is_done() {
        if failed_pages > 0 {
            tracing::debug!(
                job_id = %ctx.job_id,
                failed_pages,
                "All pages done remotely, holding completion for page retries"
            );
            return Tick::Continue;
        }
        return Tick::Done(JobOutcome::Complete(status));
    }

    Tick::Continue
}

/// Fetch and validate the job status, handling every failure in place
async fn poll_status(ctx: &PollContext) -> Option<StatusPayload> {
    let result = ctx
        .service
        .fetch_status(&ctx.job_id)
        .await
        .and_then(|raw| validate_status(&raw).map_err(Error::StatusValidation));

    match result {
        Ok(status) => Some(status),
        Err(e) if e.is_job_unknown() => {
            tracing::warn!(
                job_id = %ctx.job_id,
                "Split service has no record of job, resubmitting start request"
            );
            match ctx.service.start_job(&ctx.job_id).await {
                Ok(()) => ctx.store.emit(JobEvent::Resubmitted {
                    job_id: ctx.job_id.clone(),
                }),
                Err(e) => tracing::warn!(
                    job_id = %ctx.job_id,
                    error = %e,
                    "Start resubmission failed, will retry next tick"
                ),
            }
            None
        }
        Err(e) if e.is_transient() => {
            tracing::warn!(job_id = %ctx.job_id, error = %e, "Status poll failed, retrying next tick");
            None
        }
        Err(e) => {
            tracing::error!(job_id = %ctx.job_id, error = %e, "Status poll rejected, retrying next tick");
            None
        }
    }
}

/// Record the outcome and resolve waiters
async fn finish(ctx: &PollContext, outcome: JobOutcome, ticks: u64) {
    let (status, event) = match &outcome {
        JobOutcome::Complete(_) => (
            JobStatus::Complete,
            JobEvent::Completed {
                job_id: ctx.job_id.clone(),
            },
        ),
        JobOutcome::Cancelled => (
            JobStatus::Cancelled,
            JobEvent::Cancelled {
                job_id: ctx.job_id.clone(),
            },
        ),
    };

    if ctx.store.set_status(&ctx.job_id, status).await {
        ctx.store.emit(event);
    }

    tracing::info!(job_id = %ctx.job_id, outcome = %status, ticks, "Poll loop finished");

    // send_replace stores the value even if every handle has been dropped
    ctx.outcome_tx.send_replace(Some(outcome));
}
