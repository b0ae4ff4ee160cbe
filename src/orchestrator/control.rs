//! Job control: start/resume, cancel, delete, page status updates.

use crate::error::{Error, Result};
use crate::schema::{PageDetails, StatusPayload};
use crate::types::{JobEvent, JobId, JobStatus, RemotePageStatus};
use std::sync::atomic::Ordering;
use tokio::sync::watch;

use super::context::PollContext;
use super::poll_loop::run_poll_loop;
use super::{JobHandle, JobLoop, SplitJobOrchestrator};

impl SplitJobOrchestrator {
    /// Start a job, or attach to it if it is already tracked
    ///
    /// For a new job this sends the start request and spawns its poll loop.
    /// For a tracked job no request is made: a running job keeps running, and
    /// a finished one returns a handle that is already resolved (a completed job
    /// is never restarted; delete it first to start over).
    ///
    /// # Errors
    ///
    /// Returns the start request's own failure, or [`Error::ShuttingDown`]
    /// once [`shutdown`](Self::shutdown) has begun.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use splitjob::*;
    /// # async fn example(orchestrator: SplitJobOrchestrator) -> Result<()> {
    /// let handle = orchestrator.start_or_resume(&JobId::from("scan.pdf")).await?;
    /// match handle.wait().await {
    ///     JobOutcome::Complete(status) => println!("{} pages", status.page_count),
    ///     JobOutcome::Cancelled => println!("cancelled"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start_or_resume(&self, job_id: &JobId) -> Result<JobHandle> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let (slot, mut guard) = self.lock_slot(job_id).await;

        if let Some(existing) = &guard.job_loop {
            tracing::debug!(job_id = %job_id, "Job already tracked, attaching");
            return Ok(JobHandle::new(job_id.clone(), existing.outcome.clone()));
        }

        // Taken before the start request so a cancel issued earlier is honoured
        let cancel_token = self.registries.cancellation.token(job_id).await;

        // Shutdown may have run cancel_all before the token above existed
        if !self.accepting_new.load(Ordering::SeqCst) {
            self.retire_slot(job_id, &slot, &mut guard).await;
            return Err(Error::ShuttingDown);
        }

        self.store.insert_new(job_id).await;
        if let Err(e) = self.service.start_job(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Start request failed");
            self.store.remove(job_id).await;
            self.retire_slot(job_id, &slot, &mut guard).await;
            return Err(e);
        }
        self.store.set_status(job_id, JobStatus::Running).await;

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let ctx = PollContext {
            job_id: job_id.clone(),
            service: self.service.clone(),
            store: self.store.clone(),
            registries: self.registries.clone(),
            polling: self.config.polling.clone(),
            cancel_token,
            outcome_tx,
        };
        let task = tokio::spawn(run_poll_loop(ctx));

        guard.job_loop = Some(JobLoop {
            outcome: outcome_rx.clone(),
            task: Some(task),
        });
        drop(guard);

        self.store.emit(JobEvent::Started {
            job_id: job_id.clone(),
        });
        tracing::info!(job_id = %job_id, "Job started");

        Ok(JobHandle::new(job_id.clone(), outcome_rx))
    }

    /// Ask a job's poll loop to stop
    ///
    /// Level-triggered and safe to call at any time, including before
    /// [`start_or_resume`](Self::start_or_resume): the loop honours it at its
    /// next checkpoint and resolves as cancelled. A job that already completed
    /// stays complete.
    pub async fn request_cancel(&self, job_id: &JobId) {
        tracing::info!(job_id = %job_id, "Cancellation requested");
        self.registries.cancellation.request_cancel(job_id).await;
    }

    /// Delete a job everywhere
    ///
    /// Deletes the remote job, stops the poll loop (letting an in-flight
    /// fetch finish), then drops the job's store entry, cancellation flag,
    /// page claims and every artifact it owns.
    ///
    /// # Errors
    ///
    /// The remote delete's own failure is returned and local state is left
    /// untouched. A 404 from the service counts as already deleted.
    pub async fn delete_job(&self, job_id: &JobId) -> Result<()> {
        // Held until every trace of the job is gone, so a start queued behind
        // this delete finds a retired slot and begins from scratch
        let (slot, mut guard) = self.lock_slot(job_id).await;

        match self.service.delete_job(job_id).await {
            Ok(()) => {}
            Err(Error::Http { status: 404, .. }) => {
                tracing::debug!(job_id = %job_id, "Remote job already gone");
            }
            Err(e) => {
                if guard.job_loop.is_none() {
                    self.retire_slot(job_id, &slot, &mut guard).await;
                }
                return Err(e);
            }
        }

        self.registries.cancellation.request_cancel(job_id).await;

        if let Some(task) = guard.job_loop.take().and_then(|job_loop| job_loop.task) {
            if let Err(e) = task.await {
                tracing::warn!(job_id = %job_id, error = %e, "Poll loop task ended abnormally");
            }
        }

        self.registries.cancellation.clear(job_id).await;
        self.registries.tracker.clear(job_id).await;

        let released = match self.store.remove(job_id).await {
            Some(job) => self.registries.resources.release_all(job.handles()).await,
            None => 0,
        };

        self.retire_slot(job_id, &slot, &mut guard).await;
        drop(guard);

        self.store.emit(JobEvent::Deleted {
            job_id: job_id.clone(),
        });
        tracing::info!(job_id = %job_id, released, "Job deleted");

        Ok(())
    }

    /// Transition one page on the service and apply the fresh status
    ///
    /// `linked_document_id` ties a processed page to the document it was filed
    /// as. The returned status is also merged into the job's store entry when
    /// the job is tracked.
    pub async fn update_page_status(
        &self,
        job_id: &JobId,
        page: u32,
        new_status: RemotePageStatus,
        linked_document_id: Option<&str>,
    ) -> Result<StatusPayload> {
        let status = self
            .service
            .update_page_status(job_id, page, new_status, linked_document_id)
            .await?;

        if !self.store.upsert_pages(job_id, &status).await {
            tracing::debug!(job_id = %job_id, "Page status updated for untracked job");
        }

        tracing::info!(job_id = %job_id, page, status = %new_status, "Page status updated");
        Ok(status)
    }

    /// Replace the stored details of one page, e.g. with fields a user corrected
    ///
    /// Local only; persist edits on the service with
    /// [`save_draft_metadata`](Self::save_draft_metadata). Returns false when
    /// the job or page is not tracked. `page_key` is the key from the status
    /// payload, e.g. `page_3`.
    pub async fn set_page_details(
        &self,
        job_id: &JobId,
        page_key: &str,
        details: PageDetails,
    ) -> bool {
        let updated = self.store.set_page_detail(job_id, page_key, details).await;
        if !updated {
            tracing::debug!(job_id = %job_id, page_key, "Details not applied to untracked page");
        }
        updated
    }

    /// Save draft per-page metadata ahead of finalization
    pub async fn save_draft_metadata(
        &self,
        job_id: &JobId,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.service.save_draft_metadata(job_id, payload).await
    }
}
