//! In-memory job state
//!
//! [`JobStore`] is the read side handed to callers: they take snapshots with
//! [`JobStore::get`] or follow the event channel. Writes come from the
//! orchestrator only. Every mutation emits a [`JobEvent`] so observers never
//! need to poll.

use crate::resources::ResourceHandle;
use crate::schema::{PageDetails, StatusPayload};
use crate::types::{Job, JobEvent, JobId, JobStatus, PageState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Artifacts gathered for one page by a fetch sequence
#[derive(Debug, Default)]
pub struct FetchedPage {
    /// Handle of the preview image
    pub image_ref: Option<ResourceHandle>,
    /// Handle of the derived document
    pub file_ref: Option<ResourceHandle>,
    /// Page details
    pub details: Option<PageDetails>,
}

impl FetchedPage {
    /// Handles carried by this fetch
    pub fn handles(&self) -> Vec<ResourceHandle> {
        self.image_ref.iter().chain(self.file_ref.iter()).copied().collect()
    }
}

/// Job state container (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobStore {
    /// Create an empty store publishing on `event_tx`
    pub fn new(event_tx: broadcast::Sender<JobEvent>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Snapshot of a job
    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// IDs of every tracked job
    pub async fn job_ids(&self) -> Vec<JobId> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Track a new job. Returns false if the ID is already tracked.
    pub async fn insert_new(&self, job_id: &JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return false;
        }
        jobs.insert(job_id.clone(), Job::new(job_id.clone()));
        true
    }

    /// Set a job's lifecycle state. Returns false if the job is not tracked.
    pub async fn set_status(&self, job_id: &JobId, status: JobStatus) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) => {
                job.status = status;
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Merge a validated status payload into a job's pages
    ///
    /// Pages are never removed: a key missing from `status` keeps its last known
    /// state. Remote status and artifact names are taken from the payload;
    /// fetched handles and details are preserved. Returns false if the job is
    /// not tracked.
    pub async fn upsert_pages(&self, job_id: &JobId, status: &StatusPayload) -> bool {
        {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(job_id) else {
                return false;
            };

            for (key, entry) in &status.pages {
                let page = job
                    .pages
                    .entry(key.clone())
                    .or_insert_with(|| PageState::new(entry.page, entry.status));

                if page.remote_status != entry.status {
                    tracing::debug!(
                        job_id = %job_id,
                        page = entry.page,
                        from = %page.remote_status,
                        to = %entry.status,
                        "Page status changed"
                    );
                }

                page.page_number = entry.page;
                page.remote_status = entry.status;
                page.image_name = entry.img.clone();
                page.file_name = entry.pdf.clone();
                page.document_uri = entry.document_uri.clone();
                if page.details.is_none() {
                    page.details = entry.details.clone();
                }
            }

            job.total_pages = status.page_count;
            job.updated_at = Utc::now();
        }

        self.emit(JobEvent::StatusUpdated {
            job_id: job_id.clone(),
            total_pages: status.page_count,
            done_pages: status.done_pages(),
        });
        true
    }

    /// Replace a page's details. Returns false if job or page is unknown.
    pub async fn set_page_detail(
        &self,
        job_id: &JobId,
        page_key: &str,
        detail: PageDetails,
    ) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        match job.pages.get_mut(page_key) {
            Some(page) => {
                page.details = Some(detail);
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Attach the result of a page fetch
    ///
    /// Returns the handles the new ones superseded, which the caller must
    /// release, or `None` if the job or page is no longer tracked (the caller
    /// then owns and must release the handles in `fetched`).
    pub async fn attach_artifacts(
        &self,
        job_id: &JobId,
        page_key: &str,
        fetched: FetchedPage,
    ) -> Option<Vec<ResourceHandle>> {
        let (page_number, superseded) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(job_id)?;
            let page = job.pages.get_mut(page_key)?;

            let mut superseded = Vec::new();
            if let Some(handle) = fetched.image_ref {
                superseded.extend(page.image_ref.replace(handle));
            }
            if let Some(handle) = fetched.file_ref {
                superseded.extend(page.file_ref.replace(handle));
            }
            if let Some(details) = fetched.details {
                page.details = Some(details);
            }

            let page_number = page.page_number;
            job.updated_at = Utc::now();
            (page_number, superseded)
        };

        self.emit(JobEvent::PageFetched {
            job_id: job_id.clone(),
            page: page_number,
        });
        Some(superseded)
    }

    /// Stop tracking a job, returning its final state
    pub async fn remove(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.write().await.remove(job_id)
    }

    /// Publish an event to all subscribers
    ///
    /// With no subscribers the event is dropped, which is fine: nobody is listening.
    pub fn emit(&self, event: JobEvent) {
        self.event_tx.send(event).ok();
    }

    /// Subscribe to all job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }
}
