//! Split job orchestration split into focused submodules.
//!
//! The `SplitJobOrchestrator` struct and its methods are organized by concern:
//! - [`control`] - Start/resume, cancel, delete, page status updates
//! - [`lifecycle`] - Shutdown coordination
//! - [`poll_loop`] - The per-job poll loop and its tick
//! - [`page_fetch`] - Sequential artifact/details retrieval for one page
//! - [`context`] - State shared by one job's poll loop

mod context;
mod control;
mod lifecycle;
mod page_fetch;
mod poll_loop;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::cancellation::CancellationRegistry;
use crate::client::{HttpSplitClient, SplitService, TokenProvider};
use crate::config::Config;
use crate::error::Result;
use crate::resources::{Artifact, ResourceHandle, ResourceStore};
use crate::store::JobStore;
use crate::tracker::PageFetchTracker;
use crate::types::{Job, JobEvent, JobId, JobOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, watch};
use tokio_stream::Stream;
use tokio_stream::wrappers::BroadcastStream;

/// A job's poll loop as seen from the orchestrator
pub(crate) struct JobLoop {
    /// Resolved once with the loop's outcome
    pub(crate) outcome: watch::Receiver<Option<JobOutcome>>,
    /// Loop task, taken when someone waits for it to exit
    pub(crate) task: Option<tokio::task::JoinHandle<()>>,
}

/// A job's entry in the loop map
///
/// Start and delete of one job serialize on the slot's own lock, so the shared
/// map lock is only held long enough to look a slot up.
#[derive(Default)]
pub(crate) struct JobSlot {
    /// The running or finished loop, if the job was started
    pub(crate) job_loop: Option<JobLoop>,
    /// Set once the slot has been dropped from the map; holders must look up again
    pub(crate) retired: bool,
}

pub(crate) type SlotRef = Arc<Mutex<JobSlot>>;

/// Per-job bookkeeping shared with every poll loop
#[derive(Clone)]
pub(crate) struct Registries {
    /// Cooperative cancellation flags
    pub(crate) cancellation: CancellationRegistry,
    /// At-most-once page fetch claims
    pub(crate) tracker: PageFetchTracker,
    /// Owner of fetched artifact bytes
    pub(crate) resources: ResourceStore,
}

/// Drives split jobs on a remote service to completion
///
/// Cloneable - all fields are Arc-wrapped. Each instance owns its own
/// registries, so two orchestrators never share job state.
#[derive(Clone)]
pub struct SplitJobOrchestrator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Remote split service
    pub(crate) service: Arc<dyn SplitService>,
    /// Job state exposed to callers
    pub(crate) store: JobStore,
    /// Cancellation, claims and artifacts
    pub(crate) registries: Registries,
    /// Poll loop slots keyed by job
    pub(crate) loops: Arc<Mutex<HashMap<JobId, SlotRef>>>,
    /// Cleared during shutdown; no new jobs are started afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl SplitJobOrchestrator {
    /// Create an orchestrator over any [`SplitService`] implementation
    pub fn new(config: Config, service: Arc<dyn SplitService>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        tracing::debug!(
            interval_ms = config.polling.interval.as_millis() as u64,
            reclaim_failed_pages = config.polling.reclaim_failed_pages,
            "Split job orchestrator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            service,
            store: JobStore::new(event_tx),
            registries: Registries {
                cancellation: CancellationRegistry::new(),
                tracker: PageFetchTracker::new(),
                resources: ResourceStore::new(),
            },
            loops: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Lock the job's slot, creating it if needed
    ///
    /// The map lock is released before the slot lock is awaited.
    pub(crate) async fn lock_slot(&self, job_id: &JobId) -> (SlotRef, OwnedMutexGuard<JobSlot>) {
        loop {
            let slot = {
                let mut loops = self.loops.lock().await;
                Arc::clone(loops.entry(job_id.clone()).or_default())
            };
            let guard = Arc::clone(&slot).lock_owned().await;
            if !guard.retired {
                return (slot, guard);
            }
            // Deleted while we waited; the next lookup gets a fresh slot
        }
    }

    /// Drop a locked slot from the map
    pub(crate) async fn retire_slot(&self, job_id: &JobId, slot: &SlotRef, guard: &mut JobSlot) {
        guard.retired = true;
        let mut loops = self.loops.lock().await;
        if loops.get(job_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            loops.remove(job_id);
        }
    }

    /// Create an orchestrator talking HTTP to `config.service.base_url`
    pub fn connect(config: Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = HttpSplitClient::new(&config.service, tokens)?;
        Self::new(config, Arc::new(client))
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Snapshot of a job, if tracked
    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        self.store.get(job_id).await
    }

    /// IDs of every tracked job
    pub async fn job_ids(&self) -> Vec<JobId> {
        self.store.job_ids().await
    }

    /// Bytes behind a page's resource handle
    ///
    /// Returns `None` once the owning job has been deleted or the handle was
    /// superseded.
    pub async fn artifact(&self, handle: ResourceHandle) -> Option<Arc<Artifact>> {
        self.registries.resources.get(handle).await
    }

    /// Subscribe to events for every job
    ///
    /// Multiple subscribers are supported. A subscriber that falls behind by
    /// more than `config.event_buffer` events receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.subscribe()
    }

    /// Stream of events for one job
    ///
    /// Lagged notifications are skipped; the stream ends when the orchestrator
    /// is dropped.
    pub fn watch(&self, job_id: &JobId) -> impl Stream<Item = JobEvent> + Unpin + use<> {
        use tokio_stream::StreamExt;

        let job_id = job_id.clone();
        BroadcastStream::new(self.subscribe()).filter_map(move |event| match event {
            Ok(event) if event.job_id() == Some(&job_id) => Some(event),
            _ => None,
        })
    }

    /// Call `callback` for every event concerning `job_id`
    ///
    /// The callback runs on a background task until the returned
    /// [`ChangeSubscription`] is dropped.
    pub fn on_change<F>(&self, job_id: &JobId, callback: F) -> ChangeSubscription
    where
        F: Fn(&JobEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        let job_id = job_id.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.job_id() == Some(&job_id) => callback(&event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(job_id = %job_id, skipped, "Change observer lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        ChangeSubscription { task }
    }
}

/// Observer registration returned by [`SplitJobOrchestrator::on_change`]
///
/// Dropping it stops the callback.
pub struct ChangeSubscription {
    task: tokio::task::JoinHandle<()>,
}

impl ChangeSubscription {
    /// Stop delivering events
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Caller's view of a started job
///
/// Cloneable; every clone observes the same single outcome.
#[derive(Clone)]
pub struct JobHandle {
    job_id: JobId,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(crate) fn new(job_id: JobId, outcome: watch::Receiver<Option<JobOutcome>>) -> Self {
        Self { job_id, outcome }
    }

    /// The job this handle tracks
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The outcome, if the loop has already finished
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the poll loop to finish
    ///
    /// Resolves with the final status on completion, or `Cancelled`. Never
    /// fails because of remote errors: those are absorbed by the loop.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.outcome.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(JobOutcome::Cancelled),
            // Loop task went away without reporting
            Err(_) => JobOutcome::Cancelled,
        }
    }
}
