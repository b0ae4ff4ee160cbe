//! At-most-once page fetch bookkeeping
//!
//! The poll loop sees the same page reported as ready on every tick until the
//! job completes. [`PageFetchTracker::try_claim`] is what keeps those repeated
//! sightings from turning into repeated artifact fetches: the claim is taken
//! before the first network call, so a later tick arriving during a slow fetch
//! finds the page already claimed.

use crate::types::JobId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-job set of claimed page numbers (cloneable - state is Arc-wrapped)
#[derive(Clone, Default)]
pub struct PageFetchTracker {
    claims: Arc<Mutex<HashMap<JobId, BTreeSet<u32>>>>,
}

impl PageFetchTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a page for fetching.
    ///
    /// Returns true exactly once per (job, page) pair; every later call returns
    /// false until the claim is released or the job is cleared.
    pub async fn try_claim(&self, job_id: &JobId, page: u32) -> bool {
        self.claims
            .lock()
            .await
            .entry(job_id.clone())
            .or_default()
            .insert(page)
    }

    /// Give a claim back so a later tick may fetch the page again
    ///
    /// Only used when failed fetches are configured to be retried.
    pub async fn release(&self, job_id: &JobId, page: u32) -> bool {
        self.claims
            .lock()
            .await
            .get_mut(job_id)
            .map(|pages| pages.remove(&page))
            .unwrap_or(false)
    }

    /// Pages claimed so far for a job, ascending
    pub async fn claimed(&self, job_id: &JobId) -> Vec<u32> {
        self.claims
            .lock()
            .await
            .get(job_id)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget every claim for a job
    pub async fn clear(&self, job_id: &JobId) {
        self.claims.lock().await.remove(job_id);
    }
}
