//! Per-job cooperative cancellation
//!
//! Each job gets one [`CancellationToken`]. Cancellation is level-triggered: once
//! requested it stays set until the job is cleared, so a request made before the
//! poll loop starts is still honoured at its first checkpoint.

use crate::types::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Map of jobs to their cancellation tokens (cloneable - state is Arc-wrapped)
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The job's token, created on first use
    pub async fn token(&self, job_id: &JobId) -> CancellationToken {
        self.tokens
            .lock()
            .await
            .entry(job_id.clone())
            .or_default()
            .clone()
    }

    /// Ask the job to stop at its next checkpoint
    pub async fn request_cancel(&self, job_id: &JobId) {
        self.token(job_id).await.cancel();
    }

    /// Whether cancellation has been requested
    pub async fn is_cancelled(&self, job_id: &JobId) -> bool {
        self.tokens
            .lock()
            .await
            .get(job_id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Remove the job's entry, returning the token that was registered
    pub async fn clear(&self, job_id: &JobId) -> Option<CancellationToken> {
        self.tokens.lock().await.remove(job_id)
    }

    /// Cancel every registered job
    pub async fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock().await;
        for (job_id, token) in tokens.iter() {
            tracing::debug!(job_id = %job_id, "Signaling cancellation");
            token.cancel();
        }
        tokens.len()
    }
}
