//! State shared by one job's poll loop.

use crate::client::SplitService;
use crate::config::PollingConfig;
use crate::store::JobStore;
use crate::types::{JobId, JobOutcome};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::Registries;

/// Everything a poll loop needs, bundled to keep helper signatures short
pub(crate) struct PollContext {
    pub(crate) job_id: JobId,
    pub(crate) service: Arc<dyn SplitService>,
    pub(crate) store: JobStore,
    pub(crate) registries: Registries,
    pub(crate) polling: PollingConfig,
    /// The job's entry in the cancellation registry. Held directly so that a
    /// delete clearing the registry still stops this loop.
    pub(crate) cancel_token: CancellationToken,
    pub(crate) outcome_tx: watch::Sender<Option<JobOutcome>>,
}

impl PollContext {
    /// Cancellation checkpoint
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
