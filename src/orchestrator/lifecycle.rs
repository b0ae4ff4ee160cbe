//! Shutdown coordination.

use crate::types::JobEvent;
use std::sync::atomic::Ordering;

use super::{SlotRef, SplitJobOrchestrator};

impl SplitJobOrchestrator {
    /// Gracefully shut down the orchestrator
    ///
    /// Shutdown sequence:
    /// 1. Stops accepting new jobs ([`start_or_resume`](Self::start_or_resume)
    ///    returns [`Error::ShuttingDown`](crate::Error::ShuttingDown))
    /// 2. Signals cancellation to every job
    /// 3. Waits for the poll loops to exit, bounded by
    ///    `config.polling.shutdown_timeout`
    /// 4. Emits [`JobEvent::Shutdown`]
    ///
    /// Job handles resolve as cancelled; completed jobs stay complete. The
    /// store and fetched artifacts remain readable afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new jobs
        self.accepting_new.store(false, Ordering::SeqCst);

        // 2. Cancel everything, including jobs whose loop never started
        let cancelled = self.registries.cancellation.cancel_all().await;
        tracing::debug!(cancelled, "Signaled cancellation to all jobs");

        // 3. Wait for poll loops with timeout
        let slots: Vec<SlotRef> = self.loops.lock().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(task) = slot
                .lock()
                .await
                .job_loop
                .as_mut()
                .and_then(|job_loop| job_loop.task.take())
            {
                tasks.push(task);
            }
        }
        let running = tasks.len();

        let shutdown_timeout = self.config.polling.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, futures::future::join_all(tasks)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    tracing::warn!(panicked, "Some poll loops ended abnormally");
                }
                tracing::info!(running, "All poll loops stopped");
            }
            Err(_) => {
                tracing::warn!(
                    running,
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Timeout waiting for poll loops to stop, proceeding with shutdown"
                );
            }
        }

        // 4. Emit shutdown event
        self.store.emit(JobEvent::Shutdown);

        tracing::info!("Graceful shutdown complete");
    }
}
