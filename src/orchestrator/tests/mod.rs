use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{JobStatus, RemotePageStatus};
use serde_json::json;
use std::time::Duration;

mod poll_loop;

/// Upper bound for waiting on a job; paused clocks advance instantly
const WAIT: Duration = Duration::from_secs(120);

async fn wait_outcome(handle: &JobHandle) -> JobOutcome {
    tokio::time::timeout(WAIT, handle.wait())
        .await
        .expect("job did not finish in time")
}

/// Drain every event currently buffered in `rx`
fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
