//! # splitjob
//!
//! Client-side orchestration of asynchronous document split jobs.
//!
//! A remote split service breaks a scanned document into pages, renders a
//! preview and a derived document per page, and extracts page details. This
//! crate starts such jobs, polls them until every page is done, and pulls each
//! page's artifacts exactly once as soon as the page becomes ready.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI; embed it in whatever drives the workflow
//! - **Event-driven** - Consumers subscribe to job events instead of polling the store
//! - **Never fails on remote hiccups** - Transport and payload errors are absorbed by
//!   the poll loop and retried on the next tick
//! - **Pluggable transport** - Everything remote goes through the [`SplitService`] trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use splitjob::{Config, JobId, JobOutcome, SplitJobOrchestrator, StaticTokenProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.service.base_url = "https://split.example.com".to_string();
//!
//!     let tokens = Arc::new(StaticTokenProvider::new("secret-token"));
//!     let orchestrator = SplitJobOrchestrator::connect(config, tokens)?;
//!
//!     let job = JobId::from("march invoices.pdf");
//!     let mut events = orchestrator.watch(&job);
//!     let handle = orchestrator.start_or_resume(&job).await?;
//!
//!     tokio::spawn(async move {
//!         use tokio_stream::StreamExt;
//!         while let Some(event) = events.next().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     if let JobOutcome::Complete(status) = handle.wait().await {
//!         println!("{} pages ready", status.done_pages());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-job cooperative cancellation flags
pub mod cancellation;
/// Split service client (trait seam and HTTP implementation)
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Job orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// In-memory artifact ownership
pub mod resources;
/// Status and details payload validation
pub mod schema;
/// Observable job state
pub mod store;
/// At-most-once page fetch claims
pub mod tracker;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use cancellation::CancellationRegistry;
pub use client::{HttpSplitClient, SplitService, StaticTokenProvider, TokenProvider};
pub use config::{Config, PollingConfig, ServiceConfig};
pub use error::{Error, Result, ValidationError};
pub use orchestrator::{ChangeSubscription, JobHandle, SplitJobOrchestrator};
pub use resources::{Artifact, ArtifactBody, ResourceHandle, ResourceStore};
pub use schema::{PageDetails, PageEntry, StatusPayload, validate_details, validate_status};
pub use store::{FetchedPage, JobStore};
pub use tracker::PageFetchTracker;
pub use types::{
    ArtifactKind, Job, JobEvent, JobId, JobOutcome, JobStatus, PageState, RemotePageStatus,
    Representation,
};

/// Run the orchestrator until a termination signal arrives, then shut it down.
///
/// Listens for Ctrl+C everywhere and additionally for SIGTERM on Unix. A signal
/// that cannot be registered is logged and simply never fires.
///
/// # Example
///
/// ```no_run
/// use splitjob::{Config, SplitJobOrchestrator, StaticTokenProvider, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tokens = Arc::new(StaticTokenProvider::new("secret-token"));
///     let orchestrator = SplitJobOrchestrator::connect(Config::default(), tokens)?;
///
///     run_with_shutdown(orchestrator).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: SplitJobOrchestrator) {
    wait_for_signal().await;
    orchestrator.shutdown().await;
}

async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("Received interrupt signal"),
        _ = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
