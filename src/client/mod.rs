//! Access to the remote split service.
//!
//! - [`SplitService`] - the seam the orchestrator talks through
//! - [`http`] - production implementation over reqwest
//! - [`auth`] - bearer credential supply
//!
//! The required methods are thin transport calls returning raw payloads. The
//! provided methods layer schema validation on top, so every implementation
//! validates the same way.

pub mod auth;
pub mod http;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use http::HttpSplitClient;

use crate::error::{Error, Result};
use crate::resources::Artifact;
use crate::schema::{PageDetails, StatusPayload, validate_details, validate_status};
use crate::types::{JobId, RemotePageStatus, Representation};

/// Operations offered by the split service
///
/// Implementations must not retry internally: the poll loop owns retry policy.
#[async_trait::async_trait]
pub trait SplitService: Send + Sync {
    /// Create or resume a job (`POST /jobs/{job}`). Safe to repeat.
    async fn start_job(&self, job_id: &JobId) -> Result<()>;

    /// Raw status payload (`GET /jobs/{job}/status`)
    ///
    /// Must fail with [`Error::JobUnknown`] when the service holds no state for
    /// the job.
    async fn fetch_status(&self, job_id: &JobId) -> Result<serde_json::Value>;

    /// One artifact of a page (`GET /jobs/{job}/pages/{n}/{artifact}`)
    async fn fetch_page_artifact(
        &self,
        job_id: &JobId,
        page: u32,
        artifact_name: &str,
        representation: Representation,
    ) -> Result<Artifact>;

    /// Raw page details (`GET /jobs/{job}/pages/{n}`)
    async fn fetch_details_payload(&self, job_id: &JobId, page: u32)
    -> Result<serde_json::Value>;

    /// Transition one page (`PATCH /jobs/{job}/pages/{n}/{status}`)
    async fn patch_page_status(
        &self,
        job_id: &JobId,
        page: u32,
        new_status: RemotePageStatus,
        linked_document_id: Option<&str>,
    ) -> Result<()>;

    /// Save free-form draft metadata (`PATCH /jobs/{job}/pages`)
    async fn save_draft_metadata(&self, job_id: &JobId, payload: &serde_json::Value)
    -> Result<()>;

    /// Drop all remote state for a job (`DELETE /jobs/{job}`)
    async fn delete_job(&self, job_id: &JobId) -> Result<()>;

    /// Fetch and validate page details
    ///
    /// A validation failure is returned as [`Error::DetailsValidation`].
    async fn fetch_page_details(&self, job_id: &JobId, page: u32) -> Result<PageDetails> {
        let raw = self.fetch_details_payload(job_id, page).await?;
        validate_details(&raw, page).map_err(|source| Error::DetailsValidation { page, source })
    }

    /// Transition one page, then return the freshly validated job status
    async fn update_page_status(
        &self,
        job_id: &JobId,
        page: u32,
        new_status: RemotePageStatus,
        linked_document_id: Option<&str>,
    ) -> Result<StatusPayload> {
        self.patch_page_status(job_id, page, new_status, linked_document_id)
            .await?;
        let raw = self.fetch_status(job_id).await?;
        validate_status(&raw).map_err(Error::StatusValidation)
    }
}
