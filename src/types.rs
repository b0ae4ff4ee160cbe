//! Core types for splitjob

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::ResourceHandle;
use crate::schema::{PageDetails, StatusPayload};

/// Identifier of a split job
///
/// This is the caller-chosen document name. It doubles as the path segment of
/// the job's endpoints on the split service, so it is percent-encoded when a
/// URL is built from it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the document name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for JobId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-side lifecycle of a job
///
/// Distinct from [`RemotePageStatus`], which the service reports per page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but the poll loop has not run yet
    #[default]
    NotStarted,
    /// Poll loop active
    Running,
    /// Every page reached a terminal remote state
    Complete,
    /// Stopped by an explicit cancellation request
    Cancelled,
}

impl JobStatus {
    /// True for `Complete` and `Cancelled`
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Page status as reported by the split service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePageStatus {
    /// Still being split/recognised
    Pending,
    /// Artifacts available
    Ready,
    /// Artifacts available, page flagged to be left out
    Ignore,
    /// Reviewed and linked to a document
    Processed,
    /// Processing failed on the service
    Error,
}

impl RemotePageStatus {
    /// Wire representation (lowercase)
    pub fn as_str(&self) -> &'static str {
        match self {
            RemotePageStatus::Pending => "pending",
            RemotePageStatus::Ready => "ready",
            RemotePageStatus::Ignore => "ignore",
            RemotePageStatus::Processed => "processed",
            RemotePageStatus::Error => "error",
        }
    }

    /// Parse a status string, ignoring ASCII case
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(RemotePageStatus::Pending),
            "ready" => Some(RemotePageStatus::Ready),
            "ignore" => Some(RemotePageStatus::Ignore),
            "processed" => Some(RemotePageStatus::Processed),
            "error" => Some(RemotePageStatus::Error),
            _ => None,
        }
    }

    /// Whether a page in this state has artifacts worth fetching
    pub fn has_artifacts(&self) -> bool {
        matches!(self, RemotePageStatus::Ready | RemotePageStatus::Ignore)
    }

    /// Whether this state counts towards job completion
    pub fn counts_as_done(&self) -> bool {
        matches!(self, RemotePageStatus::Ready | RemotePageStatus::Processed)
    }
}

impl std::fmt::Display for RemotePageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an artifact body should be read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Raw bytes (images, PDFs)
    Binary,
    /// UTF-8 text
    Text,
}

/// Which per-page artifact a handle refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Preview image
    Preview,
    /// Derived document (e.g. single-page PDF)
    Document,
}

/// Client-side view of one page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    /// Page number within the source document
    pub page_number: u32,
    /// Status last reported by the service
    pub remote_status: RemotePageStatus,
    /// Artifact name of the preview image, as last reported
    pub image_name: Option<String>,
    /// Artifact name of the derived document, as last reported
    pub file_name: Option<String>,
    /// Document URI, as last reported
    pub document_uri: Option<String>,
    /// Local handle of the fetched preview image
    pub image_ref: Option<ResourceHandle>,
    /// Local handle of the fetched derived document
    pub file_ref: Option<ResourceHandle>,
    /// Validated page metadata, once fetched
    pub details: Option<PageDetails>,
}

impl PageState {
    /// A page seen for the first time, nothing fetched yet
    pub fn new(page_number: u32, remote_status: RemotePageStatus) -> Self {
        Self {
            page_number,
            remote_status,
            image_name: None,
            file_name: None,
            document_uri: None,
            image_ref: None,
            file_ref: None,
            details: None,
        }
    }

    /// Handles owned by this page
    pub fn handles(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.image_ref.iter().chain(self.file_ref.iter()).copied()
    }
}

/// Snapshot of a tracked job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier (document name)
    pub id: JobId,
    /// Client-side lifecycle state
    pub status: JobStatus,
    /// Page count from the most recent validated status payload
    pub total_pages: u32,
    /// Pages keyed by the service's page key (e.g. "page_3")
    pub pages: BTreeMap<String, PageState>,
    /// When the job was first tracked
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly tracked job with no pages
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::NotStarted,
            total_pages: 0,
            pages: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a page by number
    pub fn page(&self, page_number: u32) -> Option<&PageState> {
        self.pages.values().find(|p| p.page_number == page_number)
    }

    /// Every resource handle owned by the job
    pub fn handles(&self) -> Vec<ResourceHandle> {
        self.pages.values().flat_map(PageState::handles).collect()
    }
}

/// How a job's poll loop ended
#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    /// All pages reached a terminal remote state; carries the final status payload
    Complete(StatusPayload),
    /// Stopped by cancellation (explicit request, delete, or shutdown)
    Cancelled,
}

impl JobOutcome {
    /// True for `Cancelled`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobOutcome::Cancelled)
    }
}

/// Events emitted while jobs progress
///
/// Delivered through [`SplitJobOrchestrator::subscribe`](crate::SplitJobOrchestrator::subscribe)
/// and the per-job views built on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job tracked and poll loop spawned
    Started {
        /// Job ID
        job_id: JobId,
    },

    /// A validated status payload was applied to the store
    StatusUpdated {
        /// Job ID
        job_id: JobId,
        /// Page count reported by the service
        total_pages: u32,
        /// Number of pages in a done state
        done_pages: u32,
    },

    /// The service forgot the job and a start request was resubmitted
    Resubmitted {
        /// Job ID
        job_id: JobId,
    },

    /// A page's artifacts (and details, where available) were attached
    PageFetched {
        /// Job ID
        job_id: JobId,
        /// Page number
        page: u32,
    },

    /// Fetching a page's artifacts failed
    PageFetchFailed {
        /// Job ID
        job_id: JobId,
        /// Page number
        page: u32,
        /// Error message
        error: String,
    },

    /// The poll loop finished with every page done
    Completed {
        /// Job ID
        job_id: JobId,
    },

    /// The poll loop stopped on cancellation
    Cancelled {
        /// Job ID
        job_id: JobId,
    },

    /// Job state was dropped
    Deleted {
        /// Job ID
        job_id: JobId,
    },

    /// Orchestrator shutting down
    Shutdown,
}

impl JobEvent {
    /// The job an event concerns (`None` for orchestrator-wide events)
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobEvent::Started { job_id }
            | JobEvent::StatusUpdated { job_id, .. }
            | JobEvent::Resubmitted { job_id }
            | JobEvent::PageFetched { job_id, .. }
            | JobEvent::PageFetchFailed { job_id, .. }
            | JobEvent::Completed { job_id }
            | JobEvent::Cancelled { job_id }
            | JobEvent::Deleted { job_id } => Some(job_id),
            JobEvent::Shutdown => None,
        }
    }
}
