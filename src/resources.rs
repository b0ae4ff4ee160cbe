//! Local ownership of fetched artifacts
//!
//! Binary artifacts pulled from the split service are kept in memory and handed
//! out as opaque [`ResourceHandle`]s, which is what a [`PageState`](crate::types::PageState)
//! stores. The job that owns a handle is responsible for releasing it on
//! delete or when a re-fetch supersedes it; a handle that is never released
//! keeps its bytes alive for the life of the orchestrator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Opaque reference to an artifact held by a [`ResourceStore`]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    /// Raw handle value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resource:{}", self.0)
    }
}

/// Body of a fetched artifact
#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactBody {
    /// Raw bytes
    Binary(Bytes),
    /// UTF-8 text
    Text(String),
}

impl ArtifactBody {
    /// Size of the body in bytes
    pub fn len(&self) -> usize {
        match self {
            ArtifactBody::Binary(b) => b.len(),
            ArtifactBody::Text(s) => s.len(),
        }
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fetched artifact
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    /// Artifact name on the service (e.g. "page_3.png")
    pub name: String,
    /// Content-Type reported by the service
    pub content_type: Option<String>,
    /// Artifact body
    pub body: ArtifactBody,
}

/// In-memory owner of fetched artifacts (cloneable - state is Arc-wrapped)
#[derive(Clone, Default)]
pub struct ResourceStore {
    entries: Arc<Mutex<HashMap<ResourceHandle, Arc<Artifact>>>>,
    next_handle: Arc<AtomicU64>,
}

impl ResourceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an artifact and return its handle
    pub async fn insert(&self, artifact: Artifact) -> ResourceHandle {
        let handle = ResourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.lock().await.insert(handle, Arc::new(artifact));
        handle
    }

    /// Look up an artifact
    pub async fn get(&self, handle: ResourceHandle) -> Option<Arc<Artifact>> {
        self.entries.lock().await.get(&handle).cloned()
    }

    /// Release one handle. Returns false if it was already released.
    pub async fn release(&self, handle: ResourceHandle) -> bool {
        self.entries.lock().await.remove(&handle).is_some()
    }

    /// Release several handles, returning how many were still live
    pub async fn release_all<I>(&self, handles: I) -> usize
    where
        I: IntoIterator<Item = ResourceHandle>,
    {
        let mut entries = self.entries.lock().await;
        handles
            .into_iter()
            .filter(|h| entries.remove(h).is_some())
            .count()
    }

    /// Number of live artifacts
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no artifacts are held
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
