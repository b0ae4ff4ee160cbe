//! Shared test helpers: a scripted split service and orchestrator setup.

use crate::client::SplitService;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::SplitJobOrchestrator;
use crate::resources::{Artifact, ArtifactBody};
use crate::types::{JobId, RemotePageStatus, Representation};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type StatusHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-memory split service driven by a script of status responses
///
/// Each status poll pops the next scripted response. Once the script runs
/// out, the last successful payload is repeated.
#[derive(Default)]
pub(crate) struct FakeService {
    statuses: Mutex<VecDeque<Result<Value>>>,
    last_status: Mutex<Option<Value>>,
    start_error: Mutex<Option<Error>>,
    start_delay: Mutex<Option<Duration>>,
    delete_error: Mutex<Option<Error>>,
    /// Remaining artifact failures per page
    artifact_failures: Mutex<HashMap<u32, usize>>,
    details: Mutex<HashMap<u32, Value>>,
    on_status: Mutex<Option<StatusHook>>,

    pub(crate) start_calls: AtomicUsize,
    pub(crate) status_calls: AtomicUsize,
    /// `(page, artifact name, status polls seen so far)` per artifact request
    pub(crate) artifact_fetches: Mutex<Vec<(u32, String, usize)>>,
    pub(crate) details_fetches: Mutex<Vec<u32>>,
    pub(crate) patches: Mutex<Vec<(u32, RemotePageStatus, Option<String>)>>,
    pub(crate) drafts: Mutex<Vec<Value>>,
    pub(crate) deletes: AtomicUsize,
}

impl FakeService {
    /// Service answering status polls with `responses` in order
    pub(crate) fn with_statuses(responses: Vec<Result<Value>>) -> Self {
        Self {
            statuses: Mutex::new(VecDeque::from(responses)),
            ..Default::default()
        }
    }

    /// Queue another status response
    pub(crate) fn push_status(&self, response: Result<Value>) {
        self.statuses.lock().unwrap().push_back(response);
    }

    /// Make the next start request fail with `err`
    pub(crate) fn fail_start(&self, err: Error) {
        *self.start_error.lock().unwrap() = Some(err);
    }

    /// Make the next start request hang for `delay` before answering
    pub(crate) fn delay_start(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next remote delete fail with `err`
    pub(crate) fn fail_delete(&self, err: Error) {
        *self.delete_error.lock().unwrap() = Some(err);
    }

    /// Fail the first `times` artifact fetches of `page`
    pub(crate) fn fail_artifacts(&self, page: u32, times: usize) {
        self.artifact_failures.lock().unwrap().insert(page, times);
    }

    /// Serve `payload` as the details of `page`
    pub(crate) fn set_details(&self, page: u32, payload: Value) {
        self.details.lock().unwrap().insert(page, payload);
    }

    /// Run `hook` with the 1-based poll number during every status fetch
    pub(crate) fn on_status(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_status.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn start_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Pages whose artifacts were requested, in request order (one entry per artifact)
    pub(crate) fn fetched_pages(&self) -> Vec<u32> {
        self.artifact_fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(page, _, _)| *page)
            .collect()
    }

    /// `(page, poll number)` for each artifact request
    pub(crate) fn fetch_ticks(&self) -> Vec<(u32, usize)> {
        self.artifact_fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(page, _, tick)| (*page, *tick))
            .collect()
    }
}

#[async_trait::async_trait]
impl SplitService for FakeService {
    async fn start_job(&self, _job_id: &JobId) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.start_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.start_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_status(&self, _job_id: &JobId) -> Result<Value> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.on_status.lock().unwrap().as_ref() {
            hook(call);
        }

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => {
                *self.last_status.lock().unwrap() = Some(value.clone());
                Ok(value)
            }
            Some(Err(err)) => Err(err),
            None => self.last_status.lock().unwrap().clone().ok_or(Error::Http {
                status: 503,
                url: "fake://status".to_string(),
            }),
        }
    }

    async fn fetch_page_artifact(
        &self,
        _job_id: &JobId,
        page: u32,
        artifact_name: &str,
        representation: Representation,
    ) -> Result<Artifact> {
        self.artifact_fetches
            .lock()
            .unwrap()
            .push((page, artifact_name.to_string(), self.status_count()));

        let fail = match self.artifact_failures.lock().unwrap().get_mut(&page) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(Error::Http {
                status: 500,
                url: format!("fake://pages/{}/{}", page, artifact_name),
            });
        }

        let body = match representation {
            Representation::Binary => {
                ArtifactBody::Binary(Bytes::from(format!("{}-bytes", artifact_name)))
            }
            Representation::Text => ArtifactBody::Text(artifact_name.to_string()),
        };
        Ok(Artifact {
            name: artifact_name.to_string(),
            content_type: None,
            body,
        })
    }

    async fn fetch_details_payload(&self, _job_id: &JobId, page: u32) -> Result<Value> {
        self.details_fetches.lock().unwrap().push(page);
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .unwrap_or_else(|| json!({ "page": page, "document_type": "invoice" })))
    }

    async fn patch_page_status(
        &self,
        _job_id: &JobId,
        page: u32,
        new_status: RemotePageStatus,
        linked_document_id: Option<&str>,
    ) -> Result<()> {
        self.patches.lock().unwrap().push((
            page,
            new_status,
            linked_document_id.map(str::to_string),
        ));
        Ok(())
    }

    async fn save_draft_metadata(&self, _job_id: &JobId, payload: &Value) -> Result<()> {
        self.drafts.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn delete_job(&self, _job_id: &JobId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.delete_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Status payload with one entry per `(page, status)`
///
/// Pages that offer artifacts get `page_N.png` and `page_N.pdf` names.
pub(crate) fn status_json(page_count: u32, pages: &[(u32, &str)]) -> Value {
    let mut map = serde_json::Map::new();
    for (page, status) in pages {
        let mut entry = json!({ "page": page, "status": status });
        if matches!(*status, "ready" | "ignore" | "processed") {
            entry["img"] = json!(format!("page_{}.png", page));
            entry["pdf"] = json!(format!("page_{}.pdf", page));
        }
        map.insert(format!("page_{}", page), entry);
    }
    json!({ "page_count": page_count, "pages": map })
}

/// Config with a one second poll interval
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.polling.interval = Duration::from_secs(1);
    config.polling.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Orchestrator over `service` using [`test_config`]
pub(crate) fn create_test_orchestrator(service: Arc<FakeService>) -> SplitJobOrchestrator {
    SplitJobOrchestrator::new(test_config(), service).unwrap()
}
