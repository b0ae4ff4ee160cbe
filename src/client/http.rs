//! reqwest implementation of [`SplitService`].

use super::{SplitService, TokenProvider};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::resources::{Artifact, ArtifactBody};
use crate::types::{JobId, RemotePageStatus, Representation};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use url::Url;

/// HTTP client for the split service
///
/// Holds no credential state: a bearer token is requested from the
/// [`TokenProvider`] for each call.
pub struct HttpSplitClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpSplitClient {
    /// Build a client for the service described by `config`
    pub fn new(config: &ServiceConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        // Fail early on a malformed base URL rather than on the first request
        Url::parse(&config.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// URL of a job resource, e.g. `job_url(id, &["pages", "3"])`
    ///
    /// Segments that URL parsing would collapse (`.`, `..`, or empty) are
    /// rejected so a request never lands on a different resource.
    fn job_url(&self, job_id: &JobId, segments: &[&str]) -> Result<Url> {
        let mut url = format!("{}/jobs", self.base_url);
        for segment in std::iter::once(job_id.as_str()).chain(segments.iter().copied()) {
            if matches!(segment, "" | "." | "..") {
                return Err(Error::InvalidPathSegment(segment.to_string()));
            }
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        Ok(Url::parse(&url)?)
    }

    /// Attach a fresh bearer token and send
    async fn send(&self, method: Method, url: Url, body: Option<&serde_json::Value>) -> Result<Response> {
        let token = self.tokens.bearer_token().await?;

        let mut request: RequestBuilder = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::debug!(%method, %url, "Request to split service timed out");
            }
            Error::Network(e)
        })?;

        tracing::trace!(%method, %url, status = response.status().as_u16(), "Split service response");
        Ok(response)
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl SplitService for HttpSplitClient {
    async fn start_job(&self, job_id: &JobId) -> Result<()> {
        let url = self.job_url(job_id, &[])?;
        Self::check(self.send(Method::POST, url, None).await?)?;
        Ok(())
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<serde_json::Value> {
        let url = self.job_url(job_id, &["status"])?;
        let response = self.send(Method::GET, url, None).await?;

        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(Error::JobUnknown(job_id.to_string()));
        }

        let bytes = Self::check(response)?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_page_artifact(
        &self,
        job_id: &JobId,
        page: u32,
        artifact_name: &str,
        representation: Representation,
    ) -> Result<Artifact> {
        let page_segment = page.to_string();
        let url = self.job_url(job_id, &["pages", &page_segment, artifact_name])?;
        let response = Self::check(self.send(Method::GET, url, None).await?)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match representation {
            Representation::Binary => ArtifactBody::Binary(response.bytes().await?),
            Representation::Text => ArtifactBody::Text(response.text().await?),
        };

        Ok(Artifact {
            name: artifact_name.to_string(),
            content_type,
            body,
        })
    }

    async fn fetch_details_payload(
        &self,
        job_id: &JobId,
        page: u32,
    ) -> Result<serde_json::Value> {
        let page_segment = page.to_string();
        let url = self.job_url(job_id, &["pages", &page_segment])?;
        let bytes = Self::check(self.send(Method::GET, url, None).await?)?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn patch_page_status(
        &self,
        job_id: &JobId,
        page: u32,
        new_status: RemotePageStatus,
        linked_document_id: Option<&str>,
    ) -> Result<()> {
        let page_segment = page.to_string();
        let url = self.job_url(job_id, &["pages", &page_segment, new_status.as_str()])?;
        let body = linked_document_id
            .map(|id| serde_json::json!({ "linked_document_id": id }));

        Self::check(self.send(Method::PATCH, url, body.as_ref()).await?)?;
        Ok(())
    }

    async fn save_draft_metadata(
        &self,
        job_id: &JobId,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = self.job_url(job_id, &["pages"])?;
        Self::check(self.send(Method::PATCH, url, Some(payload)).await?)?;
        Ok(())
    }

    async fn delete_job(&self, job_id: &JobId) -> Result<()> {
        let url = self.job_url(job_id, &[])?;
        Self::check(self.send(Method::DELETE, url, None).await?)?;
        Ok(())
    }
}
