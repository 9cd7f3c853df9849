//! REST client for the upscaling backend.
//!
//! Wraps the job lifecycle endpoints (submit, status, download, delete)
//! and the informational endpoints (`/`, `/models`) using [`reqwest`].

use std::collections::HashMap;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use upscale_core::descriptor::JobRequest;
use upscale_core::job::{JobResult, JobState, JobStatus};
use upscale_core::types::JobId;

/// HTTP client for one backend instance.
pub struct UpscaleApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /upscale`.
///
/// With a progress channel the backend only acknowledges the job. Without
/// one it may answer with the terminal status and the artifact location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub status: Option<JobState>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl SubmitResponse {
    /// Whether the response itself reports the job as completed.
    pub fn is_completed(&self) -> bool {
        self.status == Some(JobState::Completed)
    }
}

/// Response of `GET /`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

/// Response of `GET /models`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub factors: Vec<String>,
    pub resample_modes: Vec<String>,
    #[serde(default)]
    pub resample_desc: HashMap<String, String>,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum UpscaleApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// The request payload could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl UpscaleApiError {
    /// HTTP status of a non-2xx response, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Encode(_) => None,
        }
    }

    /// Whether the backend answered 404 (unknown job or missing file).
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl UpscaleApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a job.
    ///
    /// Sends `POST /upscale` as a multipart form carrying the source image,
    /// the JSON stage list, the resample mode, the progress flag and the
    /// client-generated job id.
    pub async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, UpscaleApiError> {
        let source = request.source();
        let file = Part::bytes(source.bytes().to_vec())
            .file_name(source.name().to_string())
            .mime_str(source.mime_type())?;

        let form = Form::new()
            .part("file", file)
            .text("scales", serde_json::to_string(&request.wire_scales())?)
            .text("resample_mode", request.resample_mode().as_str())
            .text("show_progress", request.progress_enabled().to_string())
            .text("job_id", request.job_id().to_string());

        let response = self
            .client
            .post(format!("{}/upscale", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::json_body(response).await
    }

    /// Fetch the status snapshot of a job (`GET /job/{job_id}`).
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatus, UpscaleApiError> {
        let response = self
            .client
            .get(format!("{}/job/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::json_body(response).await
    }

    /// Like [`job_status`](Self::job_status), but `None` while the backend
    /// does not know the job. Jobs are registered by a background task after
    /// `POST /upscale` returns, so early polls can see a 404.
    pub async fn job_status_if_known(
        &self,
        job_id: &JobId,
    ) -> Result<Option<JobStatus>, UpscaleApiError> {
        match self.job_status(job_id).await {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Download the artifact of a completed job (`GET /download/{job_id}`)
    /// and bind it to `filename`.
    pub async fn fetch_artifact(
        &self,
        job_id: &JobId,
        filename: String,
    ) -> Result<JobResult, UpscaleApiError> {
        let url = format!("{}/download/{}", self.api_url, job_id);
        self.fetch_artifact_from(job_id, &url, filename).await
    }

    /// Download an artifact from an explicit location, as reported by a
    /// submit response. Relative locations resolve against the base URL.
    pub async fn fetch_artifact_from(
        &self,
        job_id: &JobId,
        location: &str,
        filename: String,
    ) -> Result<JobResult, UpscaleApiError> {
        let url = self.resolve(location);
        let response = self.client.get(&url).send().await?;
        let response = Self::checked(response).await?;
        let data = response.bytes().await?.to_vec();

        tracing::debug!(job_id = %job_id, bytes = data.len(), "Artifact downloaded");

        Ok(JobResult {
            job_id: job_id.clone(),
            filename,
            data,
        })
    }

    /// Dispose of the server-side job state (`DELETE /job/{job_id}`).
    pub async fn delete_job(&self, job_id: &JobId) -> Result<(), UpscaleApiError> {
        let response = self
            .client
            .delete(format!("{}/job/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::checked(response).await.map(drop)
    }

    /// Liveness check (`GET /`).
    pub async fn health(&self) -> Result<HealthResponse, UpscaleApiError> {
        let response = self.client.get(format!("{}/", self.api_url)).send().await?;
        Self::json_body(response).await
    }

    /// Available factors and resample modes (`GET /models`).
    pub async fn models(&self) -> Result<ModelsResponse, UpscaleApiError> {
        let response = self
            .client
            .get(format!("{}/models", self.api_url))
            .send()
            .await?;

        Self::json_body(response).await
    }

    // ---- private helpers ----

    fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            format!("{}{location}", self.api_url)
        } else {
            format!("{}/{location}", self.api_url)
        }
    }

    /// Pass a 2xx response through. Anything else becomes an
    /// [`UpscaleApiError::ApiError`] carrying the backend's error detail.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, UpscaleApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UpscaleApiError::ApiError {
            status: status.as_u16(),
            body: error_detail(&body),
        })
    }

    async fn json_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UpscaleApiError> {
        Ok(Self::checked(response).await?.json::<T>().await?)
    }
}

/// The backend reports errors as `{"detail": "..."}`; keep just the text.
/// Other bodies are returned unchanged.
fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) if body.trim().is_empty() => "<empty body>".to_string(),
        Err(_) => body.to_string(),
    }
}
