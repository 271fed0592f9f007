//! `reqwest`-backed implementation of the inference API.
//!
//! Every call is logged the same way: the request line at debug level,
//! the response status at debug level, and failures at error level with
//! a body preview. Nothing is retried here; callers decide whether a
//! failed call is worth repeating.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use fightwatch_api_models::{
    ApiRoutes, FeatureCatalog, FramePredictRequest, FramePrediction, ModelLoadResponse,
    ModelStatus, ServiceStatus, VideoAnalysis, VideoAnalyzeRequest,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{ApiError, FrameClassifier, VideoAnalyzer};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Per-request timeout. Whole-video uploads can take a while.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of the response body kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Client for the inference API.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    routes: ApiRoutes,
    client: reqwest::Client,
}

impl InferenceClient {
    /// Creates a client for `base_url` with the given routes and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the base URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        routes: ApiRoutes,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Config {
                message: "API base URL is empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url,
            routes,
            client,
        })
    }

    /// Creates a client for `base_url` with default routes and timeout.
    ///
    /// # Errors
    ///
    /// See [`InferenceClient::new`].
    pub fn with_defaults(base_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, ApiRoutes::default(), DEFAULT_TIMEOUT)
    }

    /// The normalized base URL (no trailing slash).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET features`: the per-source feature catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is not a
    /// catalog.
    pub async fn features(&self) -> Result<FeatureCatalog, ApiError> {
        self.get_json(&self.routes.features).await
    }

    /// `GET status`: service state and whether models are loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body cannot be
    /// decoded.
    pub async fn status(&self) -> Result<ServiceStatus, ApiError> {
        self.get_json(&self.routes.status).await
    }

    /// `GET model-status`: the model-loaded flag.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body cannot be
    /// decoded.
    pub async fn model_status(&self) -> Result<ModelStatus, ApiError> {
        self.get_json(&self.routes.model_status).await
    }

    /// `GET model-load`: asks the server to load the model.
    ///
    /// The server reports load failures as 404/500 with a JSON body whose
    /// `model_loaded` is false. Those bodies are returned as a normal
    /// response so the caller sees the server's message.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, or on an error status
    /// whose body is not a model-load response.
    pub async fn load_model(&self) -> Result<ModelLoadResponse, ApiError> {
        let url = self.endpoint(&self.routes.model_load);
        log::debug!("API request: GET {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            log::error!("API request failed: GET {url}: {e}");
            ApiError::Http(e)
        })?;
        let status = response.status();
        let text = response.text().await?;
        log::debug!("API response: GET {url} -> {status}");

        match serde_json::from_str::<ModelLoadResponse>(&text) {
            Ok(body) => {
                if !status.is_success() {
                    log::warn!(
                        "Model load failed (HTTP {status}): {}",
                        body.message.as_deref().unwrap_or("no message")
                    );
                }
                Ok(body)
            }
            Err(e) if status.is_success() => {
                log::error!("API response decode failed: GET {url}: {e}");
                Err(ApiError::Json(e))
            }
            Err(_) => Err(status_error("GET", &url, status, &text)),
        }
    }

    /// `POST frame-predict`: classifies one JPEG frame.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body cannot be
    /// decoded.
    pub async fn predict_frame(&self, jpeg: &[u8]) -> Result<FramePrediction, ApiError> {
        let body = FramePredictRequest {
            frame: encode_base64(jpeg),
        };
        self.post_json(&self.routes.frame_predict, &body).await
    }

    /// `POST video-analyze`: analyzes a whole video file.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body cannot be
    /// decoded. A decoded body with an `error` status is not an error
    /// here.
    pub async fn analyze(&self, video: &[u8]) -> Result<VideoAnalysis, ApiError> {
        let body = VideoAnalyzeRequest {
            video: encode_base64(video),
        };
        self.post_json(&self.routes.video_analyze, &body).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        log::debug!("API request: GET {url}");
        let result = self.client.get(&url).send().await;
        decode("GET", &url, result).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        log::debug!("API request: POST {url}");
        let result = self.client.post(&url).json(body).send().await;
        decode("POST", &url, result).await
    }
}

#[async_trait]
impl FrameClassifier for InferenceClient {
    async fn classify_frame(&self, jpeg: &[u8]) -> Result<FramePrediction, ApiError> {
        self.predict_frame(jpeg).await
    }
}

#[async_trait]
impl VideoAnalyzer for InferenceClient {
    async fn analyze_video(&self, video: &[u8]) -> Result<VideoAnalysis, ApiError> {
        self.analyze(video).await
    }
}

/// Standard base64 with padding and no data-URL prefix.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

async fn decode<T: DeserializeOwned>(
    method: &str,
    url: &str,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, ApiError> {
    let response = result.map_err(|e| {
        log::error!("API request failed: {method} {url}: {e}");
        ApiError::Http(e)
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| {
        log::error!("API response body read failed: {method} {url} ({status}): {e}");
        ApiError::Http(e)
    })?;
    log::debug!("API response: {method} {url} -> {status}");

    if !status.is_success() {
        return Err(status_error(method, url, status, &text));
    }

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "API response decode failed: {method} {url}\n  \
             status: {status}\n  \
             parse error: {e}\n  \
             body preview: {}",
            preview(&text)
        );
        ApiError::Json(e)
    })
}

fn status_error(method: &str, url: &str, status: reqwest::StatusCode, text: &str) -> ApiError {
    let body = preview(text);
    log::error!("API response error: {method} {url}\n  status: {status}\n  body preview: {body}");
    ApiError::Status {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
