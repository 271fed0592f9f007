#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP client for the fight-detection inference API.
//!
//! The API is an external service: it owns the model, answers feature and
//! status queries, classifies single JPEG frames and analyzes whole video
//! files. [`InferenceClient`] speaks its JSON protocol; the
//! [`FrameClassifier`] and [`VideoAnalyzer`] traits are the seams the
//! sampler depends on so it can be driven by a fake in tests.

pub mod client;

pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, InferenceClient};

use async_trait::async_trait;
use fightwatch_api_models::{FramePrediction, VideoAnalysis};
use thiserror::Error;

/// Errors from inference API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout or body transfer failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        /// Request method.
        method: String,
        /// Full request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Client could not be built from the given settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

impl ApiError {
    /// Whether trying again later could plausibly succeed (timeouts,
    /// refused connections, 429 and 5xx answers).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) | Self::Config { .. } => false,
        }
    }
}

/// Classifies a single still frame.
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    /// Sends one JPEG frame for classification.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the answer cannot be
    /// decoded.
    async fn classify_frame(&self, jpeg: &[u8]) -> Result<FramePrediction, ApiError>;
}

/// Analyzes a whole video file.
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    /// Sends the raw bytes of a video file for analysis.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the answer cannot be
    /// decoded.
    async fn analyze_video(&self, video: &[u8]) -> Result<VideoAnalysis, ApiError>;
}
