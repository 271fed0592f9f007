#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types for the fight-detection inference API.
//!
//! Field names follow the server's `snake_case` JSON exactly. The server
//! owns these shapes; nothing here validates the values it returns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ApiRoutes {
    /// `GET` feature catalog.
    pub features: String,
    /// `GET` service status.
    pub status: String,
    /// `GET` model-loaded flag.
    pub model_status: String,
    /// `GET` trigger model load.
    pub model_load: String,
    /// `POST` single-frame classification.
    pub frame_predict: String,
    /// `POST` whole-video analysis.
    pub video_analyze: String,
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self {
            features: "/api/features".to_string(),
            status: "/api/status".to_string(),
            model_status: "/api/model/status".to_string(),
            model_load: "/api/model/load".to_string(),
            frame_predict: "/api/webcam/predict".to_string(),
            video_analyze: "/api/analyze/video".to_string(),
        }
    }
}

/// Availability of one monitoring feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeatureStatus {
    /// Fully available.
    Active,
    /// Usable with reduced capability (e.g. models not loaded).
    Limited,
    /// Not available.
    Inactive,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

/// One entry of the feature catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Display name, e.g. `"Live Webcam"`.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Current availability.
    pub status: FeatureStatus,
    /// Capability tags, e.g. `"incident-reporting"`.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Feature catalog keyed by source name (`webcam`, `upload`, `youtube`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCatalog(pub BTreeMap<String, Feature>);

impl FeatureCatalog {
    /// Looks up a feature by source key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Feature> {
        self.0.get(key)
    }

    /// Iterates `(key, feature)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Feature)> {
        self.0.iter()
    }

    /// Returns the catalog with every `active` feature downgraded to
    /// `limited` when the models are not loaded. Unchanged otherwise.
    #[must_use]
    pub fn degraded(mut self, models_loaded: bool) -> Self {
        if !models_loaded {
            for feature in self.0.values_mut() {
                if feature.status == FeatureStatus::Active {
                    feature.status = FeatureStatus::Limited;
                }
            }
        }
        self
    }
}

/// `GET status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Free-form service state, e.g. `"operational"`.
    pub status: String,
    /// Server version string.
    #[serde(default)]
    pub version: String,
    /// Whether the detection models are in memory.
    #[serde(default)]
    pub models_loaded: bool,
}

/// `GET model-status` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Whether the model is loaded.
    pub model_loaded: bool,
}

/// `GET model-load` response. Also the body of the server's 404/500
/// answers when loading fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadResponse {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status: Option<String>,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: Option<String>,
    /// Whether the model is loaded after the call.
    #[serde(default)]
    pub model_loaded: bool,
}

/// `POST frame-predict` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePredictRequest {
    /// Base64 JPEG without a data-URL prefix.
    pub frame: String,
}

/// `POST frame-predict` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePrediction {
    /// Class label chosen by the model.
    pub predicted_class: String,
    /// Probability of `predicted_class`.
    pub confidence: f64,
}

/// `POST video-analyze` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAnalyzeRequest {
    /// Base64 of the whole video file.
    pub video: String,
}

/// Outcome flag of a video analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalysisStatus {
    /// Predictions are present.
    Success,
    /// The server rejected or failed the analysis.
    Error,
    /// Anything else the server might send.
    #[serde(other)]
    Unknown,
}

/// Fight probability at one point of an analyzed video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoPrediction {
    /// Offset into the video, in seconds.
    pub timestamp: f64,
    /// Probability that a fight is visible.
    pub fight_probability: f64,
}

/// `POST video-analyze` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    /// Whether the analysis succeeded.
    pub status: AnalysisStatus,
    /// Per-segment predictions.
    #[serde(default)]
    pub predictions: Vec<VideoPrediction>,
    /// Server message, usually only on failure.
    #[serde(default)]
    pub message: Option<String>,
}

impl VideoAnalysis {
    /// The prediction with the highest fight probability, if any.
    #[must_use]
    pub fn peak(&self) -> Option<VideoPrediction> {
        self.predictions
            .iter()
            .copied()
            .filter(|p| p.fight_probability.is_finite())
            .max_by(|a, b| a.fight_probability.total_cmp(&b.fight_probability))
    }
}
