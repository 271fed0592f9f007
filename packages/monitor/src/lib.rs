#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-session monitor context.
//!
//! A [`MonitorContext`] owns everything one operator session needs: the
//! loaded [`MonitorConfig`], the inference client, and the shared
//! [`IncidentStore`] that live samplers and upload analysis record into.
//! It is created once and passed explicitly to whatever needs it.

pub mod config;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fightwatch_api::{ApiError, FrameClassifier, InferenceClient, VideoAnalyzer};
use fightwatch_api_models::{FeatureCatalog, FramePrediction, ModelLoadResponse, ServiceStatus};
use fightwatch_auth::AuthError;
use fightwatch_incident::IncidentStore;
use fightwatch_incident_models::{Incident, IncidentSource, IncidentStats, NewIncident, SourceFilter};
use fightwatch_sampler::stream::{InvalidStreamUrl, StreamUrl};
use fightwatch_sampler::upload::{UploadError, UploadReport};
use fightwatch_sampler::{FrameSource, SampleSink, Sampler, SamplerConfig, SamplerHandle};
use thiserror::Error;

pub use config::{ConfigError, MonitorConfig};

/// Errors surfaced by monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Inference API error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Upload analysis error.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Session error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rejected stream URL.
    #[error(transparent)]
    InvalidStream(#[from] InvalidStreamUrl),

    /// A YouTube monitor was started without a URL.
    #[error("A YouTube URL is required to monitor a stream")]
    MissingStreamUrl,

    /// Upload analysis needs the detection model in memory.
    #[error("Detection model is not loaded; run `load-model` first")]
    ModelNotLoaded,
}

/// Result of the startup status queries.
#[derive(Debug, Clone)]
pub struct MonitorOverview {
    /// Feature catalog, downgraded to `limited` when models are not loaded.
    pub features: FeatureCatalog,
    /// Service health.
    pub service: ServiceStatus,
    /// Whether the detection model is in memory.
    pub model_loaded: bool,
}

impl MonitorOverview {
    /// Whether the service is running without its models.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        !self.service.models_loaded
    }
}

/// Incident list and statistics for one filter.
#[derive(Debug, Clone)]
pub struct Dashboard {
    /// Filter the view was built with.
    pub filter: SourceFilter,
    /// Matching incidents in insertion order.
    pub incidents: Vec<Incident>,
    /// Statistics; see [`IncidentStats`] for which fields honor the filter.
    pub stats: IncidentStats,
}

/// [`SampleSink`] that records incidents into an [`IncidentStore`].
///
/// Failed ticks are logged and counted; they never stop the sampler.
#[derive(Debug, Clone)]
pub struct IncidentRecorder {
    store: IncidentStore,
    failures: Arc<AtomicU64>,
}

impl IncidentRecorder {
    /// Creates a recorder writing into `store`.
    #[must_use]
    pub fn new(store: IncidentStore) -> Self {
        Self {
            store,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of failed ticks reported so far.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl SampleSink for IncidentRecorder {
    fn on_prediction(&self, prediction: &FramePrediction) {
        log::trace!(
            "Prediction {} ({:.3})",
            prediction.predicted_class,
            prediction.confidence
        );
    }

    fn on_incident(&self, incident: NewIncident) {
        let recorded = self.store.record(incident);
        log::warn!(
            "Incident {}: {} from {} ({:.0}%)",
            recorded.id,
            recorded.kind,
            recorded.source,
            recorded.confidence * 100.0
        );
    }

    fn on_error(&self, error: &ApiError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if error.is_transient() {
            log::debug!("Frame request failed: {error}");
        } else {
            log::warn!("Frame request failed: {error}");
        }
    }
}

/// Everything one operator session needs.
#[derive(Debug)]
pub struct MonitorContext {
    config: MonitorConfig,
    client: Arc<InferenceClient>,
    incidents: IncidentStore,
    model_loaded: AtomicBool,
}

impl MonitorContext {
    /// Builds a context and its inference client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Api`] if the client cannot be built.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        let client = InferenceClient::new(
            &config.api.base_url,
            config.api.routes.clone(),
            config.timeout(),
        )?;
        log::debug!("Inference API at {}", client.base_url());

        Ok(Self {
            config,
            client: Arc::new(client),
            incidents: IncidentStore::new(),
            model_loaded: AtomicBool::new(false),
        })
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The shared inference client.
    #[must_use]
    pub fn client(&self) -> Arc<InferenceClient> {
        self.client.clone()
    }

    /// The session's incident store.
    #[must_use]
    pub const fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }

    /// Last known model state, from [`MonitorContext::bootstrap`] or
    /// [`MonitorContext::load_model`].
    #[must_use]
    pub fn model_loaded(&self) -> bool {
        self.model_loaded.load(Ordering::Relaxed)
    }

    /// Queries the feature catalog, service status and model status
    /// concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Api`] if any of the three requests fails.
    pub async fn bootstrap(&self) -> Result<MonitorOverview, MonitorError> {
        let (features, service, model) = tokio::try_join!(
            self.client.features(),
            self.client.status(),
            self.client.model_status(),
        )?;

        if !service.models_loaded {
            log::warn!(
                "Inference service is {} without models; features are limited",
                service.status
            );
        }
        self.model_loaded.store(model.model_loaded, Ordering::Relaxed);

        Ok(MonitorOverview {
            features: features.degraded(service.models_loaded),
            service,
            model_loaded: model.model_loaded,
        })
    }

    /// Asks the service to load the detection model.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Api`] if the request fails.
    pub async fn load_model(&self) -> Result<ModelLoadResponse, MonitorError> {
        let response = self.client.load_model().await?;
        self.model_loaded
            .store(response.model_loaded, Ordering::Relaxed);
        if response.model_loaded {
            log::info!("Detection model loaded");
        } else {
            log::warn!(
                "Detection model not loaded: {}",
                response.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(response)
    }

    /// Builds a sampler configuration for `source` from the loaded settings.
    ///
    /// Webcam samplers fall back to the configured camera id.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::MissingStreamUrl`] or
    /// [`MonitorError::InvalidStream`] when a YouTube source has no valid
    /// URL.
    pub fn sampler_config(
        &self,
        source: IncidentSource,
        camera_id: Option<String>,
        stream_url: Option<&str>,
    ) -> Result<SamplerConfig, MonitorError> {
        let source_url = match (source, stream_url) {
            (IncidentSource::Youtube, None) => return Err(MonitorError::MissingStreamUrl),
            (IncidentSource::Youtube, Some(url)) => Some(StreamUrl::parse(url)?.to_string()),
            (_, url) => url.map(str::to_string),
        };
        let camera_id = match source {
            IncidentSource::Webcam => camera_id.or_else(|| self.config.sampler.camera_id.clone()),
            _ => camera_id,
        };

        Ok(SamplerConfig {
            period: self.config.period(),
            source,
            camera_id,
            source_url,
            policy: self.config.policy(),
        })
    }

    /// Starts a sampler that classifies through the inference client and
    /// records into this context's store.
    #[must_use]
    pub fn start_sampler(
        &self,
        config: SamplerConfig,
        frames: Arc<dyn FrameSource>,
    ) -> SamplerHandle {
        let classifier: Arc<dyn FrameClassifier> = self.client.clone();
        self.start_sampler_with(config, frames, classifier)
    }

    /// Like [`MonitorContext::start_sampler`] with a caller-supplied
    /// classifier.
    #[must_use]
    pub fn start_sampler_with(
        &self,
        config: SamplerConfig,
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn FrameClassifier>,
    ) -> SamplerHandle {
        let sink = Arc::new(IncidentRecorder::new(self.incidents.clone()));
        Sampler::start(config, frames, classifier, sink)
    }

    /// Analyzes an uploaded video and records its incident, if any.
    ///
    /// Fails fast with [`MonitorError::ModelNotLoaded`] when the service
    /// reports no model in memory.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if the status check or the analysis fails.
    pub async fn analyze_upload(&self, path: &Path) -> Result<Option<UploadReport>, MonitorError> {
        let model = self.client.model_status().await?;
        self.model_loaded
            .store(model.model_loaded, Ordering::Relaxed);
        if !model.model_loaded {
            return Err(MonitorError::ModelNotLoaded);
        }
        self.analyze_upload_with(self.client.as_ref(), path).await
    }

    /// Analyzes `path` with `analyzer` and records the resulting incident.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Upload`] if the analysis fails.
    pub async fn analyze_upload_with(
        &self,
        analyzer: &dyn VideoAnalyzer,
        path: &Path,
    ) -> Result<Option<UploadReport>, MonitorError> {
        let report =
            fightwatch_sampler::upload::analyze_upload(analyzer, path, &self.config.policy())
                .await?;

        if let Some(incident) = report.as_ref().and_then(|r| r.incident.clone()) {
            let recorded = self.incidents.record(incident);
            log::warn!(
                "Incident {} in {} ({:.0}%)",
                recorded.id,
                path.display(),
                recorded.confidence * 100.0
            );
        }

        Ok(report)
    }

    /// Incident list and statistics for `filter`.
    #[must_use]
    pub fn dashboard(&self, filter: SourceFilter) -> Dashboard {
        let (incidents, stats) = self.incidents.dashboard(filter);
        Dashboard {
            filter,
            incidents,
            stats,
        }
    }

    /// Drops every recorded incident. Returns how many were removed.
    pub fn clear_incidents(&self) -> usize {
        let removed = self.incidents.clear();
        log::info!("Cleared {removed} incident(s)");
        removed
    }
}
