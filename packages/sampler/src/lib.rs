#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Periodic frame sampling against the inference API.
//!
//! A running [`Sampler`] captures a frame from its [`FrameSource`] once
//! per period, sends it to a [`FrameClassifier`], and reports the
//! prediction (and, when it clears the [`DetectionPolicy`], an incident)
//! to a [`SampleSink`].
//!
//! Ticks do not wait for each other: each tick's capture and request run
//! on their own task, so a slow API produces overlapping requests and
//! possibly out-of-order results. Stopping prevents future ticks; a
//! request already in flight is allowed to finish but its result is
//! discarded.
//!
//! The [`upload`] module covers whole-file analysis of uploaded videos
//! and [`stream`] validates YouTube URLs.

pub mod frame;
pub mod stream;
pub mod upload;

pub use frame::{DirectoryFrameSource, Frame, FrameSource, SnapshotFileSource};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use fightwatch_api::{ApiError, FrameClassifier};
use fightwatch_api_models::FramePrediction;
use fightwatch_incident_models::{DEFAULT_INCIDENT_KIND, IncidentSource, NewIncident};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sampling period used when none is configured.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Confidence a positive prediction must exceed to become an incident.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Decides whether a prediction is an incident.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPolicy {
    /// Confidence must be strictly greater than this.
    pub threshold: f64,
    /// Class label that counts as a detection (compared
    /// case-insensitively). Also used as the incident kind.
    pub positive_class: String,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_INCIDENT_KIND)
    }
}

impl DetectionPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(threshold: f64, positive_class: impl Into<String>) -> Self {
        Self {
            threshold,
            positive_class: positive_class.into(),
        }
    }

    /// Whether `confidence` clears the threshold.
    #[must_use]
    pub fn exceeds(&self, confidence: f64) -> bool {
        confidence > self.threshold
    }

    /// Whether `prediction` is a positive detection above the threshold.
    #[must_use]
    pub fn is_incident(&self, prediction: &FramePrediction) -> bool {
        prediction
            .predicted_class
            .trim()
            .eq_ignore_ascii_case(&self.positive_class)
            && self.exceeds(prediction.confidence)
    }
}

/// Settings for one running sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between ticks.
    pub period: Duration,
    /// Source recorded on emitted incidents.
    pub source: IncidentSource,
    /// Camera identifier recorded on emitted incidents.
    pub camera_id: Option<String>,
    /// Stream URL recorded on emitted incidents.
    pub source_url: Option<String>,
    /// Incident decision.
    pub policy: DetectionPolicy,
}

impl SamplerConfig {
    /// Default period and policy for `source`, no provenance metadata.
    #[must_use]
    pub fn new(source: IncidentSource) -> Self {
        Self {
            period: DEFAULT_PERIOD,
            source,
            camera_id: None,
            source_url: None,
            policy: DetectionPolicy::default(),
        }
    }

    /// Builds the incident report for a positive prediction.
    #[must_use]
    pub fn incident_for(&self, prediction: &FramePrediction) -> NewIncident {
        NewIncident::new(
            self.policy.positive_class.clone(),
            prediction.confidence,
            self.source,
        )
        .at(Utc::now())
        .with_camera_id(self.camera_id.clone())
        .with_source_url(self.source_url.clone())
    }
}

/// Receives what a running sampler produces.
///
/// Called from tokio tasks, possibly concurrently and out of order.
pub trait SampleSink: Send + Sync {
    /// Every successful prediction, positive or not.
    fn on_prediction(&self, _prediction: &FramePrediction) {}

    /// A positive prediction above the threshold.
    fn on_incident(&self, incident: NewIncident);

    /// A failed classification request. The sampler carries on.
    fn on_error(&self, _error: &ApiError) {}
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The source had no frame; nothing was sent.
    NotReady,
    /// The classification request failed.
    Failed(ApiError),
    /// The frame was classified.
    Classified {
        /// The server's answer.
        prediction: FramePrediction,
        /// Set when the prediction is an incident.
        incident: Option<NewIncident>,
    },
}

/// Runs one capture-and-classify step.
pub async fn sample_once(
    source: &dyn FrameSource,
    classifier: &dyn FrameClassifier,
    config: &SamplerConfig,
) -> TickOutcome {
    let Some(frame) = source.capture().await else {
        return TickOutcome::NotReady;
    };

    match classifier.classify_frame(frame.as_bytes()).await {
        Ok(prediction) => {
            let incident = config
                .policy
                .is_incident(&prediction)
                .then(|| config.incident_for(&prediction));
            TickOutcome::Classified {
                prediction,
                incident,
            }
        }
        Err(e) => TickOutcome::Failed(e),
    }
}

/// Counters for a running sampler.
#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    classified: AtomicU64,
    incidents: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of a sampler's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerStats {
    /// Ticks fired.
    pub ticks: u64,
    /// Ticks skipped because the source was not ready.
    pub skipped: u64,
    /// Classification requests that failed.
    pub failed: u64,
    /// Predictions delivered to the sink.
    pub classified: u64,
    /// Incidents delivered to the sink.
    pub incidents: u64,
    /// Results that arrived after stop and were dropped.
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Shared {
    stopped: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Entry point for periodic sampling.
pub struct Sampler;

impl Sampler {
    /// Starts sampling on the current tokio runtime. The first tick fires
    /// immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(
        config: SamplerConfig,
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn FrameClassifier>,
        sink: Arc<dyn SampleSink>,
    ) -> SamplerHandle {
        let shared = Arc::new(Shared::default());

        log::info!(
            "Sampling {} as {} every {:?} (threshold {})",
            source.describe(),
            config.source,
            config.period,
            config.policy.threshold
        );

        let ticker = tokio::spawn(run_ticker(
            Arc::new(config),
            source,
            classifier,
            sink,
            shared.clone(),
        ));

        SamplerHandle {
            shared,
            ticker: Some(ticker),
        }
    }
}

/// Starts a sampler. See [`Sampler::start`].
#[must_use]
pub fn start(
    config: SamplerConfig,
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn FrameClassifier>,
    sink: Arc<dyn SampleSink>,
) -> SamplerHandle {
    Sampler::start(config, source, classifier, sink)
}

/// Stops a sampler. See [`SamplerHandle::stop`].
pub fn stop(handle: SamplerHandle) -> SamplerStats {
    handle.stop()
}

/// Cancellation handle for a running sampler.
///
/// Dropping the handle stops the sampler as well.
#[derive(Debug)]
pub struct SamplerHandle {
    shared: Arc<Shared>,
    ticker: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Halts future ticks and returns the counters at that moment.
    ///
    /// Requests already in flight are not aborted; their results are
    /// discarded when they arrive.
    pub fn stop(mut self) -> SamplerStats {
        self.cancel();
        self.stats()
    }

    /// Whether [`SamplerHandle::stop`] has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        let c = &self.shared.counters;
        SamplerStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            classified: c.classified.load(Ordering::Relaxed),
            incidents: c.incidents.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }

    fn cancel(&mut self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        log::info!("Sampler stopped");
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_ticker(
    config: Arc<SamplerConfig>,
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn FrameClassifier>,
    sink: Arc<dyn SampleSink>,
    shared: Arc<Shared>,
) {
    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if shared.is_stopped() {
            break;
        }
        Shared::bump(&shared.counters.ticks);

        tokio::spawn(run_tick(
            config.clone(),
            source.clone(),
            classifier.clone(),
            sink.clone(),
            shared.clone(),
        ));
    }
}

async fn run_tick(
    config: Arc<SamplerConfig>,
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn FrameClassifier>,
    sink: Arc<dyn SampleSink>,
    shared: Arc<Shared>,
) {
    let outcome = sample_once(source.as_ref(), classifier.as_ref(), &config).await;
    let counters = &shared.counters;

    match outcome {
        TickOutcome::NotReady => Shared::bump(&counters.skipped),
        TickOutcome::Failed(e) => {
            if shared.is_stopped() {
                log::debug!("Discarding failure that arrived after stop: {e}");
                Shared::bump(&counters.discarded);
                return;
            }
            Shared::bump(&counters.failed);
            log::warn!("Frame classification failed, skipping tick: {e}");
            sink.on_error(&e);
        }
        TickOutcome::Classified {
            prediction,
            incident,
        } => {
            if shared.is_stopped() {
                log::debug!("Discarding prediction that arrived after stop");
                Shared::bump(&counters.discarded);
                return;
            }
            Shared::bump(&counters.classified);
            log::debug!(
                "Prediction: {} ({:.3})",
                prediction.predicted_class,
                prediction.confidence
            );
            sink.on_prediction(&prediction);

            if let Some(incident) = incident {
                Shared::bump(&counters.incidents);
                log::info!(
                    "Incident detected on {}: {} ({:.3})",
                    incident.source,
                    incident.kind,
                    incident.confidence
                );
                sink.on_incident(incident);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;

    fn jpeg() -> Frame {
        Frame::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]).unwrap()
    }

    struct StaticSource(Option<Frame>);

    #[async_trait]
    impl FrameSource for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        async fn capture(&self) -> Option<Frame> {
            self.0.clone()
        }
    }

    struct FixedClassifier {
        class: &'static str,
        confidence: f64,
    }

    #[async_trait]
    impl FrameClassifier for FixedClassifier {
        async fn classify_frame(&self, _jpeg: &[u8]) -> Result<FramePrediction, ApiError> {
            Ok(FramePrediction {
                predicted_class: self.class.to_string(),
                confidence: self.confidence,
            })
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl FrameClassifier for FailingClassifier {
        async fn classify_frame(&self, _jpeg: &[u8]) -> Result<FramePrediction, ApiError> {
            Err(ApiError::Status {
                method: "POST".to_string(),
                url: "http://127.0.0.1:5000/api/webcam/predict".to_string(),
                status: 503,
                body: "model busy".to_string(),
            })
        }
    }

    /// Blocks every request until the test releases permits.
    struct GatedClassifier {
        gate: Semaphore,
        started: AtomicUsize,
        fails: bool,
    }

    impl GatedClassifier {
        fn closed(fails: bool) -> Self {
            Self {
                gate: Semaphore::new(0),
                started: AtomicUsize::new(0),
                fails,
            }
        }
    }

    #[async_trait]
    impl FrameClassifier for GatedClassifier {
        async fn classify_frame(&self, _jpeg: &[u8]) -> Result<FramePrediction, ApiError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            if self.fails {
                return Err(ApiError::Status {
                    method: "POST".to_string(),
                    url: "http://127.0.0.1:5000/api/webcam/predict".to_string(),
                    status: 504,
                    body: "timed out".to_string(),
                });
            }
            Ok(FramePrediction {
                predicted_class: "fight".to_string(),
                confidence: 0.99,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        predictions: Mutex<Vec<FramePrediction>>,
        incidents: Mutex<Vec<NewIncident>>,
        errors: AtomicUsize,
    }

    impl SampleSink for RecordingSink {
        fn on_prediction(&self, prediction: &FramePrediction) {
            self.predictions.lock().unwrap().push(prediction.clone());
        }

        fn on_incident(&self, incident: NewIncident) {
            self.incidents.lock().unwrap().push(incident);
        }

        fn on_error(&self, _error: &ApiError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config(source: IncidentSource) -> SamplerConfig {
        SamplerConfig {
            period: Duration::from_millis(10),
            ..SamplerConfig::new(source)
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn policy_requires_positive_class_and_strict_threshold() {
        let policy = DetectionPolicy::new(0.4, "fight");
        let prediction = |class: &str, confidence| FramePrediction {
            predicted_class: class.to_string(),
            confidence,
        };

        assert!(policy.is_incident(&prediction("fight", 0.5)));
        assert!(policy.is_incident(&prediction("Fight", 0.41)));
        assert!(!policy.is_incident(&prediction("fight", 0.4)));
        assert!(!policy.is_incident(&prediction("non_fight", 0.95)));
    }

    #[tokio::test]
    async fn not_ready_source_yields_no_incident() {
        let outcome = sample_once(
            &StaticSource(None),
            &FixedClassifier {
                class: "fight",
                confidence: 0.99,
            },
            &SamplerConfig::new(IncidentSource::Webcam),
        )
        .await;
        assert!(matches!(outcome, TickOutcome::NotReady));
    }

    #[tokio::test]
    async fn confidence_above_threshold_emits_exactly_one_incident() {
        let mut config = SamplerConfig::new(IncidentSource::Youtube);
        config.policy = DetectionPolicy::new(0.4, "fight");
        config.camera_id = Some("cam-7".to_string());
        config.source_url = Some("https://youtu.be/dQw4w9WgXcQ".to_string());

        let outcome = sample_once(
            &StaticSource(Some(jpeg())),
            &FixedClassifier {
                class: "fight",
                confidence: 0.5,
            },
            &config,
        )
        .await;

        let TickOutcome::Classified {
            prediction,
            incident,
        } = outcome
        else {
            panic!("expected a classification");
        };
        assert!((prediction.confidence - 0.5).abs() < f64::EPSILON);
        let incident = incident.expect("one incident");
        assert_eq!(incident.source, IncidentSource::Youtube);
        assert_eq!(incident.camera_id.as_deref(), Some("cam-7"));
        assert_eq!(
            incident.source_url.as_deref(),
            Some("https://youtu.be/dQw4w9WgXcQ")
        );
    }

    #[tokio::test]
    async fn failed_request_is_reported_not_raised() {
        let outcome = sample_once(
            &StaticSource(Some(jpeg())),
            &FailingClassifier,
            &SamplerConfig::new(IncidentSource::Webcam),
        )
        .await;
        assert!(matches!(outcome, TickOutcome::Failed(e) if e.is_transient()));
    }

    #[tokio::test]
    async fn running_sampler_skips_unready_ticks_silently() {
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(None)),
            Arc::new(FixedClassifier {
                class: "fight",
                confidence: 0.99,
            }),
            sink.clone(),
        );

        wait_for(|| handle.stats().skipped >= 3).await;
        let stats = stop(handle);

        assert_eq!(stats.classified, 0);
        assert_eq!(stats.incidents, 0);
        assert!(sink.incidents.lock().unwrap().is_empty());
        assert_eq!(sink.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn running_sampler_keeps_going_after_failures() {
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(Some(jpeg()))),
            Arc::new(FailingClassifier),
            sink.clone(),
        );

        wait_for(|| sink.errors.load(Ordering::SeqCst) >= 3).await;
        assert!(!handle.is_stopped());
        let stats = handle.stop();
        assert!(stats.failed >= 3);
        assert!(sink.incidents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn running_sampler_delivers_predictions_and_incidents() {
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(Some(jpeg()))),
            Arc::new(FixedClassifier {
                class: "fight",
                confidence: 0.9,
            }),
            sink.clone(),
        );

        wait_for(|| sink.incidents.lock().unwrap().len() >= 2).await;
        handle.stop();

        let predictions = sink.predictions.lock().unwrap().len();
        let incidents = sink.incidents.lock().unwrap().len();
        assert!(predictions >= incidents);
        assert!(
            sink.incidents
                .lock()
                .unwrap()
                .iter()
                .all(|i| i.source == IncidentSource::Webcam && i.kind == "fight")
        );
    }

    #[tokio::test]
    async fn results_arriving_after_stop_are_discarded() {
        let classifier = Arc::new(GatedClassifier::closed(false));
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(Some(jpeg()))),
            classifier.clone(),
            sink.clone(),
        );

        wait_for(|| classifier.started.load(Ordering::SeqCst) >= 1).await;
        let observer = handle.shared.clone();
        handle.stop();

        let in_flight = classifier.started.load(Ordering::SeqCst);
        classifier.gate.add_permits(in_flight);

        wait_for(|| observer.counters.discarded.load(Ordering::Relaxed) >= 1).await;
        assert!(sink.predictions.lock().unwrap().is_empty());
        assert!(sink.incidents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_requests_do_not_hold_back_later_ticks() {
        let classifier = Arc::new(GatedClassifier::closed(false));
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(Some(jpeg()))),
            classifier.clone(),
            sink.clone(),
        );

        wait_for(|| classifier.started.load(Ordering::SeqCst) >= 3).await;
        assert!(sink.predictions.lock().unwrap().is_empty());
        assert!(handle.stats().ticks >= 3);

        classifier.gate.add_permits(1);
        wait_for(|| !sink.predictions.lock().unwrap().is_empty()).await;
        handle.stop();

        let in_flight = classifier.started.load(Ordering::SeqCst);
        classifier.gate.add_permits(in_flight);
    }

    #[tokio::test]
    async fn failures_arriving_after_stop_count_only_as_discarded() {
        let classifier = Arc::new(GatedClassifier::closed(true));
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(Some(jpeg()))),
            classifier.clone(),
            sink.clone(),
        );

        wait_for(|| classifier.started.load(Ordering::SeqCst) >= 1).await;
        let observer = handle.shared.clone();
        handle.stop();

        let in_flight = classifier.started.load(Ordering::SeqCst);
        classifier.gate.add_permits(in_flight);

        wait_for(|| {
            observer.counters.discarded.load(Ordering::Relaxed)
                >= u64::try_from(in_flight).unwrap()
        })
        .await;
        assert_eq!(observer.counters.failed.load(Ordering::Relaxed), 0);
        assert_eq!(sink.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_sampling() {
        let sink = Arc::new(RecordingSink::default());
        let handle = start(
            fast_config(IncidentSource::Webcam),
            Arc::new(StaticSource(None)),
            Arc::new(FailingClassifier),
            sink,
        );
        let observer = handle.shared.clone();
        drop(handle);

        assert!(observer.is_stopped());
        let ticks = observer.counters.ticks.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(observer.counters.ticks.load(Ordering::Relaxed), ticks);
    }
}
