//! Whole-file analysis of uploaded videos.
//!
//! Unlike the live sampler this sends the entire file in one request and
//! reports at most one incident: the peak fight probability, if it clears
//! the threshold.

use std::path::{Path, PathBuf};

use chrono::Utc;
use fightwatch_api::{ApiError, VideoAnalyzer};
use fightwatch_api_models::{AnalysisStatus, VideoAnalysis, VideoPrediction};
use fightwatch_incident_models::{IncidentSource, NewIncident};
use thiserror::Error;

use crate::DetectionPolicy;

/// Extensions treated as video files.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "webm", "mkv", "avi", "ogv", "ogg", "mpeg", "mpg",
];

/// Errors from upload analysis.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server answered but did not report success.
    #[error("Analysis failed: {message}")]
    AnalysisFailed {
        /// Server message, or a generic one.
        message: String,
    },
}

/// Result of analyzing one uploaded file.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// The analyzed file.
    pub path: PathBuf,
    /// Raw server response.
    pub analysis: VideoAnalysis,
    /// Highest fight probability seen; 0 when there were no predictions.
    pub peak_probability: f64,
    /// The prediction carrying the peak, if any.
    pub peak: Option<VideoPrediction>,
    /// Incident to record when the peak clears the threshold.
    pub incident: Option<NewIncident>,
}

/// Whether `path` has a video file extension.
#[must_use]
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Analyzes the video at `path`.
///
/// Files that are not videos, cannot be read, or are empty are ignored:
/// the result is `Ok(None)` and nothing is sent.
///
/// # Errors
///
/// Returns [`UploadError::Api`] if the request fails and
/// [`UploadError::AnalysisFailed`] if the server reports a failure.
pub async fn analyze_upload(
    analyzer: &dyn VideoAnalyzer,
    path: &Path,
    policy: &DetectionPolicy,
) -> Result<Option<UploadReport>, UploadError> {
    if !is_video_file(path) {
        log::debug!("Ignoring {}: not a video file", path.display());
        return Ok(None);
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            log::debug!("Ignoring {}: empty file", path.display());
            return Ok(None);
        }
        Err(e) => {
            log::debug!("Ignoring {}: {e}", path.display());
            return Ok(None);
        }
    };

    log::info!(
        "Uploading {} ({} bytes) for analysis",
        path.display(),
        bytes.len()
    );
    let analysis = analyzer.analyze_video(&bytes).await?;

    if analysis.status != AnalysisStatus::Success {
        return Err(UploadError::AnalysisFailed {
            message: analysis
                .message
                .clone()
                .unwrap_or_else(|| "Analysis failed".to_string()),
        });
    }

    let peak = analysis.peak();
    let peak_probability = peak.map_or(0.0, |p| p.fight_probability);
    let incident = policy.exceeds(peak_probability).then(|| {
        NewIncident::new(
            policy.positive_class.clone(),
            peak_probability,
            IncidentSource::Upload,
        )
        .at(Utc::now())
    });

    log::info!(
        "Analysis of {} complete: {} prediction(s), peak {peak_probability:.3}{}",
        path.display(),
        analysis.predictions.len(),
        if incident.is_some() { " (incident)" } else { "" }
    );

    Ok(Some(UploadReport {
        path: path.to_path_buf(),
        analysis,
        peak_probability,
        peak,
        incident,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FakeAnalyzer {
        response: VideoAnalysis,
        calls: AtomicUsize,
    }

    impl FakeAnalyzer {
        fn new(status: AnalysisStatus, probabilities: &[f64]) -> Self {
            Self {
                response: VideoAnalysis {
                    status,
                    predictions: probabilities
                        .iter()
                        .enumerate()
                        .map(|(i, p)| VideoPrediction {
                            timestamp: f64::from(u32::try_from(i).unwrap()),
                            fight_probability: *p,
                        })
                        .collect(),
                    message: None,
                },
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VideoAnalyzer for FakeAnalyzer {
        async fn analyze_video(&self, _video: &[u8]) -> Result<VideoAnalysis, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn write_video(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fightwatch_upload_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();
        path
    }

    #[test]
    fn recognises_video_extensions() {
        assert!(is_video_file(Path::new("clip.MP4")));
        assert!(is_video_file(Path::new("/tmp/a/b.webm")));
        assert!(!is_video_file(Path::new("photo.jpg")));
        assert!(!is_video_file(Path::new("no_extension")));
    }

    #[tokio::test]
    async fn non_video_input_is_ignored_without_a_request() {
        let analyzer = FakeAnalyzer::new(AnalysisStatus::Success, &[0.9]);
        let policy = DetectionPolicy::default();

        let report = analyze_upload(&analyzer, Path::new("notes.txt"), &policy)
            .await
            .unwrap();
        assert!(report.is_none());

        let missing = std::env::temp_dir().join("fightwatch_missing_clip.mp4");
        let report = analyze_upload(&analyzer, &missing, &policy).await.unwrap();
        assert!(report.is_none());

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn peak_above_threshold_yields_upload_incident() {
        let path = write_video("peak_above.mp4");
        let analyzer = FakeAnalyzer::new(AnalysisStatus::Success, &[0.1, 0.55, 0.3]);
        let policy = DetectionPolicy::new(0.4, "fight");

        let report = analyze_upload(&analyzer, &path, &policy)
            .await
            .unwrap()
            .unwrap();

        assert!((report.peak_probability - 0.55).abs() < f64::EPSILON);
        let incident = report.incident.unwrap();
        assert_eq!(incident.source, IncidentSource::Upload);
        assert_eq!(incident.kind, "fight");
        assert!(incident.timestamp.is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn peak_below_threshold_yields_no_incident() {
        let path = write_video("peak_below.mp4");
        let analyzer = FakeAnalyzer::new(AnalysisStatus::Success, &[0.1, 0.4]);
        let policy = DetectionPolicy::new(0.4, "fight");

        let report = analyze_upload(&analyzer, &path, &policy)
            .await
            .unwrap()
            .unwrap();
        assert!(report.incident.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_predictions_means_zero_peak() {
        let path = write_video("no_predictions.mp4");
        let analyzer = FakeAnalyzer::new(AnalysisStatus::Success, &[]);

        let report = analyze_upload(&analyzer, &path, &DetectionPolicy::default())
            .await
            .unwrap()
            .unwrap();
        assert!(report.peak.is_none());
        assert!(report.peak_probability.abs() < f64::EPSILON);
        assert!(report.incident.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn server_failure_carries_message() {
        let path = write_video("server_failure.mp4");
        let mut analyzer = FakeAnalyzer::new(AnalysisStatus::Error, &[]);
        analyzer.response.message = Some("Unsupported codec".to_string());

        let err = analyze_upload(&analyzer, &path, &DetectionPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Analysis failed: Unsupported codec");

        let _ = std::fs::remove_file(&path);
    }
}
