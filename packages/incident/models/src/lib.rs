#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record, source and dashboard statistics types.
//!
//! An [`Incident`] is one detection event reported by a monitor (live
//! webcam, uploaded video, or YouTube stream). [`IncidentStats`] is the
//! derived summary the admin dashboard shows; it is recomputed from the
//! incident log and never stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Category label used when the detector does not supply one.
pub const DEFAULT_INCIDENT_KIND: &str = "fight";

/// Origin of the video an incident was detected in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum IncidentSource {
    /// Live camera sampled once per period.
    Webcam,
    /// Pre-recorded video file analyzed in one request.
    Upload,
    /// YouTube stream or video.
    Youtube,
}

impl IncidentSource {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Webcam, Self::Upload, Self::Youtube]
    }

    /// Human-readable label for dashboard output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Webcam => "Webcam",
            Self::Upload => "Uploaded Videos",
            Self::Youtube => "YouTube",
        }
    }
}

/// Unique identifier assigned to an incident when it enters the log.
///
/// Clock-based (milliseconds since the Unix epoch) and strictly
/// increasing within one log. Not stable across sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IncidentId(pub u64);

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An incident report that has not been recorded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    /// Category label, e.g. `"fight"`.
    pub kind: String,
    /// Detection probability reported by the model.
    pub confidence: f64,
    /// Where the video came from.
    pub source: IncidentSource,
    /// Detection time; the log uses its own clock when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Camera identifier, when the monitor knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    /// URL of the analyzed stream or video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl NewIncident {
    /// Creates a report with no timestamp and no provenance metadata.
    #[must_use]
    pub fn new(kind: impl Into<String>, confidence: f64, source: IncidentSource) -> Self {
        Self {
            kind: kind.into(),
            confidence,
            source,
            timestamp: None,
            camera_id: None,
            source_url: None,
        }
    }

    /// Sets the detection time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the camera identifier.
    #[must_use]
    pub fn with_camera_id(mut self, camera_id: Option<String>) -> Self {
        self.camera_id = camera_id;
        self
    }

    /// Sets the source URL.
    #[must_use]
    pub fn with_source_url(mut self, source_url: Option<String>) -> Self {
        self.source_url = source_url;
        self
    }
}

/// A recorded incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Identity assigned at insertion.
    pub id: IncidentId,
    /// Category label, e.g. `"fight"`.
    pub kind: String,
    /// Detection probability reported by the model. Not validated.
    pub confidence: f64,
    /// Where the video came from.
    pub source: IncidentSource,
    /// When the incident was detected or recorded.
    pub timestamp: DateTime<Utc>,
    /// Camera identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    /// URL of the analyzed stream or video, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Incident {
    /// Builds a stored incident from a report, filling in the identity
    /// and falling back to `recorded_at` when the report has no
    /// timestamp.
    #[must_use]
    pub fn from_report(id: IncidentId, report: NewIncident, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: report.kind,
            confidence: report.confidence,
            source: report.source,
            timestamp: report.timestamp.unwrap_or(recorded_at),
            camera_id: report.camera_id,
            source_url: report.source_url,
        }
    }

    /// Confidence usable for averaging: finite values clamped into
    /// `[0, 1]`, `None` for NaN and infinities.
    #[must_use]
    pub fn bounded_confidence(&self) -> Option<f64> {
        self.confidence
            .is_finite()
            .then(|| self.confidence.clamp(0.0, 1.0))
    }
}

/// Which incidents the dashboard list and total are narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    /// Every source.
    #[default]
    All,
    /// A single source.
    #[serde(untagged)]
    Only(IncidentSource),
}

impl SourceFilter {
    /// Whether an incident from `source` passes this filter.
    #[must_use]
    pub fn matches(self, source: IncidentSource) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == source,
        }
    }
}

impl std::fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(source) => write!(f, "{source}"),
        }
    }
}

/// Error returned when a filter string is neither `all` nor a source name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFilterError {
    /// The rejected input.
    pub value: String,
}

impl std::fmt::Display for InvalidFilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid source filter '{}': expected all, webcam, upload or youtube",
            self.value
        )
    }
}

impl std::error::Error for InvalidFilterError {}

impl std::str::FromStr for SourceFilter {
    type Err = InvalidFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        trimmed
            .parse::<IncidentSource>()
            .map(Self::Only)
            .map_err(|_| InvalidFilterError {
                value: s.to_string(),
            })
    }
}

/// Dashboard summary derived from the incident log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStats {
    /// Incidents matching the active filter.
    pub total: u64,
    /// Incident count per source over the whole log, ignoring the filter.
    pub by_source: BTreeMap<IncidentSource, u64>,
    /// Mean confidence over the whole log; 0 when empty.
    pub average_confidence: f64,
    /// Percentage change between the last 24 hours and the 24 hours
    /// before; 0 when the earlier window is empty.
    pub trend_percent: f64,
}

impl IncidentStats {
    /// Number of distinct sources that reported at least one incident.
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.by_source.values().filter(|count| **count > 0).count()
    }

    /// Count for one source, 0 when it never reported.
    #[must_use]
    pub fn count_for(&self, source: IncidentSource) -> u64 {
        self.by_source.get(&source).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_parses_case_insensitively() {
        assert_eq!(
            "YouTube".parse::<IncidentSource>().unwrap(),
            IncidentSource::Youtube
        );
        assert_eq!(IncidentSource::Upload.to_string(), "upload");
    }

    #[test]
    fn filter_parses_all_and_sources() {
        assert_eq!("all".parse::<SourceFilter>().unwrap(), SourceFilter::All);
        assert_eq!(
            " webcam ".parse::<SourceFilter>().unwrap(),
            SourceFilter::Only(IncidentSource::Webcam)
        );
        let err = "drone".parse::<SourceFilter>().unwrap_err();
        assert_eq!(err.value, "drone");
    }

    #[test]
    fn filter_matches() {
        assert!(SourceFilter::All.matches(IncidentSource::Upload));
        assert!(SourceFilter::Only(IncidentSource::Upload).matches(IncidentSource::Upload));
        assert!(!SourceFilter::Only(IncidentSource::Upload).matches(IncidentSource::Webcam));
    }

    #[test]
    fn bounded_confidence_clamps_and_rejects_non_finite() {
        let mut incident = Incident::from_report(
            IncidentId(1),
            NewIncident::new(DEFAULT_INCIDENT_KIND, 1.7, IncidentSource::Webcam),
            Utc::now(),
        );
        assert_eq!(incident.bounded_confidence(), Some(1.0));

        incident.confidence = -0.2;
        assert_eq!(incident.bounded_confidence(), Some(0.0));

        incident.confidence = f64::NAN;
        assert_eq!(incident.bounded_confidence(), None);
    }

    #[test]
    fn report_timestamp_wins_over_recorded_at() {
        let detected = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let recorded = DateTime::from_timestamp(1_700_000_500, 0).unwrap();

        let with_ts = Incident::from_report(
            IncidentId(1),
            NewIncident::new("fight", 0.9, IncidentSource::Upload).at(detected),
            recorded,
        );
        assert_eq!(with_ts.timestamp, detected);

        let without_ts = Incident::from_report(
            IncidentId(2),
            NewIncident::new("fight", 0.9, IncidentSource::Upload),
            recorded,
        );
        assert_eq!(without_ts.timestamp, recorded);
    }

    #[test]
    fn incident_serializes_with_camel_case_provenance() {
        let incident = Incident::from_report(
            IncidentId(42),
            NewIncident::new("fight", 0.5, IncidentSource::Webcam)
                .with_camera_id(Some("cam-1".to_string())),
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["source"], "webcam");
        assert_eq!(json["cameraId"], "cam-1");
        assert!(json.get("sourceUrl").is_none());
    }

    #[test]
    fn active_sources_counts_non_zero_entries() {
        let mut stats = IncidentStats::default();
        assert_eq!(stats.active_sources(), 0);
        stats.by_source.insert(IncidentSource::Webcam, 2);
        stats.by_source.insert(IncidentSource::Youtube, 1);
        assert_eq!(stats.active_sources(), 2);
        assert_eq!(stats.count_for(IncidentSource::Upload), 0);
    }
}
