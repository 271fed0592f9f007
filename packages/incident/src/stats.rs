//! Dashboard statistics over an incident slice.
//!
//! Everything here is a pure function of the incidents, the active
//! filter and the reference instant, so callers can pin `now` in tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use fightwatch_incident_models::{Incident, IncidentSource, IncidentStats, SourceFilter};

/// Incident counts for the two consecutive 24-hour windows ending at a
/// reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    /// Incidents with `timestamp > now - 24h`.
    pub last_24h: u64,
    /// Incidents with `now - 48h < timestamp <= now - 24h`.
    pub previous_24h: u64,
}

impl WindowCounts {
    /// Counts the incidents falling into each window.
    #[must_use]
    pub fn at(incidents: &[Incident], now: DateTime<Utc>) -> Self {
        let day_ago = now - Duration::hours(24);
        let two_days_ago = now - Duration::hours(48);

        incidents.iter().fold(Self::default(), |mut acc, incident| {
            if incident.timestamp > day_ago {
                acc.last_24h += 1;
            } else if incident.timestamp > two_days_ago {
                acc.previous_24h += 1;
            }
            acc
        })
    }

    /// Percentage change from the earlier window to the later one.
    #[must_use]
    pub fn trend_percent(self) -> f64 {
        trend_percent(self.last_24h, self.previous_24h)
    }
}

/// `(last - previous) / previous * 100`, defined as 0 when `previous` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trend_percent(last: u64, previous: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    (last as f64 - previous as f64) / previous as f64 * 100.0
}

/// Mean of the usable confidences, 0 when there are none.
///
/// Out-of-range values are clamped into `[0, 1]`; NaN and infinities
/// are left out.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_confidence(incidents: &[Incident]) -> f64 {
    let (sum, count) = incidents
        .iter()
        .filter_map(Incident::bounded_confidence)
        .fold((0.0_f64, 0_u64), |(sum, count), c| (sum + c, count + 1));

    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Incident count per source over all of `incidents`.
#[must_use]
pub fn count_by_source(incidents: &[Incident]) -> BTreeMap<IncidentSource, u64> {
    let mut counts = BTreeMap::new();
    for incident in incidents {
        *counts.entry(incident.source).or_insert(0) += 1;
    }
    counts
}

/// Builds the dashboard summary for `incidents` as seen at `now`.
///
/// Only `total` honours `filter`; the per-source breakdown, the mean
/// confidence and the trend always cover the whole log.
#[must_use]
pub fn statistics_at(
    incidents: &[Incident],
    filter: SourceFilter,
    now: DateTime<Utc>,
) -> IncidentStats {
    let total = incidents
        .iter()
        .filter(|incident| filter.matches(incident.source))
        .count() as u64;

    IncidentStats {
        total,
        by_source: count_by_source(incidents),
        average_confidence: average_confidence(incidents),
        trend_percent: WindowCounts::at(incidents, now).trend_percent(),
    }
}
