#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory incident log and dashboard statistics.
//!
//! [`IncidentLog`] is the single-owner append-only log. [`IncidentStore`]
//! wraps it in an `Arc<Mutex<_>>` so sampler tasks can record into it
//! while the operator reads statistics. There is no persistence and no
//! size bound.

pub mod stats;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use fightwatch_incident_models::{
    Incident, IncidentId, IncidentStats, NewIncident, SourceFilter,
};

/// Hands out clock-based incident ids that never repeat within a log.
#[derive(Debug, Default, Clone)]
struct IdClock {
    last: Option<u64>,
}

impl IdClock {
    /// Milliseconds since the epoch at `now`, bumped past the previous id
    /// when the clock has not advanced (or went backwards).
    fn next(&mut self, now: DateTime<Utc>) -> IncidentId {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = match self.last {
            Some(last) if millis <= last => last + 1,
            _ => millis,
        };
        self.last = Some(id);
        IncidentId(id)
    }
}

/// Append-only incident log in insertion order.
#[derive(Debug, Default, Clone)]
pub struct IncidentLog {
    incidents: Vec<Incident>,
    ids: IdClock,
}

impl IncidentLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a report using the current time for the id and for a
    /// missing timestamp.
    pub fn record(&mut self, report: NewIncident) -> &Incident {
        self.record_at(report, Utc::now())
    }

    /// Records a report as if it arrived at `now`.
    pub fn record_at(&mut self, report: NewIncident, now: DateTime<Utc>) -> &Incident {
        let id = self.ids.next(now);
        let incident = Incident::from_report(id, report, now);
        log::debug!(
            "Recorded incident {id}: {} from {} (confidence {:.3})",
            incident.kind,
            incident.source,
            incident.confidence
        );
        self.incidents.push(incident);
        &self.incidents[self.incidents.len() - 1]
    }

    /// Removes every incident, returning how many were dropped.
    ///
    /// The id clock is kept so ids are not reused after a clear.
    pub fn clear(&mut self) -> usize {
        let removed = std::mem::take(&mut self.incidents).len();
        log::info!("Cleared {removed} incident(s)");
        removed
    }

    /// All incidents in insertion order.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Incidents passing `filter`, in insertion order.
    pub fn filtered(&self, filter: SourceFilter) -> impl Iterator<Item = &Incident> {
        self.incidents
            .iter()
            .filter(move |incident| filter.matches(incident.source))
    }

    /// Number of recorded incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Dashboard summary as of now.
    #[must_use]
    pub fn statistics(&self, filter: SourceFilter) -> IncidentStats {
        self.statistics_at(filter, Utc::now())
    }

    /// Dashboard summary as of `now`.
    #[must_use]
    pub fn statistics_at(&self, filter: SourceFilter, now: DateTime<Utc>) -> IncidentStats {
        stats::statistics_at(&self.incidents, filter, now)
    }
}

/// Cloneable, thread-safe handle to a shared [`IncidentLog`].
///
/// Every operation takes the lock once, so readers never observe a
/// half-applied `clear` and statistics always match the log at the
/// moment of the call.
#[derive(Debug, Clone, Default)]
pub struct IncidentStore {
    inner: Arc<Mutex<IncidentLog>>,
}

impl IncidentStore {
    /// Creates a store around an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IncidentLog> {
        // The log holds no invariant a panicking writer could break halfway.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a report and returns a copy of the stored incident.
    pub fn record(&self, report: NewIncident) -> Incident {
        self.lock().record(report).clone()
    }

    /// Empties the log, returning how many incidents were dropped.
    pub fn clear(&self) -> usize {
        self.lock().clear()
    }

    /// Copy of every incident in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Incident> {
        self.lock().incidents().to_vec()
    }

    /// Copy of the incidents passing `filter`.
    #[must_use]
    pub fn filtered(&self, filter: SourceFilter) -> Vec<Incident> {
        self.lock().filtered(filter).cloned().collect()
    }

    /// Number of recorded incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Dashboard summary as of now.
    #[must_use]
    pub fn statistics(&self, filter: SourceFilter) -> IncidentStats {
        self.lock().statistics(filter)
    }

    /// Filtered list and summary taken under the same lock.
    #[must_use]
    pub fn dashboard(&self, filter: SourceFilter) -> (Vec<Incident>, IncidentStats) {
        let log = self.lock();
        (log.filtered(filter).cloned().collect(), log.statistics(filter))
    }
}
