//! In-memory weather cache shared between the fetcher (writer) and the animators (readers)
//!
//! Entries are replaced whole under a short write lock and observations are
//! shared as `Arc`s, so a reader only ever sees a complete previous or new entry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{FlightCategory, Observation};

/// What a fetch produced for one airport
#[derive(Debug, Clone)]
pub enum CacheUpdate {
    /// A fresh observation
    Observed(Observation),
    /// The fetch covering this airport failed
    Failed,
}

/// Snapshot of one airport's cached state
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub airport: String,
    /// Latest observation, absent until the first successful fetch
    pub observation: Option<Arc<Observation>>,
    pub last_fetch_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Bumped on every observation write
    pub generation: u64,
}

impl CacheEntry {
    fn empty(airport: &str) -> Self {
        Self {
            airport: airport.to_string(),
            observation: None,
            last_fetch_attempt_at: None,
            last_success_at: None,
            generation: 0,
        }
    }

    /// True when nothing succeeded within `window`, or nothing ever succeeded.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Some(last_success) = self.last_success_at else {
            return true;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(last_success) > window,
            Err(_) => false,
        }
    }

    /// Category to display: the cached one, or `NoData` when stale or missing
    #[must_use]
    pub fn display_category(&self, now: DateTime<Utc>, window: Duration) -> FlightCategory {
        if self.is_stale(now, window) {
            return FlightCategory::NoData;
        }
        self.observation
            .as_ref()
            .map_or(FlightCategory::NoData, |obs| obs.category)
    }
}

/// Latest observation per configured airport
#[derive(Debug, Clone)]
pub struct WeatherCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    staleness_window: Duration,
}

impl WeatherCache {
    /// Create a cache with one empty entry per airport
    #[must_use]
    pub fn new<S: AsRef<str>>(airports: &[S], staleness_window: Duration) -> Self {
        let entries = airports
            .iter()
            .map(|a| (a.as_ref().to_string(), CacheEntry::empty(a.as_ref())))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
            staleness_window,
        }
    }

    #[must_use]
    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Snapshot of one airport's entry
    #[must_use]
    pub fn get(&self, airport: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(airport)
            .cloned()
    }

    /// Record an observation or a failed attempt for `airport` at `at`.
    /// Unknown airports are ignored.
    pub fn update(&self, airport: &str, update: CacheUpdate, at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = entries.get(airport) else {
            debug!("Ignoring update for unconfigured airport {}", airport);
            return;
        };

        let mut next = current.clone();
        next.last_fetch_attempt_at = Some(at);
        if let CacheUpdate::Observed(observation) = update {
            next.observation = Some(Arc::new(observation));
            next.last_success_at = Some(at);
            next.generation += 1;
        }
        entries.insert(airport.to_string(), next);
    }

    /// Mark a failed attempt on every airport without touching observations
    pub fn mark_failed(&self, at: DateTime<Utc>) {
        let airports: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for airport in airports {
            self.update(&airport, CacheUpdate::Failed, at);
        }
    }

    #[must_use]
    pub fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.is_stale(now, self.staleness_window)
    }

    /// True once any airport has received an observation
    #[must_use]
    pub fn has_any_data(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|entry| entry.observation.is_some())
    }
}
