//! Fetch cadence and outcome handling
//!
//! The fetcher is polled once per frame. When a fetch is due it spawns the
//! network call on the runtime and returns immediately; later polls pick the
//! result up, write it to the cache and schedule the next attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::MetarMapError;
use crate::cache::{CacheUpdate, WeatherCache};
use crate::config::MetarMapConfig;
use crate::metar::{self, MetarRecord, MetarSource};
use crate::models::Observation;

type FetchResult = anyhow::Result<Vec<MetarRecord>>;

/// Result of one completed fetch cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every configured airport was present in the response
    Success { updated: usize },
    /// Some airports were missing; their entries were left untouched
    Partial { updated: usize, missing: Vec<String> },
    /// Nothing usable came back; the cache was left untouched
    Failed { error: String },
}

/// Coarse fetcher state, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Fetching,
}

enum FetchState {
    Idle { next_due: DateTime<Utc> },
    Fetching { task: JoinHandle<FetchResult> },
    Finished { result: FetchResult },
}

/// Drives periodic fetches from a [`MetarSource`] into the [`WeatherCache`]
pub struct Fetcher {
    source: Arc<dyn MetarSource>,
    airports: Vec<String>,
    lookback_hours: u32,
    interval: Duration,
    retry_interval: Duration,
    deadline: Duration,
    state: FetchState,
    consecutive_failures: u32,
}

impl Fetcher {
    /// Create a fetcher whose first fetch is due at `now`
    #[must_use]
    pub fn new(source: Arc<dyn MetarSource>, config: &MetarMapConfig, now: DateTime<Utc>) -> Self {
        Self {
            source,
            airports: config.airports.clone(),
            lookback_hours: config.fetch.lookback_hours,
            interval: config.fetch.interval(),
            retry_interval: config.fetch.retry_interval(),
            deadline: config.fetch.fetch_deadline(),
            state: FetchState::Idle { next_due: now },
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> FetchPhase {
        match self.state {
            FetchState::Idle { .. } => FetchPhase::Idle,
            FetchState::Fetching { .. } | FetchState::Finished { .. } => FetchPhase::Fetching,
        }
    }

    /// When the next fetch starts; `None` while one is in flight
    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        match self.state {
            FetchState::Idle { next_due } => Some(next_due),
            _ => None,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Advance the state machine. Never blocks.
    ///
    /// Returns the outcome when a fetch completed during this poll.
    pub fn poll(&mut self, now: DateTime<Utc>, cache: &WeatherCache) -> Option<FetchOutcome> {
        match &mut self.state {
            FetchState::Idle { next_due } => {
                if now >= *next_due {
                    self.start();
                }
                None
            }
            FetchState::Fetching { task } => {
                if !task.is_finished() {
                    return None;
                }
                let result = task.now_or_never().map(flatten_join)?;
                Some(self.finish(result, now, cache))
            }
            FetchState::Finished { .. } => {
                let FetchState::Finished { result } = std::mem::replace(
                    &mut self.state,
                    FetchState::Idle {
                        next_due: DateTime::<Utc>::MIN_UTC,
                    },
                ) else {
                    unreachable!("state checked above");
                };
                Some(self.finish(result, now, cache))
            }
        }
    }

    /// Wait for the in-flight fetch, if any, without applying it.
    /// The next [`poll`](Self::poll) applies the result.
    pub async fn wait_for_fetch(&mut self) {
        if let FetchState::Fetching { .. } = self.state {
            let FetchState::Fetching { task } = std::mem::replace(
                &mut self.state,
                FetchState::Idle {
                    next_due: DateTime::<Utc>::MIN_UTC,
                },
            ) else {
                unreachable!("state checked above");
            };
            let result = flatten_join(task.await);
            self.state = FetchState::Finished { result };
        }
    }

    fn start(&mut self) {
        let source = Arc::clone(&self.source);
        let stations = self.airports.clone();
        let lookback_hours = self.lookback_hours;
        let deadline = self.deadline;

        debug!("Starting METAR fetch for {} stations", stations.len());
        let task = tokio::spawn(async move {
            match tokio::time::timeout(deadline, source.fetch(&stations, lookback_hours)).await {
                Ok(result) => result,
                Err(_) => Err(MetarMapError::fetch(format!(
                    "timed out after {:.1}s",
                    deadline.as_secs_f64()
                ))
                .into()),
            }
        });
        self.state = FetchState::Fetching { task };
    }

    fn finish(&mut self, result: FetchResult, now: DateTime<Utc>, cache: &WeatherCache) -> FetchOutcome {
        match result {
            Ok(records) => {
                let latest = metar::latest_by_station(&records, now);
                let outcome = self.apply(&latest, now, cache);
                self.consecutive_failures = 0;
                self.state = FetchState::Idle {
                    next_due: after(now, self.interval),
                };
                outcome
            }
            Err(error) => {
                self.consecutive_failures += 1;
                cache.mark_failed(now);
                let retry_at = after(now, self.retry_interval);
                warn!(
                    "METAR fetch failed (attempt {}), keeping previous data, retrying at {}: {:#}",
                    self.consecutive_failures,
                    retry_at.format("%H:%M:%S"),
                    error
                );
                self.state = FetchState::Idle { next_due: retry_at };
                FetchOutcome::Failed {
                    error: format!("{error:#}"),
                }
            }
        }
    }

    fn apply(
        &self,
        latest: &HashMap<String, Observation>,
        now: DateTime<Utc>,
        cache: &WeatherCache,
    ) -> FetchOutcome {
        let mut updated = 0;
        let mut missing = Vec::new();
        for airport in &self.airports {
            match latest.get(airport) {
                Some(observation) => {
                    debug!(
                        "{}: {} wind {} lightning {}",
                        airport,
                        observation.category,
                        observation.format_wind(),
                        observation.lightning
                    );
                    cache.update(airport, CacheUpdate::Observed(observation.clone()), now);
                    updated += 1;
                }
                None => missing.push(airport.clone()),
            }
        }

        info!("Updated METARs ({} stations)", updated);
        if missing.is_empty() {
            FetchOutcome::Success { updated }
        } else {
            warn!("No recent METAR for: {}", missing.join(", "));
            FetchOutcome::Partial { updated, missing }
        }
    }
}

fn flatten_join(joined: Result<FetchResult, tokio::task::JoinError>) -> FetchResult {
    joined.unwrap_or_else(|e| Err(anyhow!("fetch task failed: {e}")))
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::models::FlightCategory;

    /// Replays scripted responses, one per fetch
    struct ScriptedSource {
        responses: Mutex<Vec<FetchResult>>,
    }

    #[async_trait]
    impl MetarSource for ScriptedSource {
        async fn fetch(&self, _stations: &[String], _lookback_hours: u32) -> FetchResult {
            let next = self.responses.lock().unwrap().pop();
            next.unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    struct HangingSource;

    #[async_trait]
    impl MetarSource for HangingSource {
        async fn fetch(&self, _stations: &[String], _lookback_hours: u32) -> FetchResult {
            std::future::pending().await
        }
    }

    fn config() -> MetarMapConfig {
        let mut config = MetarMapConfig::default();
        config.airports = vec!["KPDX".to_string(), "KEUG".to_string()];
        config.led.count = 2;
        config
    }

    fn record(station: &str, category: &str) -> MetarRecord {
        serde_json::from_value(json!({"icaoId": station, "fltCat": category})).unwrap()
    }

    fn scripted(mut responses: Vec<FetchResult>) -> Arc<dyn MetarSource> {
        responses.reverse();
        Arc::new(ScriptedSource {
            responses: Mutex::new(responses),
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_success_schedules_normal_interval() {
        let config = config();
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let source = scripted(vec![Ok(vec![record("KPDX", "VFR"), record("KEUG", "IFR")])]);
        let mut fetcher = Fetcher::new(source, &config, t0());

        assert_eq!(fetcher.poll(t0(), &cache), None);
        assert_eq!(fetcher.phase(), FetchPhase::Fetching);

        fetcher.wait_for_fetch().await;
        let outcome = fetcher.poll(t0(), &cache);
        assert_eq!(outcome, Some(FetchOutcome::Success { updated: 2 }));
        assert_eq!(fetcher.next_due(), Some(t0() + chrono::Duration::seconds(600)));
        assert_eq!(
            cache.get("KEUG").unwrap().observation.unwrap().category,
            FlightCategory::Ifr
        );
    }

    #[tokio::test]
    async fn test_not_due_does_not_fetch() {
        let config = config();
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let later = t0() + chrono::Duration::seconds(30);
        let mut fetcher = Fetcher::new(scripted(vec![]), &config, later);
        assert_eq!(fetcher.poll(t0(), &cache), None);
        assert_eq!(fetcher.phase(), FetchPhase::Idle);
    }

    #[tokio::test]
    async fn test_partial_response_leaves_missing_untouched() {
        let config = config();
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let source = scripted(vec![
            Ok(vec![record("KPDX", "VFR"), record("KEUG", "MVFR")]),
            Ok(vec![record("KPDX", "LIFR"), record("KSEA", "VFR")]),
        ]);
        let mut fetcher = Fetcher::new(source, &config, t0());

        fetcher.poll(t0(), &cache);
        fetcher.wait_for_fetch().await;
        fetcher.poll(t0(), &cache);

        let second = t0() + chrono::Duration::seconds(600);
        fetcher.poll(second, &cache);
        fetcher.wait_for_fetch().await;
        let outcome = fetcher.poll(second, &cache);

        assert_eq!(
            outcome,
            Some(FetchOutcome::Partial {
                updated: 1,
                missing: vec!["KEUG".to_string()],
            })
        );
        let keug = cache.get("KEUG").unwrap();
        assert_eq!(keug.observation.unwrap().category, FlightCategory::Mvfr);
        assert_eq!(keug.last_success_at, Some(t0()));
        assert_eq!(
            cache.get("KPDX").unwrap().observation.unwrap().category,
            FlightCategory::Lifr
        );
    }

    #[tokio::test]
    async fn test_failure_schedules_retry_and_keeps_cache() {
        let config = config();
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let source = scripted(vec![
            Ok(vec![record("KPDX", "VFR"), record("KEUG", "VFR")]),
            Err(anyhow!("connection reset")),
        ]);
        let mut fetcher = Fetcher::new(source, &config, t0());

        fetcher.poll(t0(), &cache);
        fetcher.wait_for_fetch().await;
        fetcher.poll(t0(), &cache);

        let second = t0() + chrono::Duration::seconds(600);
        fetcher.poll(second, &cache);
        fetcher.wait_for_fetch().await;
        let outcome = fetcher.poll(second, &cache);

        assert!(matches!(outcome, Some(FetchOutcome::Failed { ref error }) if error.contains("connection reset")));
        assert_eq!(fetcher.consecutive_failures(), 1);
        assert_eq!(fetcher.next_due(), Some(second + chrono::Duration::seconds(60)));
        let entry = cache.get("KPDX").unwrap();
        assert_eq!(entry.observation.unwrap().category, FlightCategory::Vfr);
        assert_eq!(entry.last_fetch_attempt_at, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_fetch_times_out() {
        let mut config = config();
        config.fetch.timeout_s = 1;
        config.fetch.max_retries = 0;
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let mut fetcher = Fetcher::new(Arc::new(HangingSource), &config, t0());

        fetcher.poll(t0(), &cache);
        assert_eq!(fetcher.poll(t0(), &cache), None);

        fetcher.wait_for_fetch().await;
        let outcome = fetcher.poll(t0(), &cache);
        assert!(matches!(outcome, Some(FetchOutcome::Failed { ref error }) if error.contains("timed out")));
    }
}
