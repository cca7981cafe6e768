//! Frame loop
//!
//! Each tick polls the fetcher, advances every animator by the elapsed time and
//! pushes the resulting frame to the sink. The loop runs until the shutdown
//! future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::MetarMapError;
use crate::animator::AnimatorBank;
use crate::cache::WeatherCache;
use crate::config::MetarMapConfig;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::metar::MetarSource;
use crate::models::Frame;
use crate::sink::LedSink;

/// Owns the tick cadence and every component of the map
pub struct FrameOrchestrator<S: LedSink> {
    config: Arc<MetarMapConfig>,
    cache: WeatherCache,
    fetcher: Fetcher,
    animators: AnimatorBank,
    sink: S,
    consecutive_sink_failures: u32,
    frames_rendered: u64,
}

impl<S: LedSink> FrameOrchestrator<S> {
    /// Wire up cache, fetcher and animators; the first fetch is due at `now`
    pub fn new(
        config: Arc<MetarMapConfig>,
        source: Arc<dyn MetarSource>,
        sink: S,
        now: DateTime<Utc>,
    ) -> Self {
        let cache = WeatherCache::new(config.airports.as_slice(), config.fetch.staleness_window());
        let fetcher = Fetcher::new(source, &config, now);
        let animators = AnimatorBank::new(&config.airports, &config.animation);

        Self {
            config,
            cache,
            fetcher,
            animators,
            sink,
            consecutive_sink_failures: 0,
            frames_rendered: 0,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    #[must_use]
    pub fn animators(&self) -> &AnimatorBank {
        &self.animators
    }

    pub fn fetcher_mut(&mut self) -> &mut Fetcher {
        &mut self.fetcher
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.config
            .led
            .frame_interval(self.config.animation.fade_instead_of_blink)
    }

    /// Render one frame at wall time `now`, `delta` after the previous one.
    ///
    /// A failing sink skips the frame; only a run of failures longer than
    /// `led.max_sink_failures` is returned as an error.
    pub fn tick(&mut self, now: DateTime<Utc>, delta: Duration) -> crate::Result<Frame> {
        if let Some(FetchOutcome::Failed { .. }) = self.fetcher.poll(now, &self.cache) {
            debug!(
                "{} consecutive fetch failures",
                self.fetcher.consecutive_failures()
            );
        }

        let pixels = self.animators.tick(
            &self.cache,
            now,
            delta,
            &self.config.animation,
            &self.config.colors,
        );
        let frame = Frame::new(pixels, self.config.led.brightness);

        match self.sink.show(&frame) {
            Ok(()) => {
                if self.consecutive_sink_failures > 0 {
                    info!(
                        "LED sink recovered after {} failed frames",
                        self.consecutive_sink_failures
                    );
                }
                self.consecutive_sink_failures = 0;
                self.frames_rendered += 1;
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                self.consecutive_sink_failures += 1;
                warn!(
                    "Skipping frame ({} in a row): {}",
                    self.consecutive_sink_failures, e
                );
                if self.consecutive_sink_failures > self.config.led.max_sink_failures {
                    return Err(MetarMapError::render(format!(
                        "LED sink failed {} frames in a row: {e}",
                        self.consecutive_sink_failures
                    )));
                }
            }
        }

        Ok(frame)
    }

    /// Push an all-clear frame if `led.clear_on_exit` is set
    pub fn clear(&mut self) -> crate::Result<()> {
        if !self.config.led.clear_on_exit {
            return Ok(());
        }
        let frame = Frame::filled(
            self.animators.len(),
            self.config.colors.clear,
            self.config.led.brightness,
        );
        self.sink.show(&frame)
    }

    /// Run the frame loop until `shutdown` resolves or the sink gives up
    pub async fn run<F>(mut self, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = self.frame_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let started = Instant::now();
        let started_wall = Utc::now();
        let mut last_tick = started;

        info!(
            "Driving {} LEDs every {} ms",
            self.animators.len(),
            period.as_millis()
        );

        let result = loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping frame loop");
                    break Ok(());
                }
                tick_at = interval.tick() => {
                    let delta = tick_at.saturating_duration_since(last_tick);
                    last_tick = tick_at;
                    let now = started_wall
                        + chrono::Duration::from_std(tick_at.saturating_duration_since(started))
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    if let Err(e) = self.tick(now, delta) {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = self.clear() {
            warn!("Failed to clear LEDs on exit: {}", e);
        }
        info!("Frame loop stopped after {} frames", self.frames_rendered);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metar::MetarRecord;
    use crate::models::Rgb;
    use crate::sink::RecordingSink;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EmptySource;

    #[async_trait]
    impl MetarSource for EmptySource {
        async fn fetch(&self, _stations: &[String], _hours: u32) -> anyhow::Result<Vec<MetarRecord>> {
            Ok(Vec::new())
        }
    }

    fn config() -> Arc<MetarMapConfig> {
        let mut config = MetarMapConfig::default();
        config.airports = vec!["KPDX".to_string(), "KEUG".to_string()];
        config.led.count = 2;
        config.led.max_sink_failures = 2;
        config.animation.phase_seed = Some(7);
        Arc::new(config)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_tick_renders_nodata_before_first_fetch() {
        let sink = RecordingSink::new();
        let mut orchestrator =
            FrameOrchestrator::new(config(), Arc::new(EmptySource), sink.clone(), t0());
        let frame = orchestrator.tick(t0(), Duration::from_millis(100)).unwrap();
        assert_eq!(frame.pixels, vec![Rgb(5, 5, 5), Rgb(5, 5, 5)]);
        assert_eq!(frame.brightness, 0.6);
        assert_eq!(sink.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failures_skip_then_fail() {
        let sink = RecordingSink::new();
        let mut orchestrator =
            FrameOrchestrator::new(config(), Arc::new(EmptySource), sink.clone(), t0());
        let delta = Duration::from_millis(100);

        sink.fail_next(2);
        assert!(orchestrator.tick(t0(), delta).is_ok());
        assert!(orchestrator.tick(t0(), delta).is_ok());
        assert!(orchestrator.tick(t0(), delta).is_ok());
        assert_eq!(orchestrator.frames_rendered(), 1);

        sink.fail_next(3);
        orchestrator.tick(t0(), delta).unwrap();
        orchestrator.tick(t0(), delta).unwrap();
        let err = orchestrator.tick(t0(), delta).unwrap_err();
        assert!(matches!(err, MetarMapError::Render { .. }));
    }

    struct UnpluggedSink;

    impl LedSink for UnpluggedSink {
        fn show(&mut self, _frame: &Frame) -> crate::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "strip unplugged").into())
        }
    }

    #[tokio::test]
    async fn test_io_sink_error_is_fatal_at_once() {
        let mut orchestrator =
            FrameOrchestrator::new(config(), Arc::new(EmptySource), UnpluggedSink, t0());
        let err = orchestrator.tick(t0(), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, MetarMapError::Io { .. }));
        assert_eq!(orchestrator.frames_rendered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_and_clears() {
        let sink = RecordingSink::new();
        let orchestrator =
            FrameOrchestrator::new(config(), Arc::new(EmptySource), sink.clone(), Utc::now());

        orchestrator
            .run(tokio::time::sleep(Duration::from_millis(1050)))
            .await
            .unwrap();

        let frames = sink.frames();
        assert!(frames.len() >= 10);
        assert_eq!(frames.last().unwrap().pixels, vec![Rgb::BLACK, Rgb::BLACK]);
    }

    #[test]
    fn test_frame_interval_follows_animation_style() {
        let mut config = MetarMapConfig::default();
        config.animation.fade_instead_of_blink = false;
        let orchestrator = FrameOrchestrator::new(
            Arc::new(config),
            Arc::new(EmptySource),
            RecordingSink::new(),
            t0(),
        );
        assert_eq!(orchestrator.frame_interval(), Duration::from_millis(50));
    }
}
