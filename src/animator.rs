//! Per-LED animation state machines
//!
//! Every LED owns a [`LedAnimator`]. Each frame it receives the airport's current
//! cache snapshot and the elapsed time, and returns one color. Output depends
//! only on accumulated time, the inputs seen so far and the phase offset, so two
//! runs fed the same inputs and seed produce identical frames.
//!
//! Effect priority, highest first: refresh transition, lightning, wind, idle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{RngExt, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::cache::{CacheEntry, WeatherCache};
use crate::config::{AnimationConfig, ColorConfig, RefreshAnimation};
use crate::models::{FlightCategory, Rgb};

/// What an animator is drawing this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    #[default]
    None,
    Wind,
    Lightning,
    Refresh,
}

/// Per-frame input derived from one cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedInput {
    pub category: FlightCategory,
    pub wind_kt: u32,
    pub gust_kt: u32,
    pub lightning: bool,
    /// Cache generation; a change means new data landed
    pub generation: u64,
}

impl LedInput {
    /// Input for an airport without usable data
    #[must_use]
    pub fn no_data(generation: u64) -> Self {
        Self {
            category: FlightCategory::NoData,
            wind_kt: 0,
            gust_kt: 0,
            lightning: false,
            generation,
        }
    }

    /// Build from a cache snapshot. Stale entries carry `NoData` and no effect flags.
    #[must_use]
    pub fn from_entry(entry: &CacheEntry, now: DateTime<Utc>, staleness_window: Duration) -> Self {
        match &entry.observation {
            Some(obs) if !entry.is_stale(now, staleness_window) => Self {
                category: obs.category,
                wind_kt: obs.wind_kt,
                gust_kt: obs.gust_kt,
                lightning: obs.lightning,
                generation: entry.generation,
            },
            _ => Self::no_data(entry.generation),
        }
    }

    fn peak_wind_kt(&self) -> u32 {
        self.wind_kt.max(self.gust_kt)
    }
}

#[derive(Debug, Clone, Copy)]
struct RefreshState {
    started: Duration,
    from: Rgb,
}

/// Animation state for one LED
#[derive(Debug, Clone)]
pub struct LedAnimator {
    airport: String,
    led_index: usize,
    /// Fraction of a cycle, `0.0..1.0`
    phase_offset: f32,
    clock: Duration,
    last_generation: u64,
    shown_category: Option<FlightCategory>,
    last_color: Rgb,
    refresh: Option<RefreshState>,
    active_effect: Effect,
}

impl LedAnimator {
    #[must_use]
    pub fn new(airport: impl Into<String>, led_index: usize, phase_offset: f32) -> Self {
        Self {
            airport: airport.into(),
            led_index,
            phase_offset,
            clock: Duration::ZERO,
            last_generation: 0,
            shown_category: None,
            last_color: Rgb::BLACK,
            refresh: None,
            active_effect: Effect::None,
        }
    }

    #[must_use]
    pub fn airport(&self) -> &str {
        &self.airport
    }

    #[must_use]
    pub fn led_index(&self) -> usize {
        self.led_index
    }

    #[must_use]
    pub fn phase_offset(&self) -> f32 {
        self.phase_offset
    }

    #[must_use]
    pub fn active_effect(&self) -> Effect {
        self.active_effect
    }

    /// Category whose color was last drawn
    #[must_use]
    pub fn shown_category(&self) -> Option<FlightCategory> {
        self.shown_category
    }

    /// Advance by `delta` and return this frame's color
    pub fn tick(
        &mut self,
        input: &LedInput,
        delta: Duration,
        animation: &AnimationConfig,
        colors: &ColorConfig,
    ) -> Rgb {
        self.clock += delta;

        if input.generation != self.last_generation {
            self.last_generation = input.generation;
            let changed = self.shown_category != Some(input.category);
            if input.category != FlightCategory::NoData && (changed || !animation.refresh_only_on_change) {
                debug!(
                    "LED {} ({}): new data, {} -> {}",
                    self.led_index,
                    self.airport,
                    self.shown_category.map_or("none", FlightCategory::as_str),
                    input.category
                );
                self.refresh = Some(RefreshState {
                    started: self.clock,
                    from: self.last_color,
                });
            }
        }

        let (color, effect) = if input.category == FlightCategory::NoData {
            self.refresh = None;
            (colors.nodata, Effect::None)
        } else {
            let base = colors.for_category(input.category);
            match self.refresh {
                Some(refresh) => self.refresh_color(refresh, input, base, animation, colors),
                None => self.effect_color(input, base, animation, colors),
            }
        };

        self.shown_category = Some(input.category);
        self.last_color = color;
        self.active_effect = effect;
        color
    }

    fn refresh_color(
        &mut self,
        refresh: RefreshState,
        input: &LedInput,
        base: Rgb,
        animation: &AnimationConfig,
        colors: &ColorConfig,
    ) -> (Rgb, Effect) {
        let target = if animation.refresh_disable_effects {
            base
        } else {
            self.effect_color(input, base, animation, colors).0
        };
        let elapsed = self.clock.saturating_sub(refresh.started).as_secs_f32();

        match animation.refresh_animation {
            RefreshAnimation::Fade => {
                let progress = elapsed / animation.refresh_fade_s;
                if progress >= 1.0 {
                    self.refresh = None;
                    return self.effect_color(input, base, animation, colors);
                }
                (refresh.from.blend(target, progress), Effect::Refresh)
            }
            RefreshAnimation::Blink => {
                let half = animation.refresh_blink_s;
                let total = half * 2.0 * animation.refresh_blinks as f32;
                if elapsed >= total {
                    self.refresh = None;
                    return self.effect_color(input, base, animation, colors);
                }
                let in_cycle = elapsed % (half * 2.0);
                let color = if in_cycle < half { Rgb::BLACK } else { target };
                (color, Effect::Refresh)
            }
        }
    }

    /// Lightning, wind or idle color for this instant
    fn effect_color(
        &self,
        input: &LedInput,
        base: Rgb,
        animation: &AnimationConfig,
        colors: &ColorConfig,
    ) -> (Rgb, Effect) {
        if animation.lightning && input.lightning {
            return (self.lightning_color(base, animation, colors), Effect::Lightning);
        }

        let peak = input.peak_wind_kt();
        if animation.very_high_wind_limit().is_some_and(|limit| peak >= limit) {
            return (colors.highwind, Effect::Wind);
        }

        let windy = peak >= animation.wind_threshold_kt
            || (animation.always_animate_for_gusts && input.gust_kt > 0);
        if animation.wind && windy {
            return (self.wind_color(base, animation), Effect::Wind);
        }

        (base, Effect::None)
    }

    fn lightning_color(&self, base: Rgb, animation: &AnimationConfig, colors: &ColorConfig) -> Rgb {
        let t = self.cycle_position(animation.lightning_period_s);
        let flash = animation.lightning_flash_ms as f32 / 1000.0;
        if t < flash {
            return colors.lightning;
        }
        let intensity = 1.0 - (t - flash) * animation.lightning_fade_intensity;
        base.blend(colors.lightning, intensity)
    }

    fn wind_color(&self, base: Rgb, animation: &AnimationConfig) -> Rgb {
        let period = animation.blink_speed_s * 2.0;
        let t = self.cycle_position(period);
        let dim = base.scale(animation.wind_dim_factor);
        if animation.fade_instead_of_blink {
            let weight = 1.0 - (1.0 - 2.0 * t / period).abs();
            base.blend(dim, weight)
        } else if t < animation.blink_speed_s {
            base
        } else {
            dim
        }
    }

    /// Seconds into a `period`-long cycle, shifted by the phase offset.
    ///
    /// The clock is reduced in f64 before narrowing; an f32 clock loses
    /// sub-second resolution after a few days of uptime.
    fn cycle_position(&self, period: f32) -> f32 {
        if period <= 0.0 {
            return 0.0;
        }
        let period = f64::from(period);
        let shifted = self.clock.as_secs_f64() + f64::from(self.phase_offset) * period;
        shifted.rem_euclid(period) as f32
    }
}

/// All animators, indexed by LED position
#[derive(Debug, Clone)]
pub struct AnimatorBank {
    animators: Vec<LedAnimator>,
    seed: u64,
}

impl AnimatorBank {
    /// One animator per airport, in strip order
    #[must_use]
    pub fn new(airports: &[String], animation: &AnimationConfig) -> Self {
        let seed = animation.phase_seed.unwrap_or_else(|| rand::rng().random::<u64>());
        let mut rng = StdRng::seed_from_u64(seed);

        let mut offsets: Vec<f32> = Vec::with_capacity(airports.len());
        for _ in airports {
            let offset = if animation.randomize_phases {
                loop {
                    let candidate: f32 = rng.random_range(0.0..1.0);
                    if !offsets.contains(&candidate) {
                        break candidate;
                    }
                }
            } else {
                0.0
            };
            offsets.push(offset);
        }

        let animators = airports
            .iter()
            .zip(offsets)
            .enumerate()
            .map(|(index, (airport, offset))| LedAnimator::new(airport.clone(), index, offset))
            .collect::<Vec<_>>();

        if animation.phase_seed.is_some() {
            debug!("Animator phase seed {}", seed);
        } else {
            info!("Animator phase seed {} (set animation.phase_seed to reproduce)", seed);
        }

        Self { animators, seed }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.animators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.animators.is_empty()
    }

    #[must_use]
    pub fn get(&self, led_index: usize) -> Option<&LedAnimator> {
        self.animators.get(led_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedAnimator> {
        self.animators.iter()
    }

    /// Advance every animator from the cache and return colors in strip order
    pub fn tick(
        &mut self,
        cache: &WeatherCache,
        now: DateTime<Utc>,
        delta: Duration,
        animation: &AnimationConfig,
        colors: &ColorConfig,
    ) -> Vec<Rgb> {
        let window = cache.staleness_window();
        self.animators
            .iter_mut()
            .map(|animator| {
                let input = cache
                    .get(animator.airport())
                    .map_or(LedInput::no_data(0), |entry| LedInput::from_entry(&entry, now, window));
                animator.tick(&input, delta, animation, colors)
            })
            .collect()
    }
}
