//! Configuration management for the METAR map
//!
//! Handles loading configuration from files and environment variables,
//! and validates every setting once at startup. The resulting structure is
//! immutable and shared by reference with every component.

use crate::MetarMapError;
use crate::models::{ColorOrder, FlightCategory, Rgb};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for the METAR map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetarMapConfig {
    /// Station per LED, in strip order
    #[serde(default = "default_airports")]
    pub airports: Vec<String>,
    /// LED hardware settings
    #[serde(default)]
    pub led: LedConfig,
    /// Animation toggles and rates
    #[serde(default)]
    pub animation: AnimationConfig,
    /// Palette
    #[serde(default)]
    pub colors: ColorConfig,
    /// Weather API fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where rendered frames go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Frame summaries through `tracing`
    Log,
    /// ANSI true-color preview on stdout
    Terminal,
    /// Raw wire bytes written to `device_path`
    Device,
}

/// LED hardware settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    /// Number of LEDs on the strip
    #[serde(default = "default_led_count")]
    pub count: usize,
    /// GPIO pin the strip is wired to (informational for the driver)
    #[serde(default = "default_led_pin")]
    pub pin: u8,
    /// Channel order of the strip
    #[serde(default)]
    pub color_order: ColorOrder,
    /// Global brightness (0.0-1.0)
    #[serde(default = "default_led_brightness")]
    pub brightness: f32,
    /// Frame interval in milliseconds; derived from the animation style when unset
    #[serde(default)]
    pub frame_interval_ms: Option<u64>,
    /// Frame destination
    #[serde(default = "default_output")]
    pub output: OutputKind,
    /// Device node or FIFO for `output = "device"`
    #[serde(default)]
    pub device_path: Option<PathBuf>,
    /// Consecutive sink failures tolerated before the loop gives up
    #[serde(default = "default_max_sink_failures")]
    pub max_sink_failures: u32,
    /// Blank the strip when shutting down
    #[serde(default = "default_true")]
    pub clear_on_exit: bool,
}

/// How the refresh transition is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshAnimation {
    Fade,
    Blink,
}

/// Animation toggles and rates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Animate windy airports
    #[serde(default = "default_true")]
    pub wind: bool,
    /// Animate airports reporting lightning
    #[serde(default = "default_true")]
    pub lightning: bool,
    /// Cross-fade instead of on/off blinking
    #[serde(default = "default_true")]
    pub fade_instead_of_blink: bool,
    /// Seconds between wind animation toggles
    #[serde(default = "default_blink_speed")]
    pub blink_speed_s: f32,
    /// Wind (or gust) at or above this animates
    #[serde(default = "default_wind_threshold")]
    pub wind_threshold_kt: u32,
    /// Any reported gust animates regardless of speed
    #[serde(default)]
    pub always_animate_for_gusts: bool,
    /// Show the solid high-wind color at `very_high_wind_kt`
    #[serde(default = "default_true")]
    pub very_high_wind: bool,
    /// Wind (or gust) at or above this shows solid high-wind color
    #[serde(default = "default_very_high_wind")]
    pub very_high_wind_kt: u32,
    /// Brightness of the "off" half of the wind animation (0.0 = off)
    #[serde(default)]
    pub wind_dim_factor: f32,
    /// Duration of a lightning flash
    #[serde(default = "default_lightning_flash_ms")]
    pub lightning_flash_ms: u64,
    /// Fraction of the flash intensity removed per second after the flash
    #[serde(default = "default_lightning_fade_intensity")]
    pub lightning_fade_intensity: f32,
    /// Seconds between lightning flashes
    #[serde(default = "default_lightning_period")]
    pub lightning_period_s: f32,
    /// Desynchronize neighbouring LEDs
    #[serde(default = "default_true")]
    pub randomize_phases: bool,
    /// Seed for phase offsets; random when unset
    #[serde(default)]
    pub phase_seed: Option<u64>,
    /// Refresh transition style
    #[serde(default = "default_refresh_animation")]
    pub refresh_animation: RefreshAnimation,
    /// Length of the refresh fade
    #[serde(default = "default_refresh_fade")]
    pub refresh_fade_s: f32,
    /// Number of off/on cycles for the blink transition
    #[serde(default = "default_refresh_blinks")]
    pub refresh_blinks: u32,
    /// Length of each half of a refresh blink cycle
    #[serde(default = "default_refresh_blink")]
    pub refresh_blink_s: f32,
    /// Suppress wind and lightning while the refresh transition runs
    #[serde(default = "default_true")]
    pub refresh_disable_effects: bool,
    /// Only play the refresh transition when the category changes
    #[serde(default = "default_true")]
    pub refresh_only_on_change: bool,
}

/// Palette, each entry `[r, g, b]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_color_vfr")]
    pub vfr: Rgb,
    #[serde(default = "default_color_mvfr")]
    pub mvfr: Rgb,
    #[serde(default = "default_color_ifr")]
    pub ifr: Rgb,
    #[serde(default = "default_color_lifr")]
    pub lifr: Rgb,
    #[serde(default = "default_color_nodata")]
    pub nodata: Rgb,
    #[serde(default = "default_color_clear")]
    pub clear: Rgb,
    #[serde(default = "default_color_lightning")]
    pub lightning: Rgb,
    #[serde(default = "default_color_highwind")]
    pub highwind: Rgb,
}

/// Weather API fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Normal fetch interval in seconds
    #[serde(default = "default_fetch_every")]
    pub every_s: u64,
    /// Retry interval after a failed fetch
    #[serde(default = "default_error_retry")]
    pub error_retry_s: u64,
    /// How far back the API should look for reports
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    /// Base URL of the aviation weather API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_s: u64,
    /// Retries for transient failures within one fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Station ids per request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Staleness window override in seconds; `lookback_hours` when unset
    #[serde(default)]
    pub stale_after_s: Option<u64>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_airports() -> Vec<String> {
    [
        "KRBG", "K77S", "KEUG", "KCVO", "KSLE", "KMMV", "KUAO", "KHIO", "KTTD", "KPDX", "KVUO",
        "KSPB", "KKLS", "K4S2", "KDLS", "KS33", "KS39", "KRDM", "KBDN", "KS21",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_led_count() -> usize {
    20
}

fn default_led_pin() -> u8 {
    18
}

fn default_led_brightness() -> f32 {
    0.6
}

fn default_output() -> OutputKind {
    OutputKind::Log
}

fn default_max_sink_failures() -> u32 {
    50
}

fn default_blink_speed() -> f32 {
    1.0
}

fn default_wind_threshold() -> u32 {
    25
}

fn default_very_high_wind() -> u32 {
    35
}

fn default_lightning_flash_ms() -> u64 {
    100
}

fn default_lightning_fade_intensity() -> f32 {
    2.5
}

fn default_lightning_period() -> f32 {
    2.0
}

fn default_refresh_animation() -> RefreshAnimation {
    RefreshAnimation::Fade
}

fn default_refresh_fade() -> f32 {
    3.0
}

fn default_refresh_blinks() -> u32 {
    2
}

fn default_refresh_blink() -> f32 {
    0.25
}

fn default_color_vfr() -> Rgb {
    Rgb(0, 255, 0)
}

fn default_color_mvfr() -> Rgb {
    Rgb(0, 0, 255)
}

fn default_color_ifr() -> Rgb {
    Rgb(255, 0, 0)
}

fn default_color_lifr() -> Rgb {
    Rgb(255, 0, 255)
}

fn default_color_nodata() -> Rgb {
    Rgb(5, 5, 5)
}

fn default_color_clear() -> Rgb {
    Rgb(0, 0, 0)
}

fn default_color_lightning() -> Rgb {
    Rgb(255, 255, 255)
}

fn default_color_highwind() -> Rgb {
    Rgb(255, 255, 0)
}

fn default_fetch_every() -> u64 {
    600
}

fn default_error_retry() -> u64 {
    60
}

fn default_lookback_hours() -> u32 {
    5
}

fn default_api_base() -> String {
    "https://aviationweather.gov".to_string()
}

fn default_user_agent() -> String {
    format!("METARMap/{} (+contact@example.com)", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_chunk_size() -> usize {
    150
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            count: default_led_count(),
            pin: default_led_pin(),
            color_order: ColorOrder::default(),
            brightness: default_led_brightness(),
            frame_interval_ms: None,
            output: default_output(),
            device_path: None,
            max_sink_failures: default_max_sink_failures(),
            clear_on_exit: true,
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            wind: true,
            lightning: true,
            fade_instead_of_blink: true,
            blink_speed_s: default_blink_speed(),
            wind_threshold_kt: default_wind_threshold(),
            always_animate_for_gusts: false,
            very_high_wind: true,
            very_high_wind_kt: default_very_high_wind(),
            wind_dim_factor: 0.0,
            lightning_flash_ms: default_lightning_flash_ms(),
            lightning_fade_intensity: default_lightning_fade_intensity(),
            lightning_period_s: default_lightning_period(),
            randomize_phases: true,
            phase_seed: None,
            refresh_animation: default_refresh_animation(),
            refresh_fade_s: default_refresh_fade(),
            refresh_blinks: default_refresh_blinks(),
            refresh_blink_s: default_refresh_blink(),
            refresh_disable_effects: true,
            refresh_only_on_change: true,
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            vfr: default_color_vfr(),
            mvfr: default_color_mvfr(),
            ifr: default_color_ifr(),
            lifr: default_color_lifr(),
            nodata: default_color_nodata(),
            clear: default_color_clear(),
            lightning: default_color_lightning(),
            highwind: default_color_highwind(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            every_s: default_fetch_every(),
            error_retry_s: default_error_retry(),
            lookback_hours: default_lookback_hours(),
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            timeout_s: default_timeout(),
            max_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            stale_after_s: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetarMapConfig {
    fn default() -> Self {
        Self {
            airports: default_airports(),
            led: LedConfig::default(),
            animation: AnimationConfig::default(),
            colors: ColorConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LedConfig {
    /// Frame interval, defaulting to 10 fps when fading and 20 fps when blinking
    #[must_use]
    pub fn frame_interval(&self, fading: bool) -> Duration {
        match self.frame_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None if fading => Duration::from_millis(100),
            None => Duration::from_millis(50),
        }
    }
}

impl AnimationConfig {
    /// High-wind threshold, `None` when the override is switched off
    #[must_use]
    pub fn very_high_wind_limit(&self) -> Option<u32> {
        self.very_high_wind.then_some(self.very_high_wind_kt)
    }
}

impl ColorConfig {
    /// Base color for a flight category
    #[must_use]
    pub fn for_category(&self, category: FlightCategory) -> Rgb {
        match category {
            FlightCategory::Vfr => self.vfr,
            FlightCategory::Mvfr => self.mvfr,
            FlightCategory::Ifr => self.ifr,
            FlightCategory::Lifr => self.lifr,
            FlightCategory::NoData => self.nodata,
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.every_s)
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.error_retry_s)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }

    /// Hard bound for one whole fetch, retries included
    #[must_use]
    pub fn fetch_deadline(&self) -> Duration {
        self.request_timeout() * (self.max_retries + 1)
    }

    /// Time without a successful fetch after which an airport shows NODATA
    #[must_use]
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(
            self.stale_after_s
                .unwrap_or(u64::from(self.lookback_hours) * 3600),
        )
    }
}

impl MetarMapConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path()
                .filter(|path| path.exists())
                .unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. METARMAP__FETCH__EVERY_S=300
        builder = builder.add_source(
            Environment::with_prefix("METARMAP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("airports")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: MetarMapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("metarmap").join("config.toml"))
    }

    /// Trim and upper-case station ids
    pub fn normalize(&mut self) {
        for airport in &mut self.airports {
            *airport = airport.trim().to_ascii_uppercase();
        }
        if self.fetch.api_base.ends_with('/') {
            self.fetch.api_base = self.fetch.api_base.trim_end_matches('/').to_string();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_airports()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// The AIRPORTS list must map 1:1 onto the strip
    pub fn validate_airports(&self) -> Result<()> {
        if self.airports.is_empty() {
            return Err(MetarMapError::config("At least one airport must be configured").into());
        }

        if let Some(bad) = self
            .airports
            .iter()
            .find(|a| a.is_empty() || !a.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(MetarMapError::config(format!("Invalid airport identifier '{bad}'")).into());
        }

        if self.airports.len() != self.led.count {
            return Err(MetarMapError::config(format!(
                "AIRPORTS has {} entries but LED count is {}",
                self.airports.len(),
                self.led.count
            ))
            .into());
        }

        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        let led = &self.led;
        let anim = &self.animation;
        let fetch = &self.fetch;

        if !(0.0..=1.0).contains(&led.brightness) {
            return Err(MetarMapError::config("LED brightness must be between 0.0 and 1.0").into());
        }

        if let Some(ms) = led.frame_interval_ms {
            if ms == 0 || ms > 1000 {
                return Err(
                    MetarMapError::config("Frame interval must be between 1 and 1000 ms").into(),
                );
            }
        }

        let positive = [
            ("blink_speed_s", anim.blink_speed_s),
            ("lightning_fade_intensity", anim.lightning_fade_intensity),
            ("lightning_period_s", anim.lightning_period_s),
            ("refresh_fade_s", anim.refresh_fade_s),
            ("refresh_blink_s", anim.refresh_blink_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MetarMapError::config(format!("{name} must be greater than 0")).into());
            }
        }

        if !(0.0..=1.0).contains(&anim.wind_dim_factor) {
            return Err(MetarMapError::config("wind_dim_factor must be between 0.0 and 1.0").into());
        }

        if anim.lightning_flash_ms as f32 >= anim.lightning_period_s * 1000.0 {
            return Err(MetarMapError::config(
                "lightning_flash_ms must be shorter than lightning_period_s",
            )
            .into());
        }

        if anim.refresh_blinks == 0 {
            return Err(MetarMapError::config("refresh_blinks must be at least 1").into());
        }

        if fetch.every_s == 0 || fetch.error_retry_s == 0 {
            return Err(MetarMapError::config("Fetch intervals must be greater than 0").into());
        }

        if fetch.error_retry_s > fetch.every_s {
            return Err(MetarMapError::config(
                "error_retry_s cannot be longer than the normal fetch interval",
            )
            .into());
        }

        if fetch.timeout_s == 0 || fetch.timeout_s > 300 {
            return Err(
                MetarMapError::config("Network timeout must be between 1 and 300 seconds").into(),
            );
        }

        if fetch.max_retries > 10 {
            return Err(MetarMapError::config("Fetch max retries cannot exceed 10").into());
        }

        if fetch.lookback_hours == 0 || fetch.lookback_hours > 48 {
            return Err(
                MetarMapError::config("lookback_hours must be between 1 and 48").into(),
            );
        }

        if fetch.chunk_size == 0 {
            return Err(MetarMapError::config("chunk_size must be at least 1").into());
        }

        if fetch.stale_after_s == Some(0) {
            return Err(MetarMapError::config("stale_after_s must be greater than 0").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(MetarMapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(MetarMapError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.fetch.api_base.starts_with("http://") && !self.fetch.api_base.starts_with("https://")
        {
            return Err(
                MetarMapError::config("Weather API base URL must be a valid HTTP or HTTPS URL")
                    .into(),
            );
        }

        if self.fetch.user_agent.trim().is_empty() {
            return Err(MetarMapError::config("User agent cannot be empty").into());
        }

        if self.led.output == OutputKind::Device && self.led.device_path.is_none() {
            return Err(
                MetarMapError::config("output = \"device\" requires led.device_path").into(),
            );
        }

        Ok(())
    }
}
