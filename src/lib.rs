//! `metarmap` - drives an LED strip from live METAR flight categories
//!
//! One LED per airport shows VFR/MVFR/IFR/LIFR, animated for wind and
//! lightning, with a transition whenever new weather lands.

pub mod animator;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metar;
pub mod models;
pub mod orchestrator;
pub mod sink;
pub mod telemetry;

// Re-export core types for public API
pub use animator::{AnimatorBank, Effect, LedAnimator, LedInput};
pub use cache::{CacheEntry, CacheUpdate, WeatherCache};
pub use config::MetarMapConfig;
pub use error::MetarMapError;
pub use fetcher::{FetchOutcome, Fetcher};
pub use metar::{AviationWeatherClient, MetarRecord, MetarSource};
pub use models::{FlightCategory, Frame, Observation, Rgb};
pub use orchestrator::FrameOrchestrator;
pub use sink::LedSink;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, MetarMapError>;
