//! Data models for the METAR map
//!
//! This module contains the core domain models organized by concern:
//! - Color: 8-bit RGB triples, blending and strip channel order
//! - Observation: flight category and the wind/lightning flags per airport
//! - Frame: one rendered frame handed to the LED sink

pub mod color;
pub mod frame;
pub mod observation;

// Re-export all public types for convenient access
pub use color::{ColorOrder, Rgb};
pub use frame::Frame;
pub use observation::{FlightCategory, Observation};
