//! RGB color model and blending

use palette::{Mix, Srgb};
use serde::{Deserialize, Serialize};

/// An 8-bit RGB triple, written as `[r, g, b]` in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    /// Linear blend towards `other`; `alpha` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn blend(self, other: Rgb, alpha: f32) -> Rgb {
        let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
        let from: Srgb<f32> = Srgb::from(self).into_format();
        let to: Srgb<f32> = Srgb::from(other).into_format();
        from.mix(to, alpha).into_format::<u8>().into()
    }

    /// Scale every channel by `factor` (0.0 = off, 1.0 = unchanged).
    #[must_use]
    pub fn scale(self, factor: f32) -> Rgb {
        Rgb::BLACK.blend(self, factor)
    }
}

impl From<Rgb> for Srgb<u8> {
    fn from(value: Rgb) -> Self {
        Srgb::new(value.0, value.1, value.2)
    }
}

impl From<Srgb<u8>> for Rgb {
    fn from(value: Srgb<u8>) -> Self {
        Rgb(value.red, value.green, value.blue)
    }
}

/// Channel order expected by the LED strip on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    Rgb,
    Rbg,
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    /// Arrange the channels of `color` in wire order.
    #[must_use]
    pub fn arrange(self, color: Rgb) -> [u8; 3] {
        let Rgb(r, g, b) = color;
        match self {
            ColorOrder::Rgb => [r, g, b],
            ColorOrder::Rbg => [r, b, g],
            ColorOrder::Grb => [g, r, b],
            ColorOrder::Gbr => [g, b, r],
            ColorOrder::Brg => [b, r, g],
            ColorOrder::Bgr => [b, g, r],
        }
    }
}
