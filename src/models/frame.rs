//! One rendered frame of the LED strip

use super::{ColorOrder, Rgb};

/// Ordered LED colors plus the global brightness scalar
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// One color per LED, in AIRPORTS order
    pub pixels: Vec<Rgb>,
    /// Global brightness (0.0-1.0)
    pub brightness: f32,
}

impl Frame {
    #[must_use]
    pub fn new(pixels: Vec<Rgb>, brightness: f32) -> Self {
        Self { pixels, brightness }
    }

    /// A frame with every LED set to `color`
    #[must_use]
    pub fn filled(count: usize, color: Rgb, brightness: f32) -> Self {
        Self::new(vec![color; count], brightness)
    }

    /// Brightness-scaled bytes in the strip's channel order, three per LED.
    #[must_use]
    pub fn wire_bytes(&self, order: ColorOrder) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|pixel| order.arrange(pixel.scale(self.brightness)))
            .collect()
    }
}
