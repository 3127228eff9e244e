//! RGB to HSV conversion.

use limeout_core::Frame;
use serde::{Deserialize, Serialize};

/// A color in HSV space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in degrees [0, 360)
    pub h: f32,
    /// Saturation [0, 1]
    pub s: f32,
    /// Value [0, 1]
    pub v: f32,
}

impl Hsv {
    pub const fn new(h: f32, s: f32, v: f32) -> Self {
        Self { h, s, v }
    }

    /// Convert back to 8-bit RGB.
    pub fn to_rgb(self) -> [u8; 3] {
        let c = self.v * self.s;
        let hp = self.h.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
        let (r, g, b) = match hp as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.v - c;
        let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [to_u8(r), to_u8(g), to_u8(b)]
    }
}

/// Convert an 8-bit RGB triple to HSV. Achromatic colors get hue 0.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };

    // rem_euclid can land exactly on 360 through rounding
    let h = if h >= 360.0 { h - 360.0 } else { h };
    Hsv::new(h, s, max)
}

/// Circular hue distance in degrees, in [0, 180].
#[inline]
pub fn hue_distance(h1: f32, h2: f32) -> f32 {
    let d = (h1 - h2).abs().rem_euclid(360.0);
    d.min(360.0 - d)
}

/// A frame converted to HSV, one entry per pixel.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<Hsv>,
}

impl HsvFrame {
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Hsv {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

/// Convert every pixel of an RGBA frame to HSV. Alpha is ignored.
pub fn to_hsv(frame: &Frame) -> HsvFrame {
    HsvFrame {
        width: frame.width,
        height: frame.height,
        data: frame
            .data
            .chunks_exact(4)
            .map(|px| rgb_to_hsv(px[0], px[1], px[2]))
            .collect(),
    }
}
