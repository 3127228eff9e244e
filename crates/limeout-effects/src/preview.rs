//! Preview compositing over a checkerboard or a solid color.
//!
//! Cosmetic only: the composited frame is for display and is never fed back
//! into the export path.

use limeout_core::{Frame, LimeoutError, Result, Vec2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What shows through transparent pixels in the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Background {
    Checkerboard {
        tile_size: u32,
        light: [u8; 3],
        dark: [u8; 3],
    },
    Solid([u8; 3]),
}

impl Default for Background {
    fn default() -> Self {
        Self::checkerboard(10)
    }
}

impl Background {
    /// Grey checkerboard with the given tile size.
    pub const fn checkerboard(tile_size: u32) -> Self {
        Self::Checkerboard {
            tile_size,
            light: [200, 200, 200],
            dark: [150, 150, 150],
        }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn solid_hex(hex: &str) -> Result<Self> {
        parse_hex_rgb(hex)
            .map(Self::Solid)
            .ok_or_else(|| LimeoutError::invalid(format!("not a #RRGGBB color: {hex}")))
    }

    #[inline]
    fn color_at(&self, x: u32, y: u32) -> [u8; 3] {
        match *self {
            Self::Solid(c) => c,
            Self::Checkerboard {
                tile_size,
                light,
                dark,
            } => {
                let t = tile_size.max(1);
                if (x / t + y / t) % 2 == 0 {
                    light
                } else {
                    dark
                }
            }
        }
    }
}

/// Parse `#RRGGBB` or `RRGGBB`. Exactly six hex digits, nothing else.
pub fn parse_hex_rgb(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Alpha-blend an RGBA frame over `background`. The result is fully opaque.
pub fn composite(frame: &Frame, background: &Background) -> Frame {
    let mut out = frame.clone();
    let stride = out.stride();
    if stride == 0 {
        return out;
    }
    out.data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let bg = background.color_at(x as u32, y as u32);
                let a = px[3] as f32 / 255.0;
                for c in 0..3 {
                    let v = px[c] as f32 * a + bg[c] as f32 * (1.0 - a);
                    px[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                px[3] = 255;
            }
        });
    out
}

/// Draw a crosshair with a square ring at `center`, clipped to the frame.
pub fn overlay_crosshair(frame: &mut Frame, center: Vec2, size: u32, color: [u8; 4]) {
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let s = size as i64;
    let ring = (s / 2).max(1);
    let mut plot = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < frame.width as i64 && y < frame.height as i64 {
            frame.set_pixel(x as u32, y as u32, color);
        }
    };
    for d in -s..=s {
        plot(cx + d, cy);
        plot(cx, cy + d);
    }
    for d in -ring..=ring {
        plot(cx + d, cy - ring);
        plot(cx + d, cy + ring);
        plot(cx - ring, cy + d);
        plot(cx + ring, cy + d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_pixels_unchanged() {
        let frame = Frame::solid(4, 4, [10, 20, 30, 255]);
        let out = composite(&frame, &Background::Solid([255, 0, 255]));
        assert_eq!(out, frame);
    }

    #[test]
    fn test_transparent_shows_checkerboard() {
        let frame = Frame::new(20, 10);
        let out = composite(&frame, &Background::checkerboard(10));
        assert_eq!(out.pixel(0, 0), [200, 200, 200, 255]);
        assert_eq!(out.pixel(10, 0), [150, 150, 150, 255]);
        assert_eq!(out.pixel(19, 9), [150, 150, 150, 255]);
    }

    #[test]
    fn test_half_alpha_blends() {
        let frame = Frame::solid(1, 1, [255, 0, 0, 128]);
        let out = composite(&frame, &Background::Solid([0, 0, 255]));
        let px = out.pixel(0, 0);
        assert_eq!(px[3], 255);
        assert_eq!(px[0], 128);
        assert_eq!(px[2], 127);
    }

    #[test]
    fn test_composite_leaves_source_alone() {
        let frame = Frame::solid(2, 2, [1, 2, 3, 0]);
        let copy = frame.clone();
        let _ = composite(&frame, &Background::default());
        assert_eq!(frame, copy);
    }

    #[test]
    fn test_solid_hex() {
        assert_eq!(
            Background::solid_hex("#FF8000").unwrap(),
            Background::Solid([255, 128, 0])
        );
        assert_eq!(
            Background::solid_hex("00ff00").unwrap(),
            Background::Solid([0, 255, 0])
        );
        assert!(Background::solid_hex("#12345").is_err());
        assert!(Background::solid_hex("#GG0000").is_err());
        assert!(Background::solid_hex("#+1+1+1").is_err());
        assert_eq!(parse_hex_rgb(" #0a0B0c "), Some([10, 11, 12]));
    }

    #[test]
    fn test_zero_tile_size_does_not_panic() {
        let out = composite(&Frame::new(3, 3), &Background::checkerboard(0));
        assert_eq!(out.pixel(0, 0), [200, 200, 200, 255]);
        assert_eq!(out.pixel(1, 0), [150, 150, 150, 255]);
    }

    #[test]
    fn test_crosshair_clips() {
        let mut frame = Frame::new(8, 8);
        overlay_crosshair(&mut frame, Vec2::new(0.0, 0.0), 4, [255, 255, 0, 255]);
        assert_eq!(frame.pixel(0, 0), [255, 255, 0, 255]);
        assert_eq!(frame.pixel(4, 0), [255, 255, 0, 255]);
        assert_eq!(frame.pixel(5, 5), [0, 0, 0, 0]);
    }
}
