//! Translational warp with configurable resampling and border policy.

use limeout_core::Frame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Resampling kernel for sub-pixel shifts. Whole-pixel shifts are exact
/// copies under either kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

/// What fills pixels uncovered by the shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderFill {
    /// Fully transparent black.
    #[default]
    Transparent,
    /// Repeat the nearest edge pixel.
    Replicate,
}

/// Shift `frame` by `(dx, dy)`: output pixel `(x, y)` samples the source at
/// `(x - dx, y - dy)`. Dimensions, index and timestamp are preserved.
pub fn translate(
    frame: &Frame,
    dx: f32,
    dy: f32,
    interpolation: Interpolation,
    border: BorderFill,
) -> Frame {
    if dx == 0.0 && dy == 0.0 {
        return frame.clone();
    }
    let mut out = frame.clone();
    let stride = out.stride();
    if stride == 0 {
        return out;
    }
    let integral_shift = dx.fract() == 0.0 && dy.fract() == 0.0;
    out.data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = y as f32 - dy;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let sx = x as f32 - dx;
                let value = if integral_shift || interpolation == Interpolation::Nearest {
                    sample_nearest(frame, sx, sy, border)
                } else {
                    sample_bilinear(frame, sx, sy, border)
                };
                px.copy_from_slice(&value);
            }
        });
    out
}

/// Source pixel at integer coordinates, or `None` when outside and transparent.
#[inline]
fn fetch(frame: &Frame, x: i64, y: i64, border: BorderFill) -> Option<[u8; 4]> {
    let w = frame.width as i64;
    let h = frame.height as i64;
    if (0..w).contains(&x) && (0..h).contains(&y) {
        return Some(frame.pixel(x as u32, y as u32));
    }
    match border {
        BorderFill::Transparent => None,
        BorderFill::Replicate => Some(frame.pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)),
    }
}

fn sample_nearest(frame: &Frame, sx: f32, sy: f32, border: BorderFill) -> [u8; 4] {
    fetch(frame, sx.round() as i64, sy.round() as i64, border).unwrap_or([0; 4])
}

/// Bilinear sample in premultiplied space so transparent taps do not darken
/// the color of partially covered edge pixels.
fn sample_bilinear(frame: &Frame, sx: f32, sy: f32, border: BorderFill) -> [u8; 4] {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    let mut rgb = [0.0f32; 3];
    let mut alpha = 0.0f32;
    for (x, y, w) in taps {
        if w == 0.0 {
            continue;
        }
        if let Some(px) = fetch(frame, x, y, border) {
            let a = px[3] as f32 * w;
            for c in 0..3 {
                rgb[c] += px[c] as f32 * a;
            }
            alpha += a;
        }
    }
    if alpha <= 0.0 {
        return [0; 4];
    }
    let unpremul = |v: f32| (v / alpha).round().clamp(0.0, 255.0) as u8;
    [
        unpremul(rgb[0]),
        unpremul(rgb[1]),
        unpremul(rgb[2]),
        alpha.round().clamp(0.0, 255.0) as u8,
    ]
}
