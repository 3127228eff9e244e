//! Matte operations: morphology and Gaussian feathering.

use limeout_core::MaskFrame;
use rayon::prelude::*;

/// Values this close to 0 or 1 after blurring are snapped to the extreme.
const SNAP_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Morph {
    Erode,
    Dilate,
}

/// Shrink opaque regions by `radius` pixels using a disc kernel.
pub fn erode(matte: &mut MaskFrame, radius: u32) {
    morph(matte, radius, Morph::Erode);
}

/// Grow opaque regions by `radius` pixels using a disc kernel.
pub fn dilate(matte: &mut MaskFrame, radius: u32) {
    morph(matte, radius, Morph::Dilate);
}

fn morph(matte: &mut MaskFrame, radius: u32, op: Morph) {
    if radius == 0 || matte.data.is_empty() {
        return;
    }
    let r = radius as i32;
    let r2 = r * r;
    let w = matte.width as i32;
    let h = matte.height as i32;
    let src = matte.data.clone();

    matte
        .data
        .par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for (x, out) in row.iter_mut().enumerate() {
                let x = x as i32;
                let mut val = match op {
                    Morph::Erode => 1.0f32,
                    Morph::Dilate => 0.0f32,
                };
                for dy in -r..=r {
                    let ny = y + dy;
                    if ny < 0 || ny >= h {
                        continue;
                    }
                    for dx in -r..=r {
                        let nx = x + dx;
                        if nx < 0 || nx >= w || dx * dx + dy * dy > r2 {
                            continue;
                        }
                        let s = src[(ny * w + nx) as usize];
                        val = match op {
                            Morph::Erode => val.min(s),
                            Morph::Dilate => val.max(s),
                        };
                    }
                }
                *out = val;
            }
        });
}

/// Normalized 1D Gaussian kernel with half-width `radius` and sigma `radius / 3`.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let r = radius as i32;
    let sigma = radius as f32 / 3.0;
    let sigma2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / sigma2).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Gaussian blur the matte so the boundary ramps over `radius` pixels on each side.
///
/// Borders replicate the edge value. Radius 0 leaves the matte untouched.
pub fn feather(matte: &mut MaskFrame, radius: u32) {
    if radius == 0 || matte.data.is_empty() {
        return;
    }
    let kernel = gaussian_kernel(radius);
    let r = radius as i32;
    let w = matte.width as usize;
    let h = matte.height as i32;

    // Horizontal pass
    let src = matte.data.clone();
    matte
        .data
        .par_chunks_mut(w)
        .zip(src.par_chunks(w))
        .for_each(|(row, src_row)| {
            let last = w as i32 - 1;
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = (x as i32 + k as i32 - r).clamp(0, last);
                    acc += src_row[sx as usize] * weight;
                }
                *out = acc;
            }
        });

    // Vertical pass
    let src = matte.data.clone();
    matte
        .data
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = (y as i32 + k as i32 - r).clamp(0, h - 1);
                    acc += src[sy as usize * w + x] * weight;
                }
                *out = snap(acc);
            }
        });
}

#[inline]
fn snap(v: f32) -> f32 {
    if v >= 1.0 - SNAP_EPSILON {
        1.0
    } else if v <= SNAP_EPSILON {
        0.0
    } else {
        v
    }
}
