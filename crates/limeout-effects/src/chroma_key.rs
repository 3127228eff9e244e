//! Chroma keying (green/blue screen) with matte processing pipeline.
//!
//! threshold -> erode/dilate -> feather -> spill suppression -> defringe

use crate::matte;
use limeout_color::{color_distance, rgb_to_hsv, ColorKey};
use limeout_core::{Frame, LimeoutError, MaskFrame, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Alpha above which an edge pixel is considered for spill suppression.
const SPILL_ALPHA_LOW: f32 = 0.02;
/// Alpha band treated as semi-transparent by the defringe pass.
const DEFRINGE_ALPHA_LOW: f32 = 0.02;
const DEFRINGE_ALPHA_HIGH: f32 = 0.98;
/// Share of the removed spill handed back to each of the other channels.
const SPILL_COMPENSATION: f32 = 0.3;
/// Extra search distance for opaque neighbors beyond the feather band.
const DEFRINGE_REACH: u32 = 2;

const MAX_FEATHER: u32 = 64;
const MAX_MORPH: u32 = 32;

/// Parameters for chroma key extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaKeyParams {
    /// Background color to remove
    pub key: ColorKey,
    /// Alpha ramp half-width around the mask boundary (pixels)
    pub feather_width: u32,
    /// Spill suppression strength (0.0-1.0)
    pub spill_strength: f32,
    /// Semi-transparent edge decontamination strength (0.0-1.0)
    pub defringe_strength: f32,
    /// Erosion radius applied to the raw mask (pixels)
    pub erode: u32,
    /// Dilation radius applied after erosion (pixels)
    pub dilate: u32,
}

impl Default for ChromaKeyParams {
    fn default() -> Self {
        Self {
            key: ColorKey::green_screen(),
            feather_width: 2,
            spill_strength: 0.5,
            defringe_strength: 0.0,
            erode: 0,
            dilate: 0,
        }
    }
}

impl ChromaKeyParams {
    /// Hard threshold only: no feather, spill or defringe.
    pub fn hard(key: ColorKey) -> Self {
        Self {
            key,
            feather_width: 0,
            spill_strength: 0.0,
            defringe_strength: 0.0,
            erode: 0,
            dilate: 0,
        }
    }

    /// Reject malformed parameters before any pixel work.
    pub fn validate(&self) -> Result<()> {
        self.key.validate()?;
        for (name, v) in [
            ("spill strength", self.spill_strength),
            ("defringe strength", self.defringe_strength),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(LimeoutError::invalid(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
        }
        if self.feather_width > MAX_FEATHER {
            return Err(LimeoutError::invalid(format!(
                "feather width {} exceeds {MAX_FEATHER}",
                self.feather_width
            )));
        }
        if self.erode > MAX_MORPH || self.dilate > MAX_MORPH {
            return Err(LimeoutError::invalid(format!(
                "erode/dilate radius exceeds {MAX_MORPH}"
            )));
        }
        Ok(())
    }
}

/// Chroma key processing pipeline.
pub struct ChromaKeyEngine;

impl ChromaKeyEngine {
    /// Hard mask: 0 where the pixel is within `tolerance` of the key, else 1.
    pub fn threshold_mask(frame: &Frame, key: &ColorKey) -> MaskFrame {
        let w = frame.width as usize;
        let mut mask = MaskFrame::filled(frame.width, frame.height, 1.0);
        if w == 0 {
            return mask;
        }
        mask.data
            .par_chunks_mut(w)
            .zip(frame.data.par_chunks(frame.stride()))
            .for_each(|(mask_row, px_row)| {
                for (alpha, px) in mask_row.iter_mut().zip(px_row.chunks_exact(4)) {
                    let hsv = rgb_to_hsv(px[0], px[1], px[2]);
                    if color_distance(hsv, key) < key.tolerance {
                        *alpha = 0.0;
                    }
                }
            });
        mask
    }

    /// Threshold, refine and feather. The result always has the frame's shape.
    pub fn matte(frame: &Frame, params: &ChromaKeyParams) -> Result<MaskFrame> {
        params.validate()?;
        frame.validate()?;
        let mut mask = Self::threshold_mask(frame, &params.key);
        matte::erode(&mut mask, params.erode);
        matte::dilate(&mut mask, params.dilate);
        matte::feather(&mut mask, params.feather_width);
        Ok(mask)
    }

    /// Pull the key's dominant channel out of partially transparent edge pixels.
    ///
    /// Only pixels with `SPILL_ALPHA_LOW < alpha < 1` are touched, scaled by
    /// how close their hue is to the key.
    pub fn suppress_spill(frame: &mut Frame, matte: &MaskFrame, key: &ColorKey, strength: f32) {
        if strength <= 0.0 {
            return;
        }
        let key_rgb = key.center().to_rgb();
        let dominant = dominant_channel(key_rgb);
        let others = [(dominant + 1) % 3, (dominant + 2) % 3];
        let w = frame.width as usize;
        let stride = frame.stride();
        if w == 0 {
            return;
        }

        frame
            .data
            .par_chunks_mut(stride)
            .zip(matte.data.par_chunks(w))
            .for_each(|(row, alpha_row)| {
                for (px, &alpha) in row.chunks_exact_mut(4).zip(alpha_row) {
                    if alpha <= SPILL_ALPHA_LOW || alpha >= 1.0 {
                        continue;
                    }
                    let similarity = key.hue_similarity(rgb_to_hsv(px[0], px[1], px[2]).h);
                    if similarity <= 0.0 {
                        continue;
                    }
                    let d = px[dominant] as f32;
                    let o0 = px[others[0]] as f32;
                    let o1 = px[others[1]] as f32;
                    let excess = (d - (o0 + o1) * 0.5).max(0.0);
                    let removal = excess * strength * similarity;
                    if removal <= 0.0 {
                        continue;
                    }
                    let comp = removal * SPILL_COMPENSATION;
                    px[dominant] = to_u8(d - removal);
                    px[others[0]] = to_u8(o0 + comp);
                    px[others[1]] = to_u8(o1 + comp);
                }
            });
    }

    /// Blend semi-transparent edge pixels toward nearby fully opaque colors.
    pub fn defringe(frame: &mut Frame, matte: &MaskFrame, radius: u32, strength: f32) {
        if strength <= 0.0 || frame.data.is_empty() {
            return;
        }
        let table = OpaqueTable::build(frame, matte);
        let w = frame.width as usize;
        let stride = frame.stride();

        frame
            .data
            .par_chunks_mut(stride)
            .zip(matte.data.par_chunks(w))
            .enumerate()
            .for_each(|(y, (row, alpha_row))| {
                for (x, (px, &alpha)) in row.chunks_exact_mut(4).zip(alpha_row).enumerate() {
                    if alpha <= DEFRINGE_ALPHA_LOW || alpha >= DEFRINGE_ALPHA_HIGH {
                        continue;
                    }
                    let Some(neighbor) = table.mean(x as u32, y as u32, radius) else {
                        continue;
                    };
                    let weight = (1.0 - alpha) * strength;
                    for c in 0..3 {
                        let v = px[c] as f32;
                        px[c] = to_u8(v + (neighbor[c] - v) * weight);
                    }
                }
            });
    }

    /// Full pipeline: returns an RGBA frame whose alpha is the matte times the
    /// incoming alpha. The input frame is never modified.
    pub fn key(frame: &Frame, params: &ChromaKeyParams) -> Result<Frame> {
        let matte = Self::matte(frame, params)?;
        let mut out = frame.clone();
        Self::suppress_spill(&mut out, &matte, &params.key, params.spill_strength);
        Self::defringe(
            &mut out,
            &matte,
            params.feather_width + DEFRINGE_REACH,
            params.defringe_strength,
        );
        apply_matte(&mut out, &matte);
        tracing::trace!(
            frame = frame.index,
            partial = matte.partial_count(),
            "keyed frame"
        );
        Ok(out)
    }
}

/// Multiply the matte into the frame's alpha channel.
fn apply_matte(frame: &mut Frame, matte: &MaskFrame) {
    frame
        .data
        .par_chunks_mut(4)
        .zip(matte.data.par_iter())
        .for_each(|(px, &m)| {
            px[3] = (m.clamp(0.0, 1.0) * px[3] as f32).round() as u8;
        });
}

fn dominant_channel(rgb: [u8; 3]) -> usize {
    let mut best = 0;
    for c in 1..3 {
        if rgb[c] > rgb[best] {
            best = c;
        }
    }
    best
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Summed-area table over fully opaque pixels: RGB sums and counts.
struct OpaqueTable {
    width: usize,
    height: usize,
    /// (width + 1) * (height + 1) entries of [r, g, b, count]
    sums: Vec<[u64; 4]>,
}

impl OpaqueTable {
    fn build(frame: &Frame, matte: &MaskFrame) -> Self {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let tw = width + 1;
        let mut sums = vec![[0u64; 4]; tw * (height + 1)];
        for y in 0..height {
            let mut row_acc = [0u64; 4];
            for x in 0..width {
                if matte.data[y * width + x] >= 1.0 {
                    let px = frame.pixel(x as u32, y as u32);
                    row_acc[0] += px[0] as u64;
                    row_acc[1] += px[1] as u64;
                    row_acc[2] += px[2] as u64;
                    row_acc[3] += 1;
                }
                let above = sums[y * tw + x + 1];
                let cell = &mut sums[(y + 1) * tw + x + 1];
                for c in 0..4 {
                    cell[c] = above[c] + row_acc[c];
                }
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    /// Mean opaque color in the square window of `radius` around `(x, y)`.
    fn mean(&self, x: u32, y: u32, radius: u32) -> Option<[f32; 3]> {
        let tw = self.width + 1;
        let x0 = (x as usize).saturating_sub(radius as usize);
        let y0 = (y as usize).saturating_sub(radius as usize);
        let x1 = (x as usize + radius as usize + 1).min(self.width);
        let y1 = (y as usize + radius as usize + 1).min(self.height);
        let at = |xx: usize, yy: usize| self.sums[yy * tw + xx];
        let (a, b, c, d) = (at(x1, y1), at(x0, y1), at(x1, y0), at(x0, y0));
        let mut total = [0u64; 4];
        for i in 0..4 {
            total[i] = a[i] + d[i] - b[i] - c[i];
        }
        if total[3] == 0 {
            return None;
        }
        let n = total[3] as f32;
        Some([total[0] as f32 / n, total[1] as f32 / n, total[2] as f32 / n])
    }
}
