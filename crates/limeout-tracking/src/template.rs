//! Zero-mean normalized cross-correlation template matching.
//!
//! Scores match OpenCV's `TM_CCOEFF_NORMED`: 1.0 for a perfect match, 0 for
//! no correlation, negative for inverted patches. Window statistics come from
//! an [`IntegralImage`] so each candidate costs one pass over the template.

use crate::pyramid::{GrayImage, ImagePyramid, IntegralImage};
use limeout_core::PixelRect;
use rayon::prelude::*;

/// Minimum template side, in pixels, at the coarse level for coarse-to-fine search.
pub const MIN_COARSE_TEMPLATE: u32 = 16;

/// Refinement radius at full resolution after a coarse match.
const REFINE_RADIUS: u32 = 2;

/// Below this standard deviation a patch counts as flat.
const FLAT_EPSILON: f64 = 1e-6;

/// A template with its mean removed.
#[derive(Debug, Clone)]
pub struct Template {
    width: u32,
    height: u32,
    zero_mean: Vec<f32>,
    norm: f64,
}

impl Template {
    pub fn new(patch: &GrayImage) -> Self {
        let n = patch.data.len().max(1) as f64;
        let mean = patch.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let zero_mean: Vec<f32> = patch.data.iter().map(|&v| (v as f64 - mean) as f32).collect();
        let norm = zero_mean
            .iter()
            .map(|&v| v as f64 * v as f64)
            .sum::<f64>()
            .sqrt();
        Self {
            width: patch.width,
            height: patch.height,
            zero_mean,
            norm,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the patch has too little contrast to be matched.
    pub fn is_flat(&self) -> bool {
        self.norm / (self.zero_mean.len().max(1) as f64).sqrt() < FLAT_EPSILON
    }

    /// NCC score of the template placed with its top-left at `(x, y)`.
    fn score_at(&self, image: &GrayImage, integral: &IntegralImage, x: u32, y: u32) -> f32 {
        let n = (self.width * self.height) as f64;
        let (sum, sq_sum) = integral.window(x, y, self.width, self.height);
        let variance_sum = sq_sum - sum * sum / n;
        if variance_sum <= FLAT_EPSILON * FLAT_EPSILON * n || self.norm <= 0.0 {
            return 0.0;
        }
        let iw = image.width as usize;
        let tw = self.width as usize;
        let mut cross = 0.0f64;
        for ty in 0..self.height as usize {
            let img_row = &image.data[(y as usize + ty) * iw + x as usize..][..tw];
            let tpl_row = &self.zero_mean[ty * tw..][..tw];
            cross += img_row
                .iter()
                .zip(tpl_row)
                .map(|(&i, &t)| i as f64 * t as f64)
                .sum::<f64>();
        }
        (cross / (self.norm * variance_sum.sqrt())).clamp(-1.0, 1.0) as f32
    }
}

/// Best template placement found by a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Top-left corner of the matched window.
    pub x: u32,
    pub y: u32,
    /// Raw NCC score in [-1, 1].
    pub score: f32,
}

impl MatchResult {
    /// Prefer the higher score; break ties on the smaller (y, x).
    fn better(self, other: Self) -> Self {
        if other.score > self.score
            || (other.score == self.score && (other.y, other.x) < (self.y, self.x))
        {
            other
        } else {
            self
        }
    }
}

/// Search a grayscale image for a template, optionally coarse-to-fine.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    full: Template,
    coarse: Option<Template>,
}

impl TemplateMatcher {
    pub fn new(patch: &GrayImage) -> Self {
        let coarse = (patch.width / 2 >= MIN_COARSE_TEMPLATE
            && patch.height / 2 >= MIN_COARSE_TEMPLATE)
            .then(|| Template::new(&patch.downsample()));
        Self {
            full: Template::new(patch),
            coarse,
        }
    }

    pub fn template(&self) -> &Template {
        &self.full
    }

    pub fn is_coarse_to_fine(&self) -> bool {
        self.coarse.is_some()
    }

    /// Best match whose top-left lies within `margin` pixels of `(hint_x, hint_y)`.
    ///
    /// Returns `None` when the template does not fit in the image.
    pub fn find_near(
        &self,
        image: &GrayImage,
        hint_x: u32,
        hint_y: u32,
        margin: u32,
    ) -> Option<MatchResult> {
        let max_x = image.width.checked_sub(self.full.width)?;
        let max_y = image.height.checked_sub(self.full.height)?;
        let x0 = hint_x.saturating_sub(margin).min(max_x);
        let y0 = hint_y.saturating_sub(margin).min(max_y);
        let x1 = hint_x.saturating_add(margin).min(max_x);
        let y1 = hint_y.saturating_add(margin).min(max_y);
        let window = PixelRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
        self.search(image, window)
    }

    /// Exhaustive search over every placement in the image.
    pub fn find_anywhere(&self, image: &GrayImage) -> Option<MatchResult> {
        let max_x = image.width.checked_sub(self.full.width)?;
        let max_y = image.height.checked_sub(self.full.height)?;
        self.search(image, PixelRect::new(0, 0, max_x + 1, max_y + 1))
    }

    /// `window` holds candidate top-left positions and must be non-empty and valid.
    fn search(&self, image: &GrayImage, window: PixelRect) -> Option<MatchResult> {
        let Some(coarse) = &self.coarse else {
            let integral = IntegralImage::new(image);
            return best_in(&self.full, image, &integral, window);
        };

        let pyramid = ImagePyramid::build(image, 2);
        let small = &pyramid.levels[1];
        let coarse_hit = small
            .width
            .checked_sub(coarse.width)
            .zip(small.height.checked_sub(coarse.height))
            .and_then(|(max_x, max_y)| {
                let x0 = (window.x / 2).min(max_x);
                let y0 = (window.y / 2).min(max_y);
                let x1 = ((window.right() - 1) as u32 / 2).min(max_x);
                let y1 = ((window.bottom() - 1) as u32 / 2).min(max_y);
                let coarse_window = PixelRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
                best_in(coarse, small, &IntegralImage::new(small), coarse_window)
            });

        let full_integral = IntegralImage::new(image);
        let refine = match coarse_hit {
            Some(hit) => {
                let cx = (hit.x * 2).clamp(window.x, window.right() as u32 - 1);
                let cy = (hit.y * 2).clamp(window.y, window.bottom() as u32 - 1);
                let x0 = cx.saturating_sub(REFINE_RADIUS).max(window.x);
                let y0 = cy.saturating_sub(REFINE_RADIUS).max(window.y);
                let x1 = (cx + REFINE_RADIUS).min(window.right() as u32 - 1);
                let y1 = (cy + REFINE_RADIUS).min(window.bottom() as u32 - 1);
                PixelRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
            }
            None => window,
        };
        best_in(&self.full, image, &full_integral, refine)
    }
}

/// Score every placement in `window` and keep the best. Rows run in parallel.
fn best_in(
    template: &Template,
    image: &GrayImage,
    integral: &IntegralImage,
    window: PixelRect,
) -> Option<MatchResult> {
    if window.is_empty() {
        return None;
    }
    (window.y..window.y + window.height)
        .into_par_iter()
        .filter_map(|y| {
            (window.x..window.x + window.width)
                .map(|x| MatchResult {
                    x,
                    y,
                    score: template.score_at(image, integral, x, y),
                })
                .reduce(MatchResult::better)
        })
        .reduce_with(MatchResult::better)
}
