//! Grayscale images, 2x pyramids and integral images for template matching.

use limeout_core::{Frame, PixelRect};
use rayon::prelude::*;

/// A grayscale image stored as f32 values [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Luma (Rec. 601 weights) of an RGBA frame. Alpha is ignored.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            data: rgb_to_gray(&frame.data),
            width: frame.width,
            height: frame.height,
        }
    }

    /// Sample with edge clamping.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.width as usize + x]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, val: f32) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = val;
        }
    }

    /// Copy out a sub-rectangle. The rectangle must fit inside the image.
    pub fn crop(&self, rect: PixelRect) -> Self {
        let w = self.width as usize;
        let mut data = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * w + rect.x as usize;
            data.extend_from_slice(&self.data[start..start + rect.width as usize]);
        }
        Self {
            data,
            width: rect.width,
            height: rect.height,
        }
    }

    /// Half-resolution copy using a 2x2 box filter. Odd edges are clamped.
    pub fn downsample(&self) -> Self {
        let nw = self.width.div_ceil(2);
        let nh = self.height.div_ceil(2);
        let mut level = GrayImage::new(nw, nh);
        if nw == 0 || nh == 0 {
            return level;
        }
        level
            .data
            .par_chunks_mut(nw as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = (y * 2) as i32;
                for (x, out) in row.iter_mut().enumerate() {
                    let sx = (x * 2) as i32;
                    *out = (self.get(sx, sy)
                        + self.get(sx + 1, sy)
                        + self.get(sx, sy + 1)
                        + self.get(sx + 1, sy + 1))
                        * 0.25;
                }
            });
        level
    }
}

/// Multi-scale image pyramid. Level 0 is full resolution.
pub struct ImagePyramid {
    pub levels: Vec<GrayImage>,
}

impl ImagePyramid {
    pub fn build(gray: &GrayImage, num_levels: u32) -> Self {
        let mut levels = vec![gray.clone()];
        for _ in 1..num_levels.max(1) {
            let next = match levels.last() {
                Some(prev) => prev.downsample(),
                None => break,
            };
            levels.push(next);
        }
        Self { levels }
    }
}

/// Convert packed RGBA bytes to luma in [0, 1].
pub fn rgb_to_gray(rgba: &[u8]) -> Vec<f32> {
    rgba.par_chunks_exact(4)
        .map(|px| (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0)
        .collect()
}

/// Summed-area tables of values and squared values, for O(1) window
/// mean and variance.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
    stride: usize,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        let w = img.width as usize;
        let h = img.height as usize;
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sq_sum = vec![0.0f64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..w {
                let v = img.data[y * w + x] as f64;
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sq_sum[i] = sq_sum[i - stride] + row_sq;
            }
        }
        Self {
            sum,
            sq_sum,
            stride,
        }
    }

    /// Sum and squared sum over the `w x h` window with top-left `(x, y)`.
    #[inline]
    pub fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let s = self.stride;
        let rect = |t: &[f64]| t[y1 * s + x1] - t[y0 * s + x1] - t[y1 * s + x0] + t[y0 * s + x0];
        (rect(&self.sum), rect(&self.sq_sum))
    }
}
