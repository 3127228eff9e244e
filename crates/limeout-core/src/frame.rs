//! Frame buffer types for video frames in CPU memory.
//!
//! Every frame in the pipeline is tightly packed 8-bit RGBA. Decoded source
//! frames are fully opaque; stabilization and keying lower the alpha channel.

use crate::error::{LimeoutError, Result};
use crate::time::{FrameRate, RationalTime};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A video frame in CPU memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Position of the frame in its source stream
    pub index: u64,
    /// Presentation timestamp
    pub pts: RationalTime,
    /// RGBA8 pixel data, `width * height * 4` bytes, no row padding
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a fully transparent black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            index: 0,
            pts: RationalTime::ZERO,
            data: vec![0u8; Self::byte_len(width, height)],
        }
    }

    /// Wrap an existing RGBA8 buffer, checking its length.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(LimeoutError::invalid(format!(
                "RGBA buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            index: 0,
            pts: RationalTime::ZERO,
            data,
        })
    }

    /// Expand a packed RGB24 buffer into an opaque RGBA frame.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        if rgb.len() != pixels * 3 {
            return Err(LimeoutError::invalid(format!(
                "RGB buffer for {width}x{height} must be {} bytes, got {}",
                pixels * 3,
                rgb.len()
            )));
        }
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for px in rgb.chunks_exact(3) {
            data.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self::from_rgba(width, height, data)
    }

    /// A frame filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height);
        for px in frame.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
        frame
    }

    /// Set the stream position and derive the timestamp from the frame rate.
    pub fn with_index(mut self, index: u64, rate: FrameRate) -> Self {
        self.index = index;
        self.pts = RationalTime::from_frames(index as i64, rate);
        self
    }

    /// Copy index and timestamp from another frame.
    pub fn with_timing_of(mut self, other: &Frame) -> Self {
        self.index = other.index;
        self.pts = other.pts;
        self
    }

    #[inline]
    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Frame dimensions as `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// Read one pixel. Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Write one pixel. Panics when out of bounds.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Fill an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgba: [u8; 4]) {
        let x1 = x.saturating_add(w).min(self.width);
        let y1 = y.saturating_add(h).min(self.height);
        for yy in y.min(self.height)..y1 {
            for xx in x.min(self.width)..x1 {
                self.set_pixel(xx, yy, rgba);
            }
        }
    }

    /// Extract the alpha channel as a mask.
    pub fn alpha_mask(&self) -> MaskFrame {
        MaskFrame {
            width: self.width,
            height: self.height,
            data: self
                .data
                .chunks_exact(BYTES_PER_PIXEL)
                .map(|px| px[3] as f32 / 255.0)
                .collect(),
        }
    }

    /// Check that the buffer length matches the stated dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LimeoutError::invalid(format!(
                "frame {} has empty dimensions {}x{}",
                self.index, self.width, self.height
            )));
        }
        if self.data.len() != Self::byte_len(self.width, self.height) {
            return Err(LimeoutError::invalid(format!(
                "frame {} buffer is {} bytes, expected {} for {}x{}",
                self.index,
                self.data.len(),
                Self::byte_len(self.width, self.height),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        let mut frame = Self::new(width, height);
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let bar = (x as u64 * 8 / width as u64) as usize;
                let i = x as usize * BYTES_PER_PIXEL;
                row[i..i + BYTES_PER_PIXEL].copy_from_slice(&BARS[bar]);
            }
        }
        frame
    }
}

/// Per-pixel alpha in [0, 1], same dimensions as the frame it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl MaskFrame {
    /// Create a mask filled with `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value.clamp(0.0, 1.0);
    }

    /// Whether this mask has the same shape as `frame`.
    pub fn matches(&self, frame: &Frame) -> bool {
        self.width == frame.width && self.height == frame.height
    }

    /// Count of pixels strictly between transparent and opaque.
    pub fn partial_count(&self) -> usize {
        self.data.iter().filter(|&&a| a > 0.0 && a < 1.0).count()
    }
}
