//! Fixed margin crop, applied after stabilization.

use limeout_core::{Frame, LimeoutError, Result};
use serde::{Deserialize, Serialize};

/// Pixels trimmed from each side of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CropMargins {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropMargins {
    pub const NONE: Self = Self::new(0, 0, 0, 0);

    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Same margin on all four sides.
    pub const fn uniform(margin: u32) -> Self {
        Self::new(margin, margin, margin, margin)
    }

    pub fn is_zero(self) -> bool {
        self == Self::NONE
    }

    /// Margins that keep the region `(x, y, w, h)`, clamped to the frame.
    ///
    /// The region is clamped so that at least one pixel survives.
    pub fn from_region(x: u32, y: u32, w: u32, h: u32, frame_w: u32, frame_h: u32) -> Self {
        let x = x.min(frame_w.saturating_sub(1));
        let y = y.min(frame_h.saturating_sub(1));
        let w = w.clamp(1, (frame_w - x).max(1));
        let h = h.clamp(1, (frame_h - y).max(1));
        Self::new(
            x,
            y,
            frame_w.saturating_sub(x + w),
            frame_h.saturating_sub(y + h),
        )
    }

    /// Parse `left,top,right,bottom`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            [l, t, r, b] => Some(Self::new(*l, *t, *r, *b)),
            _ => None,
        }
    }

    /// Output dimensions for a `width x height` input, or `InvalidMargin`
    /// when nothing would be left.
    pub fn output_dimensions(self, width: u32, height: u32) -> Result<(u32, u32)> {
        let horizontal = self.left as u64 + self.right as u64;
        let vertical = self.top as u64 + self.bottom as u64;
        if horizontal >= width as u64 || vertical >= height as u64 {
            return Err(LimeoutError::InvalidMargin {
                left: self.left,
                top: self.top,
                right: self.right,
                bottom: self.bottom,
                width,
                height,
            });
        }
        Ok((width - horizontal as u32, height - vertical as u32))
    }
}

/// Trim `margins` off `frame`. Index and timestamp carry over.
pub fn crop(frame: &Frame, margins: CropMargins) -> Result<Frame> {
    let (out_w, out_h) = margins.output_dimensions(frame.width, frame.height)?;
    if margins.is_zero() {
        return Ok(frame.clone());
    }

    let src_stride = frame.stride();
    let row_bytes = out_w as usize * 4;
    let col_offset = margins.left as usize * 4;
    let mut data = Vec::with_capacity(row_bytes * out_h as usize);
    for y in margins.top..margins.top + out_h {
        let start = y as usize * src_stride + col_offset;
        data.extend_from_slice(&frame.data[start..start + row_bytes]);
    }
    Ok(Frame::from_rgba(out_w, out_h, data)?.with_timing_of(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use limeout_core::FrameRate;
    use proptest::prelude::*;

    #[test]
    fn test_zero_margins_identity() {
        let frame = Frame::test_pattern(32, 8).with_index(7, FrameRate::FPS_25);
        let out = crop(&frame, CropMargins::NONE).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_crop_selects_region() {
        let mut frame = Frame::solid(6, 4, [0, 0, 0, 255]);
        frame.set_pixel(2, 1, [9, 9, 9, 255]);
        let out = crop(&frame, CropMargins::new(2, 1, 1, 1)).unwrap();
        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(out.pixel(0, 0), [9, 9, 9, 255]);
    }

    #[test]
    fn test_crop_rejects_consuming_margins() {
        let frame = Frame::solid(10, 10, [0, 0, 0, 255]);
        let err = crop(&frame, CropMargins::new(5, 0, 5, 0)).unwrap_err();
        assert!(matches!(err, LimeoutError::InvalidMargin { width: 10, .. }));
        assert!(crop(&frame, CropMargins::new(0, 0, 0, 10)).is_err());
        assert!(crop(&frame, CropMargins::new(0, u32::MAX, 0, 1)).is_err());
    }

    #[test]
    fn test_from_region_clamps() {
        assert_eq!(
            CropMargins::from_region(10, 20, 100, 50, 200, 100),
            CropMargins::new(10, 20, 90, 30)
        );
        let m = CropMargins::from_region(190, 0, 500, 500, 200, 100);
        assert_eq!(m.output_dimensions(200, 100).unwrap(), (10, 100));
        let m = CropMargins::from_region(500, 500, 0, 0, 200, 100);
        assert_eq!(m.output_dimensions(200, 100).unwrap(), (1, 1));
    }

    #[test]
    fn test_parse() {
        assert_eq!(CropMargins::parse("1,2,3,4"), Some(CropMargins::new(1, 2, 3, 4)));
        assert_eq!(CropMargins::parse("1,2"), None);
    }

    proptest! {
        #[test]
        fn crop_dimensions_add_up(
            w in 1u32..64, h in 1u32..64,
            l in 0u32..64, t in 0u32..64, r in 0u32..64, b in 0u32..64,
        ) {
            let frame = Frame::solid(w, h, [1, 2, 3, 255]);
            let margins = CropMargins::new(l, t, r, b);
            match crop(&frame, margins) {
                Ok(out) => {
                    prop_assert_eq!(out.width + l + r, w);
                    prop_assert_eq!(out.height + t + b, h);
                }
                Err(e) => {
                    let is_margin_error = matches!(e, LimeoutError::InvalidMargin { .. });
                    prop_assert!(is_margin_error);
                    prop_assert!(l + r >= w || t + b >= h);
                }
            }
        }
    }
}
