//! Key color definition and the distance metric used for thresholding.

use crate::hsv::{hue_distance, rgb_to_hsv, Hsv};
use limeout_core::{Frame, LimeoutError, Result};
use serde::{Deserialize, Serialize};

/// Channel weights of the combined distance; they sum to 1.
const HUE_WEIGHT: f32 = 0.6;
const SATURATION_WEIGHT: f32 = 0.2;
const VALUE_WEIGHT: f32 = 0.2;

/// Normalized deviation that maps to distance 1.0.
const DISTANCE_SPAN: f32 = 2.0;

/// The background color to remove: an HSV center plus tolerance ranges.
///
/// Distances are measured per channel relative to the ranges, so a pixel
/// sitting on every range edge has [`color_distance`] 0.5. Pixels closer than
/// `tolerance` are keyed out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorKey {
    /// Center hue in degrees [0, 360)
    pub hue: f32,
    /// Center saturation [0, 1]
    pub saturation: f32,
    /// Center value [0, 1]
    pub value: f32,
    /// Hue half-width in degrees (0, 180]
    pub hue_range: f32,
    /// Saturation half-width (0, 1]
    pub saturation_range: f32,
    /// Value half-width (0, 1]
    pub value_range: f32,
    /// Threshold on [`color_distance`], [0, 1]
    pub tolerance: f32,
}

impl Default for ColorKey {
    fn default() -> Self {
        Self::green_screen()
    }
}

impl ColorKey {
    /// Green screen default.
    pub fn green_screen() -> Self {
        Self {
            hue: 120.0,
            saturation: 0.7,
            value: 0.7,
            hue_range: 40.0,
            saturation_range: 0.5,
            value_range: 0.5,
            tolerance: 0.5,
        }
    }

    /// Blue screen default.
    pub fn blue_screen() -> Self {
        Self {
            hue: 230.0,
            hue_range: 30.0,
            ..Self::green_screen()
        }
    }

    /// Key centered on an RGB color with the default green-screen ranges.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let hsv = rgb_to_hsv(r, g, b);
        Self {
            hue: hsv.h,
            saturation: hsv.s,
            value: hsv.v,
            ..Self::green_screen()
        }
    }

    /// Build a key from an HSV box (lower and upper bounds per channel).
    ///
    /// The hue bound may wrap through 0 (e.g. lower 340, upper 20).
    pub fn from_hsv_bounds(lower: Hsv, upper: Hsv) -> Result<Self> {
        let hue_span = (upper.h - lower.h).rem_euclid(360.0);
        let key = Self {
            hue: (lower.h + hue_span * 0.5).rem_euclid(360.0),
            saturation: (lower.s + upper.s) * 0.5,
            value: (lower.v + upper.v) * 0.5,
            hue_range: (hue_span * 0.5).max(0.5),
            saturation_range: ((upper.s - lower.s) * 0.5).max(0.005),
            value_range: ((upper.v - lower.v) * 0.5).max(0.005),
            tolerance: 0.5,
        };
        if upper.s < lower.s || upper.v < lower.v {
            return Err(LimeoutError::invalid(format!(
                "HSV bounds are inverted: lower {lower:?}, upper {upper:?}"
            )));
        }
        key.validate()?;
        Ok(key)
    }

    /// Eyedropper: key on the mean color of a square patch around `(x, y)`.
    pub fn sample(frame: &Frame, x: u32, y: u32, radius: u32) -> Result<Self> {
        if x >= frame.width || y >= frame.height {
            return Err(LimeoutError::invalid(format!(
                "sample point ({x}, {y}) outside {}x{} frame",
                frame.width, frame.height
            )));
        }
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = x.saturating_add(radius).min(frame.width - 1);
        let y1 = y.saturating_add(radius).min(frame.height - 1);
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for yy in y0..=y1 {
            for xx in x0..=x1 {
                let px = frame.pixel(xx, yy);
                for c in 0..3 {
                    sum[c] += px[c] as u64;
                }
                count += 1;
            }
        }
        let mean = |c: usize| ((sum[c] + count / 2) / count) as u8;
        Ok(Self::from_rgb(mean(0), mean(1), mean(2)))
    }

    /// Center as an HSV color.
    #[inline]
    pub fn center(&self) -> Hsv {
        Hsv::new(self.hue, self.saturation, self.value)
    }

    /// Reject malformed keys before any frame is touched.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            self.hue,
            self.saturation,
            self.value,
            self.hue_range,
            self.saturation_range,
            self.value_range,
            self.tolerance,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(LimeoutError::invalid("color key contains a non-finite value"));
        }
        if !(0.0..360.0).contains(&self.hue) {
            return Err(LimeoutError::invalid(format!(
                "key hue must be in [0, 360), got {}",
                self.hue
            )));
        }
        if !(0.0..=1.0).contains(&self.saturation) || !(0.0..=1.0).contains(&self.value) {
            return Err(LimeoutError::invalid(format!(
                "key saturation/value must be in [0, 1], got {}/{}",
                self.saturation, self.value
            )));
        }
        if self.hue_range <= 0.0 || self.hue_range > 180.0 {
            return Err(LimeoutError::invalid(format!(
                "hue range must be in (0, 180], got {}",
                self.hue_range
            )));
        }
        if self.saturation_range <= 0.0
            || self.saturation_range > 1.0
            || self.value_range <= 0.0
            || self.value_range > 1.0
        {
            return Err(LimeoutError::invalid(format!(
                "saturation/value ranges must be in (0, 1], got {}/{}",
                self.saturation_range, self.value_range
            )));
        }
        if !(0.0..=1.0).contains(&self.tolerance) {
            return Err(LimeoutError::invalid(format!(
                "tolerance must be in [0, 1], got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Hue similarity to the key in [0, 1]; 0 beyond twice the hue range.
    #[inline]
    pub fn hue_similarity(&self, hue: f32) -> f32 {
        (1.0 - hue_distance(hue, self.hue) / (2.0 * self.hue_range)).clamp(0.0, 1.0)
    }
}

/// Distance of a pixel from the key, in [0, 1].
///
/// Hue uses the circular distance; each channel is normalized by the key's
/// range before the weighted Euclidean combination.
#[inline]
pub fn color_distance(pixel: Hsv, key: &ColorKey) -> f32 {
    let dh = hue_distance(pixel.h, key.hue) / key.hue_range;
    let ds = (pixel.s - key.saturation).abs() / key.saturation_range;
    let dv = (pixel.v - key.value).abs() / key.value_range;
    let e = (HUE_WEIGHT * dh * dh + SATURATION_WEIGHT * ds * ds + VALUE_WEIGHT * dv * dv).sqrt();
    (e / DISTANCE_SPAN).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_center_has_zero_distance() {
        let key = ColorKey::green_screen();
        assert_eq!(color_distance(key.center(), &key), 0.0);
    }

    #[test]
    fn test_green_is_keyed_red_is_not() {
        let key = ColorKey::green_screen();
        let green = color_distance(rgb_to_hsv(0, 255, 0), &key);
        let red = color_distance(rgb_to_hsv(255, 0, 0), &key);
        assert!(green < key.tolerance, "green distance {green}");
        assert!(red >= key.tolerance, "red distance {red}");
        assert_eq!(red, 1.0);
    }

    #[test]
    fn test_range_edge_is_half() {
        let key = ColorKey::green_screen();
        let edge = Hsv::new(
            key.hue + key.hue_range,
            key.saturation + key.saturation_range,
            key.value - key.value_range,
        );
        assert!((color_distance(edge, &key) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_hue_wraps_around_zero() {
        let key = ColorKey {
            hue: 355.0,
            ..ColorKey::green_screen()
        };
        let near = Hsv::new(5.0, key.saturation, key.value);
        let far = Hsv::new(180.0, key.saturation, key.value);
        assert!(color_distance(near, &key) < color_distance(far, &key));
    }

    #[test]
    fn test_validate_rejects_bad_keys() {
        let good = ColorKey::green_screen();
        assert!(good.validate().is_ok());
        assert!(ColorKey { hue: 360.0, ..good }.validate().is_err());
        assert!(ColorKey { tolerance: 1.5, ..good }.validate().is_err());
        assert!(ColorKey { hue_range: 0.0, ..good }.validate().is_err());
        assert!(ColorKey { saturation: f32::NAN, ..good }.validate().is_err());
        assert!(ColorKey { value_range: -0.1, ..good }.validate().is_err());
    }

    #[test]
    fn test_from_hsv_bounds_matches_opencv_preset() {
        // OpenCV green preset: H 35..85 (half-degrees), S/V 50..255
        let lower = Hsv::new(70.0, 50.0 / 255.0, 50.0 / 255.0);
        let upper = Hsv::new(170.0, 1.0, 1.0);
        let key = ColorKey::from_hsv_bounds(lower, upper).unwrap();
        assert!((key.hue - 120.0).abs() < 1e-4);
        assert!((key.hue_range - 50.0).abs() < 1e-4);
        assert!(color_distance(rgb_to_hsv(20, 220, 30), &key) < key.tolerance);
    }

    #[test]
    fn test_from_hsv_bounds_wrapping_hue() {
        let key =
            ColorKey::from_hsv_bounds(Hsv::new(340.0, 0.2, 0.2), Hsv::new(20.0, 1.0, 1.0)).unwrap();
        assert!(key.hue.abs() < 1e-4 || (key.hue - 360.0).abs() < 1e-4);
        assert!((key.hue_range - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_sample_averages_patch() {
        let mut frame = Frame::solid(9, 9, [0, 200, 0, 255]);
        frame.set_pixel(0, 0, [255, 0, 0, 255]);
        let key = ColorKey::sample(&frame, 4, 4, 2).unwrap();
        assert!((key.hue - 120.0).abs() < 1e-3);
        assert!(ColorKey::sample(&frame, 9, 0, 1).is_err());
    }

    #[test]
    fn test_sample_huge_radius_clamps_to_frame() {
        let frame = Frame::solid(9, 9, [0, 200, 0, 255]);
        let key = ColorKey::sample(&frame, 4, 4, u32::MAX).unwrap();
        assert!((key.hue - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_hue_similarity() {
        let key = ColorKey::green_screen();
        assert_eq!(key.hue_similarity(120.0), 1.0);
        assert_eq!(key.hue_similarity(0.0), 0.0);
        assert!((key.hue_similarity(160.0) - 0.5).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn distance_stays_in_unit_range(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
            let d = color_distance(rgb_to_hsv(r, g, b), &ColorKey::green_screen());
            prop_assert!((0.0..=1.0).contains(&d));
        }
    }
}
