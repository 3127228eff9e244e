//! Time representation for frame-accurate export
//!
//! Uses rational numbers to avoid floating-point accumulation errors, so a
//! frame's timestamp is exact no matter how far into the clip it sits.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A rational time value representing a point in time (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    value: Rational64,
}

impl RationalTime {
    /// Create a new RationalTime of `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            value: Rational64::new(numerator, denominator),
        }
    }

    /// Timestamp of frame `frames` at the given rate.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self {
            value: Rational64::new(frames * rate.denominator as i64, rate.numerator as i64),
        }
    }

    /// From seconds, rounded to the microsecond.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        const PRECISION: i64 = 1_000_000;
        Self {
            value: Rational64::new((seconds * PRECISION as f64).round() as i64, PRECISION),
        }
    }

    /// Convert to seconds as f64.
    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Convert to frame number at the given frame rate (floored).
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames_rational =
            self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames_rational.floor().to_integer()
    }

    /// Zero time constant.
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl Sub for RationalTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate a decimal rate such as `29.97` with a small rational.
    pub fn from_fps_f64(fps: f64) -> Option<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return None;
        }
        for known in Self::KNOWN {
            if (known.to_fps_f64() - fps).abs() < 0.005 {
                return Some(known);
            }
        }
        let ratio = Rational64::approximate_float(fps)?;
        let num = u32::try_from(*ratio.numer()).ok()?;
        let den = u32::try_from(*ratio.denom()).ok()?;
        Some(Self::new(num, den)).filter(|r| r.is_valid())
    }

    /// Parse ffprobe-style `"30000/1001"` or a plain decimal.
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once('/') {
            Some((n, d)) => {
                let rate = Self::new(n.trim().parse().ok()?, d.trim().parse().ok()?);
                rate.is_valid().then_some(rate)
            }
            None => Self::from_fps_f64(s.trim().parse().ok()?),
        }
    }

    /// Both terms non-zero.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame.
    #[inline]
    pub fn frame_duration(self) -> RationalTime {
        RationalTime::new(self.denominator as i64, self.numerator as i64)
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);

    const KNOWN: [Self; 8] = [
        Self::FPS_23_976,
        Self::FPS_24,
        Self::FPS_25,
        Self::FPS_29_97,
        Self::FPS_30,
        Self::FPS_50,
        Self::FPS_59_94,
        Self::FPS_60,
    ];
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_time_frames() {
        let rate = FrameRate::FPS_24;
        let time = RationalTime::from_frames(48, rate);
        assert_eq!(time.to_seconds_f64(), 2.0);
        assert_eq!(time.to_frames(rate), 48);
    }

    #[test]
    fn test_ntsc_timestamps_are_exact() {
        let rate = FrameRate::FPS_29_97;
        let t = RationalTime::from_frames(30_000, rate);
        assert_eq!(t, RationalTime::new(1001, 1));
        assert_eq!(t.to_frames(rate), 30_000);
    }

    #[test]
    fn test_parse_ffprobe_rate() {
        assert_eq!(FrameRate::parse("30000/1001"), Some(FrameRate::FPS_29_97));
        assert_eq!(FrameRate::parse("25/1"), Some(FrameRate::FPS_25));
        assert_eq!(FrameRate::parse("0/0"), None);
        assert_eq!(FrameRate::parse("23.976"), Some(FrameRate::FPS_23_976));
    }

    #[test]
    fn test_from_fps_f64_rejects_garbage() {
        assert_eq!(FrameRate::from_fps_f64(0.0), None);
        assert_eq!(FrameRate::from_fps_f64(f64::NAN), None);
        let odd = FrameRate::from_fps_f64(12.5).unwrap();
        assert!((odd.to_fps_f64() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_arithmetic() {
        let a = RationalTime::new(1, 2);
        let b = RationalTime::new(1, 4);
        assert_eq!((a + b).to_seconds_f64(), 0.75);
        assert_eq!((a - b).to_seconds_f64(), 0.25);
    }

    #[test]
    fn test_from_seconds() {
        assert_eq!(RationalTime::from_seconds_f64(10.01), RationalTime::new(1001, 100));
        assert_eq!(RationalTime::from_seconds_f64(0.0), RationalTime::ZERO);
    }
}
