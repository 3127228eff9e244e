//! Limeout Tracking - Template tracking and translational stabilization.

pub mod pyramid;
pub mod stabilize;
pub mod template;
pub mod warp;

pub use pyramid::{rgb_to_gray, GrayImage, ImagePyramid, IntegralImage};
pub use stabilize::{
    FrameCorrection, OffsetSample, StabilizationState, Stabilizer, StabilizerSettings,
    TrackedRegion, TrackingSignal, TrackingStatus,
};
pub use template::{MatchResult, Template, TemplateMatcher};
pub use warp::{translate, BorderFill, Interpolation};
