//! Limeout Core - Foundation types for background removal
//!
//! This crate provides the fundamental types used throughout Limeout:
//! - RGBA frames and per-pixel alpha masks
//! - Time representation (RationalTime, FrameRate)
//! - Pixel-space geometry
//! - The shared error taxonomy

pub mod error;
pub mod frame;
pub mod geometry;
pub mod time;

pub use error::{ErrorKind, LimeoutError, Result};
pub use frame::{Frame, MaskFrame};
pub use geometry::{PixelRect, Vec2};
pub use time::{FrameRate, RationalTime};

/// Memory budget constants.
pub mod memory_budget {
    /// Number of decoded frames buffered ahead of the processing stage.
    pub const LOOKAHEAD_FRAMES: usize = 8;
}
