//! Limeout Effects - CPU frame transforms
//!
//! Everything in this crate is a pure per-frame function: chroma keying,
//! matte operations, margin cropping and preview compositing. None of them
//! hold state between calls, so they can be re-run freely while scrubbing.

pub mod chroma_key;
pub mod crop;
pub mod matte;
pub mod preview;

pub use chroma_key::{ChromaKeyEngine, ChromaKeyParams};
pub use crop::{crop, CropMargins};
pub use preview::{composite, overlay_crosshair, parse_hex_rgb, Background};
