//! Limeout Color - HSV conversion and key color distance.

pub mod hsv;
pub mod key;

pub use hsv::{hue_distance, rgb_to_hsv, to_hsv, Hsv, HsvFrame};
pub use key::{color_distance, ColorKey};
