//! Limeout Media - FFmpeg integration for video I/O
//!
//! This crate handles:
//! - Media file probing
//! - Video decoding to RGBA frames
//! - Alpha-preserving VP9/WebM export sessions

pub mod decoder;
pub mod encoder;
pub mod export;
pub mod probe;
pub mod validate;

pub use decoder::{FrameSource, MemorySource, VideoDecoder};
pub use encoder::{FfmpegEncoder, FrameEncoder, MemoryEncoder, Vp9Settings};
pub use export::{
    ExportCancel, ExportConfig, ExportProgress, ExportSession, ExportSummary, FrameExporter,
    SessionStatus, Strictness, WriteOutcome,
};
pub use probe::{MediaProbe, SourceInfo, VideoStreamInfo};
pub use validate::{default_output_path, validate_input_path, validate_output_path};

/// Paths of the FFmpeg tools, or `NotFound` naming the first one missing.
pub fn check_tools() -> limeout_core::Result<(std::path::PathBuf, std::path::PathBuf)> {
    let ffmpeg = encoder::locate_ffmpeg()?;
    let ffprobe = probe::locate_ffprobe()?;
    tracing::debug!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "FFmpeg tools found");
    Ok((ffmpeg, ffprobe))
}
