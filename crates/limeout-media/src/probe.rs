//! Media file probing through `ffprobe`, without a full decode.

use limeout_core::{FrameRate, LimeoutError, RationalTime, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Duration
    pub duration: RationalTime,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Container format
    pub format: String,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub pixel_format: String,
    /// Exact count when the container reports one, else estimated from duration.
    pub frame_count: Option<u64>,
    pub bit_rate: Option<u64>,
}

/// What a frame consumer needs to know about a source before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub frame_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Locate the `ffprobe` binary (sidecar download or `PATH`).
pub fn locate_ffprobe() -> Result<PathBuf> {
    let candidate = ffmpeg_sidecar::ffprobe::ffprobe_path();
    which::which(&candidate)
        .map_err(|_| LimeoutError::NotFound(format!("ffprobe not found ({})", candidate.display())))
}

impl MediaProbe {
    /// Probe a media file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(LimeoutError::NotFound(format!("File not found: {path_str}")));
        }

        let ffprobe = locate_ffprobe()?;
        debug!(path = %path_str, ffprobe = %ffprobe.display(), "Probing media");
        let output = Command::new(&ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "ffprobe failed");
            return Err(LimeoutError::Decoder(format!(
                "ffprobe failed on {path_str}: {}",
                stderr.trim()
            )));
        }

        Self::from_ffprobe_json(path_str, &String::from_utf8_lossy(&output.stdout))
    }

    /// Parse `ffprobe -print_format json -show_format -show_streams` output.
    pub fn from_ffprobe_json(path: String, json: &str) -> Result<Self> {
        let parsed: FfprobeOutput = serde_json::from_str(json)
            .map_err(|e| LimeoutError::Decoder(format!("unreadable ffprobe output: {e}")))?;

        let format_duration = parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok());

        let video_streams = parsed
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .filter_map(|s| {
                let width = s.width.filter(|&w| w > 0)?;
                let height = s.height.filter(|&h| h > 0)?;
                let frame_rate = s
                    .r_frame_rate
                    .as_deref()
                    .and_then(FrameRate::parse)
                    .or_else(|| s.avg_frame_rate.as_deref().and_then(FrameRate::parse))?;
                let duration = s
                    .duration
                    .as_deref()
                    .and_then(|d| d.parse::<f64>().ok())
                    .or(format_duration);
                let frame_count = s
                    .nb_frames
                    .as_deref()
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|&n| n > 0)
                    .or_else(|| {
                        duration.map(|d| (d * frame_rate.to_fps_f64()).round().max(0.0) as u64)
                    });
                Some(VideoStreamInfo {
                    index: s.index,
                    codec: s.codec_name.clone().unwrap_or_default(),
                    width,
                    height,
                    frame_rate,
                    pixel_format: s.pix_fmt.clone().unwrap_or_default(),
                    frame_count,
                    bit_rate: s.bit_rate.as_deref().and_then(|b| b.parse().ok()),
                })
            })
            .collect::<Vec<_>>();

        if video_streams.is_empty() {
            return Err(LimeoutError::UnsupportedFormat(format!(
                "{path} has no decodable video stream"
            )));
        }

        Ok(Self {
            path,
            duration: RationalTime::from_seconds_f64(format_duration.unwrap_or(0.0)),
            video_streams,
            format: parsed
                .format
                .and_then(|f| f.format_name)
                .unwrap_or_default(),
        })
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Source description for the primary video stream.
    pub fn source_info(&self) -> Result<SourceInfo> {
        let v = self
            .primary_video()
            .ok_or_else(|| LimeoutError::UnsupportedFormat(format!("{} has no video", self.path)))?;
        Ok(SourceInfo {
            width: v.width,
            height: v.height,
            frame_rate: v.frame_rate,
            frame_count: v.frame_count,
        })
    }
}
