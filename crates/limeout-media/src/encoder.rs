//! Encoder backends behind the [`FrameEncoder`] seam.
//!
//! [`FfmpegEncoder`] pipes raw RGBA into an FFmpeg child producing VP9 with
//! an alpha plane in WebM. [`MemoryEncoder`] keeps frames in memory and can
//! inject failures, for tests.

use limeout_core::{FrameRate, LimeoutError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something that turns a sequence of RGBA buffers into an output file.
pub trait FrameEncoder: Send {
    /// Encode one tightly packed RGBA frame of the session's dimensions.
    fn encode(&mut self, rgba: &[u8]) -> Result<()>;

    /// Whether the encoder can still accept frames. A broken encoder never recovers.
    fn is_healthy(&self) -> bool;

    /// Flush and close the output. Called at most once.
    fn finish(&mut self) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// VP9 encoder tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vp9Settings {
    /// Constant quality (0-63, lower = better).
    pub crf: u32,
    /// libvpx speed/quality trade-off (0-8, higher = faster).
    pub cpu_used: u8,
    /// Row-based multithreading.
    pub row_mt: bool,
}

impl Default for Vp9Settings {
    fn default() -> Self {
        Self {
            crf: 30,
            cpu_used: 4,
            row_mt: true,
        }
    }
}

/// Locate the `ffmpeg` binary (sidecar download or `PATH`).
pub fn locate_ffmpeg() -> Result<PathBuf> {
    let candidate = ffmpeg_sidecar::paths::ffmpeg_path();
    which::which(&candidate)
        .map_err(|_| LimeoutError::NotFound(format!("ffmpeg not found ({})", candidate.display())))
}

/// Even-dimension padding filter, or `None` when both sides are already even.
pub fn pad_filter(width: u32, height: u32) -> Option<String> {
    (width % 2 != 0 || height % 2 != 0)
        .then(|| "pad=ceil(iw/2)*2:ceil(ih/2)*2:0:0:color=black@0".to_string())
}

/// Dimensions of the encoded stream after padding.
pub fn encoded_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(2) * 2, height.div_ceil(2) * 2)
}

/// Build the FFmpeg arguments for an alpha-preserving VP9/WebM encode from stdin.
pub fn ffmpeg_args(
    output: &Path,
    width: u32,
    height: u32,
    rate: FrameRate,
    settings: &Vp9Settings,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostats".into(),
        "-y".into(),
        // Input from pipe (raw frames)
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        format!("{width}x{height}"),
        "-framerate".into(),
        format!("{}/{}", rate.numerator, rate.denominator),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some(filter) = pad_filter(width, height) {
        args.extend(["-vf".into(), filter]);
    }

    args.extend([
        "-c:v".into(),
        "libvpx-vp9".into(),
        "-pix_fmt".into(),
        "yuva420p".into(),
        // Alt-ref frames drop the alpha plane
        "-auto-alt-ref".into(),
        "0".into(),
        "-crf".into(),
        settings.crf.to_string(),
        "-b:v".into(),
        "0".into(),
        "-cpu-used".into(),
        settings.cpu_used.to_string(),
        "-row-mt".into(),
        if settings.row_mt { "1" } else { "0" }.into(),
        "-an".into(),
        "-f".into(),
        "webm".into(),
    ]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// FFmpeg child process fed through its stdin.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frame_bytes: usize,
    broken: bool,
}

impl FfmpegEncoder {
    pub fn spawn(
        output: &Path,
        width: u32,
        height: u32,
        rate: FrameRate,
        settings: &Vp9Settings,
    ) -> Result<Self> {
        let ffmpeg = locate_ffmpeg()?;
        let args = ffmpeg_args(output, width, height, rate, settings);
        debug!(ffmpeg = %ffmpeg.display(), args = ?args, "Spawning encoder");

        let mut child = Command::new(&ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LimeoutError::EncodeFailure {
                frame: 0,
                reason: format!("failed to spawn ffmpeg: {e}"),
            })?;
        let stdin = child.stdin.take().ok_or_else(|| LimeoutError::EncodeFailure {
            frame: 0,
            reason: "failed to open ffmpeg stdin".into(),
        })?;

        info!(
            output = %output.display(),
            width,
            height,
            fps = %rate,
            "VP9 alpha encoder started"
        );
        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            frame_bytes: width as usize * height as usize * 4,
            broken: false,
        })
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn encode(&mut self, rgba: &[u8]) -> Result<()> {
        if rgba.len() != self.frame_bytes {
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: format!("expected {} bytes, got {}", self.frame_bytes, rgba.len()),
            });
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| LimeoutError::EncodeFailure {
            frame: 0,
            reason: "encoder already closed".into(),
        })?;
        if let Err(e) = stdin.write_all(rgba) {
            // A failed pipe write means ffmpeg is gone
            self.broken = true;
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: format!("failed to write frame: {e}"),
            });
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.broken && self.stdin.is_some()
    }

    fn finish(&mut self) -> Result<()> {
        // Close stdin to signal end-of-stream
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "ffmpeg exited with an error");
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: format!("ffmpeg exited with status {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ffmpeg-vp9"
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.finish();
        }
    }
}

/// Shared state of a [`MemoryEncoder`]; clones see the same frames.
#[derive(Debug, Default)]
pub struct MemoryEncoderState {
    pub frames: Vec<Vec<u8>>,
    pub calls: usize,
    pub finished: bool,
    pub broken: bool,
    failing_calls: HashSet<usize>,
    break_on_call: Option<usize>,
}

/// In-memory encoder with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryEncoder {
    state: Arc<Mutex<MemoryEncoderState>>,
}

impl MemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given `encode` calls (0-based) once each, staying healthy.
    pub fn failing_calls(self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.state.lock().failing_calls.extend(calls);
        self
    }

    /// Break permanently on the given `encode` call (0-based).
    pub fn breaking_at(self, call: usize) -> Self {
        self.state.lock().break_on_call = Some(call);
        self
    }

    /// Copies of every accepted frame, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

impl FrameEncoder for MemoryEncoder {
    fn encode(&mut self, rgba: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let call = state.calls;
        state.calls += 1;
        if state.broken || state.finished {
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: "encoder is closed".into(),
            });
        }
        if state.break_on_call == Some(call) {
            state.broken = true;
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: "broken pipe".into(),
            });
        }
        if state.failing_calls.remove(&call) {
            return Err(LimeoutError::EncodeFailure {
                frame: 0,
                reason: "transient failure".into(),
            });
        }
        state.frames.push(rgba.to_vec());
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        let state = self.state.lock();
        !state.broken && !state.finished
    }

    fn finish(&mut self) -> Result<()> {
        self.state.lock().finished = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
