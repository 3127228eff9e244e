//! Video decoding to RGBA frames using FFmpeg via ffmpeg-sidecar.

use crate::probe::{MediaProbe, SourceInfo};
use crate::validate::validate_input_path;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use limeout_core::{Frame, LimeoutError, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A sequential stream of decoded frames.
///
/// Frames come out in increasing index order, fully opaque, all with the
/// dimensions reported by [`FrameSource::info`].
pub trait FrameSource: Send {
    fn info(&self) -> SourceInfo;

    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Video decoder using FFmpeg.
///
/// Spawns FFmpeg as a subprocess writing raw RGBA to stdout, so no FFmpeg
/// development headers are needed at build time.
pub struct VideoDecoder {
    path: PathBuf,
    child: FfmpegChild,
    events: FfmpegIterator,
    stream: StreamState,
}

/// Bookkeeping over the FFmpeg event stream, kept apart from the child
/// process so end-of-stream handling can run on any event sequence.
#[derive(Debug)]
struct StreamState {
    info: SourceInfo,
    /// Frames pulled from FFmpeg so far, including skipped ones.
    decoded: u64,
    start_frame: u64,
    last_error: Option<String>,
    finished: bool,
}

impl StreamState {
    fn new(info: SourceInfo, start_frame: u64) -> Self {
        Self {
            info,
            decoded: 0,
            start_frame,
            last_error: None,
            finished: false,
        }
    }

    fn next_from(&mut self, events: &mut impl Iterator<Item = FfmpegEvent>) -> Result<Option<Frame>> {
        while !self.finished {
            match events.next() {
                Some(FfmpegEvent::OutputFrame(out)) => {
                    let index = self.decoded;
                    self.decoded += 1;
                    if index < self.start_frame {
                        continue;
                    }
                    if (out.width, out.height) != (self.info.width, self.info.height) {
                        return Err(LimeoutError::Decoder(format!(
                            "frame {index} is {}x{}, expected {}x{}",
                            out.width, out.height, self.info.width, self.info.height
                        )));
                    }
                    let frame = Frame::from_rgba(out.width, out.height, out.data)?
                        .with_index(index, self.info.frame_rate);
                    return Ok(Some(frame));
                }
                Some(FfmpegEvent::Error(e)) => {
                    self.finished = true;
                    return Err(LimeoutError::Decoder(e));
                }
                Some(FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, msg)) => {
                    warn!(frame = self.decoded, message = %msg, "ffmpeg reported an error");
                    self.last_error = Some(msg);
                }
                Some(FfmpegEvent::Done) | None => {
                    self.finished = true;
                    // An error anywhere in the stream means the tail is missing
                    if let Some(msg) = self.last_error.take() {
                        return Err(LimeoutError::Decoder(format!(
                            "decoding stopped after {} frames: {msg}",
                            self.decoded
                        )));
                    }
                }
                Some(_) => {}
            }
        }
        Ok(None)
    }
}

impl VideoDecoder {
    /// Open a video file for decoding from the first frame.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a video file; frames before `start_frame` are decoded and dropped
    /// so the first returned frame is exact.
    pub fn open_at<P: AsRef<Path>>(path: P, start_frame: u64) -> Result<Self> {
        let path = path.as_ref();
        validate_input_path(path)?;
        let info = MediaProbe::probe(path)?.source_info()?;
        let path_str = path.to_string_lossy().to_string();

        info!(
            path = %path_str,
            width = info.width,
            height = info.height,
            fps = %info.frame_rate,
            start_frame,
            "Opening video file"
        );

        let mut child = FfmpegCommand::new()
            .hide_banner()
            .input(&path_str)
            .args(["-map", "0:v:0", "-an", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .output("-")
            .spawn()
            .map_err(|e| LimeoutError::Decoder(format!("failed to spawn ffmpeg: {e}")))?;
        let events = child
            .iter()
            .map_err(|e| LimeoutError::Decoder(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            child,
            events,
            stream: StreamState::new(info, start_frame),
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the next frame to be returned.
    pub fn current_frame(&self) -> u64 {
        self.stream.decoded.max(self.stream.start_frame)
    }
}

impl FrameSource for VideoDecoder {
    fn info(&self) -> SourceInfo {
        self.stream.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.stream.next_from(&mut self.events)
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        if !self.stream.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Frames held in memory, for tests and already-decoded clips.
#[derive(Debug, Clone)]
pub struct MemorySource {
    info: SourceInfo,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    /// All frames must share the given dimensions.
    pub fn new(info: SourceInfo, frames: Vec<Frame>) -> Result<Self> {
        if let Some(bad) = frames
            .iter()
            .find(|f| (f.width, f.height) != (info.width, info.height))
        {
            return Err(LimeoutError::invalid(format!(
                "frame {} is {}x{}, source is {}x{}",
                bad.index, bad.width, bad.height, info.width, info.height
            )));
        }
        Ok(Self {
            info,
            frames: frames.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
