//! Export sessions: ordered, alpha-preserving frame output.
//!
//! An [`ExportSession`] owns one encoder for the whole run. Frames must arrive
//! with strictly increasing indices. A frame that fails to encode is retried
//! once (when configured), then skipped or the session is aborted depending on
//! [`Strictness`]. Every exit path finalizes the encoder, so the output stays
//! playable up to the last frame that was written.

use crate::encoder::{encoded_dimensions, FfmpegEncoder, FrameEncoder, Vp9Settings};
use crate::validate::validate_output_path;
use limeout_core::{Frame, FrameRate, LimeoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Span};
use uuid::Uuid;

/// What to do when a frame cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Log a warning, count the frame as skipped and continue.
    #[default]
    Skip,
    /// Finalize what has been written and stop.
    Abort,
}

/// Export session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub strictness: Strictness,
    /// Retry a failed frame once before applying `strictness`.
    pub retry_once: bool,
    pub vp9: Vp9Settings,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Skip,
            retry_once: true,
            vp9: Vp9Settings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Open,
    Finalized,
    Aborted,
}

/// Result of a single [`ExportSession::write_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Written on the second attempt.
    Retried,
    /// Not written; the session continues.
    Skipped { reason: String },
}

/// Final counters of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub session_id: Uuid,
    pub path: PathBuf,
    pub status: SessionStatus,
    pub frames_written: u64,
    pub frames_skipped: u64,
    pub retries: u64,
    pub width: u32,
    pub height: u32,
    /// Stream size after even-dimension padding.
    pub encoded_width: u32,
    pub encoded_height: u32,
    pub frame_rate: FrameRate,
}

/// Opens export sessions.
pub struct FrameExporter;

impl FrameExporter {
    /// Open a VP9/WebM session backed by an FFmpeg child process.
    pub fn open(
        path: impl AsRef<Path>,
        dimensions: (u32, u32),
        frame_rate: FrameRate,
        config: ExportConfig,
    ) -> Result<ExportSession> {
        let path = validate_output_path(path.as_ref())?;
        check_stream_params(dimensions, frame_rate)?;
        let (width, height) = dimensions;
        let encoder = FfmpegEncoder::spawn(&path, width, height, frame_rate, &config.vp9)?;
        Self::with_encoder(path, dimensions, frame_rate, config, Box::new(encoder))
    }

    /// Open a session over any encoder backend.
    pub fn with_encoder(
        path: impl Into<PathBuf>,
        dimensions: (u32, u32),
        frame_rate: FrameRate,
        config: ExportConfig,
        encoder: Box<dyn FrameEncoder>,
    ) -> Result<ExportSession> {
        check_stream_params(dimensions, frame_rate)?;
        let path = path.into();
        let id = Uuid::new_v4();
        let span = info_span!("export_session", id = %id, output = %path.display());
        {
            let _enter = span.enter();
            info!(
                width = dimensions.0,
                height = dimensions.1,
                fps = %frame_rate,
                encoder = encoder.name(),
                strictness = ?config.strictness,
                "Export session opened"
            );
        }
        Ok(ExportSession {
            id,
            path,
            width: dimensions.0,
            height: dimensions.1,
            frame_rate,
            config,
            encoder,
            status: SessionStatus::Open,
            last_index: None,
            frames_written: 0,
            frames_skipped: 0,
            retries: 0,
            scratch: Vec::new(),
            span,
        })
    }
}

fn check_stream_params(dimensions: (u32, u32), frame_rate: FrameRate) -> Result<()> {
    if dimensions.0 == 0 || dimensions.1 == 0 {
        return Err(LimeoutError::invalid(format!(
            "export dimensions must be non-zero, got {}x{}",
            dimensions.0, dimensions.1
        )));
    }
    if !frame_rate.is_valid() {
        return Err(LimeoutError::invalid(format!(
            "invalid export frame rate {}/{}",
            frame_rate.numerator, frame_rate.denominator
        )));
    }
    Ok(())
}

/// An open output file receiving frames in order.
pub struct ExportSession {
    id: Uuid,
    path: PathBuf,
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    config: ExportConfig,
    encoder: Box<dyn FrameEncoder>,
    status: SessionStatus,
    last_index: Option<u64>,
    frames_written: u64,
    frames_skipped: u64,
    retries: u64,
    scratch: Vec<u8>,
    span: Span,
}

impl ExportSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Write the next frame.
    ///
    /// Returns `Err(SessionAbort)` when the session had to stop; it is already
    /// finalized in that case. Out-of-order frames are rejected with
    /// `InvalidParameter` and leave the session untouched.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<WriteOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.status != SessionStatus::Open {
            return Err(LimeoutError::invalid(format!(
                "export session is {:?}, cannot write frame {}",
                self.status, frame.index
            )));
        }
        if let Some(last) = self.last_index {
            if frame.index <= last {
                return Err(LimeoutError::invalid(format!(
                    "frame {} arrived after frame {last}; frames must be strictly increasing",
                    frame.index
                )));
            }
        }

        if (frame.width, frame.height) != (self.width, self.height) {
            let reason = format!(
                "frame is {}x{}, session is {}x{}",
                frame.width, frame.height, self.width, self.height
            );
            return self.handle_failure(frame.index, reason);
        }

        self.prepare(frame);
        let first = self.encoder.encode(&self.scratch);
        let outcome = match first {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(e) => {
                let reason = failure_reason(e);
                warn!(frame = frame.index, reason = %reason, "Frame encode failed");
                if !self.encoder.is_healthy() {
                    return Err(self.abort_inner(format!("encoder broke at frame {}: {reason}", frame.index)));
                }
                if self.config.retry_once {
                    match self.encoder.encode(&self.scratch) {
                        Ok(()) => {
                            self.retries += 1;
                            Ok(WriteOutcome::Retried)
                        }
                        Err(e) => Err(failure_reason(e)),
                    }
                } else {
                    Err(reason)
                }
            }
        };

        match outcome {
            Ok(written) => {
                self.frames_written += 1;
                self.last_index = Some(frame.index);
                Ok(written)
            }
            Err(reason) => {
                if !self.encoder.is_healthy() {
                    return Err(self.abort_inner(format!("encoder broke at frame {}: {reason}", frame.index)));
                }
                self.handle_failure(frame.index, reason)
            }
        }
    }

    /// Copy the frame into the scratch buffer with RGB zeroed under alpha 0.
    fn prepare(&mut self, frame: &Frame) {
        self.scratch.clear();
        self.scratch.extend_from_slice(&frame.data);
        for px in self.scratch.chunks_exact_mut(4) {
            if px[3] == 0 {
                px[..3].fill(0);
            }
        }
    }

    fn handle_failure(&mut self, index: u64, reason: String) -> Result<WriteOutcome> {
        match self.config.strictness {
            Strictness::Skip => {
                warn!(frame = index, reason = %reason, "Skipping frame");
                self.frames_skipped += 1;
                self.last_index = Some(index);
                Ok(WriteOutcome::Skipped { reason })
            }
            Strictness::Abort => Err(self.abort_inner(format!("frame {index}: {reason}"))),
        }
    }

    /// Stop the session: finalize the encoder and return the abort error.
    pub fn abort(&mut self, reason: impl Into<String>) -> LimeoutError {
        let span = self.span.clone();
        let _enter = span.enter();
        self.abort_inner(reason.into())
    }

    fn abort_inner(&mut self, reason: String) -> LimeoutError {
        if self.status == SessionStatus::Open {
            if let Err(e) = self.encoder.finish() {
                warn!(error = %e, "Encoder finalize failed during abort");
            }
            self.status = SessionStatus::Aborted;
            warn!(
                frames_written = self.frames_written,
                reason = %reason,
                "Export session aborted"
            );
        }
        LimeoutError::SessionAbort {
            frames_written: self.frames_written,
            reason,
        }
    }

    /// Flush and finalize the output.
    pub fn close(mut self) -> Result<ExportSummary> {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.status == SessionStatus::Open {
            if let Err(e) = self.encoder.finish() {
                self.status = SessionStatus::Aborted;
                return Err(LimeoutError::SessionAbort {
                    frames_written: self.frames_written,
                    reason: format!("finalize failed: {}", failure_reason(e)),
                });
            }
            self.status = SessionStatus::Finalized;
            info!(
                frames_written = self.frames_written,
                frames_skipped = self.frames_skipped,
                retries = self.retries,
                "Export session finalized"
            );
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> ExportSummary {
        let (encoded_width, encoded_height) = encoded_dimensions(self.width, self.height);
        ExportSummary {
            session_id: self.id,
            path: self.path.clone(),
            status: self.status,
            frames_written: self.frames_written,
            frames_skipped: self.frames_skipped,
            retries: self.retries,
            width: self.width,
            height: self.height,
            encoded_width,
            encoded_height,
            frame_rate: self.frame_rate,
        }
    }
}

impl Drop for ExportSession {
    fn drop(&mut self) {
        if self.status == SessionStatus::Open {
            let _enter = self.span.enter();
            warn!("Export session dropped while open, finalizing");
            if let Err(e) = self.encoder.finish() {
                warn!(error = %e, "Encoder finalize failed on drop");
            }
            self.status = SessionStatus::Finalized;
        }
    }
}

fn failure_reason(e: LimeoutError) -> String {
    match e {
        LimeoutError::EncodeFailure { reason, .. } => reason,
        other => other.to_string(),
    }
}

// ── Progress and cancellation ───────────────────────────────────

/// Export progress information.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Frames handled so far (written or skipped).
    pub current_frame: u64,
    /// Total frames to render, when known.
    pub total_frames: Option<u64>,
    /// Estimated time remaining in seconds.
    pub eta_seconds: Option<f64>,
    /// Frames per second (processing speed).
    pub fps: f64,
}

impl ExportProgress {
    pub fn new(current_frame: u64, total_frames: Option<u64>, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let fps = if secs > 0.0 {
            current_frame as f64 / secs
        } else {
            0.0
        };
        let eta_seconds = total_frames
            .filter(|_| fps > 0.0)
            .map(|total| total.saturating_sub(current_frame) as f64 / fps);
        Self {
            current_frame,
            total_frames,
            eta_seconds,
            fps,
        }
    }

    /// Completion fraction (0.0 to 1.0), when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_frames {
            Some(0) | None => None,
            Some(total) => Some((self.current_frame as f64 / total as f64).min(1.0)),
        }
    }

    /// Completion percentage (0 to 100), when the total is known.
    pub fn percent(&self) -> Option<f64> {
        self.fraction().map(|f| f * 100.0)
    }
}

/// Handle for cancelling an in-progress export.
#[derive(Debug, Clone)]
pub struct ExportCancel(Arc<AtomicBool>);

impl ExportCancel {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ExportCancel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MemoryEncoder;
    use limeout_core::ErrorKind;

    fn frame(i: u64) -> Frame {
        Frame::solid(4, 2, [200, 10, 10, 255]).with_index(i, FrameRate::FPS_30)
    }

    fn session(config: ExportConfig, encoder: &MemoryEncoder) -> ExportSession {
        FrameExporter::with_encoder(
            "/tmp/test.webm",
            (4, 2),
            FrameRate::FPS_30,
            config,
            Box::new(encoder.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_writes_in_order_and_finalizes() {
        let enc = MemoryEncoder::new();
        let mut s = session(ExportConfig::default(), &enc);
        for i in 0..5 {
            assert_eq!(s.write_frame(&frame(i)).unwrap(), WriteOutcome::Written);
        }
        let summary = s.close().unwrap();
        assert_eq!(summary.frames_written, 5);
        assert_eq!(summary.status, SessionStatus::Finalized);
        assert_eq!(enc.frame_count(), 5);
        assert!(enc.is_finished());
    }

    #[test]
    fn test_rejects_non_increasing_index() {
        let enc = MemoryEncoder::new();
        let mut s = session(ExportConfig::default(), &enc);
        s.write_frame(&frame(3)).unwrap();
        let err = s.write_frame(&frame(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(s.write_frame(&frame(2)).is_err());
        assert_eq!(s.status(), SessionStatus::Open);
        s.write_frame(&frame(4)).unwrap();
        assert_eq!(enc.frame_count(), 2);
    }

    #[test]
    fn test_transparent_pixels_are_zeroed() {
        let enc = MemoryEncoder::new();
        let mut s = session(ExportConfig::default(), &enc);
        let mut f = frame(0);
        f.set_pixel(1, 0, [0, 255, 0, 0]);
        f.set_pixel(2, 0, [0, 255, 0, 1]);
        s.write_frame(&f).unwrap();
        let out = &enc.frames()[0];
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(&out[8..12], &[0, 255, 0, 1]);
        // Source frame is not modified
        assert_eq!(f.pixel(1, 0), [0, 255, 0, 0]);
    }

    #[test]
    fn test_retry_recovers_transient_failure() {
        let enc = MemoryEncoder::new().failing_calls([1]);
        let mut s = session(ExportConfig::default(), &enc);
        s.write_frame(&frame(0)).unwrap();
        assert_eq!(s.write_frame(&frame(1)).unwrap(), WriteOutcome::Retried);
        let summary = s.close().unwrap();
        assert_eq!(summary.frames_written, 2);
        assert_eq!(summary.retries, 1);
    }

    #[test]
    fn test_skip_strictness_yields_exactly_k_frames() {
        // Calls 1 and 2 fail: frame 1 fails its write and its retry
        let enc = MemoryEncoder::new().failing_calls([1, 2]);
        let mut s = session(ExportConfig::default(), &enc);
        let mut skipped = 0;
        for i in 0..6 {
            if let WriteOutcome::Skipped { .. } = s.write_frame(&frame(i)).unwrap() {
                skipped += 1;
            }
        }
        assert_eq!(skipped, 1);
        let summary = s.close().unwrap();
        assert_eq!(summary.frames_written, 5);
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(enc.frame_count(), 5);
    }

    #[test]
    fn test_abort_strictness_finalizes() {
        let enc = MemoryEncoder::new().failing_calls([2]);
        let config = ExportConfig {
            strictness: Strictness::Abort,
            retry_once: false,
            ..Default::default()
        };
        let mut s = session(config, &enc);
        s.write_frame(&frame(0)).unwrap();
        s.write_frame(&frame(1)).unwrap();
        let err = s.write_frame(&frame(2)).unwrap_err();
        assert!(matches!(
            err,
            LimeoutError::SessionAbort {
                frames_written: 2,
                ..
            }
        ));
        assert_eq!(s.status(), SessionStatus::Aborted);
        assert!(enc.is_finished());
        assert!(s.write_frame(&frame(3)).is_err());
    }

    #[test]
    fn test_broken_encoder_always_aborts() {
        let enc = MemoryEncoder::new().breaking_at(1);
        let mut s = session(ExportConfig::default(), &enc);
        s.write_frame(&frame(0)).unwrap();
        let err = s.write_frame(&frame(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionAbort);
        assert!(enc.is_finished());
        let summary = s.close().unwrap();
        assert_eq!(summary.status, SessionStatus::Aborted);
        assert_eq!(summary.frames_written, 1);
    }

    #[test]
    fn test_dimension_mismatch_is_not_retried() {
        let enc = MemoryEncoder::new();
        let mut s = session(ExportConfig::default(), &enc);
        let wrong = Frame::solid(2, 2, [1, 1, 1, 255]).with_index(0, FrameRate::FPS_30);
        assert!(matches!(
            s.write_frame(&wrong).unwrap(),
            WriteOutcome::Skipped { .. }
        ));
        assert_eq!(s.summary().retries, 0);
        assert_eq!(enc.frame_count(), 0);
    }

    #[test]
    fn test_drop_finalizes_open_session() {
        let enc = MemoryEncoder::new();
        {
            let mut s = session(ExportConfig::default(), &enc);
            s.write_frame(&frame(0)).unwrap();
        }
        assert!(enc.is_finished());
        assert_eq!(enc.frame_count(), 1);
    }

    #[test]
    fn test_explicit_abort() {
        let enc = MemoryEncoder::new();
        let mut s = session(ExportConfig::default(), &enc);
        s.write_frame(&frame(0)).unwrap();
        let err = s.abort("cancelled by user");
        assert!(matches!(err, LimeoutError::SessionAbort { frames_written: 1, .. }));
        assert!(enc.is_finished());
    }

    #[test]
    fn test_open_rejects_bad_params() {
        let enc = MemoryEncoder::new();
        let bad = FrameExporter::with_encoder(
            "/tmp/x.webm",
            (0, 10),
            FrameRate::FPS_30,
            ExportConfig::default(),
            Box::new(enc.clone()),
        );
        assert!(bad.is_err());
        assert!(FrameExporter::open("/tmp/x.mp4", (4, 4), FrameRate::FPS_30, ExportConfig::default()).is_err());
    }

    #[test]
    fn test_summary_reports_padding() {
        let enc = MemoryEncoder::new();
        let s = FrameExporter::with_encoder(
            "/tmp/odd.webm",
            (5, 3),
            FrameRate::FPS_24,
            ExportConfig::default(),
            Box::new(enc),
        )
        .unwrap();
        let summary = s.close().unwrap();
        assert_eq!((summary.encoded_width, summary.encoded_height), (6, 4));
    }

    #[test]
    fn test_progress() {
        let p = ExportProgress::new(50, Some(200), Duration::from_secs(5));
        assert!((p.fps - 10.0).abs() < 1e-9);
        assert!((p.fraction().unwrap() - 0.25).abs() < 1e-9);
        assert!((p.percent().unwrap() - 25.0).abs() < 1e-9);
        assert!((p.eta_seconds.unwrap() - 15.0).abs() < 1e-9);
        let unknown = ExportProgress::new(10, None, Duration::ZERO);
        assert_eq!(unknown.fraction(), None);
        assert_eq!(unknown.eta_seconds, None);
    }

    #[test]
    fn test_cancel_handle() {
        let cancel = ExportCancel::new();
        let other = cancel.clone();
        assert!(!cancel.is_cancelled());
        other.cancel();
        assert!(cancel.is_cancelled());
    }
}
