//! Batch export: decode ahead on a worker thread, process and write in order.

use crate::config::PipelineConfig;
use crate::processor::FrameProcessor;
use crossbeam_channel::{bounded, Receiver, Sender};
use glam::IVec2;
use limeout_core::memory_budget::LOOKAHEAD_FRAMES;
use limeout_core::{Frame, LimeoutError, Result};
use limeout_media::{
    ExportCancel, ExportProgress, ExportSession, ExportSummary, FrameExporter, FrameSource,
    VideoDecoder, WriteOutcome,
};
use limeout_tracking::TrackingSignal;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

/// Progress is reported every this many frames, and once at the end.
const PROGRESS_INTERVAL: u64 = 10;

/// Things the caller may want to show while an export runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Progress(ExportProgress),
    TrackingLost { frame: u64, offset: IVec2 },
    TrackingReacquired { frame: u64, offset: IVec2 },
    FrameSkipped { frame: u64, reason: String },
    /// The source stopped before the frame count it advertised.
    SourceEndedEarly { frames_read: u64, expected: u64 },
}

/// Outcome of a finished (or cancelled) export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub summary: ExportSummary,
    pub frames_read: u64,
    pub tracking_losses: u64,
    pub cancelled: bool,
    /// Fewer frames arrived than the source reported.
    pub ended_early: bool,
    pub elapsed: Duration,
}

/// Drives one export run over a [`FrameProcessor`].
pub struct BatchExport<'a> {
    processor: &'a FrameProcessor,
}

impl<'a> BatchExport<'a> {
    pub fn new(processor: &'a FrameProcessor) -> Self {
        Self { processor }
    }

    /// Export every frame of `source` into `session`.
    ///
    /// Tracking uses its own fresh state, so a preview running on the same
    /// processor is unaffected. The session is finalized on every path:
    /// closed on success or cancellation, aborted on a decode or processing
    /// failure.
    pub fn run<S: FrameSource>(
        &self,
        source: S,
        mut session: ExportSession,
        cancel: &ExportCancel,
        mut on_event: impl FnMut(ExportEvent),
    ) -> Result<ExportReport> {
        let info = source.info();
        if (info.width, info.height) != self.processor.source_size() {
            return Err(session.abort(format!(
                "source is {}x{}, processor expects {}x{}",
                info.width,
                info.height,
                self.processor.source_size().0,
                self.processor.source_size().1
            )));
        }
        if session.dimensions() != self.processor.output_size() {
            return Err(session.abort(format!(
                "session is {:?}, processed frames are {:?}",
                session.dimensions(),
                self.processor.output_size()
            )));
        }

        let span = info_span!("batch_export", session = %session.id());
        let _enter = span.enter();
        info!(total_frames = ?info.frame_count, lookahead = LOOKAHEAD_FRAMES, "Export started");

        let start = Instant::now();
        let (tx, rx) = bounded(LOOKAHEAD_FRAMES);
        let outcome = std::thread::scope(|scope| {
            let producer_cancel = cancel.clone();
            scope.spawn(move || decode_ahead(source, tx, &producer_cancel));
            let outcome = self.drive(&rx, &mut session, cancel, &mut on_event, info.frame_count, start);
            // Unblocks the producer if it is waiting on a full channel
            drop(rx);
            outcome
        });
        let Tally {
            frames_read,
            handled,
            tracking_losses,
            cancelled,
        } = outcome?;

        // drive already reported progress on an interval boundary
        if handled == 0 || handled % PROGRESS_INTERVAL != 0 {
            on_event(ExportEvent::Progress(ExportProgress::new(
                handled,
                info.frame_count,
                start.elapsed(),
            )));
        }

        let ended_early = match info.frame_count {
            Some(expected) if !cancelled && frames_read < expected => {
                warn!(frames_read, expected, "Source ended before its reported frame count");
                on_event(ExportEvent::SourceEndedEarly {
                    frames_read,
                    expected,
                });
                true
            }
            _ => false,
        };

        if cancelled {
            warn!(frames_written = session.frames_written(), "Export cancelled, finalizing partial output");
        }
        let summary = session.close()?;
        let elapsed = start.elapsed();
        info!(
            frames_written = summary.frames_written,
            frames_skipped = summary.frames_skipped,
            tracking_losses,
            elapsed_secs = elapsed.as_secs_f64(),
            "Export finished"
        );
        Ok(ExportReport {
            summary,
            frames_read,
            tracking_losses,
            cancelled,
            ended_early,
            elapsed,
        })
    }

    fn drive(
        &self,
        rx: &Receiver<Result<Frame>>,
        session: &mut ExportSession,
        cancel: &ExportCancel,
        on_event: &mut impl FnMut(ExportEvent),
        total: Option<u64>,
        start: Instant,
    ) -> Result<Tally> {
        let mut state = self.processor.fresh_state();
        let mut tally = Tally::default();

        for item in rx.iter() {
            if cancel.is_cancelled() {
                tally.cancelled = true;
                break;
            }
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return Err(session.abort(format!("decode failed: {e}"))),
            };
            tally.frames_read += 1;

            let processed = match self.processor.process(&mut state, &frame) {
                Ok(p) => p,
                Err(e) => {
                    return Err(session.abort(format!("processing frame {} failed: {e}", frame.index)))
                }
            };
            match processed.correction.signal {
                Some(TrackingSignal::Lost { frame, offset }) => {
                    tally.tracking_losses += 1;
                    on_event(ExportEvent::TrackingLost { frame, offset });
                }
                Some(TrackingSignal::Reacquired { frame, offset }) => {
                    on_event(ExportEvent::TrackingReacquired { frame, offset });
                }
                None => {}
            }

            if let WriteOutcome::Skipped { reason } = session.write_frame(&processed.frame)? {
                on_event(ExportEvent::FrameSkipped {
                    frame: frame.index,
                    reason,
                });
            }
            tally.handled += 1;
            if tally.handled % PROGRESS_INTERVAL == 0 {
                on_event(ExportEvent::Progress(ExportProgress::new(
                    tally.handled,
                    total,
                    start.elapsed(),
                )));
            }
        }
        // The producer stops on its own when cancelled; make sure we notice
        // even if the channel drained first.
        tally.cancelled |= cancel.is_cancelled();
        Ok(tally)
    }
}

#[derive(Debug, Default)]
struct Tally {
    frames_read: u64,
    handled: u64,
    tracking_losses: u64,
    cancelled: bool,
}

fn decode_ahead<S: FrameSource>(mut source: S, tx: Sender<Result<Frame>>, cancel: &ExportCancel) {
    while !cancel.is_cancelled() {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// Export a video file end to end: open the source, set up stabilization
/// from `config`, and write a transparent WebM to `output`.
pub fn export_video(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    cancel: &ExportCancel,
    on_event: impl FnMut(ExportEvent),
) -> Result<ExportReport> {
    config.validate()?;
    let source = VideoDecoder::open(input)?;
    let info = source.info();
    let mut processor = FrameProcessor::from_config(config, (info.width, info.height))?;

    if let Some(rect) = config.region {
        let mut reference_source = VideoDecoder::open_at(input, config.reference_frame)?;
        let reference = reference_source.next_frame()?.ok_or_else(|| {
            LimeoutError::invalid(format!(
                "reference frame {} is past the end of {}",
                config.reference_frame,
                input.display()
            ))
        })?;
        processor.select_region(&reference, rect)?;
    }

    let rate = config.output_frame_rate(info.frame_rate);
    let session = FrameExporter::open(output, processor.output_size(), rate, config.export.clone())?;
    BatchExport::new(&processor).run(source, session, cancel, on_event)
}
