//! Export sessions driven by the batch pipeline.
//!
//! Uses the in-memory encoder so no FFmpeg binary is needed.

use limeout_color::ColorKey;
use limeout_core::{ErrorKind, Frame, FrameRate, LimeoutError};
use limeout_effects::{ChromaKeyParams, CropMargins};
use limeout_media::encoder::ffmpeg_args;
use limeout_media::{
    ExportCancel, ExportConfig, ExportSession, FrameExporter, MemoryEncoder, MemorySource,
    SessionStatus, SourceInfo, Strictness, Vp9Settings, WriteOutcome,
};
use limeout_pipeline::{BatchExport, ExportEvent, FrameProcessor};
use limeout_tracking::{Stabilizer, StabilizerSettings};
use std::path::Path;

// ── Helpers ────────────────────────────────────────────────────

fn source(frames: u64, width: u32, height: u32) -> MemorySource {
    let info = SourceInfo {
        width,
        height,
        frame_rate: FrameRate::FPS_24,
        frame_count: Some(frames),
    };
    let frames = (0..frames)
        .map(|i| {
            let mut f = Frame::solid(width, height, [0, 220, 0, 255]);
            f.fill_rect(4, 4, 8, 8, [200, 40, 40, 255]);
            f.with_index(i, FrameRate::FPS_24)
        })
        .collect();
    MemorySource::new(info, frames).unwrap()
}

fn processor(size: (u32, u32), margins: CropMargins) -> FrameProcessor {
    let stabilizer = Stabilizer::new(StabilizerSettings::default()).unwrap();
    FrameProcessor::new(size, ChromaKeyParams::hard(ColorKey::green_screen()), stabilizer, margins)
        .unwrap()
}

fn session(encoder: &MemoryEncoder, size: (u32, u32), config: ExportConfig) -> ExportSession {
    FrameExporter::with_encoder(
        "/tmp/integration.webm",
        size,
        FrameRate::FPS_24,
        config,
        Box::new(encoder.clone()),
    )
    .unwrap()
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn skipped_failures_leave_exactly_k_frames() {
    let p = processor((32, 24), CropMargins::NONE);
    let encoder = MemoryEncoder::new().failing_calls([2, 5]);
    let config = ExportConfig {
        retry_once: false,
        ..Default::default()
    };
    let mut skipped = Vec::new();
    let report = BatchExport::new(&p)
        .run(
            source(10, 32, 24),
            session(&encoder, (32, 24), config),
            &ExportCancel::new(),
            |e| {
                if let ExportEvent::FrameSkipped { frame, .. } = e {
                    skipped.push(frame);
                }
            },
        )
        .unwrap();

    assert_eq!(skipped, vec![2, 5]);
    assert_eq!(report.summary.frames_written, 8);
    assert_eq!(report.summary.frames_skipped, 2);
    assert_eq!(encoder.frame_count(), 8);
    assert_eq!(report.summary.status, SessionStatus::Finalized);
}

#[test]
fn abort_strictness_stops_and_finalizes() {
    let p = processor((32, 24), CropMargins::NONE);
    let encoder = MemoryEncoder::new().failing_calls([4, 5]);
    let config = ExportConfig {
        strictness: Strictness::Abort,
        ..Default::default()
    };
    let err = BatchExport::new(&p)
        .run(
            source(10, 32, 24),
            session(&encoder, (32, 24), config),
            &ExportCancel::new(),
            |_| {},
        )
        .unwrap_err();

    assert!(matches!(err, LimeoutError::SessionAbort { frames_written: 4, .. }));
    assert!(err.is_fatal());
    assert!(encoder.is_finished());
    assert_eq!(encoder.frame_count(), 4);
}

#[test]
fn frames_must_arrive_in_increasing_order() {
    let encoder = MemoryEncoder::new();
    let mut s = session(&encoder, (8, 8), ExportConfig::default());
    let frame = |i| Frame::solid(8, 8, [1, 2, 3, 255]).with_index(i, FrameRate::FPS_24);

    assert_eq!(s.write_frame(&frame(0)).unwrap(), WriteOutcome::Written);
    assert_eq!(s.write_frame(&frame(2)).unwrap(), WriteOutcome::Written);
    let err = s.write_frame(&frame(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(s.close().unwrap().frames_written, 2);
}

#[test]
fn cropped_odd_output_is_padded_for_encoding() {
    let p = processor((32, 24), CropMargins::new(1, 0, 0, 1));
    assert_eq!(p.output_size(), (31, 23));
    let encoder = MemoryEncoder::new();
    let report = BatchExport::new(&p)
        .run(
            source(3, 32, 24),
            session(&encoder, p.output_size(), ExportConfig::default()),
            &ExportCancel::new(),
            |_| {},
        )
        .unwrap();

    let s = &report.summary;
    assert_eq!((s.width, s.height), (31, 23));
    assert_eq!((s.encoded_width, s.encoded_height), (32, 24));
    assert!(encoder.frames().iter().all(|f| f.len() == 31 * 23 * 4));

    let args = ffmpeg_args(Path::new("out.webm"), 31, 23, FrameRate::FPS_24, &Vp9Settings::default());
    assert!(args.iter().any(|a| a.starts_with("pad=")));
    assert!(args.iter().any(|a| a == "yuva420p"));
}

#[test]
fn cancelled_before_start_yields_empty_finalized_output() {
    let p = processor((32, 24), CropMargins::NONE);
    let encoder = MemoryEncoder::new();
    let cancel = ExportCancel::new();
    cancel.cancel();
    let report = BatchExport::new(&p)
        .run(
            source(5, 32, 24),
            session(&encoder, (32, 24), ExportConfig::default()),
            &cancel,
            |_| {},
        )
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.summary.frames_written, 0);
    assert_eq!(report.summary.status, SessionStatus::Finalized);
    assert!(encoder.is_finished());
}

#[test]
fn margins_that_consume_the_frame_are_rejected() {
    let stabilizer = Stabilizer::new(StabilizerSettings::default()).unwrap();
    let err = FrameProcessor::new(
        (32, 24),
        ChromaKeyParams::default(),
        stabilizer,
        CropMargins::new(0, 12, 0, 12),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}
