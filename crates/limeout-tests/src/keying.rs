//! End-to-end keying through the pipeline.
//!
//! Exercises limeout-color, limeout-effects and limeout-pipeline together.

use limeout_color::{color_distance, rgb_to_hsv, ColorKey};
use limeout_core::{Frame, FrameRate};
use limeout_effects::{composite, Background, ChromaKeyEngine, ChromaKeyParams, CropMargins};
use limeout_media::{
    ExportCancel, ExportConfig, FrameExporter, MemoryEncoder, MemorySource, SourceInfo,
};
use limeout_pipeline::{BatchExport, FrameProcessor};
use limeout_tracking::{Stabilizer, StabilizerSettings};
use proptest::prelude::*;

// ── Helpers ────────────────────────────────────────────────────

const W: u32 = 64;
const H: u32 = 48;
const GREEN: [u8; 4] = [0, 255, 0, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

fn green_with_red_square(index: u64) -> Frame {
    let mut f = Frame::solid(W, H, GREEN);
    f.fill_rect(24, 16, 16, 16, RED);
    f.with_index(index, FrameRate::FPS_25)
}

fn in_square(x: u32, y: u32) -> bool {
    (24..40).contains(&x) && (16..32).contains(&y)
}

fn green_key(feather_width: u32) -> ChromaKeyParams {
    ChromaKeyParams {
        key: ColorKey::green_screen(),
        feather_width,
        ..Default::default()
    }
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn ten_frame_clip_keys_green_out_and_keeps_red() {
    let frames: Vec<Frame> = (0..10).map(green_with_red_square).collect();
    let info = SourceInfo {
        width: W,
        height: H,
        frame_rate: FrameRate::FPS_25,
        frame_count: Some(10),
    };
    let source = MemorySource::new(info, frames).unwrap();
    let stabilizer = Stabilizer::new(StabilizerSettings::default()).unwrap();
    let processor = FrameProcessor::new((W, H), green_key(0), stabilizer, CropMargins::NONE).unwrap();

    let encoder = MemoryEncoder::new();
    let session = FrameExporter::with_encoder(
        "/tmp/e2e.webm",
        (W, H),
        FrameRate::FPS_25,
        ExportConfig::default(),
        Box::new(encoder.clone()),
    )
    .unwrap();
    let report = BatchExport::new(&processor)
        .run(source, session, &ExportCancel::new(), |_| {})
        .unwrap();

    assert_eq!(report.summary.frames_written, 10);
    let encoded = encoder.frames();
    assert_eq!(encoded.len(), 10);
    for data in &encoded {
        for y in 0..H {
            for x in 0..W {
                let i = ((y * W + x) * 4) as usize;
                let expected = if in_square(x, y) { 255 } else { 0 };
                assert_eq!(data[i + 3], expected, "alpha at ({x}, {y})");
            }
        }
    }
}

#[test]
fn keying_leaves_source_frame_untouched() {
    let frame = green_with_red_square(0);
    let copy = frame.clone();
    let keyed = ChromaKeyEngine::key(&frame, &green_key(3)).unwrap();
    assert_eq!(frame, copy);
    assert_eq!(keyed.dimensions(), frame.dimensions());
}

#[test]
fn preview_background_never_reaches_export_data() {
    let frame = green_with_red_square(0);
    let keyed = ChromaKeyEngine::key(&frame, &green_key(2)).unwrap();
    let before = keyed.clone();
    let checker = composite(&keyed, &Background::default());
    let solid = composite(&keyed, &Background::Solid([255, 0, 255]));
    assert_eq!(keyed, before);
    assert_ne!(checker, solid);
    assert_eq!(checker.pixel(30, 20), solid.pixel(30, 20));
}

#[test]
fn wider_feather_never_narrows_transition_band() {
    let frame = green_with_red_square(0);
    let mut last = 0;
    for feather in [0, 1, 2, 4, 8] {
        let matte = ChromaKeyEngine::matte(&frame, &green_key(feather)).unwrap();
        let band = matte.partial_count();
        assert!(band >= last, "feather {feather}: band {band} < {last}");
        last = band;
    }
    assert!(last > 0);
}

#[test]
fn zero_strengths_give_threshold_plus_feather_alpha() {
    let frame = green_with_red_square(0);
    let params = ChromaKeyParams {
        spill_strength: 0.0,
        defringe_strength: 0.0,
        ..green_key(3)
    };
    let matte = ChromaKeyEngine::matte(&frame, &params).unwrap();
    let keyed = ChromaKeyEngine::key(&frame, &params).unwrap();
    for (i, (px, src)) in keyed.data.chunks_exact(4).zip(frame.data.chunks_exact(4)).enumerate() {
        assert_eq!(&px[..3], &src[..3]);
        assert_eq!(px[3], (matte.data[i] * 255.0).round() as u8);
    }
}

proptest! {
    #[test]
    fn far_colors_stay_opaque_with_hard_key(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let key = ColorKey::green_screen();
        let frame = Frame::solid(4, 4, [r, g, b, 255]);
        let keyed = ChromaKeyEngine::key(&frame, &ChromaKeyParams::hard(key)).unwrap();
        let far = color_distance(rgb_to_hsv(r, g, b), &key) >= key.tolerance;
        let alpha = keyed.pixel(1, 1)[3];
        prop_assert_eq!(alpha, if far { 255 } else { 0 });
    }
}
