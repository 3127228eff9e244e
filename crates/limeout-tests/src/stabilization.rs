//! Stabilization through the frame processor.

use glam::IVec2;
use limeout_color::ColorKey;
use limeout_core::{Frame, FrameRate, PixelRect};
use limeout_effects::{ChromaKeyParams, CropMargins};
use limeout_pipeline::FrameProcessor;
use limeout_tracking::{Stabilizer, StabilizerSettings, TrackingStatus};

// ── Helpers ────────────────────────────────────────────────────

const RED: [u8; 4] = [220, 20, 20, 255];
const REFERENCE: PixelRect = PixelRect::new(18, 14, 20, 20);

/// Green backdrop with a textured red marker whose top-left is `(x, y)`.
fn scene(x: u32, y: u32, index: u64) -> Frame {
    let mut f = Frame::solid(80, 60, [0, 200, 0, 255]);
    f.fill_rect(x, y, 16, 16, RED);
    f.fill_rect(x + 2, y + 2, 4, 4, [40, 0, 0, 255]);
    f.fill_rect(x + 9, y + 8, 5, 3, [120, 0, 60, 255]);
    f.with_index(index, FrameRate::FPS_30)
}

fn processor() -> FrameProcessor {
    let stabilizer = Stabilizer::new(StabilizerSettings::default()).unwrap();
    FrameProcessor::new(
        (80, 60),
        ChromaKeyParams::hard(ColorKey::green_screen()),
        stabilizer,
        CropMargins::NONE,
    )
    .unwrap()
}

/// Marker path: drifts right and down a pixel or two per frame.
fn path(i: u64) -> (u32, u32) {
    (20 + (i as u32 * 3) / 2, 16 + i as u32 % 3)
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn static_clip_keeps_constant_offset() {
    let mut p = processor();
    let mut state = p.select_region(&scene(20, 16, 0), REFERENCE).unwrap();
    for i in 0..10 {
        let out = p.process(&mut state, &scene(20, 16, i)).unwrap();
        assert_eq!(out.correction.offset, IVec2::ZERO);
        assert_eq!(out.correction.status, TrackingStatus::Tracking);
    }
}

#[test]
fn drifting_marker_is_held_in_place() {
    let mut p = processor();
    let mut state = p.select_region(&scene(20, 16, 0), REFERENCE).unwrap();
    for i in 1..10 {
        let (x, y) = path(i);
        let out = p.process(&mut state, &scene(x, y, i)).unwrap();
        assert_eq!(
            out.correction.offset,
            IVec2::new(20 - x as i32, 16 - y as i32),
            "frame {i}"
        );
        // Marker interior lands where it was in the reference frame
        assert_eq!(out.frame.pixel(28, 18), RED, "frame {i}");
        assert_eq!(out.frame.pixel(23, 19), [40, 0, 0, 255], "frame {i}");
    }
}

#[test]
fn reselecting_region_resets_offset() {
    let mut p = processor();
    let mut state = p.select_region(&scene(20, 16, 0), REFERENCE).unwrap();
    let moved = scene(27, 19, 1);
    p.process(&mut state, &moved).unwrap();
    assert_eq!(state.offset, IVec2::new(-7, -3));

    let mut fresh = p
        .select_region(&moved, PixelRect::new(25, 17, 20, 20))
        .unwrap();
    assert_eq!(fresh.offset, IVec2::ZERO);
    let out = p.process(&mut fresh, &moved).unwrap();
    assert_eq!(out.correction.offset, IVec2::ZERO);

    // The old state is stale and restarts against the new reference
    let out = p.process(&mut state, &scene(27, 19, 2)).unwrap();
    assert_eq!(out.correction.offset, IVec2::ZERO);
}

#[test]
fn concurrent_runs_use_independent_states() {
    let mut p = processor();
    p.select_region(&scene(20, 16, 0), REFERENCE).unwrap();
    let p = &p;

    let offsets: Vec<Vec<IVec2>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(move || {
                    let mut state = p.fresh_state();
                    (0..8)
                        .map(|i| {
                            let (x, y) = path(i);
                            p.process(&mut state, &scene(x, y, i)).unwrap().correction.offset
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(offsets.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(offsets[0][7], IVec2::new(20 - path(7).0 as i32, 16 - path(7).1 as i32));
}

#[test]
fn unarmed_processor_passes_motion_through() {
    let p = processor();
    let mut state = p.fresh_state();
    let out = p.process(&mut state, &scene(30, 20, 0)).unwrap();
    assert_eq!(out.correction.status, TrackingStatus::Unarmed);
    assert_eq!(out.frame.pixel(38, 22), RED);
}
