//! Key, stabilize and export a video to transparent WebM.

use std::io::Write;

use anyhow::{anyhow, Context};
use limeout_color::ColorKey;
use limeout_core::PixelRect;
use limeout_effects::{parse_hex_rgb, CropMargins};
use limeout_media::{default_output_path, ExportCancel, Strictness};
use limeout_pipeline::{export_video, ExportEvent, PipelineConfig};

use crate::{ExportArgs, StrictnessArg};

pub fn run(args: ExportArgs, verbose: bool) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, &args)?;
    config.validate().context("invalid export settings")?;

    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    super::init_logging(&level);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    println!("Exporting: {}", args.input.display());
    println!("  Output: {}", output.display());
    if let Some(region) = config.region {
        println!(
            "  Stabilizing on {}x{} at ({}, {}) from frame {}",
            region.width, region.height, region.x, region.y, config.reference_frame
        );
    }
    if !config.margins.is_zero() {
        let m = config.margins;
        println!("  Crop: left {} top {} right {} bottom {}", m.left, m.top, m.right, m.bottom);
    }

    let cancel = ExportCancel::new();
    let report = export_video(&args.input, &output, &config, &cancel, |event| match event {
        ExportEvent::Progress(p) => {
            match (p.percent(), p.eta_seconds) {
                (Some(pct), Some(eta)) => print!(
                    "\r  Progress: {pct:.1}% ({} frames, {:.1} fps, ETA: {eta:.0}s)  ",
                    p.current_frame, p.fps
                ),
                _ => print!("\r  Progress: {} frames ({:.1} fps)  ", p.current_frame, p.fps),
            }
            let _ = std::io::stdout().flush();
        }
        ExportEvent::TrackingLost { frame, offset } => {
            println!("\n  [WARN] Tracking lost at frame {frame}, holding offset ({}, {})", offset.x, offset.y);
        }
        ExportEvent::TrackingReacquired { frame, .. } => {
            println!("\n  Tracking reacquired at frame {frame}");
        }
        ExportEvent::FrameSkipped { frame, reason } => {
            println!("\n  [WARN] Skipped frame {frame}: {reason}");
        }
        ExportEvent::SourceEndedEarly {
            frames_read,
            expected,
        } => {
            println!("\n  [WARN] Source ended after {frames_read} of {expected} frames");
        }
    });

    match report {
        Ok(report) => {
            let s = &report.summary;
            println!("\nExport complete: {}", s.path.display());
            println!(
                "  {} frames written, {} skipped, {} retried ({}x{} @ {})",
                s.frames_written, s.frames_skipped, s.retries, s.width, s.height, s.frame_rate
            );
            if report.tracking_losses > 0 {
                println!("  Tracking was lost {} time(s)", report.tracking_losses);
            }
            Ok(())
        }
        Err(e) => {
            println!();
            Err(anyhow!(e).context(format!("export of {} failed", args.input.display())))
        }
    }
}

fn apply_overrides(config: &mut PipelineConfig, args: &ExportArgs) -> anyhow::Result<()> {
    if let Some(key) = &args.key {
        let tolerance = config.key.key.tolerance;
        config.key.key = parse_key(key)?;
        config.key.key.tolerance = tolerance;
    }
    if let Some(t) = args.tolerance {
        config.key.key.tolerance = t;
    }
    if let Some(f) = args.feather {
        config.key.feather_width = f;
    }
    if let Some(s) = args.spill {
        config.key.spill_strength = s;
    }
    if let Some(d) = args.defringe {
        config.key.defringe_strength = d;
    }
    if let Some(e) = args.erode {
        config.key.erode = e;
    }
    if let Some(d) = args.dilate {
        config.key.dilate = d;
    }
    if let Some(m) = &args.margins {
        config.margins = CropMargins::parse(m)
            .ok_or_else(|| anyhow!("margins must be left,top,right,bottom, got {m}"))?;
    }
    if let Some(r) = &args.region {
        config.region = Some(
            PixelRect::parse(r).ok_or_else(|| anyhow!("region must be x,y,width,height, got {r}"))?,
        );
    }
    if let Some(n) = args.reference_frame {
        config.reference_frame = n;
    }
    if args.full_frame_search {
        config.stabilizer.full_frame_fallback = true;
    }
    if args.fps.is_some() {
        config.fps = args.fps;
    }
    if let Some(s) = args.strictness {
        config.export.strictness = match s {
            StrictnessArg::Skip => Strictness::Skip,
            StrictnessArg::Abort => Strictness::Abort,
        };
    }
    if let Some(crf) = args.crf {
        config.export.vp9.crf = crf;
    }
    Ok(())
}

fn parse_key(s: &str) -> anyhow::Result<ColorKey> {
    match s.to_ascii_lowercase().as_str() {
        "green" => Ok(ColorKey::green_screen()),
        "blue" => Ok(ColorKey::blue_screen()),
        hex => parse_hex_rgb(hex)
            .map(|[r, g, b]| ColorKey::from_rgb(r, g, b))
            .ok_or_else(|| anyhow!("key must be green, blue or #RRGGBB, got {s}")),
    }
}
