//! Show stream information.

use std::path::PathBuf;

use anyhow::Context;
use limeout_media::{validate_input_path, MediaProbe};

pub fn run(input: PathBuf) -> anyhow::Result<()> {
    validate_input_path(&input)?;
    let probe = MediaProbe::probe(&input).with_context(|| format!("probing {}", input.display()))?;

    println!("File: {}", probe.path);
    println!("  Container: {}", probe.format);
    println!("  Duration: {}", probe.duration);
    println!();

    for v in &probe.video_streams {
        println!("Video stream #{}:", v.index);
        println!("  Codec: {} ({})", v.codec, v.pixel_format);
        println!("  Resolution: {}x{} @ {}", v.width, v.height, v.frame_rate);
        match v.frame_count {
            Some(n) => println!("  Frames: {n}"),
            None => println!("  Frames: unknown"),
        }
        if let Some(bps) = v.bit_rate {
            println!("  Bit rate: {} kbps", bps / 1000);
        }
    }

    Ok(())
}
