//! Check that the FFmpeg tools are installed.

use limeout_media::check_tools;

pub fn run() -> anyhow::Result<()> {
    println!("Limeout System Check");
    println!("{}", "=".repeat(50));

    match check_tools() {
        Ok((ffmpeg, ffprobe)) => {
            println!("[OK] ffmpeg: {}", ffmpeg.display());
            println!("[OK] ffprobe: {}", ffprobe.display());
            Ok(())
        }
        Err(e) => {
            println!("[FAIL] {e}");
            anyhow::bail!("FFmpeg is required for probing and export")
        }
    }
}
