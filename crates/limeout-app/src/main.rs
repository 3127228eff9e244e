//! Limeout - background removal and stabilization to transparent WebM.
//!
//! Usage:
//!   limeout probe <INPUT>             Show stream information
//!   limeout export <INPUT> [OPTIONS]  Key, stabilize and export
//!   limeout check                     Check that FFmpeg is available

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "limeout",
    about = "Chroma key, stabilize and export alpha video",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrictnessArg {
    /// Skip frames that fail to encode
    Skip,
    /// Stop at the first frame that fails to encode
    Abort,
}

/// Export options layered over the config file.
#[derive(clap::Args)]
pub struct ExportArgs {
    /// Input video
    pub input: PathBuf,

    /// Output file (.webm); defaults to <input>_transparent.webm
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON pipeline config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Key color: green, blue or #RRGGBB
    #[arg(long)]
    pub key: Option<String>,

    /// Key tolerance [0, 1]
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Feather width in pixels
    #[arg(long)]
    pub feather: Option<u32>,

    /// Spill suppression strength [0, 1]
    #[arg(long)]
    pub spill: Option<f32>,

    /// Defringe strength [0, 1]
    #[arg(long)]
    pub defringe: Option<f32>,

    /// Matte erosion radius
    #[arg(long)]
    pub erode: Option<u32>,

    /// Matte dilation radius
    #[arg(long)]
    pub dilate: Option<u32>,

    /// Crop margins: left,top,right,bottom
    #[arg(long)]
    pub margins: Option<String>,

    /// Stabilization reference region: x,y,width,height
    #[arg(long)]
    pub region: Option<String>,

    /// Source frame the region is picked from
    #[arg(long)]
    pub reference_frame: Option<u64>,

    /// Search the whole frame when local tracking fails
    #[arg(long)]
    pub full_frame_search: bool,

    /// Output frame rate (defaults to the source rate)
    #[arg(long)]
    pub fps: Option<f64>,

    /// What to do with frames that fail to encode
    #[arg(long, value_enum)]
    pub strictness: Option<StrictnessArg>,

    /// VP9 constant quality (0-63, lower = better)
    #[arg(long)]
    pub crf: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show stream information for a video
    Probe {
        /// Path to the video
        input: PathBuf,
    },

    /// Remove the background and export a transparent WebM
    Export(ExportArgs),

    /// Check that ffmpeg and ffprobe can be found
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    match cli.command {
        Commands::Probe { input } => {
            commands::init_logging(level);
            commands::probe::run(input)
        }
        Commands::Export(args) => commands::export::run(args, cli.verbose),
        Commands::Check => {
            commands::init_logging(level);
            commands::check::run()
        }
    }
}
