//! Headless host for the bitstream analysis controller.
//!
//! Usage:
//!   analysis_app clip.hevc --format hevc              # Limited parse
//!   analysis_app clip.hevc -f hevc --parse-entire     # Whole file
//!   analysis_app capture.ts -f ts --stream 1 --json   # One stream, JSON report

mod platform;

use std::path::PathBuf;

use clap::Parser;

use platform::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "analysis_app")]
#[command(about = "Run a background bitstream analysis and report its results")]
pub(crate) struct Cli {
    /// Bitstream or container file to analyze
    pub path: PathBuf,

    /// Source format (hevc, vvc, avc, mpeg2, ts)
    #[arg(short = 'f', long)]
    pub format: String,

    /// Parse the entire file instead of a bounded prefix; overrides the stored preference
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub parse_entire: Option<bool>,

    /// Show only this stream (0-based); overrides the stored preference
    #[arg(short = 's', long)]
    pub stream: Option<usize>,

    /// Color-code packet and bitrate rows by stream; overrides the stored preference
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub color_code: Option<bool>,

    /// Hide the analysis surface after this many milliseconds
    #[arg(long)]
    pub hide_after_ms: Option<u64>,

    /// Log destination; overrides the stored preference
    #[arg(long, value_enum)]
    pub log: Option<LogDestination>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

fn main() -> anyhow::Result<()> {
    platform::run_app(Cli::parse())
}
