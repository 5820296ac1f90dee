//! Command-line interface for Clipper
//!
//! Handles argument parsing and logging configuration.

use crate::settings::Config;
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Clipper - record, trim and play back audio clips from the terminal
#[derive(Parser, Debug)]
#[command(name = "clipper")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Audio file to open at startup
    pub file: Option<PathBuf>,

    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Settings file (default: <config dir>/clipper/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Player command line, e.g. "aplay -q"
    #[arg(long)]
    pub player: Option<String>,

    /// Recording sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Directory for temporary audio files
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Width of the text waveform
    #[arg(long, default_value_t = 72)]
    pub columns: usize,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Apply flags on top of file settings
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(player) = &self.player {
            config.player_command = Some(player.clone());
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = Some(dir.clone());
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    builder.filter_module("clipper", args.log_level());

    // Native capture internals only at -vvv
    if args.verbose >= 3 {
        builder.filter_module("pipewire", args.log_level());
    }

    builder
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .init();
}
