//! Clipper - a terminal audio clipper for Linux
//!
//! This is the main entry point for the Clipper application.

use anyhow::Context;
use clap::Parser;
use clipper::cli::{self, Args};
use clipper::settings::Config;
use log::info;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and initialize logging
    let args = Args::parse();
    cli::init_logging(&args);

    info!("Starting Clipper");

    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid settings")?;

    clipper::app::run(&args, &config)
}
