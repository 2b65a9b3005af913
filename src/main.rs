//! # street-matcher CLI
//!
//! Reconciles the datasets listed in a JSON config onto the basemap, or
//! merges a newer snapshot of one dataset into a previously written model.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use street_matcher::io::write_model;
use street_matcher::{pipeline, ReconcileConfig, Result};

/// Command-line interface for street-matcher
#[derive(Parser)]
#[command(name = "street-matcher")]
#[command(about = "Match foreign street networks and point datasets onto an OpenStreetMap basemap")]
#[command(long_about = "Match foreign street networks and point datasets onto an \
OpenStreetMap basemap:

  street-matcher run --config brno.json
  street-matcher update --config brno.json --model full_model.geojson \\
      --column city_census_id --input census_2024.geojson

Logging goes to stderr and follows RUST_LOG; -v raises it to debug.")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match every configured dataset and write the model to the configured output
    Run {
        /// JSON reconcile configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Merge a newer snapshot of one dataset into an existing model
    Update {
        /// JSON reconcile configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Previously written model
        #[arg(short, long)]
        model: PathBuf,
        /// Column (configured dataset) to update
        #[arg(long)]
        column: String,
        /// GeoJSON file with the new snapshot
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the updated model; overwrites --model when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut logger = env_logger::Builder::from_default_env();
    logger.target(env_logger::Target::Stderr);
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(LevelFilter::Info);
    }
    logger.init();

    if let Err(e) = run(cli.command) {
        error!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Run { config } => {
            let config = ReconcileConfig::load(&config)?;
            let model = pipeline::reconcile(&config)?;
            write_model(&config.output, &model)?;
            info!("Model written to {}", config.output.display());
        }
        Command::Update {
            config,
            model,
            column,
            input,
            output,
        } => {
            let config = ReconcileConfig::load(&config)?;
            let updated = pipeline::update(&config, &model, &column, &input)?;
            let output = output.unwrap_or(model);
            write_model(&output, &updated)?;
            info!("Updated model written to {}", output.display());
        }
    }
    Ok(())
}
