//! plate-scout - license plate recognition pipeline
//!
//! A pretrained plate detector and a pretrained OCR stack wired into three
//! frontends: an HTTP JSON API, a visual demo over a frame sequence, and a
//! one-shot CLI scan.

mod config;
mod demo;
mod server;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// plate-scout - license plate recognition toolkit
#[derive(Parser, Debug)]
#[command(name = "plate-scout")]
#[command(about = "License plate recognition - HTTP API, visual demo, one-shot scan")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP recognition API
    Serve,
    /// Play a frame sequence and log detected plates
    Demo,
    /// Recognize plates in a single image and print them
    Scan {
        /// Image file to scan
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_configuration(args.config.as_deref())?;

    match args.command {
        Command::Serve => {
            let reader = vision::build_reader(&config.models)?;
            // Models load before the runtime exists so artifact downloads can
            // run their own blocking fetch
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::run_server(config.server, reader))
        }
        Command::Demo => {
            let reader = vision::build_reader(&config.models)?;
            demo::run_demo(config.demo, reader)
        }
        Command::Scan { image } => {
            let reader = vision::build_reader(&config.models)?;
            scan_image(reader, &image)
        }
    }
}

/// Load the explicit config file, the platform default, or built-in defaults.
fn load_configuration(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let default_path = config_dir.join("config.toml");
        if default_path.exists() {
            let config = config::load_config(&default_path)
                .with_context(|| format!("failed to load config from {}", default_path.display()))?;
            info!("Loaded configuration from {}", default_path.display());
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// One-shot scan: run the pipeline on a single image file.
fn scan_image(mut reader: vision::PlateReader, path: &Path) -> Result<()> {
    let image =
        image::open(path).with_context(|| format!("cannot open image {}", path.display()))?;

    let readings = reader.scan(&image)?;
    if readings.is_empty() {
        println!("no plates detected");
        return Ok(());
    }

    for reading in readings {
        println!(
            "{}\t({}, {}, {}, {})",
            reading.text,
            reading.region.x_min,
            reading.region.y_min,
            reading.region.x_max,
            reading.region.y_max
        );
    }
    Ok(())
}
