use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goggles_core::FaceOutcome;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;

#[derive(Parser)]
#[command(name = "goggles", about = "Grayscale and glasses photo filters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a photo to grayscale
    Grayscale {
        /// Photo to process
        input: PathBuf,
        /// Write here instead of the gallery
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Draw glasses over every detected pair of eyes
    Glasses {
        /// Photo to process
        input: PathBuf,
        /// Glasses graphic with an alpha channel
        #[arg(short, long)]
        asset: Option<PathBuf>,
        /// Write here instead of the gallery
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print detected faces and eyes as JSON
    Detect {
        /// Photo to analyse
        input: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Grayscale { input, output } => {
            let engine = engine::spawn_engine(&config, false)?;
            engine.select(input).await?;
            engine.grayscale().await?;
            let path = engine.save(output).await?;
            println!("{}", path.display());
        }
        Commands::Glasses {
            input,
            asset,
            output,
        } => {
            if let Some(asset) = asset {
                config.glasses_asset = asset;
            }
            let engine = engine::spawn_engine(&config, true)?;
            engine.select(input).await?;
            let result = engine.glasses().await?;
            for (i, outcome) in result.outcomes.iter().enumerate() {
                if let FaceOutcome::Skipped(reason) = outcome {
                    eprintln!("face {i}: skipped ({reason})");
                }
            }
            if result.faces() == 0 {
                eprintln!("no faces detected");
            }
            let path = engine.save(output).await?;
            println!(
                "{} ({} of {} faces)",
                path.display(),
                result.applied(),
                result.faces()
            );
        }
        Commands::Detect { input } => {
            let engine = engine::spawn_engine(&config, true)?;
            engine.select(input).await?;
            let faces = engine.detect().await?;
            println!("{}", serde_json::to_string_pretty(&faces)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
