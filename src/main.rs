use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vidremix::{Config, RemixEngine};

#[derive(Parser)]
#[command(
    name = "vidremix",
    version,
    about = "Re-render a video so it looks the same but hashes differently",
    long_about = "vidremix decodes a video, runs every frame through a configurable chain of \
                  geometric, photometric, frequency-domain and overlay effects, perturbs the \
                  soundtrack, and re-encodes the result with cleaned container metadata."
)]
struct Cli {
    /// Input video file
    #[arg(short, long, required_unless_present = "write_default_config")]
    input: Option<PathBuf>,

    /// Output video file path
    #[arg(short, long, required_unless_present = "write_default_config")]
    output: Option<PathBuf>,

    /// Configuration file (TOML, optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed; overrides the configuration file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write the default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "vidremix=debug" } else { "vidremix=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Some(path) = &cli.write_default_config {
        Config::default()
            .save_to_file(path)
            .with_context(|| format!("writing default configuration to {:?}", path))?;
        info!("Default configuration written to {:?}", path);
        return Ok(());
    }

    info!("Starting vidremix v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    if cli.seed.is_some() {
        config.run.seed = cli.seed;
    }

    let (Some(input), Some(output)) = (cli.input, cli.output) else {
        anyhow::bail!("--input and --output are required");
    };

    let engine = RemixEngine::new(config);
    match engine.process(&input, &output).await {
        Ok(report) => {
            info!(
                "Done: seed {}, speed {:.3}, {} frames written",
                report.seed, report.speed, report.frames_written
            );
            Ok(())
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}
