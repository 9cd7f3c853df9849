//! `upscale` -- command-line client for the image upscaling backend.
//!
//! Submits an image through a pipeline of scale stages, shows live
//! progress, saves the result next to the source and removes the job from
//! the server.
//!
//! # Environment variables
//!
//! | Variable                    | Default                  | Description                        |
//! |-----------------------------|--------------------------|------------------------------------|
//! | `UPSCALER_API_URL`          | `http://127.0.0.1:8000`  | Backend HTTP base URL              |
//! | `UPSCALER_WS_URL`           | derived from the API URL | Backend WebSocket base URL         |
//! | `UPSCALER_READY_TIMEOUT_MS` | `5000`                   | Wait for the progress channel      |
//! | `UPSCALER_CLEANUP_DELAY_MS` | `5000`                   | Grace period before deleting a job |
//! | `UPSCALER_POLL_INTERVAL_MS` | `1000`                   | Status-poll fallback interval      |
//! | `RUST_LOG`                  | `upscale_cli=info,...`   | Log filter                         |

mod logging;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use upscale_client::config::ClientConfig;
use upscale_client::orchestrator::Orchestrator;
use upscale_core::asset::SourceAsset;
use upscale_core::descriptor::JobSelections;
use upscale_core::stages::{ResampleMode, ScaleFactor};

use crate::logging::LogConfig;

#[derive(Parser)]
#[command(name = "upscale")]
#[command(about = "Multi-stage image upscaling client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend HTTP base URL (overrides `UPSCALER_API_URL`).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON logs and JSON event lines on stdout.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upscale an image.
    Upscale(UpscaleArgs),
    /// List the factors and resample modes the backend offers.
    Models,
    /// Check that the backend is reachable.
    Health,
}

#[derive(Args)]
struct UpscaleArgs {
    /// Source image (png, jpg, jpeg, tiff, bmp, gif).
    file: PathBuf,

    /// Stage factor, repeat for more stages (`-s x4 -s x2`).
    #[arg(short, long = "scale", required = true)]
    scales: Vec<ScaleFactor>,

    #[arg(short, long, default_value_t = ResampleMode::default())]
    resample: ResampleMode,

    /// Skip the live progress channel.
    #[arg(long)]
    no_progress: bool,

    /// Where to write the result. Defaults to the suggested name next to
    /// the source.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(LogConfig {
        json: cli.json,
        verbose: cli.verbose,
    });

    let mut config = ClientConfig::from_env();
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }

    tracing::debug!(api_url = %config.api_url, ws_url = %config.ws_url, "Using backend");

    match cli.command {
        Commands::Upscale(args) => run_upscale(config, args, cli.json).await,
        Commands::Models => run_models(config).await,
        Commands::Health => run_health(config).await,
    }
}

async fn run_upscale(config: ClientConfig, args: UpscaleArgs, json: bool) -> Result<()> {
    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Source path has no usable file name")?
        .to_string();
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut selections = JobSelections::new();
    selections.set_source(SourceAsset::new(name, bytes)?);
    selections.set_stages(&args.scales)?;
    selections.set_resample_mode(args.resample);
    selections.set_progress_enabled(!args.no_progress);

    let mut orchestrator = Orchestrator::new(config);
    let renderer = tokio::spawn(render::render_events(orchestrator.subscribe(), json));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, abandoning job");
                cancel.cancel();
            }
        })
    };

    let outcome = orchestrator.run(&selections, &cancel).await;
    interrupt.abort();

    let saved = match outcome {
        Ok(result) => {
            let output = args
                .output
                .unwrap_or_else(|| args.file.with_file_name(&result.filename));
            tokio::fs::write(&output, &result.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))
                .map(|()| (output, result.len()))
        }
        Err(e) => Err(e.into()),
    };

    // Nothing else will use the job; delete it now rather than after the
    // grace period.
    orchestrator.shutdown().await;
    drop(orchestrator);
    let _ = renderer.await;

    let (output, bytes) = saved?;
    if !json {
        println!("Saved {} ({bytes} bytes)", output.display());
    }
    Ok(())
}

async fn run_models(config: ClientConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config);
    let models = orchestrator
        .api()
        .models()
        .await
        .context("Failed to fetch models")?;

    println!("Factors: {}", models.factors.join(", "));
    println!("Resample modes:");
    for mode in &models.resample_modes {
        match models.resample_desc.get(mode) {
            Some(desc) => println!("  {mode:<14} {desc}"),
            None => println!("  {mode}"),
        }
    }
    Ok(())
}

async fn run_health(config: ClientConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config);
    let health = orchestrator
        .api()
        .health()
        .await
        .with_context(|| format!("Backend at {} is not reachable", orchestrator.config().api_url))?;

    println!("{}", health.message);
    Ok(())
}
