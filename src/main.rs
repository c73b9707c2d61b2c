//! # WKMP Audio Player (wkmp-ap)
//!
//! Core playback engine with sample-accurate crossfading.
//!
//! **Purpose:** Decode audio files, manage playback queue, perform sample-accurate
//! crossfading, and provide HTTP/SSE control interface.
//!
//! **Architecture:** Single-stream audio pipeline using symphonia + rubato + cpal
//!
//! **Traceability:** Implements requirements from single-stream-design.md,
//! api_design.md, and crossfade.md

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkmp_ap::api;
use wkmp_ap::config::{Config, ConfigOverrides};
use wkmp_ap::playback::engine::PlaybackEngine;
use wkmp_ap::state::SharedState;

#[derive(Parser, Debug)]
#[command(name = "wkmp-ap")]
#[command(about = "WKMP Audio Player - Sample-accurate crossfading playback engine")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "wkmp-ap.toml")]
    config: PathBuf,

    /// Database path (overrides config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// HTTP server port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Root folder path for audio files (overrides config file)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    // File + line numbers enabled for debugging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wkmp_ap=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_file(true).with_line_number(true))
        .init();

    info!("Starting WKMP Audio Player (wkmp-ap)");

    // Parse command-line arguments
    let args = Args::parse();
    info!("Configuration file: {:?}", args.config);

    // Load configuration
    let overrides = ConfigOverrides {
        database_path: args.database,
        port: args.port,
        root_folder: args.root_folder,
    };
    let config = Config::load(&args.config, overrides).await?;
    info!("Loaded configuration: database={}, port={}, root_folder={:?}",
          config.database_path.display(), config.port, config.root_folder);

    // Initialize shared state
    let shared_state = Arc::new(SharedState::new());

    // Initialize playback engine
    let root_folder = config.root_folder.clone().unwrap_or_else(|| PathBuf::from("."));
    let engine = Arc::new(
        PlaybackEngine::with_root_folder(config.db_pool.clone(), Arc::clone(&shared_state), root_folder).await?,
    );
    info!("Playback engine created");

    // Start playback engine
    engine.start().await?;
    info!("Playback engine started");

    // Start HTTP API server
    let port = config.port;
    let app_state = api::AppState {
        engine: Arc::clone(&engine),
        shared: Arc::clone(&shared_state),
        db_pool: config.db_pool.clone(),
        root_folder: config.root_folder.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        port,
    };
    let router = api::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("API server error: {}", e);
        }
    });

    // Wait for API server (main service loop)
    api_handle.await?;

    // Shutdown playback engine
    engine.stop().await?;

    info!("WKMP Audio Player shutting down");
    Ok(())
}
