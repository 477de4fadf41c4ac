//! IIIF Streamer - a tile server for pyramidal raster images.
//!
//! This binary resolves the configuration, initialises logging and serves
//! the IIIF/IIP endpoints.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iiif_streamer::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> ExitCode {
    // Header date handling assumes UTC for the whole process lifetime
    std::env::set_var("TZ", "UTC");

    let config = Config::parse().clamped();
    init_logging(&config);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    if config.filesystem_prefix.is_empty() {
        info!("  Filesystem prefix: (none)");
    } else {
        info!("  Filesystem prefix: {}", config.filesystem_prefix);
    }
    info!(
        "  Metadata cache: {} descriptors",
        config.metadata_cache_capacity()
    );
    info!("  JPEG quality: {}", config.jpeg_quality());
    info!("  Output cap: {} pixels", config.max_cvt());
    if config.max_sample_size() > 0 {
        info!("  Max sample size: {}", config.max_sample_size());
    }
    if !config.cors.is_empty() {
        info!("  CORS origin: {}", config.cors);
    }

    let addr = config.bind_address();
    let state = AppState::new(config);
    let router = create_router(state);

    info!("");
    info!("Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/<identifier>/info.json", addr);
    info!("    curl http://{}/<identifier>/full/full/0/default.jpg", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
///
/// `VERBOSITY` maps onto a filter level and `LOGFILE` selects a file sink
/// instead of stderr. An explicit `RUST_LOG` overrides both.
fn init_logging(config: &Config) {
    let level = match config.verbosity {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("iiif_streamer={level},tower_http={level}").into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.logfile.is_empty() {
        registry.with(tracing_subscriber::fmt::layer()).init();
        return;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logfile)
    {
        Ok(file) => {
            let writer = Arc::new(file);
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
        }
        Err(e) => {
            registry.with(tracing_subscriber::fmt::layer()).init();
            error!("Could not open log file {}: {}", config.logfile, e);
        }
    }
}
