//! ThySpace daemon
//!
//! Serves the location/ownership API over HTTP from a single in-memory core.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (config from the user config dir, created if missing)
//! thyspace
//!
//! # Start with custom config
//! thyspace --config /path/to/config.toml
//!
//! # Override the port and log level
//! thyspace --http-port 9000 --log-level debug
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thyspace::config::default_config_path;
use thyspace::{spawn_logging_listener, Config, HttpServer, SpaceCore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "thyspace")]
#[command(about = "Location-based social backend: land, content, presence and events")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "THYSPACE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "THYSPACE_HTTP_PORT")]
    http_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "THYSPACE_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Where the running config came from, reported once logging is up
enum ConfigOrigin {
    File(PathBuf),
    CreatedDefault(PathBuf),
    UnsavedDefault { path: PathBuf, error: String },
}

fn load_config(args: &Args) -> anyhow::Result<(Config, ConfigOrigin)> {
    let (mut config, origin) = match &args.config {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            ConfigOrigin::File(path.clone()),
        ),
        None => {
            let path = default_config_path();
            if path.exists() {
                (
                    Config::load(&path)
                        .with_context(|| format!("failed to load config {}", path.display()))?,
                    ConfigOrigin::File(path),
                )
            } else {
                let config = Config::default();
                let origin = match config.save(&path) {
                    Ok(()) => ConfigOrigin::CreatedDefault(path),
                    Err(e) => ConfigOrigin::UnsavedDefault {
                        path,
                        error: e.to_string(),
                    },
                };
                (config, origin)
            }
        }
    };

    // Apply CLI overrides
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok((config, origin))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, origin) = load_config(&args)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("thyspace={},info", config.log_level))),
        )
        .init();

    match &origin {
        ConfigOrigin::File(path) => debug!(path = %path.display(), "Loaded config"),
        ConfigOrigin::CreatedDefault(path) => {
            info!(path = %path.display(), "Created default config")
        }
        ConfigOrigin::UnsavedDefault { path, error } => {
            warn!(path = %path.display(), error = %error, "Could not write default config")
        }
    }

    info!(
        http_port = config.http_port,
        default_radius_m = config.default_radius_m,
        presence_ttl_secs = config.presence_ttl_secs,
        "Starting thyspace"
    );

    let core = Arc::new(SpaceCore::open(config.clone())?);
    let _listener = spawn_logging_listener(Arc::clone(core.events()));

    // Expire stale presence in the background
    let sweeper = {
        let core = Arc::clone(&core);
        let mut interval = tokio::time::interval(config.presence_sweep_interval());
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                match core.sweep_presence() {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Presence sweep"),
                    Err(e) => {
                        warn!(error = %e, "Presence sweeper stopping");
                        break;
                    }
                }
            }
        })
    };

    let http_addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr()))?;
    let http_server = Arc::new(HttpServer::new(Arc::clone(&core), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    sweeper.abort();
    if let Ok(stats) = core.stats() {
        info!(
            locations = stats.locations,
            owned = stats.owned_locations,
            content = stats.content_items,
            "Final space stats"
        );
    }
    core.close();

    Ok(())
}
