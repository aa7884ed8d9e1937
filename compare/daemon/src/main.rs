//! Model Compare Daemon - Streaming Comparison Server
//!
//! Serves the fan-out engine over HTTP. Each `POST /api/compare` sends one
//! conversation to every requested model and streams the merged answers back
//! as newline-delimited JSON.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3000, OpenRouter upstream)
//! OPENROUTER_API_KEY=sk-... compare-daemon
//!
//! # Custom listen address
//! compare-daemon --listen 0.0.0.0:8080
//!
//! # With config file
//! compare-daemon --config ./model-compare.toml
//!
//! # Any OpenAI-compatible upstream
//! compare-daemon --base-url http://localhost:11434/v1
//!
//! # Verbose logging
//! RUST_LOG=debug compare-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use compare_core::{
    load_config, load_config_from_path, ConfigOverrides, FanOut, FanOutConfig,
    OpenAiCompatibleBackend,
};

/// Model Compare Daemon - stream one prompt to many models side by side
#[derive(Parser, Debug)]
#[command(name = "compare-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'L', long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "MODEL_COMPARE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Upstream chat-completion base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MODEL_COMPARE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(addr) = self.listen {
            overrides = overrides.with_listen_addr(addr);
        }
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("compare_daemon={level},compare_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for SIGINT, shutting down"),
        },
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Model Compare daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line options")?;

    info!(
        source = %config.source,
        listen = %config.server.listen_addr,
        base_url = %config.upstream.base_url,
        channel_capacity = config.stream.channel_capacity,
        "Configuration resolved"
    );
    if config.upstream.api_key.is_none() {
        warn!("OPENROUTER_API_KEY is not set; comparisons will be rejected");
    }

    let backend =
        OpenAiCompatibleBackend::new(&config.upstream).context("Failed to build HTTP client")?;
    let fan_out = FanOut::new(Arc::new(backend), FanOutConfig::from(&config));

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %listener.local_addr()?, "Listening for comparison requests");

    server::serve(listener, server::router(fan_out), shutdown_signal()).await?;

    info!("Model Compare daemon stopped");
    Ok(())
}
