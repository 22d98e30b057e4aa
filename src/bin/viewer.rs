//! Live Stream Viewer
//!
//! Ingests one source from the media server into the simulated platform sink
//! and keeps it pinned to the live edge until interrupted.
//!
//! ```text
//! viewer [SOURCE] [--config PATH] [--server URL] [--record PATH]
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_edge_ingest::{
    config::AppConfig,
    sink::{SimulatedSinkFactory, SimulatedSurface},
    ConnectionManager, StreamStatus,
};

#[cfg(feature = "ui")]
use live_edge_ingest::ui::WebServer;

#[derive(Parser, Debug)]
#[command(name = "viewer")]
#[command(author, version, about = "Ingest a live stream and follow its live edge")]
struct Args {
    /// Source name on the media server
    source: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media server base URL
    #[arg(short, long)]
    server: Option<String>,

    /// Record every appended byte to this file
    #[arg(short, long)]
    record: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(source) = args.source {
        config.stream.source = source;
    }
    if let Some(server) = args.server {
        config.stream.server_url = server;
    }
    if args.record.is_some() {
        config.sink.record_path = args.record;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Live Stream Viewer");

    if config.stream.source.is_empty() {
        bail!("no source given; pass one as the first argument or set stream.source");
    }

    let factory = Arc::new(SimulatedSinkFactory::new(config.sink.clone()));
    let (surface, simulated) = SimulatedSurface::shared();
    let manager = ConnectionManager::new(config.clone(), factory, surface);
    let source = config.stream.source.clone();
    let handle = manager.open(&source)?;

    #[cfg(feature = "ui")]
    let _web_handle = if config.ui.enabled {
        let server = WebServer::new(config.ui.clone(), handle.control().clone());
        tracing::info!(
            "Control API at http://{}:{}/api/status",
            config.ui.bind_address,
            config.ui.http_port
        );
        Some(server.start_background())
    } else {
        None
    };

    let mut status = handle.control().subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                match &snapshot.status {
                    StreamStatus::Streaming => {
                        let surface = simulated.lock();
                        tracing::info!(
                            "Streaming {} ({}), playback {:.2}x",
                            snapshot.source,
                            snapshot.codec.as_deref().unwrap_or("?"),
                            surface.playback_rate()
                        );
                    }
                    StreamStatus::Failed { message } => {
                        tracing::warn!("{} failed: {} (POST /api/retry to try again)", snapshot.source, message);
                    }
                    StreamStatus::Stopped => break,
                    _ => {}
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
