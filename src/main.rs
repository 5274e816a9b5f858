//! Liveview demo: runs the preview pipeline against a synthetic camera

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use liveview::capture::SyntheticSource;
use liveview::{Config, LivePreview};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("liveview=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Liveview launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    debug!(?config, "Configuration loaded");

    let preview = Arc::new(LivePreview::new(config)?);
    let frames = preview.frame_events();
    let status = preview.status_events();

    preview.start(SyntheticSource::new(2560, 1440));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
            Ok(line) = status.recv_async() => {
                info!(dropped = preview.dropped_raw_frames(), "{line}");
            }
            Ok(frame) = frames.recv_async() => {
                debug!(
                    sequence = frame.sequence(),
                    width = frame.width(),
                    height = frame.height(),
                    latency_ms = frame.latency().as_millis() as u64,
                    "Frame ready"
                );
            }
        }
    }

    // Joining blocks until the pipeline threads observe cancellation
    let pipeline = Arc::clone(&preview);
    tokio::task::spawn_blocking(move || pipeline.stop_and_join()).await?;

    info!("Liveview shutting down");
    Ok(())
}
