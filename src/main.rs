use anyhow::{Context, Result};
use switchyard::config::Settings;
use switchyard::infrastructure::log_messages::application as log_msg;
use switchyard::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// `switchyard [CAPTURE]` replays a captured device stream
#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = Settings::new().context("loading settings")?;
    if let Some(capture) = std::env::args_os().nth(1) {
        settings.replay.capture = Some(capture.into());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    if settings.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init();
    }

    info!("{}", log_msg::STARTING);
    info!(
        capacity = settings.ring_buffer.capacity,
        chunk_size = settings.replay.chunk_size,
        "{}",
        log_msg::LOADED_SETTINGS
    );

    let json = settings.logging.format == "json";
    let summary = Application::new(settings).run().await?;
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "replayed {} bytes in {} chunks; {} messages routed, {} chunks dropped",
            summary.bytes, summary.chunks, summary.routed, summary.dropped_chunks
        );
    }

    Ok(())
}
