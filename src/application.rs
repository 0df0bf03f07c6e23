use crate::config::Settings;
use crate::domain::diagnostics::TracingDiagnostics;
use crate::error::{Error, Result};
use crate::infrastructure::log_messages::application as log_msg;
use crate::pipeline::{IngestOutcome, Pipeline};
use crate::routing::TracingSink;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Totals for one replay run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub bytes: usize,
    pub chunks: usize,
    pub dropped_chunks: usize,
    pub routed: usize,
}

/// Replays a captured device stream through a pipeline
///
/// Every message and diagnostic is logged; destinations listed in the replay
/// settings are registered and ready before the first byte is fed.
pub struct Application {
    settings: Settings,
}

impl Application {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<ReplaySummary> {
        let capture = self.capture_path()?;
        info!(path = %capture.display(), "{}", log_msg::READING_CAPTURE);
        let bytes = tokio::fs::read(&capture).await?;

        let mut pipeline = Pipeline::builder(TracingSink, TracingSink, TracingDiagnostics)
            .ring_buffer(self.settings.ring_buffer_config()?)
            .classifier(self.settings.classifier_config()?)
            .worker(self.settings.worker_config()?)
            .start()?;
        for name in &self.settings.replay.destinations {
            pipeline.register_destination(name)?;
            pipeline.set_ready(name)?;
        }

        let (service, stop_router) = pipeline.router_service();
        let router_task = tokio::spawn(service.run());

        let summary = self.feed(&mut pipeline, &bytes).await;

        pipeline.flush()?;
        // The router may already have stopped on its own
        let _ = stop_router.send(()).await;
        let routed = router_task.await.map_err(|_| Error::RouterGone)?;
        let routed = routed + pipeline.shutdown()?;

        let summary = ReplaySummary { routed, ..summary };
        info!(
            bytes = summary.bytes,
            chunks = summary.chunks,
            dropped_chunks = summary.dropped_chunks,
            routed = summary.routed,
            "{}",
            log_msg::REPLAY_FINISHED
        );
        Ok(summary)
    }

    async fn feed(&self, pipeline: &mut Pipeline, bytes: &[u8]) -> ReplaySummary {
        let replay = &self.settings.replay;
        let interval = Duration::from_millis(replay.chunk_interval_ms);
        let mut summary = ReplaySummary {
            bytes: bytes.len(),
            ..ReplaySummary::default()
        };

        for chunk in bytes.chunks(replay.chunk_size.max(1)) {
            summary.chunks += 1;
            if !matches!(pipeline.ingest(chunk), IngestOutcome::Accepted) {
                summary.dropped_chunks += 1;
            }
            if interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(interval).await;
            }
        }

        if summary.dropped_chunks > 0 {
            warn!(dropped = summary.dropped_chunks, "{}", log_msg::CHUNKS_DROPPED);
        }
        summary
    }

    fn capture_path(&self) -> Result<PathBuf> {
        self.settings
            .replay
            .capture
            .clone()
            .ok_or_else(|| Error::invalid_setting("replay.capture", "no capture file given"))
    }
}
