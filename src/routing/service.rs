//! Async task that keeps a router fed from the worker's batch channel

use crate::extraction::ExtractionBatch;
use crate::infrastructure::log_messages::routing as log_msg;
use crate::routing::router::Router;
use crossbeam::channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sleep between polls when no batch is waiting
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Routes batches as they arrive until told to stop or the worker goes away
pub struct RouterService {
    router: Arc<Mutex<Router>>,
    batches: Receiver<ExtractionBatch>,
    shutdown_rx: mpsc::Receiver<()>,
    poll_interval: Duration,
}

impl RouterService {
    /// Create the service and the sender that stops it
    pub fn new(
        router: Arc<Mutex<Router>>,
        batches: Receiver<ExtractionBatch>,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let service = Self {
            router,
            batches,
            shutdown_rx,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };

        (service, shutdown_tx)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until shutdown; returns the number of messages routed
    ///
    /// Batches already waiting when shutdown arrives are still routed.
    pub async fn run(mut self) -> usize {
        info!("{}", log_msg::ROUTER_STARTED);
        let mut routed = 0;

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!("{}", log_msg::ROUTER_SHUTTING_DOWN);
                routed += self.drain();
                break;
            }

            match self.batches.try_recv() {
                Ok(batch) => {
                    routed += self.router.lock().route_batch(batch);
                }
                Err(TryRecvError::Empty) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(TryRecvError::Disconnected) => {
                    debug!("batch channel closed");
                    break;
                }
            }
        }

        info!(routed, "{}", log_msg::ROUTER_STOPPED);
        routed
    }

    fn drain(&self) -> usize {
        let mut router = self.router.lock();
        self.batches
            .try_iter()
            .map(|batch| router.route_batch(batch))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnostics::RecordingDiagnostics;
    use crate::domain::message::{ExtractedMessage, ShapeKind};
    use crate::domain::types::{SequenceNumber, StreamSessionId};
    use crate::routing::router::RecordingSink;
    use bytes::Bytes;
    use crossbeam::channel;

    fn batch(session: StreamSessionId, lines: &[&'static str]) -> ExtractionBatch {
        let mut batch = ExtractionBatch::empty(session);
        for (n, line) in lines.iter().enumerate() {
            batch.messages.push(
                ExtractedMessage::builder(ShapeKind::PlainText, Bytes::from_static(line.as_bytes()))
                    .build(session, SequenceNumber::new(n as u64)),
            );
        }
        batch
    }

    fn shared_router(sink: &RecordingSink) -> Arc<Mutex<Router>> {
        Arc::new(Mutex::new(Router::new(
            sink.clone(),
            sink.clone(),
            RecordingDiagnostics::new(),
        )))
    }

    #[test]
    fn test_service_routes_until_channel_closes() {
        let sink = RecordingSink::new();
        let (tx, rx) = channel::unbounded();
        let (service, _shutdown) = RouterService::new(shared_router(&sink), rx);

        let session = StreamSessionId::generate();
        tx.send(batch(session, &["a\n", "b\n"])).unwrap();
        tx.send(batch(session, &["c\n"])).unwrap();
        drop(tx);

        assert_eq!(tokio_test::block_on(service.run()), 3);
        let texts: Vec<String> = sink.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_service_shutdown_drains_waiting_batches() {
        let sink = RecordingSink::new();
        let (tx, rx) = channel::unbounded();
        let (service, shutdown_tx) = RouterService::new(shared_router(&sink), rx);
        let service = service.with_poll_interval(Duration::from_millis(1));

        let handle = tokio::spawn(service.run());
        tx.send(batch(StreamSessionId::generate(), &["x\n"])).unwrap();
        shutdown_tx.send(()).await.unwrap();

        let routed = handle.await.unwrap();
        assert_eq!(routed, 1);
        assert_eq!(sink.messages().len(), 1);
        drop(tx);
    }
}
