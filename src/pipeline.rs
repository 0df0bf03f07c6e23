//! Producer-side facade over the ring, the worker and the router
//!
//! A [`Pipeline`] is what a serial reader talks to. `ingest` appends the bytes
//! it just read and rings the worker's doorbell; it never waits for
//! classification. Classified batches come back over a channel and reach the
//! [`Router`] either through [`Pipeline::pump`] on the host's own schedule or
//! through a [`RouterService`] task.

use crate::buffer::{RingProducer, RingStats, SharedRingBuffer};
use crate::classifier::{Classifier, ClassifierConfig, PacketChecksum};
use crate::domain::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticsSink};
use crate::domain::types::{BufferCapacity, DestinationName, StreamSessionId};
use crate::error::{Error, Result};
use crate::extraction::{ExtractionWorker, WorkerCommand, WorkerConfig, WorkerHandle};
use crate::infrastructure::log_messages::ingest as log_msg;
use crate::routing::{DefaultSink, DestinationSink, Router, RouterService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

/// What to do with a chunk that does not fit in the ring
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the chunk and keep the buffered bytes
    #[default]
    DropChunk,
    /// Drop the chunk and everything buffered, then start a new session
    Resync,
}

/// Result of handing a chunk to [`Pipeline::ingest`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// The chunk was dropped; the event has already been reported
    Dropped(DiagnosticEvent),
    /// The chunk was dropped and a reset requested
    Resynced(DiagnosticEvent),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RingBufferConfig {
    pub capacity: BufferCapacity,
    pub overflow_policy: OverflowPolicy,
}

/// Assembles a [`Pipeline`]
pub struct PipelineBuilder {
    ring: RingBufferConfig,
    classifier: ClassifierConfig,
    worker: WorkerConfig,
    checksum: Option<Arc<dyn PacketChecksum>>,
    router: Router,
}

impl PipelineBuilder {
    pub fn ring_buffer(mut self, ring: RingBufferConfig) -> Self {
        self.ring = ring;
        self
    }

    pub fn classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Replace the default additive packet checksum
    pub fn checksum(mut self, checksum: Arc<dyn PacketChecksum>) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Split the ring and start the extraction worker
    #[instrument(skip(self), fields(capacity = %self.ring.capacity))]
    pub fn start(self) -> Result<Pipeline> {
        let (producer, consumer) = SharedRingBuffer::new(self.ring.capacity).split();

        let mut classifier = Classifier::new(self.classifier);
        if let Some(checksum) = self.checksum {
            classifier = classifier.with_checksum(checksum);
        }
        let session = classifier.session();
        let worker = ExtractionWorker::spawn(consumer, classifier, self.worker)?;

        Ok(Pipeline {
            producer,
            worker,
            router: Arc::new(Mutex::new(self.router)),
            policy: self.ring.overflow_policy,
            session,
        })
    }
}

/// A running classification pipeline
pub struct Pipeline {
    producer: RingProducer,
    worker: WorkerHandle,
    router: Arc<Mutex<Router>>,
    policy: OverflowPolicy,
    session: StreamSessionId,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("session", &self.session)
            .field("policy", &self.policy)
            .field("ring", &self.producer.stats())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder(
        default_sink: impl DefaultSink + 'static,
        destination_sink: impl DestinationSink + 'static,
        diagnostics: impl DiagnosticsSink + 'static,
    ) -> PipelineBuilder {
        PipelineBuilder {
            ring: RingBufferConfig::default(),
            classifier: ClassifierConfig::default(),
            worker: WorkerConfig::default(),
            checksum: None,
            router: Router::new(default_sink, destination_sink, diagnostics),
        }
    }

    /// Append bytes read from the device; never blocks on the worker
    pub fn ingest(&mut self, bytes: &[u8]) -> IngestOutcome {
        if bytes.is_empty() {
            return IngestOutcome::Accepted;
        }
        if self.producer.append(bytes) {
            self.worker.ring_doorbell();
            return IngestOutcome::Accepted;
        }

        let free = self.producer.free_bytes();
        warn!(attempted = bytes.len(), free, "{}", log_msg::OVERFLOW);
        let event = DiagnosticEvent::unsequenced(
            DiagnosticKind::BufferOverflow {
                attempted: bytes.len(),
                free,
            },
            self.session,
        );
        self.router.lock().report(&event);

        match self.policy {
            OverflowPolicy::DropChunk => IngestOutcome::Dropped(event),
            OverflowPolicy::Resync => {
                warn!("{}", log_msg::RESYNC_REQUESTED);
                if let Err(error) = self.reset() {
                    warn!(%error, "{}", log_msg::WORKER_UNREACHABLE);
                }
                IngestOutcome::Resynced(event)
            }
        }
    }

    /// Register a destination created by the host; returns whether it was new
    pub fn register_destination(&mut self, name: &str) -> Result<bool> {
        let name = parse_name(name)?;
        let added = self.router.lock().register_destination(name.clone());
        self.worker.send(WorkerCommand::RegisterName(name))?;
        Ok(added)
    }

    /// Remove a destination; returns how many queued messages were dropped
    pub fn deregister_destination(&mut self, name: &str) -> Result<usize> {
        let name = parse_name(name)?;
        let dropped = self.router.lock().deregister_destination(&name);
        self.worker.send(WorkerCommand::DeregisterName(name))?;
        Ok(dropped)
    }

    /// Mark a destination ready; its backlog is delivered in arrival order
    ///
    /// Batches not yet pumped are routed first so the backlog is complete.
    pub fn set_ready(&mut self, name: &str) -> Result<usize> {
        let name = parse_name(name)?;
        self.pump();
        let mut router = self.router.lock();
        let newly_known = !router.is_registered(&name);
        let delivered = router.set_ready(&name);
        drop(router);
        if newly_known {
            self.worker.send(WorkerCommand::RegisterName(name))?;
        }
        Ok(delivered)
    }

    /// Discard every buffered byte and start a new session
    ///
    /// Routing state is reset when the worker's reset batch is routed, so
    /// batches already classified are still delivered first.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<StreamSessionId> {
        let session = StreamSessionId::generate();
        self.worker.send(WorkerCommand::Reset {
            discard_until: self.producer.stream_position(),
            session,
        })?;
        self.session = session;
        Ok(session)
    }

    /// Ask the worker to stop waiting on a stalled head
    pub fn flush(&self) -> Result<()> {
        self.worker.send(WorkerCommand::Flush)
    }

    /// Route every batch already received; returns the messages routed
    pub fn pump(&self) -> usize {
        let mut router = self.router.lock();
        std::iter::from_fn(|| self.worker.try_recv())
            .map(|batch| router.route_batch(batch))
            .sum()
    }

    /// Wait up to `timeout` for a batch, then route everything received
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let Some(first) = self.worker.recv_timeout(timeout) else {
            return 0;
        };
        let routed = self.router.lock().route_batch(first);
        routed + self.pump()
    }

    /// Async router fed from this pipeline's batch channel
    ///
    /// While the service runs, `pump` competes with it for batches; hosts use
    /// one or the other.
    pub fn router_service(&self) -> (RouterService, mpsc::Sender<()>) {
        RouterService::new(Arc::clone(&self.router), self.worker.batches().clone())
    }

    /// Shared handle to the router
    pub fn router(&self) -> Arc<Mutex<Router>> {
        Arc::clone(&self.router)
    }

    pub fn session(&self) -> StreamSessionId {
        self.session
    }

    pub fn ring_stats(&self) -> RingStats {
        self.producer.stats()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Flush, stop the worker and route its final batches
    #[instrument(skip(self))]
    pub fn shutdown(mut self) -> Result<usize> {
        self.worker.shutdown()?;
        Ok(self.pump())
    }
}

fn parse_name(name: &str) -> Result<DestinationName> {
    DestinationName::try_new(name).map_err(|e| Error::invalid_destination(name, e))
}
