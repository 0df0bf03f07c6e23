//! Extraction worker thread
//!
//! The worker owns the consumer half of the shared ring and the classifier.
//! It sleeps on a doorbell that the producer rings after every append, wakes
//! at least every `idle_wait` so stalled messages time out, and sends each
//! pass's output back as an [`ExtractionBatch`]. Control commands arrive on a
//! separate channel and are applied between passes, in the order sent.

use crate::buffer::{ByteRing, RingConsumer};
use crate::classifier::{Classifier, PassEnd};
use crate::domain::diagnostics::{DiagnosticEvent, DiagnosticKind};
use crate::domain::types::{DestinationName, MaxBatchMessages, StreamSessionId};
use crate::domain::validation_constants::worker as defaults;
use crate::error::{Error, Result};
use crate::extraction::ExtractionBatch;
use crate::infrastructure::log_messages::{ingest as ingest_msg, worker as log_msg};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Bound on messages per pass
    pub max_batch_messages: MaxBatchMessages,
    /// Longest sleep without a doorbell
    pub idle_wait: Duration,
    /// Shortest time between the starts of two passes
    pub min_pass_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_batch_messages: MaxBatchMessages::default(),
            idle_wait: Duration::from_millis(defaults::DEFAULT_IDLE_WAIT_MS),
            min_pass_interval: Duration::ZERO,
        }
    }
}

/// Control messages from the producer side
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerCommand {
    /// A destination came into existence on the host side
    RegisterName(DestinationName),
    DeregisterName(DestinationName),
    /// Drop every byte before this producer stream position and start `session`
    Reset {
        discard_until: u64,
        session: StreamSessionId,
    },
    /// Stop waiting on a stalled head: lines become partial messages, binary
    /// candidates are given up
    Flush,
    /// Flush and stop
    Shutdown,
}

enum Wake {
    Doorbell,
    Command(WorkerCommand),
    Idle,
    Disconnected,
}

pub struct ExtractionWorker {
    consumer: RingConsumer,
    classifier: Classifier,
    config: WorkerConfig,
    doorbell: Receiver<()>,
    commands: Receiver<WorkerCommand>,
    batches: Sender<ExtractionBatch>,
    last_pass: Option<Instant>,
}

impl ExtractionWorker {
    /// Start the worker thread
    pub fn spawn(
        consumer: RingConsumer,
        classifier: Classifier,
        config: WorkerConfig,
    ) -> Result<WorkerHandle> {
        let (doorbell_tx, doorbell_rx) = channel::bounded(1);
        let (command_tx, command_rx) = channel::unbounded();
        let (batch_tx, batch_rx) = channel::unbounded();

        let worker = Self {
            consumer,
            classifier,
            config,
            doorbell: doorbell_rx,
            commands: command_rx,
            batches: batch_tx,
            last_pass: None,
        };

        let thread = thread::Builder::new()
            .name("switchyard-extract".to_string())
            .spawn(move || worker.run())
            .map_err(Error::WorkerSpawn)?;

        Ok(WorkerHandle {
            doorbell: doorbell_tx,
            commands: command_tx,
            batches: batch_rx,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        info!(session = %self.classifier.session(), "{}", log_msg::STARTED);

        loop {
            let mut pending = Vec::new();
            match self.wait() {
                Wake::Command(command) => pending.push(command),
                Wake::Disconnected => {
                    self.finish();
                    break;
                }
                Wake::Doorbell | Wake::Idle => {}
            }
            pending.extend(self.commands.try_iter());

            let mut stop = false;
            for command in pending {
                if !self.apply(command) {
                    stop = true;
                    break;
                }
            }
            if stop {
                break;
            }

            if !self.consumer.is_empty() && !self.extract(false) {
                break;
            }
        }

        info!("{}", log_msg::STOPPED);
    }

    fn wait(&self) -> Wake {
        match self.commands.try_recv() {
            Ok(command) => return Wake::Command(command),
            Err(TryRecvError::Disconnected) => return Wake::Disconnected,
            Err(TryRecvError::Empty) => {}
        }
        match self.doorbell.recv_timeout(self.config.idle_wait) {
            Ok(()) => Wake::Doorbell,
            Err(RecvTimeoutError::Timeout) => Wake::Idle,
            Err(RecvTimeoutError::Disconnected) => Wake::Disconnected,
        }
    }

    /// Apply one command; `false` means the worker must stop
    fn apply(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::RegisterName(name) => {
                self.classifier.register_name(name);
                true
            }
            WorkerCommand::DeregisterName(name) => {
                self.classifier.deregister_name(&name);
                true
            }
            WorkerCommand::Reset {
                discard_until,
                session,
            } => {
                let discarded = self.consumer.discard_until(discard_until);
                let event = self.classifier.reset(session, discarded);
                info!(
                    discarded,
                    session = %self.classifier.session(),
                    "{}",
                    log_msg::RESET_APPLIED
                );
                let mut batch = ExtractionBatch::empty(self.classifier.session());
                batch.diagnostics.push(event);
                self.send(batch)
            }
            WorkerCommand::Flush => self.extract(true),
            WorkerCommand::Shutdown => {
                info!("{}", log_msg::SHUTTING_DOWN);
                self.finish();
                false
            }
        }
    }

    /// Final forced pass; whatever still cannot be classified is reported
    fn finish(&mut self) {
        if !self.extract(true) {
            return;
        }
        let buffered = self.consumer.used_bytes();
        if buffered > 0 {
            warn!(buffered, "{}", log_msg::UNDELIVERED_AT_SHUTDOWN);
            let mut batch = ExtractionBatch::empty(self.classifier.session());
            batch.diagnostics.push(DiagnosticEvent::new(
                DiagnosticKind::UndeliveredAtShutdown { buffered },
                self.classifier.session(),
                self.classifier.next_sequence(),
            ));
            self.send(batch);
        }
    }

    /// Run passes until the ring has nothing more to give; `false` if the
    /// batch receiver is gone
    fn extract(&mut self, force: bool) -> bool {
        let limit = self.config.max_batch_messages.into_inner();
        loop {
            self.throttle();
            let now = Instant::now();
            self.last_pass = Some(now);

            let report = if force {
                self.classifier.flush(&mut self.consumer, limit, now)
            } else {
                self.classifier.run_pass(&mut self.consumer, limit, now)
            };
            debug!(
                messages = report.messages.len(),
                diagnostics = report.diagnostics.len(),
                buffered = self.consumer.used_bytes(),
                "{}",
                log_msg::PASS_COMPLETE
            );

            let end = report.end;
            if !report.is_empty() {
                let batch = ExtractionBatch {
                    session: self.classifier.session(),
                    messages: report.messages,
                    diagnostics: report.diagnostics,
                };
                if !self.send(batch) {
                    return false;
                }
            }
            if end != PassEnd::BatchLimit {
                return true;
            }
        }
    }

    fn throttle(&self) {
        if let Some(last) = self.last_pass {
            let since = last.elapsed();
            if since < self.config.min_pass_interval {
                thread::sleep(self.config.min_pass_interval - since);
            }
        }
    }

    fn send(&self, batch: ExtractionBatch) -> bool {
        if self.batches.send(batch).is_err() {
            warn!("{}", log_msg::BATCH_RECEIVER_GONE);
            return false;
        }
        true
    }
}

/// Producer-side handle to a running worker
///
/// Dropping the handle shuts the worker down and joins it.
#[derive(Debug)]
pub struct WorkerHandle {
    doorbell: Sender<()>,
    commands: Sender<WorkerCommand>,
    batches: Receiver<ExtractionBatch>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Wake the worker; never blocks
    pub fn ring_doorbell(&self) {
        match self.doorbell.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => debug!("{}", ingest_msg::WORKER_UNREACHABLE),
        }
    }

    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::WorkerGone)?;
        self.ring_doorbell();
        Ok(())
    }

    pub fn try_recv(&self) -> Option<ExtractionBatch> {
        self.batches.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ExtractionBatch> {
        self.batches.recv_timeout(timeout).ok()
    }

    /// Receiver of extraction batches, for hosts that select over it
    pub fn batches(&self) -> &Receiver<ExtractionBatch> {
        &self.batches
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker after a final flush and wait for it
    ///
    /// Batches produced before the worker stopped stay receivable.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // A worker that already exited has dropped its receiver
        let _ = self.commands.send(WorkerCommand::Shutdown);
        self.ring_doorbell();
        thread.join().map_err(|_| Error::WorkerGone)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
