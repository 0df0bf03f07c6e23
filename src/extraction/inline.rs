//! Single-threaded extraction

use crate::buffer::{ByteRing, RingBuffer};
use crate::classifier::{Classifier, ClassifierConfig, PassEnd, PassReport};
use crate::domain::diagnostics::DiagnosticEvent;
use crate::domain::types::{BufferCapacity, MaxBatchMessages, StreamSessionId};
use crate::extraction::ExtractionBatch;
use std::time::Instant;

/// Ring and classifier owned by one thread
///
/// Bytes are appended and classified on the caller's schedule, which makes
/// extraction fully deterministic for a given byte sequence.
#[derive(Debug)]
pub struct InlineExtractor {
    ring: RingBuffer,
    classifier: Classifier,
    max_batch: MaxBatchMessages,
}

impl InlineExtractor {
    pub fn new(capacity: BufferCapacity, config: ClassifierConfig) -> Self {
        Self::with_classifier(capacity, Classifier::new(config))
    }

    pub fn with_classifier(capacity: BufferCapacity, classifier: Classifier) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            classifier,
            max_batch: MaxBatchMessages::default(),
        }
    }

    pub fn with_max_batch(mut self, max_batch: MaxBatchMessages) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Append bytes; `false` means they did not fit and were not stored
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        self.ring.append(bytes)
    }

    /// Classify everything currently classifiable
    pub fn extract(&mut self, now: Instant) -> ExtractionBatch {
        self.drain(now, false)
    }

    /// Classify everything, forcing any stalled head out
    pub fn flush(&mut self, now: Instant) -> ExtractionBatch {
        self.drain(now, true)
    }

    /// Discard every buffered byte and start a new session
    pub fn reset(&mut self) -> DiagnosticEvent {
        let discarded = self.ring.used_bytes();
        self.ring.reset();
        self.classifier.reset(StreamSessionId::generate(), discarded)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    fn drain(&mut self, now: Instant, force: bool) -> ExtractionBatch {
        let mut batch = ExtractionBatch::empty(self.classifier.session());
        loop {
            let limit = self.max_batch.into_inner();
            let PassReport {
                messages,
                diagnostics,
                end,
            } = if force {
                self.classifier.flush(&mut self.ring, limit, now)
            } else {
                self.classifier.run_pass(&mut self.ring, limit, now)
            };
            batch.messages.extend(messages);
            batch.diagnostics.extend(diagnostics);
            if end != PassEnd::BatchLimit {
                break;
            }
        }
        batch
    }
}
