//! Running the classifier over a live stream
//!
//! [`ExtractionWorker`] owns the consumer half of a shared ring on its own
//! thread and hands batches back over a channel. [`InlineExtractor`] runs the
//! same classifier on the caller's thread for single-threaded hosts.

pub mod inline;
pub mod worker;

pub use inline::InlineExtractor;
pub use worker::{ExtractionWorker, WorkerCommand, WorkerConfig, WorkerHandle};

use crate::domain::diagnostics::DiagnosticEvent;
use crate::domain::message::ExtractedMessage;
use crate::domain::types::StreamSessionId;

/// Messages and diagnostics produced together, in stream order
#[derive(Clone, Debug)]
pub struct ExtractionBatch {
    pub session: StreamSessionId,
    pub messages: Vec<ExtractedMessage>,
    pub diagnostics: Vec<DiagnosticEvent>,
}

impl ExtractionBatch {
    pub fn empty(session: StreamSessionId) -> Self {
        Self {
            session,
            messages: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.diagnostics.is_empty()
    }

    /// Append a later batch of the same stream
    pub fn extend(&mut self, later: ExtractionBatch) {
        self.session = later.session;
        self.messages.extend(later.messages);
        self.diagnostics.extend(later.diagnostics);
    }
}
