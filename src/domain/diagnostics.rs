//! Structured diagnostics for conditions that never stop the pipeline
//!
//! Every per-message problem (lost bytes, bad checksums, out-of-range ids,
//! stalled messages) is reported through a [`DiagnosticsSink`] instead of being
//! returned as an error, so the ingestion path and the extraction loop keep
//! running regardless of what the device sends.

use crate::domain::message::ShapeKind;
use crate::domain::types::{DestinationName, SequenceNumber, StreamSessionId};
use crate::infrastructure::log_messages::diagnostics as log_msg;
use chrono::{DateTime, Utc};
use derive_more::Display;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Kind of diagnostic, with the context needed to act on it
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// The producer could not append a chunk
    #[display("buffer overflow: {attempted} bytes, {free} free")]
    BufferOverflow { attempted: usize, free: usize },
    /// A binary packet failed its checksum and was discarded
    #[display("checksum mismatch: expected {expected:#06x}, computed {computed:#06x} over {payload_len} bytes")]
    ChecksumMismatch {
        expected: u16,
        computed: u16,
        payload_len: usize,
        /// Hex rendering of the first payload bytes
        payload_head: String,
    },
    /// A unit line named a unit outside 0..=7
    #[display("invalid unit id {found}")]
    InvalidUnitId { found: u16 },
    /// A message sat incomplete longer than the configured timeout
    #[display("incomplete {shape} after {waited_ms}ms with {buffered} bytes buffered")]
    IncompleteTimeout {
        shape: ShapeKind,
        waited_ms: u64,
        buffered: usize,
    },
    /// A message targeted a destination nobody has registered yet
    #[display("queued for unregistered destination {name}")]
    UnknownDestinationTarget { name: DestinationName },
    /// No pattern matched; one byte was skipped
    #[display("no pattern matched byte {byte:#04x}")]
    NoPatternMatched { byte: u8 },
    /// Zero bytes emitted by the firmware after a fixed frame were dropped
    #[display("discarded {count} spurious zero bytes")]
    SpuriousZerosDiscarded { count: usize },
    /// The stream was resynchronized and buffered bytes discarded
    #[display("stream reset, {discarded} bytes discarded")]
    StreamReset { discarded: usize },
    /// A text line exceeded the scan limit and was split
    #[display("line exceeded {limit} bytes without a terminator")]
    OversizedLine { limit: usize },
    /// The worker stopped with bytes it could not classify
    #[display("{buffered} bytes left unclassified at shutdown")]
    UndeliveredAtShutdown { buffered: usize },
}

impl DiagnosticKind {
    /// Whether this diagnostic means data the device sent was lost
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            Self::BufferOverflow { .. }
                | Self::ChecksumMismatch { .. }
                | Self::NoPatternMatched { .. }
                | Self::StreamReset { .. }
                | Self::UndeliveredAtShutdown { .. }
        )
    }
}

/// A diagnostic with the stream position it was raised at
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub session: StreamSessionId,
    /// Sequence the next extracted message will carry; `None` for events
    /// raised on the producer side, which cannot know it
    pub next_sequence: Option<SequenceNumber>,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn new(
        kind: DiagnosticKind,
        session: StreamSessionId,
        next_sequence: SequenceNumber,
    ) -> Self {
        Self {
            kind,
            session,
            next_sequence: Some(next_sequence),
            timestamp: Utc::now(),
        }
    }

    /// Event raised before the classifier has seen the affected bytes
    pub fn unsequenced(kind: DiagnosticKind, session: StreamSessionId) -> Self {
        Self {
            kind,
            session,
            next_sequence: None,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of diagnostic events
pub trait DiagnosticsSink: Send {
    fn on_diagnostic(&mut self, event: &DiagnosticEvent);
}

/// Diagnostics sink that logs through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn on_diagnostic(&mut self, event: &DiagnosticEvent) {
        if event.kind.is_data_loss() {
            warn!(
                session = %event.session,
                sequence = ?event.next_sequence,
                "{}: {}",
                log_msg::DATA_LOSS,
                event.kind
            );
        } else {
            debug!(
                session = %event.session,
                sequence = ?event.next_sequence,
                "{}: {}",
                log_msg::STREAM_NOTICE,
                event.kind
            );
        }
    }
}

/// Diagnostics sink that keeps every event, for inspection
///
/// Clones share one event log.
#[derive(Clone, Debug, Default)]
pub struct RecordingDiagnostics {
    events: std::sync::Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn count_where(&self, predicate: impl Fn(&DiagnosticKind) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(&e.kind)).count()
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn on_diagnostic(&mut self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: DiagnosticKind) -> DiagnosticEvent {
        DiagnosticEvent::new(kind, StreamSessionId::generate(), SequenceNumber::first())
    }

    #[test]
    fn data_loss_classification() {
        assert!(DiagnosticKind::BufferOverflow {
            attempted: 10,
            free: 2
        }
        .is_data_loss());
        assert!(!DiagnosticKind::InvalidUnitId { found: 9 }.is_data_loss());
        assert!(!DiagnosticKind::SpuriousZerosDiscarded { count: 4 }.is_data_loss());
        assert!(DiagnosticKind::UndeliveredAtShutdown { buffered: 3 }.is_data_loss());
    }

    #[test]
    fn recording_clones_share_the_log() {
        let recorder = RecordingDiagnostics::new();
        let mut writer = recorder.clone();
        writer.on_diagnostic(&event(DiagnosticKind::NoPatternMatched { byte: 0xff }));
        writer.on_diagnostic(&event(DiagnosticKind::InvalidUnitId { found: 8 }));

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(
            recorder.count_where(|k| matches!(k, DiagnosticKind::InvalidUnitId { .. })),
            1
        );
    }

    #[test]
    fn checksum_mismatch_renders_hex() {
        let kind = DiagnosticKind::ChecksumMismatch {
            expected: 0x1234,
            computed: 0x00ff,
            payload_len: 8,
            payload_head: "aabb".to_string(),
        };
        assert_eq!(
            kind.to_string(),
            "checksum mismatch: expected 0x1234, computed 0x00ff over 8 bytes"
        );
    }

    #[test]
    fn tracing_sink_accepts_every_kind() {
        let mut sink = TracingDiagnostics;
        sink.on_diagnostic(&event(DiagnosticKind::StreamReset { discarded: 3 }));
        sink.on_diagnostic(&event(DiagnosticKind::OversizedLine { limit: 16 }));
    }
}
