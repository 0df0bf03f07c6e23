//! Domain model for the classification and routing engine
//!
//! Validated values, the classified message type, and the diagnostics that
//! accompany it.

pub mod diagnostics;
pub mod message;
pub mod types;
pub mod validation_constants;

pub use diagnostics::{
    DiagnosticEvent, DiagnosticKind, DiagnosticsSink, RecordingDiagnostics, TracingDiagnostics,
};
pub use message::{
    ExtractedMessage, ExtractedMessageBuilder, MessageMetadata, ShapeKind, ValidationOutcome,
    ValidationWarning,
};
pub use types::{
    BufferCapacity, DestinationName, DroppedByteCount, FrameLength, MaxBatchMessages,
    MaxLineLength, SequenceNumber, StreamSessionId, UnitId,
};
