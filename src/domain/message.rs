//! Classified messages as they leave the extraction worker

use crate::domain::types::{DestinationName, SequenceNumber, StreamSessionId, UnitId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The closed set of message shapes the device protocol produces
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Sentinel-prefixed, length-delimited packet with trailing checksum
    #[display("binary packet")]
    BinaryPacket,
    /// Unit-tagged text line
    #[display("unit line")]
    UnitLine,
    /// Boot/resynchronization marker line
    #[display("sync marker")]
    SyncMarker,
    /// Backtick-led command that declares or targets a destination
    #[display("named command")]
    NamedCommand,
    /// Fixed-size binary frame tagged by its leading unit byte
    #[display("fixed frame")]
    FixedFrame,
    /// Any other terminated line
    #[display("plain text")]
    PlainText,
    /// A line-based shape that never completed
    #[display("partial message")]
    PartialMessage,
    /// A unit line whose unit id is out of range
    #[display("invalid unit line")]
    InvalidUnitLine,
}

impl ShapeKind {
    /// Shapes that are terminated by a line feed
    pub fn is_line_based(self) -> bool {
        matches!(
            self,
            Self::UnitLine
                | Self::SyncMarker
                | Self::NamedCommand
                | Self::PlainText
                | Self::InvalidUnitLine
        )
    }
}

/// Warning attached to a message that was delivered despite a problem
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    #[display("unit id {found} is outside 0..=7")]
    InvalidUnitId { found: u16 },
    #[display("{waited_ms}ms without completing a {partial_of}")]
    Incomplete {
        partial_of: ShapeKind,
        waited_ms: u64,
    },
    #[display("no line terminator within {limit} bytes")]
    OversizedLine { limit: usize },
}

/// Result of tier-two validation as carried on a delivered message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Valid,
    Warning(ValidationWarning),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Routing-relevant facts extracted alongside the payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub unit_id: Option<UnitId>,
    /// Destinations the message is addressed to, in wire order
    pub destinations: Vec<DestinationName>,
    /// Name introduced by a declaration command
    pub declared: Option<DestinationName>,
    /// Shape a partial message was a prefix of
    pub partial_of: Option<ShapeKind>,
    /// Tag byte of a binary packet
    pub packet_tag: Option<u8>,
}

impl MessageMetadata {
    /// First addressed destination, if any
    pub fn destination_name(&self) -> Option<&DestinationName> {
        self.destinations.first()
    }
}

/// A classified message; immutable once built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedMessage {
    session: StreamSessionId,
    sequence: SequenceNumber,
    kind: ShapeKind,
    payload: Bytes,
    raw: Bytes,
    timestamp: DateTime<Utc>,
    validation: ValidationOutcome,
    metadata: MessageMetadata,
}

impl ExtractedMessage {
    /// Start building a message from the span it was extracted from
    pub fn builder(kind: ShapeKind, raw: Bytes) -> ExtractedMessageBuilder {
        ExtractedMessageBuilder {
            kind,
            payload: raw.clone(),
            raw,
            validation: ValidationOutcome::Valid,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn session(&self) -> StreamSessionId {
        self.session
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The complete consumed span, framing included
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn validation(&self) -> &ValidationOutcome {
        &self.validation
    }

    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    /// Payload as text with the line terminator removed
    pub fn text(&self) -> String {
        let trimmed = self
            .payload
            .strip_suffix(b"\n")
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .unwrap_or(&self.payload[..]);
        String::from_utf8_lossy(trimmed).into_owned()
    }

    /// Fields that are identical across two runs over the same bytes
    pub fn content_eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
            && self.kind == other.kind
            && self.payload == other.payload
            && self.raw == other.raw
            && self.validation == other.validation
            && self.metadata == other.metadata
    }
}

/// Staging area for a message whose sequence and timestamp are assigned last
#[derive(Clone, Debug)]
pub struct ExtractedMessageBuilder {
    kind: ShapeKind,
    payload: Bytes,
    raw: Bytes,
    validation: ValidationOutcome,
    metadata: MessageMetadata,
}

impl ExtractedMessageBuilder {
    pub fn kind(mut self, kind: ShapeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn warning(mut self, warning: ValidationWarning) -> Self {
        self.validation = ValidationOutcome::Warning(warning);
        self
    }

    pub fn metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn current_kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn build(self, session: StreamSessionId, sequence: SequenceNumber) -> ExtractedMessage {
        ExtractedMessage {
            session,
            sequence,
            kind: self.kind,
            payload: self.payload,
            raw: self.raw,
            timestamp: Utc::now(),
            validation: self.validation,
            metadata: self.metadata,
        }
    }
}
