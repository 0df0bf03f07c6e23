//! Second-tier validation of structural matches
//!
//! A structural match only says the bytes have the right layout. The validator
//! decides what the match means: it verifies checksums, range-checks unit ids,
//! resolves command tokens against the destination catalog and fills in the
//! routing metadata.

use crate::classifier::catalog::{DestinationCatalog, TokenClass};
use crate::classifier::checksum::{read_checksum_field, AdditiveChecksum, PacketChecksum};
use crate::classifier::elements::{Field, MatchedFields};
use crate::classifier::patterns::{PatternDefinition, ValidationRule};
use crate::domain::diagnostics::DiagnosticKind;
use crate::domain::message::{
    ExtractedMessage, ExtractedMessageBuilder, MessageMetadata, ShapeKind, ValidationWarning,
};
use crate::domain::types::{DestinationName, UnitId};
use crate::domain::validation_constants::line;
use bytes::Bytes;
use std::sync::Arc;

/// Payload bytes rendered into a checksum diagnostic
const PAYLOAD_HEAD_LEN: usize = 8;

/// What to do with a structural match
#[derive(Debug)]
pub enum Verdict {
    /// Emit the message; `notice` is reported alongside it
    Accept {
        message: ExtractedMessageBuilder,
        notice: Option<DiagnosticKind>,
    },
    /// Drop the span and report why
    Reject(DiagnosticKind),
    /// The bytes are an ordinary text line after all
    Demote,
}

impl Verdict {
    fn accept(message: ExtractedMessageBuilder) -> Self {
        Self::Accept {
            message,
            notice: None,
        }
    }
}

#[derive(Clone)]
pub struct Validator {
    checksum: Arc<dyn PacketChecksum>,
    frame_prefix: String,
    max_line: usize,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("checksum", &self.checksum.name())
            .field("frame_prefix", &self.frame_prefix)
            .field("max_line", &self.max_line)
            .finish()
    }
}

impl Validator {
    pub fn new(frame_prefix: impl Into<String>, max_line: usize) -> Self {
        Self {
            checksum: Arc::new(AdditiveChecksum),
            frame_prefix: frame_prefix.into(),
            max_line,
        }
    }

    pub fn with_checksum(mut self, checksum: Arc<dyn PacketChecksum>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn checksum_name(&self) -> &'static str {
        self.checksum.name()
    }

    /// Judge a structural match over `raw`, the complete matched span
    ///
    /// Declarations are recorded in `catalog` so later lines can target them.
    pub fn validate(
        &self,
        pattern: &PatternDefinition,
        raw: Bytes,
        fields: &MatchedFields,
        catalog: &mut DestinationCatalog,
    ) -> Verdict {
        let message = ExtractedMessage::builder(pattern.kind, raw.clone());
        match pattern.rule {
            ValidationRule::None => Verdict::accept(message),
            ValidationRule::PacketChecksum => self.check_packet(message, &raw, fields),
            ValidationRule::UnitRange => check_unit(message, fields),
            ValidationRule::CommandCatalog => resolve_command(message, &raw, fields, catalog),
            ValidationRule::FixedFrame => self.route_frame(message, fields),
            ValidationRule::Fallback => self.check_line(message, &raw),
        }
    }

    /// Message for bytes that failed command validation
    pub fn demoted(&self, raw: Bytes) -> ExtractedMessageBuilder {
        ExtractedMessage::builder(ShapeKind::PlainText, raw)
    }

    fn check_packet(
        &self,
        message: ExtractedMessageBuilder,
        raw: &Bytes,
        fields: &MatchedFields,
    ) -> Verdict {
        let (Some(payload_span), Some(checksum_span)) =
            (fields.span(Field::Payload), fields.span(Field::Checksum))
        else {
            return Verdict::accept(message);
        };
        let payload = raw.slice(payload_span);
        let computed = self.checksum.compute(&payload);
        let expected = read_checksum_field(&raw[checksum_span]).unwrap_or(!computed);

        if expected != computed {
            return Verdict::Reject(DiagnosticKind::ChecksumMismatch {
                expected,
                computed,
                payload_len: payload.len(),
                payload_head: hex::encode(&payload[..payload.len().min(PAYLOAD_HEAD_LEN)]),
            });
        }

        let metadata = MessageMetadata {
            packet_tag: fields.value(Field::Tag).map(|tag| tag as u8),
            ..MessageMetadata::default()
        };
        Verdict::accept(message.payload(payload).metadata(metadata))
    }

    fn route_frame(&self, message: ExtractedMessageBuilder, fields: &MatchedFields) -> Verdict {
        let unit_id = fields
            .value(Field::Unit)
            .and_then(|unit| u8::try_from(unit).ok())
            .and_then(|unit| UnitId::try_new(unit).ok());
        let destinations = unit_id
            .and_then(|unit| DestinationName::for_frame(&self.frame_prefix, unit))
            .into_iter()
            .collect();
        Verdict::accept(message.metadata(MessageMetadata {
            unit_id,
            destinations,
            ..MessageMetadata::default()
        }))
    }

    fn check_line(&self, message: ExtractedMessageBuilder, raw: &Bytes) -> Verdict {
        if raw.last() == Some(&line::LF) {
            return Verdict::accept(message);
        }
        let limit = self.max_line;
        Verdict::Accept {
            message: message.warning(ValidationWarning::OversizedLine { limit }),
            notice: Some(DiagnosticKind::OversizedLine { limit }),
        }
    }
}

fn check_unit(message: ExtractedMessageBuilder, fields: &MatchedFields) -> Verdict {
    let found = fields.value(Field::Unit).unwrap_or(u64::MAX);
    match u8::try_from(found).ok().map(UnitId::try_new) {
        Some(Ok(unit_id)) => Verdict::accept(message.metadata(MessageMetadata {
            unit_id: Some(unit_id),
            ..MessageMetadata::default()
        })),
        _ => {
            let found = u16::try_from(found).unwrap_or(u16::MAX);
            Verdict::Accept {
                message: message
                    .kind(ShapeKind::InvalidUnitLine)
                    .warning(ValidationWarning::InvalidUnitId { found }),
                notice: Some(DiagnosticKind::InvalidUnitId { found }),
            }
        }
    }
}

fn resolve_command(
    message: ExtractedMessageBuilder,
    raw: &Bytes,
    fields: &MatchedFields,
    catalog: &mut DestinationCatalog,
) -> Verdict {
    let Some(body) = fields.span(Field::Body) else {
        return Verdict::Demote;
    };
    let text = String::from_utf8_lossy(&raw[body]);
    let mut tokens = text.split_whitespace();

    let Some(first) = tokens.next() else {
        return Verdict::Demote;
    };

    match catalog.classify(first) {
        TokenClass::Keyword => {
            let Some(name) = tokens.next().and_then(|t| DestinationName::try_new(t).ok()) else {
                return Verdict::Demote;
            };
            catalog.declare(name.clone());
            Verdict::accept(message.metadata(MessageMetadata {
                declared: Some(name),
                ..MessageMetadata::default()
            }))
        }
        TokenClass::Destination(name) => {
            let mut destinations = vec![name];
            for token in tokens {
                match catalog.classify(token) {
                    TokenClass::Destination(next) if !destinations.contains(&next) => {
                        destinations.push(next)
                    }
                    TokenClass::Destination(_) => {}
                    _ => break,
                }
            }
            Verdict::accept(message.metadata(MessageMetadata {
                destinations,
                ..MessageMetadata::default()
            }))
        }
        TokenClass::Unknown => Verdict::Demote,
    }
}
