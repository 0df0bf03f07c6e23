//! Message shape definitions and the ordered catalog they are tried from

use crate::buffer::{ByteRing, ReadPosition};
use crate::classifier::config::ClassifierConfig;
use crate::classifier::elements::{
    Element, ElementOutcome, Endian, Field, LengthWidth, MatchedFields, Matcher,
};
use crate::domain::message::ShapeKind;
use crate::domain::validation_constants::{line, packet, unit};
use bytes::Bytes;

/// Second-tier check applied after a structural match
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationRule {
    /// Accept as matched
    None,
    /// Recompute the packet checksum
    PacketChecksum,
    /// Unit id must be a real unit
    UnitRange,
    /// First tokens must be a keyword or known destination
    CommandCatalog,
    /// Route by unit byte and drop the trailing zero run
    FixedFrame,
    /// Catch-all; never loses to a pending incomplete match
    Fallback,
}

/// Structural result of one pattern against the unread head
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternMatch {
    Matched { len: usize, fields: MatchedFields },
    Incomplete,
    NoMatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternDefinition {
    /// Lower is tried first
    pub priority: u8,
    pub kind: ShapeKind,
    pub elements: Vec<Element>,
    pub rule: ValidationRule,
}

impl PatternDefinition {
    pub fn new(priority: u8, kind: ShapeKind, elements: Vec<Element>, rule: ValidationRule) -> Self {
        Self {
            priority,
            kind,
            elements,
            rule,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.rule == ValidationRule::Fallback
    }

    /// Try every element in order from the unread head
    ///
    /// Leaves the speculative cursor wherever matching stopped; callers
    /// restore it.
    pub fn match_at<R: ByteRing>(&self, ring: &mut R) -> PatternMatch {
        ring.restore_position(ReadPosition::HEAD);
        let mut fields = MatchedFields::default();
        for element in &self.elements {
            match element.match_at(ring, ReadPosition::HEAD, &mut fields) {
                ElementOutcome::Matched => {}
                ElementOutcome::Incomplete => return PatternMatch::Incomplete,
                ElementOutcome::NoMatch => return PatternMatch::NoMatch,
            }
        }
        PatternMatch::Matched {
            len: ring.save_position().offset(),
            fields,
        }
    }
}

/// Pattern definitions in ascending priority
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternCatalog {
    patterns: Vec<PatternDefinition>,
}

impl PatternCatalog {
    pub fn new(mut patterns: Vec<PatternDefinition>) -> Self {
        patterns.sort_by_key(|p| p.priority);
        Self { patterns }
    }

    /// The device protocol's shapes
    pub fn standard(config: &ClassifierConfig) -> Self {
        let max_line = config.max_line.into_inner();
        let line_body = || {
            Element::capture(
                Matcher::ReadUntil {
                    byte: line::LF,
                    max_lookahead: max_line,
                },
                Field::Body,
            )
        };

        Self::new(vec![
            PatternDefinition::new(
                0,
                ShapeKind::BinaryPacket,
                vec![
                    Element::new(Matcher::ExactByte(packet::SENTINEL)),
                    Element::capture(Matcher::AnyByte, Field::Tag),
                    Element::capture(
                        Matcher::LengthPrefixed {
                            width: LengthWidth::U16,
                            endian: Endian::Little,
                            max_len: config.max_packet_payload,
                        },
                        Field::Payload,
                    ),
                    Element::capture(Matcher::FixedSize(packet::CHECKSUM_LEN), Field::Checksum),
                ],
                ValidationRule::PacketChecksum,
            ),
            PatternDefinition::new(
                1,
                ShapeKind::FixedFrame,
                vec![
                    Element::capture(
                        Matcher::ByteRange {
                            min: 0,
                            max: unit::MAX_ID,
                        },
                        Field::Unit,
                    ),
                    Element::new(Matcher::FixedSize(config.frame_length.into_inner() - 1)),
                ],
                ValidationRule::FixedFrame,
            ),
            PatternDefinition::new(
                2,
                ShapeKind::SyncMarker,
                vec![
                    Element::new(Matcher::Literal(Bytes::copy_from_slice(
                        config.sync_marker.as_bytes(),
                    ))),
                    Element::new(Matcher::Terminator),
                ],
                ValidationRule::None,
            ),
            PatternDefinition::new(
                3,
                ShapeKind::UnitLine,
                vec![
                    Element::literal(&config.unit_prefix),
                    Element::capture(
                        Matcher::DecimalRange {
                            min: 0,
                            max: 99,
                            max_digits: unit::MAX_DIGITS,
                        },
                        Field::Unit,
                    ),
                    Element::literal(unit::SEPARATOR),
                    line_body(),
                    Element::new(Matcher::Terminator),
                ],
                ValidationRule::UnitRange,
            ),
            PatternDefinition::new(
                4,
                ShapeKind::NamedCommand,
                vec![
                    Element::new(Matcher::ExactByte(line::COMMAND_MARKER)),
                    line_body(),
                    Element::new(Matcher::Terminator),
                ],
                ValidationRule::CommandCatalog,
            ),
            PatternDefinition::new(
                5,
                ShapeKind::PlainText,
                vec![line_body(), Element::new(Matcher::Terminator)],
                ValidationRule::Fallback,
            ),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
