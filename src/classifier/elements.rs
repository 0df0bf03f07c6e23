//! Element matchers: the building blocks of a pattern
//!
//! Each element reads from the ring's speculative cursor. An element either
//! matches (and leaves the cursor after what it matched), needs more bytes
//! than are buffered, or definitely does not match. Nothing here consumes.

use crate::buffer::{ByteRing, ReadPosition};
use crate::domain::validation_constants::line;
use bytes::Bytes;
use std::ops::Range;

/// Width of a length field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthWidth {
    U8,
    U16,
    U32,
}

impl LengthWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// How an element recognizes bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// One byte with exactly this value
    ExactByte(u8),
    /// Any single byte
    AnyByte,
    /// One byte within `min..=max`
    ByteRange { min: u8, max: u8 },
    /// A length field followed by that many bytes; lengths above `max_len` never match
    LengthPrefixed {
        width: LengthWidth,
        endian: Endian,
        max_len: usize,
    },
    /// Everything up to (not including) `byte`, which must appear within `max_lookahead` bytes
    ReadUntil { byte: u8, max_lookahead: usize },
    /// ASCII decimal digits, at most `max_digits`, whose value lies in `min..=max`
    DecimalRange {
        min: u32,
        max: u32,
        max_digits: usize,
    },
    /// Exactly this many bytes of anything
    FixedSize(usize),
    /// These bytes verbatim
    Literal(Bytes),
    /// `\n` or `\r\n`
    Terminator,
}

/// Role of a captured span inside the matched message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Unit,
    Tag,
    Payload,
    Checksum,
    Body,
}

/// One pattern element: a matcher and what to remember about it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub matcher: Matcher,
    pub capture: Option<Field>,
}

impl Element {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            capture: None,
        }
    }

    pub fn capture(matcher: Matcher, field: Field) -> Self {
        Self {
            matcher,
            capture: Some(field),
        }
    }

    pub fn literal(text: &str) -> Self {
        Self::new(Matcher::Literal(Bytes::copy_from_slice(text.as_bytes())))
    }
}

/// A span of the candidate message and its numeric value, if it has one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub field: Field,
    /// Offsets relative to the start of the candidate message
    pub span: Range<usize>,
    pub value: Option<u64>,
}

/// Captures gathered while matching one pattern
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchedFields {
    captures: Vec<Capture>,
}

impl MatchedFields {
    pub fn push(&mut self, capture: Capture) {
        self.captures.push(capture);
    }

    pub fn get(&self, field: Field) -> Option<&Capture> {
        self.captures.iter().find(|c| c.field == field)
    }

    pub fn value(&self, field: Field) -> Option<u64> {
        self.get(field).and_then(|c| c.value)
    }

    pub fn span(&self, field: Field) -> Option<Range<usize>> {
        self.get(field).map(|c| c.span.clone())
    }
}

/// Result of matching one element or a whole pattern
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementOutcome {
    Matched,
    Incomplete,
    NoMatch,
}

impl Element {
    /// Match at the ring's speculative cursor
    ///
    /// `origin` is where the candidate message starts, so captured spans are
    /// message-relative. On `Matched` the cursor sits after the element; on
    /// any other outcome the cursor position is unspecified and the caller
    /// restores it.
    pub fn match_at<R: ByteRing>(
        &self,
        ring: &mut R,
        origin: ReadPosition,
        fields: &mut MatchedFields,
    ) -> ElementOutcome {
        let start = ring.save_position().offset();
        let mut value = None;

        let outcome = match &self.matcher {
            Matcher::ExactByte(expected) => match ring.read_byte() {
                None => ElementOutcome::Incomplete,
                Some(byte) if byte == *expected => ElementOutcome::Matched,
                Some(_) => ElementOutcome::NoMatch,
            },
            Matcher::AnyByte => match ring.read_byte() {
                None => ElementOutcome::Incomplete,
                Some(byte) => {
                    value = Some(u64::from(byte));
                    ElementOutcome::Matched
                }
            },
            Matcher::ByteRange { min, max } => match ring.read_byte() {
                None => ElementOutcome::Incomplete,
                Some(byte) if (*min..=*max).contains(&byte) => {
                    value = Some(u64::from(byte));
                    ElementOutcome::Matched
                }
                Some(_) => ElementOutcome::NoMatch,
            },
            Matcher::LengthPrefixed {
                width,
                endian,
                max_len,
            } => {
                return self.match_length_prefixed(ring, origin, fields, *width, *endian, *max_len)
            }
            Matcher::ReadUntil {
                byte,
                max_lookahead,
            } => read_until(ring, start, *byte, *max_lookahead),
            Matcher::DecimalRange {
                min,
                max,
                max_digits,
            } => match read_decimal(ring, start, *max_digits) {
                DecimalRead::Value(parsed) if (*min..=*max).contains(&parsed) => {
                    value = Some(u64::from(parsed));
                    ElementOutcome::Matched
                }
                DecimalRead::Value(_) | DecimalRead::NotANumber => ElementOutcome::NoMatch,
                DecimalRead::NeedMore => ElementOutcome::Incomplete,
            },
            Matcher::FixedSize(size) => skip_exact(ring, start, *size),
            Matcher::Literal(expected) => {
                let mut outcome = ElementOutcome::Matched;
                for want in expected.iter() {
                    match ring.read_byte() {
                        None => {
                            outcome = ElementOutcome::Incomplete;
                            break;
                        }
                        Some(byte) if byte == *want => {}
                        Some(_) => {
                            outcome = ElementOutcome::NoMatch;
                            break;
                        }
                    }
                }
                outcome
            }
            Matcher::Terminator => match ring.read_byte() {
                None => ElementOutcome::Incomplete,
                Some(line::LF) => ElementOutcome::Matched,
                Some(line::CR) => match ring.read_byte() {
                    None => ElementOutcome::Incomplete,
                    Some(line::LF) => ElementOutcome::Matched,
                    Some(_) => ElementOutcome::NoMatch,
                },
                Some(_) => ElementOutcome::NoMatch,
            },
        };

        if outcome == ElementOutcome::Matched {
            if let Some(field) = self.capture {
                let end = ring.save_position().offset();
                fields.push(Capture {
                    field,
                    span: (start - origin.offset())..(end - origin.offset()),
                    value,
                });
            }
        }
        outcome
    }

    fn match_length_prefixed<R: ByteRing>(
        &self,
        ring: &mut R,
        origin: ReadPosition,
        fields: &mut MatchedFields,
        width: LengthWidth,
        endian: Endian,
        max_len: usize,
    ) -> ElementOutcome {
        let mut raw = [0u8; 4];
        for slot in raw.iter_mut().take(width.bytes()) {
            match ring.read_byte() {
                Some(byte) => *slot = byte,
                None => return ElementOutcome::Incomplete,
            }
        }
        let length = decode_length(&raw[..width.bytes()], endian);
        if length > max_len as u64 {
            return ElementOutcome::NoMatch;
        }

        let body_start = ring.save_position().offset();
        let outcome = skip_exact(ring, body_start, length as usize);
        if outcome == ElementOutcome::Matched {
            if let Some(field) = self.capture {
                let end = ring.save_position().offset();
                fields.push(Capture {
                    field,
                    span: (body_start - origin.offset())..(end - origin.offset()),
                    value: Some(length),
                });
            }
        }
        outcome
    }
}

fn decode_length(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
    match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    }
}

fn skip_exact<R: ByteRing>(ring: &mut R, start: usize, size: usize) -> ElementOutcome {
    if size > 0 && ring.peek_byte(start + size - 1).is_none() {
        return ElementOutcome::Incomplete;
    }
    ring.restore_position(ReadPosition::at(start + size));
    ElementOutcome::Matched
}

fn read_until<R: ByteRing>(
    ring: &mut R,
    start: usize,
    stop: u8,
    max_lookahead: usize,
) -> ElementOutcome {
    for i in 0..max_lookahead {
        match ring.peek_byte(start + i) {
            None => return ElementOutcome::Incomplete,
            Some(byte) if byte == stop => {
                ring.restore_position(ReadPosition::at(start + i));
                return ElementOutcome::Matched;
            }
            Some(_) => {}
        }
    }
    ElementOutcome::NoMatch
}

enum DecimalRead {
    Value(u32),
    NotANumber,
    NeedMore,
}

fn read_decimal<R: ByteRing>(ring: &mut R, start: usize, max_digits: usize) -> DecimalRead {
    let mut parsed: u32 = 0;
    let mut digits = 0;
    while digits < max_digits {
        match ring.peek_byte(start + digits) {
            None => return DecimalRead::NeedMore,
            Some(byte) if byte.is_ascii_digit() => {
                parsed = parsed.saturating_mul(10).saturating_add(u32::from(byte - b'0'));
                digits += 1;
            }
            Some(_) => break,
        }
    }
    if digits == 0 {
        return DecimalRead::NotANumber;
    }
    ring.restore_position(ReadPosition::at(start + digits));
    DecimalRead::Value(parsed)
}
