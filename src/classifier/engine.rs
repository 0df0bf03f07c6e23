//! The classification pass
//!
//! A [`Classifier`] repeatedly tries the pattern catalog against the unread
//! head of a ring. Each attempt ends one of three ways:
//!
//! - a pattern matches: the span is validated, consumed and (usually) emitted
//! - the best candidate needs more bytes: the pass stops and nothing is consumed
//! - nothing matches at all: one byte is skipped and reported
//!
//! A binary candidate that never completes is eventually given up: the
//! pattern is excluded at that head and the bytes are classified again by the
//! shapes below it, so a stray low byte cannot swallow the lines behind it.
//!
//! The classifier is single-threaded and generic over [`ByteRing`], so the
//! same code runs inline over a [`crate::buffer::RingBuffer`] and inside the
//! extraction worker over a [`crate::buffer::RingConsumer`].

use crate::buffer::{ByteRing, ReadPosition};
use crate::classifier::catalog::DestinationCatalog;
use crate::classifier::checksum::PacketChecksum;
use crate::classifier::config::ClassifierConfig;
use crate::classifier::elements::MatchedFields;
use crate::classifier::patterns::{PatternCatalog, PatternMatch, ValidationRule};
use crate::classifier::validator::{Validator, Verdict};
use crate::domain::diagnostics::{DiagnosticEvent, DiagnosticKind};
use crate::domain::message::{
    ExtractedMessage, ExtractedMessageBuilder, MessageMetadata, ShapeKind, ValidationWarning,
};
use crate::domain::types::{DestinationName, SequenceNumber, StreamSessionId};
use crate::infrastructure::log_messages::classifier as log_msg;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Why a pass stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassEnd {
    /// Every buffered byte was classified
    Drained,
    /// The head is a prefix of this shape
    NeedMore { shape: ShapeKind },
    /// The per-pass message bound was reached
    BatchLimit,
}

/// Output of one pass, in stream order
#[derive(Clone, Debug)]
pub struct PassReport {
    pub messages: Vec<ExtractedMessage>,
    pub diagnostics: Vec<DiagnosticEvent>,
    pub end: PassEnd,
}

impl PassReport {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            diagnostics: Vec::new(),
            end: PassEnd::Drained,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.diagnostics.is_empty()
    }
}

/// Head of the ring that has stopped making progress
#[derive(Clone, Copy, Debug)]
struct Stall {
    shape: ShapeKind,
    buffered: usize,
    since: Instant,
    reported: bool,
}

/// Pending normalization of the zero bytes that trail a fixed frame
#[derive(Clone, Copy, Debug, Default)]
struct ZeroRun {
    remaining: usize,
    discarded: usize,
}

enum Scan {
    Matched {
        index: usize,
        len: usize,
        fields: MatchedFields,
    },
    Incomplete(ShapeKind),
    NoMatch,
}

#[derive(Debug)]
pub struct Classifier {
    config: ClassifierConfig,
    patterns: PatternCatalog,
    validator: Validator,
    catalog: DestinationCatalog,
    session: StreamSessionId,
    next_sequence: SequenceNumber,
    zero_run: ZeroRun,
    stall: Option<Stall>,
    /// Shapes given up on at the current head
    abandoned: Vec<ShapeKind>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let patterns = PatternCatalog::standard(&config);
        let validator = Validator::new(
            config.frame_destination_prefix.clone(),
            config.max_line.into_inner(),
        );
        let catalog = DestinationCatalog::new(config.declaration_keywords.iter().cloned());
        Self {
            config,
            patterns,
            validator,
            catalog,
            session: StreamSessionId::generate(),
            next_sequence: SequenceNumber::first(),
            zero_run: ZeroRun::default(),
            stall: None,
            abandoned: Vec::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: Arc<dyn PacketChecksum>) -> Self {
        self.validator = self.validator.with_checksum(checksum);
        self
    }

    /// Replace the standard shapes
    pub fn with_patterns(mut self, patterns: PatternCatalog) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn session(&self) -> StreamSessionId {
        self.session
    }

    pub fn next_sequence(&self) -> SequenceNumber {
        self.next_sequence
    }

    pub fn catalog(&self) -> &DestinationCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn register_name(&mut self, name: DestinationName) -> bool {
        self.catalog.register(name)
    }

    pub fn deregister_name(&mut self, name: &DestinationName) -> bool {
        self.catalog.deregister(name)
    }

    /// Start `session` after the caller discarded `discarded` buffered bytes
    ///
    /// Sequence numbering restarts and any pending stall or zero run is
    /// forgotten. Known destination names survive.
    pub fn reset(&mut self, session: StreamSessionId, discarded: usize) -> DiagnosticEvent {
        self.session = session;
        self.next_sequence = SequenceNumber::first();
        self.zero_run = ZeroRun::default();
        self.stall = None;
        self.abandoned.clear();
        self.diagnostic(DiagnosticKind::StreamReset { discarded })
    }

    /// Classify up to `max_messages` messages from the head of `ring`
    pub fn run_pass<R: ByteRing>(
        &mut self,
        ring: &mut R,
        max_messages: usize,
        now: Instant,
    ) -> PassReport {
        self.run(ring, max_messages, now, false)
    }

    /// Like [`Classifier::run_pass`], but nothing is left waiting
    ///
    /// A stalled line is emitted as a partial message immediately instead of
    /// after the timeout, and a stalled binary candidate is given up so its
    /// bytes reach the shapes below it.
    pub fn flush<R: ByteRing>(
        &mut self,
        ring: &mut R,
        max_messages: usize,
        now: Instant,
    ) -> PassReport {
        self.run(ring, max_messages, now, true)
    }

    fn run<R: ByteRing>(
        &mut self,
        ring: &mut R,
        max_messages: usize,
        now: Instant,
        force: bool,
    ) -> PassReport {
        let mut report = PassReport::new();

        loop {
            if report.messages.len() >= max_messages {
                report.end = PassEnd::BatchLimit;
                break;
            }
            if !self.discard_trailing_zeros(ring, &mut report) || ring.is_empty() {
                report.end = PassEnd::Drained;
                break;
            }

            match self.scan(ring) {
                Scan::Matched { index, len, fields } => {
                    self.head_moved();
                    self.accept(ring, index, len, &fields, &mut report);
                }
                Scan::Incomplete(shape) => {
                    if self.resolve_stall(ring, shape, now, force, &mut report) {
                        continue;
                    }
                    report.end = PassEnd::NeedMore { shape };
                    break;
                }
                Scan::NoMatch => {
                    self.head_moved();
                    let byte = ring.peek_byte(0).unwrap_or_default();
                    ring.consume_bytes(1);
                    warn!(byte, "{}", log_msg::LOGIC_ERROR);
                    report
                        .diagnostics
                        .push(self.diagnostic(DiagnosticKind::NoPatternMatched { byte }));
                }
            }
        }

        trace!(
            messages = report.messages.len(),
            diagnostics = report.diagnostics.len(),
            end = ?report.end,
            "classification pass"
        );
        report
    }

    /// Try every pattern in priority order without consuming
    fn scan<R: ByteRing>(&self, ring: &mut R) -> Scan {
        let mut pending: Option<ShapeKind> = None;
        let mut result = Scan::NoMatch;

        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.is_fallback() && pending.is_some() {
                break;
            }
            if !pattern.is_fallback() && self.abandoned.contains(&pattern.kind) {
                continue;
            }
            match pattern.match_at(ring) {
                PatternMatch::Matched { len, fields } if len > 0 => {
                    result = Scan::Matched { index, len, fields };
                    break;
                }
                PatternMatch::Matched { .. } | PatternMatch::NoMatch => {
                    if pattern.is_fallback() {
                        let len = self.config.max_line.into_inner().min(ring.used_bytes());
                        if len > 0 {
                            result = Scan::Matched {
                                index,
                                len,
                                fields: MatchedFields::default(),
                            };
                            break;
                        }
                    }
                }
                PatternMatch::Incomplete => {
                    pending.get_or_insert(pattern.kind);
                }
            }
        }

        ring.restore_position(ReadPosition::HEAD);
        match (result, pending) {
            (Scan::NoMatch, Some(shape)) => Scan::Incomplete(shape),
            (result, _) => result,
        }
    }

    fn accept<R: ByteRing>(
        &mut self,
        ring: &mut R,
        index: usize,
        len: usize,
        fields: &MatchedFields,
        report: &mut PassReport,
    ) {
        let raw = ring.copy_out(len);
        ring.consume_bytes(len);

        let Some(pattern) = self.patterns.iter().nth(index) else {
            return;
        };
        let is_frame = pattern.rule == ValidationRule::FixedFrame;

        match self
            .validator
            .validate(pattern, raw.clone(), fields, &mut self.catalog)
        {
            Verdict::Accept { message, notice } => {
                if let Some(kind) = notice {
                    report.diagnostics.push(self.diagnostic(kind));
                }
                self.emit(message, report);
                if is_frame {
                    self.zero_run = ZeroRun {
                        remaining: self.config.frame_zero_run,
                        discarded: 0,
                    };
                }
            }
            Verdict::Reject(kind) => {
                debug!(len, "{}: {}", log_msg::CHECKSUM_REJECTED, kind);
                report.diagnostics.push(self.diagnostic(kind));
            }
            Verdict::Demote => {
                debug!(len, "{}", log_msg::COMMAND_DEMOTED);
                let demoted = self.validator.demoted(raw);
                self.emit(demoted, report);
            }
        }
    }

    /// Drop the zero bytes the firmware appends to a fixed frame
    ///
    /// Returns `false` when the ring ran dry while the run may still continue,
    /// so the pass must wait for more bytes before classifying anything.
    fn discard_trailing_zeros<R: ByteRing>(
        &mut self,
        ring: &mut R,
        report: &mut PassReport,
    ) -> bool {
        while self.zero_run.remaining > 0 {
            match ring.peek_byte(0) {
                None => return false,
                Some(0) => {
                    ring.consume_bytes(1);
                    self.zero_run.remaining -= 1;
                    self.zero_run.discarded += 1;
                }
                Some(_) => self.zero_run.remaining = 0,
            }
        }
        if self.zero_run.discarded > 0 {
            let count = std::mem::take(&mut self.zero_run.discarded);
            report
                .diagnostics
                .push(self.diagnostic(DiagnosticKind::SpuriousZerosDiscarded { count }));
        }
        true
    }

    /// Decide what to do about a head that is still incomplete
    ///
    /// Lines are flushed as partial messages on timeout or `force`. A stalled
    /// fixed frame is given up on timeout, since any byte in the unit range
    /// starts one; a stalled packet keeps waiting for the length its header
    /// declared until `force`. Returns `true` when the pass can go on.
    fn resolve_stall<R: ByteRing>(
        &mut self,
        ring: &mut R,
        shape: ShapeKind,
        now: Instant,
        force: bool,
        report: &mut PassReport,
    ) -> bool {
        let buffered = ring.used_bytes();
        let stall = match self.stall {
            Some(stall) if stall.shape == shape && stall.buffered == buffered => stall,
            _ => Stall {
                shape,
                buffered,
                since: now,
                reported: false,
            },
        };
        let waited = now.saturating_duration_since(stall.since);
        let timed_out = waited >= self.config.incomplete_timeout;
        self.stall = Some(stall);

        if shape.is_line_based() && (force || timed_out) {
            self.flush_partial(ring, shape, waited, report);
            return true;
        }
        if force || (timed_out && shape == ShapeKind::FixedFrame) {
            self.abandon(stall, waited, report);
            return true;
        }
        if timed_out && !stall.reported {
            report.diagnostics.push(self.diagnostic(DiagnosticKind::IncompleteTimeout {
                shape,
                waited_ms: millis(waited),
                buffered,
            }));
            self.stall = Some(Stall {
                reported: true,
                ..stall
            });
        }
        false
    }

    fn abandon(&mut self, stall: Stall, waited: Duration, report: &mut PassReport) {
        let Stall {
            shape, buffered, ..
        } = stall;
        debug!(%shape, buffered, "{}", log_msg::CANDIDATE_ABANDONED);
        if !stall.reported {
            report.diagnostics.push(self.diagnostic(DiagnosticKind::IncompleteTimeout {
                shape,
                waited_ms: millis(waited),
                buffered,
            }));
        }
        self.abandoned.push(shape);
        self.stall = None;
    }

    fn head_moved(&mut self) {
        self.stall = None;
        self.abandoned.clear();
    }

    fn flush_partial<R: ByteRing>(
        &mut self,
        ring: &mut R,
        shape: ShapeKind,
        waited: Duration,
        report: &mut PassReport,
    ) {
        let buffered = ring.used_bytes();
        let len = buffered.min(self.config.max_line.into_inner());
        let raw = ring.copy_out(len);
        ring.consume_bytes(len);
        self.head_moved();

        let waited_ms = millis(waited);
        debug!(%shape, len, waited_ms, "{}", log_msg::FLUSHED_PARTIAL);
        report.diagnostics.push(self.diagnostic(DiagnosticKind::IncompleteTimeout {
            shape,
            waited_ms,
            buffered,
        }));
        let message = ExtractedMessage::builder(ShapeKind::PartialMessage, raw)
            .warning(ValidationWarning::Incomplete {
                partial_of: shape,
                waited_ms,
            })
            .metadata(MessageMetadata {
                partial_of: Some(shape),
                ..MessageMetadata::default()
            });
        self.emit(message, report);
    }

    fn emit(&mut self, message: ExtractedMessageBuilder, report: &mut PassReport) {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.next();
        report.messages.push(message.build(self.session, sequence));
    }

    fn diagnostic(&self, kind: DiagnosticKind) -> DiagnosticEvent {
        DiagnosticEvent::new(kind, self.session, self.next_sequence)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
