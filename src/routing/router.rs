//! Fan-out of classified messages to the default sink and named destinations

use crate::domain::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticsSink};
use crate::domain::message::ExtractedMessage;
use crate::domain::types::{DestinationName, StreamSessionId};
use crate::extraction::ExtractionBatch;
use crate::infrastructure::log_messages::routing as log_msg;
use crate::routing::destination_queue::DestinationQueue;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Receives every classified message, in extraction order
pub trait DefaultSink: Send {
    fn on_message(&mut self, message: &ExtractedMessage);
}

/// Receives messages addressed to a ready destination
pub trait DestinationSink: Send {
    fn on_routed_message(&mut self, destination: &DestinationName, message: ExtractedMessage);
}

/// Sink that logs each message through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DefaultSink for TracingSink {
    fn on_message(&mut self, message: &ExtractedMessage) {
        debug!(
            sequence = %message.sequence(),
            kind = %message.kind(),
            text = %message.text(),
            "message"
        );
    }
}

impl DestinationSink for TracingSink {
    fn on_routed_message(&mut self, destination: &DestinationName, message: ExtractedMessage) {
        debug!(
            %destination,
            sequence = %message.sequence(),
            kind = %message.kind(),
            "routed message"
        );
    }
}

/// Sink that records what it receives; clones share the record
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<ExtractedMessage>>>,
    routed: Arc<Mutex<Vec<(DestinationName, ExtractedMessage)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ExtractedMessage> {
        self.messages.lock().clone()
    }

    pub fn routed(&self) -> Vec<(DestinationName, ExtractedMessage)> {
        self.routed.lock().clone()
    }

    /// Messages delivered to one destination, in delivery order
    pub fn routed_to(&self, destination: &DestinationName) -> Vec<ExtractedMessage> {
        self.routed
            .lock()
            .iter()
            .filter(|(name, _)| name == destination)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl DefaultSink for RecordingSink {
    fn on_message(&mut self, message: &ExtractedMessage) {
        self.messages.lock().push(message.clone());
    }
}

impl DestinationSink for RecordingSink {
    fn on_routed_message(&mut self, destination: &DestinationName, message: ExtractedMessage) {
        self.routed.lock().push((destination.clone(), message));
    }
}

/// Delivers messages and keeps one queue per named destination
pub struct Router {
    default_sink: Box<dyn DefaultSink>,
    destination_sink: Box<dyn DestinationSink>,
    diagnostics: Box<dyn DiagnosticsSink>,
    queues: BTreeMap<DestinationName, DestinationQueue>,
    /// Unregistered names already reported this session
    reported: HashSet<DestinationName>,
    session: Option<StreamSessionId>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("queues", &self.queues)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn new(
        default_sink: impl DefaultSink + 'static,
        destination_sink: impl DestinationSink + 'static,
        diagnostics: impl DiagnosticsSink + 'static,
    ) -> Self {
        Self {
            default_sink: Box::new(default_sink),
            destination_sink: Box::new(destination_sink),
            diagnostics: Box::new(diagnostics),
            queues: BTreeMap::new(),
            reported: HashSet::new(),
            session: None,
        }
    }

    /// Report the batch's diagnostics, then route its messages in order
    ///
    /// A `StreamReset` diagnostic resets routing state at that point in the
    /// stream, after every batch classified before the reset.
    pub fn route_batch(&mut self, batch: ExtractionBatch) -> usize {
        self.observe_session(batch.session);
        for event in &batch.diagnostics {
            self.diagnostics.on_diagnostic(event);
            if matches!(event.kind, DiagnosticKind::StreamReset { .. }) {
                self.reset();
            }
        }
        let count = batch.messages.len();
        for message in batch.messages {
            self.route(message);
        }
        count
    }

    /// Pass a producer-side diagnostic to the diagnostics sink
    pub fn report(&mut self, event: &DiagnosticEvent) {
        self.diagnostics.on_diagnostic(event);
    }

    pub fn route(&mut self, message: ExtractedMessage) {
        self.observe_session(message.session());
        self.default_sink.on_message(&message);

        if let Some(declared) = &message.metadata().declared {
            if !self.queues.contains_key(declared) {
                debug!(destination = %declared, "{}", log_msg::DESTINATION_DECLARED);
                self.queues
                    .insert(declared.clone(), DestinationQueue::speculative(declared.clone()));
            }
        }

        for name in &message.metadata().destinations {
            let queue = self
                .queues
                .entry(name.clone())
                .or_insert_with(|| DestinationQueue::speculative(name.clone()));

            if !queue.is_registered() && self.reported.insert(name.clone()) {
                trace!(destination = %name, "{}", log_msg::SPECULATIVE_QUEUE);
                let event = DiagnosticEvent::new(
                    DiagnosticKind::UnknownDestinationTarget { name: name.clone() },
                    message.session(),
                    message.sequence().next(),
                );
                self.diagnostics.on_diagnostic(&event);
            }

            if queue.is_ready() {
                self.destination_sink
                    .on_routed_message(name, message.clone());
            } else {
                queue.enqueue(message.clone());
            }
        }
    }

    /// Record that the host created `name`; returns whether it was new
    pub fn register_destination(&mut self, name: DestinationName) -> bool {
        info!(destination = %name, "{}", log_msg::DESTINATION_REGISTERED);
        self.reported.remove(&name);
        match self.queues.get_mut(&name) {
            Some(queue) if queue.is_registered() => false,
            Some(queue) => {
                queue.mark_registered();
                true
            }
            None => {
                self.queues
                    .insert(name.clone(), DestinationQueue::registered(name));
                true
            }
        }
    }

    /// Forget `name` and drop its backlog; returns how many messages were dropped
    pub fn deregister_destination(&mut self, name: &DestinationName) -> usize {
        self.reported.remove(name);
        let dropped = self
            .queues
            .remove(name)
            .map(|mut queue| queue.clear())
            .unwrap_or(0);
        info!(destination = %name, dropped, "{}", log_msg::DESTINATION_REMOVED);
        dropped
    }

    /// Deliver the backlog of `name` in order and deliver directly from now on
    ///
    /// A name nobody mentioned before is registered on the spot. Returns the
    /// number of backlogged messages delivered.
    pub fn set_ready(&mut self, name: &DestinationName) -> usize {
        let queue = self
            .queues
            .entry(name.clone())
            .or_insert_with(|| DestinationQueue::registered(name.clone()));
        let backlog = queue.mark_ready();
        let delivered = backlog.len();
        info!(destination = %name, delivered, "{}", log_msg::DESTINATION_READY);
        for message in backlog {
            self.destination_sink.on_routed_message(name, message);
        }
        delivered
    }

    /// Hand the backlog of `name` to the caller without making it ready
    pub fn take_pending(&mut self, name: &DestinationName) -> Vec<ExtractedMessage> {
        self.queues
            .get_mut(name)
            .map(DestinationQueue::take_pending)
            .unwrap_or_default()
    }

    pub fn pending_len(&self, name: &DestinationName) -> usize {
        self.queues.get(name).map_or(0, DestinationQueue::len)
    }

    pub fn is_registered(&self, name: &DestinationName) -> bool {
        self.queues
            .get(name)
            .is_some_and(DestinationQueue::is_registered)
    }

    pub fn is_ready(&self, name: &DestinationName) -> bool {
        self.queues.get(name).is_some_and(DestinationQueue::is_ready)
    }

    /// Every destination the router knows, registered or not
    pub fn destinations(&self) -> impl Iterator<Item = &DestinationQueue> {
        self.queues.values()
    }

    /// Forget stream-derived state after a reset
    ///
    /// Backlogs are dropped and names only declared on the wire are forgotten;
    /// host registrations and readiness survive. Returns the messages dropped.
    pub fn reset(&mut self) -> usize {
        self.reported.clear();
        let dropped = self.queues.values_mut().map(DestinationQueue::clear).sum();
        self.queues.retain(|_, queue| queue.is_registered());
        info!(dropped, "{}", log_msg::QUEUES_CLEARED);
        dropped
    }

    fn observe_session(&mut self, session: StreamSessionId) {
        if self.session != Some(session) {
            self.session = Some(session);
            self.reported.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnostics::RecordingDiagnostics;
    use crate::domain::message::{MessageMetadata, ShapeKind};
    use crate::domain::types::SequenceNumber;
    use bytes::Bytes;

    struct Fixture {
        router: Router,
        sink: RecordingSink,
        diagnostics: RecordingDiagnostics,
        session: StreamSessionId,
        next: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let sink = RecordingSink::new();
            let diagnostics = RecordingDiagnostics::new();
            Self {
                router: Router::new(sink.clone(), sink.clone(), diagnostics.clone()),
                sink,
                diagnostics,
                session: StreamSessionId::generate(),
                next: 0,
            }
        }

        fn message(&mut self, raw: &str, metadata: MessageMetadata) -> ExtractedMessage {
            let message =
                ExtractedMessage::builder(ShapeKind::NamedCommand, Bytes::from(raw.to_string()))
                    .metadata(metadata)
                    .build(self.session, SequenceNumber::new(self.next));
            self.next += 1;
            message
        }

        fn send_to(&mut self, names: &[&str], raw: &str) {
            let metadata = MessageMetadata {
                destinations: names.iter().map(|n| name(n)).collect(),
                ..MessageMetadata::default()
            };
            let message = self.message(raw, metadata);
            self.router.route(message);
        }

        fn declare(&mut self, declared: &str) {
            let metadata = MessageMetadata {
                declared: Some(name(declared)),
                ..MessageMetadata::default()
            };
            let message = self.message(&format!("`TERM {declared}\n"), metadata);
            self.router.route(message);
        }

        fn unknown_target_reports(&self) -> usize {
            self.diagnostics
                .count_where(|k| matches!(k, DiagnosticKind::UnknownDestinationTarget { .. }))
        }
    }

    fn name(raw: &str) -> DestinationName {
        DestinationName::try_new(raw).unwrap()
    }

    fn texts(messages: &[ExtractedMessage]) -> Vec<String> {
        messages.iter().map(ExtractedMessage::text).collect()
    }

    #[test]
    fn every_message_reaches_the_default_sink() {
        let mut fx = Fixture::new();
        fx.declare("T");
        fx.send_to(&["T"], "`T one\n");
        fx.send_to(&[], "plain\n");
        assert_eq!(fx.sink.messages().len(), 3);
        assert!(fx.sink.routed().is_empty());
    }

    #[test]
    fn declaration_creates_speculative_queue() {
        let mut fx = Fixture::new();
        fx.declare("MyTerm");
        let my_term = name("MyTerm");
        assert!(!fx.router.is_registered(&my_term));
        assert_eq!(fx.router.pending_len(&my_term), 0);
        assert_eq!(fx.router.destinations().count(), 1);
    }

    #[test]
    fn backlog_drains_in_order_then_delivers_directly() {
        let mut fx = Fixture::new();
        fx.declare("T");
        for n in 0..3 {
            fx.send_to(&["T"], &format!("`T {n}\n"));
        }
        assert_eq!(fx.router.pending_len(&name("T")), 3);

        fx.router.register_destination(name("T"));
        assert_eq!(fx.router.set_ready(&name("T")), 3);
        fx.send_to(&["T"], "`T 3\n");

        assert_eq!(
            texts(&fx.sink.routed_to(&name("T"))),
            vec!["`T 0", "`T 1", "`T 2", "`T 3"]
        );
        assert_eq!(fx.router.pending_len(&name("T")), 0);
    }

    #[test]
    fn unknown_target_is_reported_once_per_session() {
        let mut fx = Fixture::new();
        fx.send_to(&["Ghost"], "`Ghost a\n");
        fx.send_to(&["Ghost"], "`Ghost b\n");
        assert_eq!(fx.unknown_target_reports(), 1);

        fx.session = StreamSessionId::generate();
        fx.send_to(&["Ghost"], "`Ghost c\n");
        assert_eq!(fx.unknown_target_reports(), 2);
    }

    #[test]
    fn registered_targets_are_not_reported() {
        let mut fx = Fixture::new();
        fx.router.register_destination(name("Scope"));
        fx.send_to(&["Scope"], "`Scope 1\n");
        assert_eq!(fx.unknown_target_reports(), 0);
        assert_eq!(fx.router.pending_len(&name("Scope")), 1);
    }

    #[test]
    fn multi_destination_messages_fan_out() {
        let mut fx = Fixture::new();
        fx.router.set_ready(&name("A"));
        fx.router.register_destination(name("B"));
        fx.send_to(&["A", "B"], "`A B both\n");

        assert_eq!(texts(&fx.sink.routed_to(&name("A"))), vec!["`A B both"]);
        assert_eq!(fx.router.pending_len(&name("B")), 1);
    }

    #[test]
    fn deregistration_discards_backlog() {
        let mut fx = Fixture::new();
        fx.router.register_destination(name("T"));
        fx.send_to(&["T"], "`T 1\n");
        fx.send_to(&["T"], "`T 2\n");
        assert_eq!(fx.router.deregister_destination(&name("T")), 2);
        assert!(!fx.router.is_registered(&name("T")));
        assert_eq!(fx.router.set_ready(&name("T")), 0);
    }

    #[test]
    fn take_pending_leaves_destination_not_ready() {
        let mut fx = Fixture::new();
        fx.router.register_destination(name("T"));
        fx.send_to(&["T"], "`T 1\n");
        assert_eq!(texts(&fx.router.take_pending(&name("T"))), vec!["`T 1"]);
        assert!(!fx.router.is_ready(&name("T")));
        assert!(fx.router.take_pending(&name("Nobody")).is_empty());
    }

    #[test]
    fn reset_keeps_registrations_only() {
        let mut fx = Fixture::new();
        fx.router.register_destination(name("Kept"));
        fx.router.set_ready(&name("Ready"));
        fx.declare("Declared");
        fx.send_to(&["Kept"], "`Kept 1\n");
        fx.send_to(&["Declared"], "`Declared 1\n");

        assert_eq!(fx.router.reset(), 2);
        assert!(fx.router.is_registered(&name("Kept")));
        assert!(fx.router.is_ready(&name("Ready")));
        assert_eq!(fx.router.pending_len(&name("Kept")), 0);
        assert_eq!(fx.router.destinations().count(), 2);
    }

    #[test]
    fn batches_forward_their_diagnostics() {
        let mut fx = Fixture::new();
        let mut batch = ExtractionBatch::empty(fx.session);
        batch.diagnostics.push(DiagnosticEvent::new(
            DiagnosticKind::NoPatternMatched { byte: 0 },
            fx.session,
            SequenceNumber::first(),
        ));
        let message = fx.message("x\n", MessageMetadata::default());
        batch.messages.push(message);

        assert_eq!(fx.router.route_batch(batch), 1);
        assert_eq!(fx.diagnostics.events().len(), 1);
        assert_eq!(fx.sink.messages().len(), 1);
    }

    #[test]
    fn stream_reset_in_a_batch_clears_backlogs() {
        let mut fx = Fixture::new();
        fx.router.register_destination(name("T"));
        fx.declare("Gone");
        fx.send_to(&["T"], "`T before\n");

        fx.session = StreamSessionId::generate();
        let mut batch = ExtractionBatch::empty(fx.session);
        batch.diagnostics.push(DiagnosticEvent::new(
            DiagnosticKind::StreamReset { discarded: 7 },
            fx.session,
            SequenceNumber::first(),
        ));
        fx.router.route_batch(batch);

        assert_eq!(fx.router.pending_len(&name("T")), 0);
        assert!(fx.router.is_registered(&name("T")));
        assert_eq!(fx.router.destinations().count(), 1);
    }
}
