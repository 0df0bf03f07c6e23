//! Per-destination FIFO

use crate::domain::message::ExtractedMessage;
use crate::domain::types::DestinationName;
use std::collections::VecDeque;

/// Messages held for one named destination until it can take them
///
/// A queue exists as soon as anything refers to its name. `registered` means
/// the host created the destination; `ready` means it accepts deliveries.
#[derive(Clone, Debug)]
pub struct DestinationQueue {
    name: DestinationName,
    registered: bool,
    ready: bool,
    pending: VecDeque<ExtractedMessage>,
}

impl DestinationQueue {
    /// Queue for a name seen on the wire but not created by the host
    pub fn speculative(name: DestinationName) -> Self {
        Self {
            name,
            registered: false,
            ready: false,
            pending: VecDeque::new(),
        }
    }

    pub fn registered(name: DestinationName) -> Self {
        Self {
            registered: true,
            ..Self::speculative(name)
        }
    }

    pub fn name(&self) -> &DestinationName {
        &self.name
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// Mark ready and hand back the backlog in arrival order
    pub fn mark_ready(&mut self) -> Vec<ExtractedMessage> {
        self.registered = true;
        self.ready = true;
        self.take_pending()
    }

    pub fn enqueue(&mut self, message: ExtractedMessage) {
        self.pending.push_back(message);
    }

    pub fn take_pending(&mut self) -> Vec<ExtractedMessage> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop the backlog; returns how many messages were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
