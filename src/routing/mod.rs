//! Delivery of classified messages
//!
//! Every message goes to the default sink. Messages addressed to named
//! destinations are also queued per destination and delivered in arrival
//! order once the destination is ready.

pub mod destination_queue;
pub mod router;
pub mod service;

pub use destination_queue::DestinationQueue;
pub use router::{DefaultSink, DestinationSink, RecordingSink, Router, TracingSink};
pub use service::RouterService;
