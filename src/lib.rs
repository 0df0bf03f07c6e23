//! Switchyard - real-time classification and routing of a microcontroller's
//! debug byte stream
//!
//! Raw serial bytes are appended to a ring, classified on a worker thread into
//! typed messages (binary packets, unit-tagged lines, named commands, fixed
//! debugger frames, plain text) and routed to a default sink and to named
//! destinations that may not exist yet when their first message arrives.

pub mod application;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod extraction;
pub mod infrastructure;
pub mod pipeline;
pub mod routing;

pub use application::{Application, ReplaySummary};
pub use error::{Error, Result};
pub use pipeline::{IngestOutcome, OverflowPolicy, Pipeline, PipelineBuilder, RingBufferConfig};
