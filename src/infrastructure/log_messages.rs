//! Log message constants for pipeline components
//!
//! This module centralizes the log messages used throughout the pipeline so
//! that wording stays consistent between the worker, router and replay tool.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting Switchyard capture replay";
    pub const LOADED_SETTINGS: &str = "Loaded settings";
    pub const REPLAY_FINISHED: &str = "Capture replay finished";
    pub const READING_CAPTURE: &str = "Reading capture file";
    pub const CHUNKS_DROPPED: &str = "Chunks dropped during replay";
}

/// Extraction worker messages
pub mod worker {
    pub const STARTED: &str = "Extraction worker started";
    pub const SHUTTING_DOWN: &str = "Extraction worker shutting down";
    pub const STOPPED: &str = "Extraction worker stopped";
    pub const PASS_COMPLETE: &str = "Extraction pass complete";
    pub const RESET_APPLIED: &str = "Stream reset applied";
    pub const BATCH_RECEIVER_GONE: &str = "Batch receiver dropped; stopping worker";
    pub const UNDELIVERED_AT_SHUTDOWN: &str = "Bytes left unclassified at shutdown";
}

/// Producer-side ingestion messages
pub mod ingest {
    pub const OVERFLOW: &str = "Ring buffer overflow on ingest";
    pub const RESYNC_REQUESTED: &str = "Resynchronization requested";
    pub const WORKER_UNREACHABLE: &str = "Extraction worker is not accepting commands";
}

/// Routing messages
pub mod routing {
    pub const ROUTER_STARTED: &str = "Router service started";
    pub const ROUTER_SHUTTING_DOWN: &str = "Router service shutting down";
    pub const ROUTER_STOPPED: &str = "Router service stopped";
    pub const DESTINATION_DECLARED: &str = "Destination declared";
    pub const DESTINATION_REGISTERED: &str = "Destination registered";
    pub const DESTINATION_READY: &str = "Destination ready; draining backlog";
    pub const DESTINATION_REMOVED: &str = "Destination deregistered; backlog discarded";
    pub const SPECULATIVE_QUEUE: &str = "Queueing for unregistered destination";
    pub const QUEUES_CLEARED: &str = "Stream reset; destination backlogs cleared";
}

/// Diagnostics messages
pub mod diagnostics {
    pub const DATA_LOSS: &str = "Stream data loss";
    pub const STREAM_NOTICE: &str = "Stream notice";
}

/// Classifier messages
pub mod classifier {
    pub const LOGIC_ERROR: &str = "No pattern matched; skipping one byte";
    pub const CHECKSUM_REJECTED: &str = "Binary packet failed checksum";
    pub const COMMAND_DEMOTED: &str = "Backtick line does not name a known destination";
    pub const FLUSHED_PARTIAL: &str = "Flushed stalled partial message";
    pub const CANDIDATE_ABANDONED: &str = "Gave up on stalled binary candidate; reclassifying head";
}
