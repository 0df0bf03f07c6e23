//! Runtime configuration of the classifier

use crate::domain::types::{FrameLength, MaxLineLength};
use crate::domain::validation_constants::{destination, frame, line, packet, unit, worker};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Largest payload a binary packet may declare
    pub max_packet_payload: usize,
    /// Total fixed frame length, unit byte included
    pub frame_length: FrameLength,
    /// Zero bytes to drop after each fixed frame
    pub frame_zero_run: usize,
    /// Destination prefix for fixed frames (`debugger` gives `debugger0`..`debugger7`)
    pub frame_destination_prefix: String,
    /// Scan limit for a line terminator
    pub max_line: MaxLineLength,
    /// Literal that opens a unit line
    pub unit_prefix: String,
    /// Boot line recognized as a sync marker
    pub sync_marker: String,
    pub declaration_keywords: Vec<String>,
    /// How long a line may sit incomplete before it is flushed as partial
    pub incomplete_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_packet_payload: packet::DEFAULT_MAX_PAYLOAD,
            frame_length: FrameLength::default(),
            frame_zero_run: frame::DEFAULT_ZERO_RUN,
            frame_destination_prefix: frame::DEFAULT_DESTINATION_PREFIX.to_string(),
            max_line: MaxLineLength::default(),
            unit_prefix: unit::LINE_PREFIX.to_string(),
            sync_marker: line::DEFAULT_SYNC_MARKER.to_string(),
            declaration_keywords: destination::DECLARATION_KEYWORDS
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
            incomplete_timeout: Duration::from_millis(worker::DEFAULT_INCOMPLETE_TIMEOUT_MS),
        }
    }
}
