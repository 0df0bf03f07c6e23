//! Protocol constants and limits
//!
//! This module centralizes the wire constants and default limits used by the
//! classifier, the rings and the worker so that every layer agrees on them.

/// Device sub-processor ids
pub mod unit {
    /// Highest valid unit id (units are numbered 0..=7)
    pub const MAX_ID: u8 = 7;

    /// Literal that starts every unit-tagged text line
    pub const LINE_PREFIX: &str = "Cog";

    /// Separator between the unit id and the free text of a unit line
    pub const SEPARATOR: &str = "  ";

    /// Most decimal digits accepted for a unit id before the line stops looking like one
    pub const MAX_DIGITS: usize = 2;
}

/// Binary packet framing
pub mod packet {
    /// Sentinel byte that opens a binary packet
    pub const SENTINEL: u8 = 0xDB;

    /// Bytes of trailing checksum
    pub const CHECKSUM_LEN: usize = 2;

    /// Largest payload a packet may declare
    pub const DEFAULT_MAX_PAYLOAD: usize = 8 * 1024;
}

/// Fixed-size debugger frames
pub mod frame {
    /// Frame length used by the device debugger, unit byte included
    pub const DEFAULT_LEN: usize = 416;

    /// Zero bytes the firmware emits after a frame
    pub const DEFAULT_ZERO_RUN: usize = 4;

    /// Prefix of the per-unit destination that frames are routed to
    pub const DEFAULT_DESTINATION_PREFIX: &str = "debugger";
}

/// Text line framing
pub mod line {
    /// Line feed, the terminating byte of every text shape
    pub const LF: u8 = b'\n';

    /// Carriage return, optionally preceding the line feed
    pub const CR: u8 = b'\r';

    /// Backtick that opens a named command
    pub const COMMAND_MARKER: u8 = b'`';

    /// Default scan limit when looking for a line terminator
    pub const DEFAULT_MAX_LEN: usize = 4096;

    /// Boot line the device prints when it starts or restarts
    pub const DEFAULT_SYNC_MARKER: &str = "Cog0  INIT $0000_0000 $0000_0000 load";
}

/// Destination declaration keywords
pub mod destination {
    /// Keywords that declare a new named destination
    pub const DECLARATION_KEYWORDS: &[&str] = &[
        "TERM", "SCOPE", "SCOPE_XY", "LOGIC", "PLOT", "BITMAP", "FFT", "SPECTRO", "MIDI",
    ];
}

/// Ring sizing
pub mod ring {
    /// Smallest ring accepted
    pub const MIN_CAPACITY: usize = 64;

    /// Default ring size: comfortably above one second of device output
    pub const DEFAULT_CAPACITY: usize = 1024 * 1024;
}

/// Worker pacing
pub mod worker {
    /// Default bound on messages per pass
    pub const DEFAULT_MAX_BATCH: usize = 1024;

    /// Default idle wait between doorbell checks in milliseconds
    pub const DEFAULT_IDLE_WAIT_MS: u64 = 20;

    /// Default time a line may sit incomplete before it is flushed, in milliseconds
    pub const DEFAULT_INCOMPLETE_TIMEOUT_MS: u64 = 250;
}
