//! Validated value types shared across the pipeline
//!
//! These newtypes keep raw integers and strings from leaking across module
//! boundaries; every one of them is checked once, at the edge where it is built.

use crate::domain::validation_constants::{frame, line, ring, unit, worker};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========== Stream identity ==========

/// Identifier of a logical sub-processor on the device (a "cog")
#[nutype(
    validate(less_or_equal = 7),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct UnitId(u8);

impl UnitId {
    /// All valid unit ids in ascending order
    pub fn all() -> impl Iterator<Item = UnitId> {
        (0..=unit::MAX_ID).filter_map(|id| UnitId::try_new(id).ok())
    }
}

/// Name of a routed destination (a debug window on the host side)
///
/// Names are single tokens as they appear on the wire after the backtick, so
/// whitespace is never part of a name.
#[nutype(
    sanitize(trim),
    validate(
        not_empty,
        len_char_max = 64,
        regex = r"^[A-Za-z_][A-Za-z0-9_]*$"
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct DestinationName(String);

impl DestinationName {
    /// Name of the per-unit destination that receives fixed debugger frames
    pub fn for_frame(prefix: &str, unit_id: UnitId) -> Option<Self> {
        Self::try_new(format!("{prefix}{unit_id}")).ok()
    }
}

/// Monotonic extraction number within a stream session
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize,
    From,
    AsRef
))]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn first() -> Self {
        Self::new(0)
    }

    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }
}

/// Identifier of the span between two stream resets
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version_num() == 7),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct StreamSessionId(Uuid);

impl StreamSessionId {
    /// Start a new session with a fresh v7 UUID
    pub fn generate() -> Self {
        // now_v7 always yields a version 7 UUID
        Self::try_new(Uuid::now_v7()).unwrap_or_else(|_| unreachable!("now_v7 yields v7"))
    }
}

impl Default for StreamSessionId {
    fn default() -> Self {
        Self::generate()
    }
}

// ========== Sizes and limits ==========

/// Capacity of a byte ring in bytes
#[nutype(
    validate(greater_or_equal = 64, less_or_equal = 268_435_456),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct BufferCapacity(usize);

impl Default for BufferCapacity {
    fn default() -> Self {
        Self::try_new(ring::DEFAULT_CAPACITY).unwrap_or_else(|_| unreachable!())
    }
}

/// Total length of a fixed-size binary frame, unit byte included
#[nutype(
    validate(greater_or_equal = 2, less_or_equal = 65_536),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct FrameLength(usize);

impl Default for FrameLength {
    fn default() -> Self {
        Self::try_new(frame::DEFAULT_LEN).unwrap_or_else(|_| unreachable!())
    }
}

/// Longest text line the classifier scans for a terminator
#[nutype(
    validate(greater_or_equal = 16, less_or_equal = 65_536),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct MaxLineLength(usize);

impl Default for MaxLineLength {
    fn default() -> Self {
        Self::try_new(line::DEFAULT_MAX_LEN).unwrap_or_else(|_| unreachable!())
    }
}

/// Upper bound on messages extracted in one worker pass
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Display,
        Serialize,
        Deserialize,
        TryFrom,
        AsRef
    )
)]
pub struct MaxBatchMessages(usize);

impl Default for MaxBatchMessages {
    fn default() -> Self {
        Self::try_new(worker::DEFAULT_MAX_BATCH).unwrap_or_else(|_| unreachable!())
    }
}

/// Number of bytes dropped at the ring tier
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
    From,
    AsRef
))]
pub struct DroppedByteCount(u64);
