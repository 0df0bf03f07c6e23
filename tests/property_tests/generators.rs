//! Generators for well-formed device output

use proptest::collection::vec;
use proptest::prelude::*;
use proptest::string::string_regex;

/// Fixed frame length, unit byte included
pub const FRAME_LEN: usize = 416;
/// Zero bytes the firmware appends to every frame
pub const FRAME_ZERO_RUN: usize = 4;

/// One message as the device would emit it
#[derive(Clone, Debug)]
pub struct WireMessage {
    pub bytes: Vec<u8>,
    /// Trailing bytes the classifier drops instead of emitting
    pub trailer: usize,
}

impl WireMessage {
    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, trailer: 0 }
    }

    /// The bytes the extracted message carries
    pub fn raw(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - self.trailer]
    }
}

pub fn unit_line() -> impl Strategy<Value = WireMessage> {
    (0u8..=7, string_regex("[a-z][a-z ]{0,24}").unwrap())
        .prop_map(|(unit, text)| WireMessage::new(format!("Cog{unit}  {text}\r\n").into_bytes()))
}

pub fn plain_line() -> impl Strategy<Value = WireMessage> {
    string_regex("[a-z][a-z0-9 ]{0,40}")
        .unwrap()
        .prop_map(|text| WireMessage::new(format!("{text}\n").into_bytes()))
}

pub fn declaration() -> impl Strategy<Value = WireMessage> {
    (0u8..10).prop_map(|n| WireMessage::new(format!("`TERM Term{n} SIZE 80 24\r\n").into_bytes()))
}

pub fn packet() -> impl Strategy<Value = WireMessage> {
    (any::<u8>(), vec(any::<u8>(), 0..48)).prop_map(|(tag, payload)| {
        let mut bytes = vec![0xDB, tag];
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);
        let sum = payload
            .iter()
            .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
        bytes.extend_from_slice(&sum.to_le_bytes());
        WireMessage::new(bytes)
    })
}

/// A debugger frame followed by the firmware's zero run
pub fn fixed_frame() -> impl Strategy<Value = WireMessage> {
    (0u8..=7, vec(any::<u8>(), FRAME_LEN - 1)).prop_map(|(unit, body)| {
        let mut bytes = vec![unit];
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&[0; FRAME_ZERO_RUN]);
        WireMessage {
            bytes,
            trailer: FRAME_ZERO_RUN,
        }
    })
}

pub fn message() -> impl Strategy<Value = WireMessage> {
    prop_oneof![
        4 => unit_line(),
        4 => plain_line(),
        2 => declaration(),
        2 => packet(),
        1 => fixed_frame(),
    ]
}

/// Non-empty chunk lengths used to slice a stream into reads
pub fn chunk_sizes() -> impl Strategy<Value = Vec<usize>> {
    vec(1usize..64, 1..16)
}

/// Slice `bytes` into reads, cycling through `sizes`
pub fn chunked<'a>(bytes: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while start < bytes.len() {
        let end = (start + sizes[i % sizes.len()]).min(bytes.len());
        chunks.push(&bytes[start..end]);
        start = end;
        i += 1;
    }
    chunks
}
