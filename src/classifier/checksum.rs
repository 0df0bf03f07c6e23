//! Packet checksum algorithms
//!
//! The checksum carried by binary packets is a protocol parameter, so the
//! validator takes any [`PacketChecksum`]. The default is a 16-bit wrapping sum
//! of the payload bytes, written little-endian after the payload.

/// Computes the 16-bit check value of a packet payload
pub trait PacketChecksum: Send + Sync {
    fn compute(&self, payload: &[u8]) -> u16;

    /// Name used in logs
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Wrapping 16-bit sum of all payload bytes
#[derive(Clone, Copy, Debug, Default)]
pub struct AdditiveChecksum;

impl PacketChecksum for AdditiveChecksum {
    fn compute(&self, payload: &[u8]) -> u16 {
        payload
            .iter()
            .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
    }

    fn name(&self) -> &'static str {
        "additive16"
    }
}

/// Adapter that turns a closure into a checksum
pub struct FnChecksum<F>(pub F);

impl<F> PacketChecksum for FnChecksum<F>
where
    F: Fn(&[u8]) -> u16 + Send + Sync,
{
    fn compute(&self, payload: &[u8]) -> u16 {
        (self.0)(payload)
    }
}

/// Read a little-endian 16-bit checksum field
pub fn read_checksum_field(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}
