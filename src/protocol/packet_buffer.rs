//! Packet buffer for accumulating partial reads.
//!
//! The transport hands the engine arbitrary byte slices; this buffer turns
//! them back into whole packets using the 3-byte length prefix. Partial
//! data stays buffered until the declared length is satisfied.

use bytes::{Bytes, BytesMut};

use crate::error::{ObexError, Result};
use crate::protocol::packet::{self, MIN_PACKET_LEN};

/// Buffer turning a byte stream into complete raw packets.
#[derive(Debug)]
pub struct PacketBuffer {
    buffer: BytesMut,
    /// Largest declared packet length this endpoint will accept.
    max_packet_len: u16,
}

impl PacketBuffer {
    /// Create a buffer accepting packets up to `max_packet_len`.
    pub fn new(max_packet_len: u16) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            max_packet_len,
        }
    }

    /// Raise or lower the accepted packet-length ceiling.
    pub fn set_max_packet_len(&mut self, max_packet_len: u16) {
        self.max_packet_len = max_packet_len;
    }

    /// Append transport bytes without extracting.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract one complete raw packet.
    ///
    /// Returns `Ok(None)` while the declared length is not yet satisfied.
    /// Declared lengths below the 3-byte minimum or above the accepted
    /// ceiling are errors.
    pub fn try_extract(&mut self) -> Result<Option<Bytes>> {
        let declared = match packet::declared_len(&self.buffer) {
            Some(len) => len,
            None => return Ok(None),
        };

        if declared < MIN_PACKET_LEN {
            return Err(ObexError::Decode(format!(
                "declared packet length {} below minimum {}",
                declared, MIN_PACKET_LEN
            )));
        }
        if declared > self.max_packet_len {
            return Err(ObexError::Protocol(format!(
                "declared packet length {} exceeds accepted maximum {}",
                declared, self.max_packet_len
            )));
        }
        if (self.buffer.len() as u16) < declared {
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(declared as usize).freeze()))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new(u16::MAX)
    }
}
