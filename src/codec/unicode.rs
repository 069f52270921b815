//! UTF-16BE string conversion for Unicode-kind header values.
//!
//! OBEX carries Unicode header values as UTF-16 big-endian with a trailing
//! two-byte null terminator. The terminator is handled by the header codec;
//! this module converts the bare code-unit sequence. Byte pairs are
//! assembled explicitly so the result never depends on host endianness.

use crate::error::{ObexError, Result};

/// Encode a string as UTF-16BE code units (no terminator).
pub fn encode_utf16be(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Decode a UTF-16BE code-unit sequence (no terminator) into a string.
///
/// Odd-length input and invalid surrogate sequences are decode errors.
pub fn decode_utf16be(data: &[u8]) -> Result<String> {
    if data.len() % 2 != 0 {
        return Err(ObexError::Decode(format!(
            "UTF-16BE payload has odd length {}",
            data.len()
        )));
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units)
        .map_err(|_| ObexError::Decode("invalid UTF-16BE sequence".to_string()))
}
