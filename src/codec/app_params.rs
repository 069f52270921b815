//! AppParameters tag/length/value sub-codec.
//!
//! The `AppParameters` header carries an opaque byte payload that profiles
//! structure as a sequence of `(tag, length, value)` triples. `length` is
//! the total length of the triple including the tag and length bytes, so
//! the minimum legal value is 2 (empty value).

use bytes::Bytes;

use crate::error::{ObexError, Result};

/// Minimum triple length: tag byte + length byte, empty value.
const MIN_TRIPLE_LEN: usize = 2;

/// One decoded application parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagParam {
    /// Profile-defined tag.
    pub tag: u8,
    /// Parameter value (may be empty).
    pub value: Bytes,
}

impl TagParam {
    /// Create a parameter from a tag and value bytes.
    pub fn new(tag: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/// Decode an AppParameters payload into its parameter list.
pub fn decode(data: &[u8]) -> Result<Vec<TagParam>> {
    let mut params = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if data.len() - offset < MIN_TRIPLE_LEN {
            return Err(ObexError::Decode(format!(
                "truncated application parameter at offset {}",
                offset
            )));
        }

        let tag = data[offset];
        let total_len = data[offset + 1] as usize;
        if total_len < MIN_TRIPLE_LEN {
            return Err(ObexError::Decode(format!(
                "application parameter length {} below minimum {}",
                total_len, MIN_TRIPLE_LEN
            )));
        }
        if total_len > data.len() - offset {
            return Err(ObexError::Decode(format!(
                "application parameter length {} exceeds remaining {} bytes",
                total_len,
                data.len() - offset
            )));
        }

        params.push(TagParam {
            tag,
            value: Bytes::copy_from_slice(&data[offset + MIN_TRIPLE_LEN..offset + total_len]),
        });
        offset += total_len;
    }

    Ok(params)
}

/// Encode a parameter list into an AppParameters payload.
///
/// A value longer than 253 bytes cannot be represented in the one-byte
/// total length and is rejected as a usage error.
pub fn encode(params: &[TagParam]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(params.iter().map(|p| p.value.len() + 2).sum());

    for param in params {
        let total_len = param.value.len() + MIN_TRIPLE_LEN;
        if total_len > u8::MAX as usize {
            return Err(ObexError::Usage(format!(
                "application parameter value of {} bytes does not fit a one-byte length",
                param.value.len()
            )));
        }
        out.push(param.tag);
        out.push(total_len as u8);
        out.extend_from_slice(&param.value);
    }

    Ok(out)
}
