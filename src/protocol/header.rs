//! Header codec.
//!
//! An OBEX header is a typed attribute inside a packet. The top two bits of
//! the identifier byte select the value kind:
//!
//! ```text
//! id >> 6 == 0  Unicode   id | total_len u16 | UTF-16BE value | 00 00
//! id >> 6 == 1  Bytes     id | total_len u16 | raw bytes
//! id >> 6 == 2  U8        id | value          (fixed 2 bytes)
//! id >> 6 == 3  U32       id | value u32 BE   (fixed 5 bytes)
//! ```
//!
//! `total_len` covers the whole header including the identifier and length
//! bytes. Unknown identifiers decode with the kind implied by their top
//! bits and render as synthetic `0xNN` names.

use std::borrow::Cow;

use bytes::Bytes;

use crate::codec::unicode;
use crate::error::{ObexError, Result};

/// Well-known header identifiers.
pub mod header_id {
    pub const NAME: u8 = 0x01;
    pub const DESCRIPTION: u8 = 0x05;
    /// MIME type; by convention ASCII terminated by a single null byte.
    pub const TYPE: u8 = 0x42;
    /// ASCII ISO-8601 timestamp (`YYYYMMDDTHHMMSS[Z]`).
    pub const TIMESTAMP: u8 = 0x44;
    pub const TARGET: u8 = 0x46;
    pub const HTTP: u8 = 0x47;
    pub const BODY: u8 = 0x48;
    pub const END_OF_BODY: u8 = 0x49;
    pub const WHO: u8 = 0x4A;
    pub const APP_PARAMETERS: u8 = 0x4C;
    pub const AUTH_CHALLENGE: u8 = 0x4D;
    pub const AUTH_RESPONSE: u8 = 0x4E;
    pub const WAN_UUID: u8 = 0x50;
    pub const OBJECT_CLASS: u8 = 0x51;
    pub const SESSION_PARAMETERS: u8 = 0x52;
    pub const SESSION_SEQUENCE_NUMBER: u8 = 0x93;
    pub const COUNT: u8 = 0xC0;
    pub const LENGTH: u8 = 0xC3;
    pub const TIMESTAMP4: u8 = 0xC4;
    pub const CONNECTION_ID: u8 = 0xCB;
    pub const CREATOR_ID: u8 = 0xCF;
}

/// Mnemonic registry: name to identifier.
const HEADER_NAMES: &[(&str, u8)] = &[
    ("Name", header_id::NAME),
    ("Description", header_id::DESCRIPTION),
    ("Type", header_id::TYPE),
    ("Timestamp", header_id::TIMESTAMP),
    ("Target", header_id::TARGET),
    ("Http", header_id::HTTP),
    ("Body", header_id::BODY),
    ("EndOfBody", header_id::END_OF_BODY),
    ("Who", header_id::WHO),
    ("AppParameters", header_id::APP_PARAMETERS),
    ("AuthChallenge", header_id::AUTH_CHALLENGE),
    ("AuthResponse", header_id::AUTH_RESPONSE),
    ("WanUuid", header_id::WAN_UUID),
    ("ObjectClass", header_id::OBJECT_CLASS),
    ("SessionParameters", header_id::SESSION_PARAMETERS),
    ("SessionSequenceNumber", header_id::SESSION_SEQUENCE_NUMBER),
    ("Count", header_id::COUNT),
    ("Length", header_id::LENGTH),
    ("Timestamp4", header_id::TIMESTAMP4),
    ("ConnectionId", header_id::CONNECTION_ID),
    ("CreatorId", header_id::CREATOR_ID),
];

/// Look up an identifier by mnemonic name (case-insensitive).
pub fn id_for_name(name: &str) -> Option<u8> {
    HEADER_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, id)| *id)
}

/// Mnemonic name for an identifier; synthetic `0xNN` when unregistered.
pub fn name_for_id(id: u8) -> Cow<'static, str> {
    HEADER_NAMES
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(name, _)| Cow::Borrowed(*name))
        .unwrap_or_else(|| Cow::Owned(format!("0x{:02X}", id)))
}

/// Value kind implied by the top two identifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Unicode,
    Bytes,
    U8,
    U32,
}

impl HeaderKind {
    /// Kind of an identifier byte.
    pub fn of(id: u8) -> Self {
        match id >> 6 {
            0 => HeaderKind::Unicode,
            1 => HeaderKind::Bytes,
            2 => HeaderKind::U8,
            _ => HeaderKind::U32,
        }
    }
}

/// A header value, discriminated by the identifier's kind bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Unicode(String),
    Bytes(Bytes),
    U8(u8),
    U32(u32),
}

impl HeaderValue {
    fn kind(&self) -> HeaderKind {
        match self {
            HeaderValue::Unicode(_) => HeaderKind::Unicode,
            HeaderValue::Bytes(_) => HeaderKind::Bytes,
            HeaderValue::U8(_) => HeaderKind::U8,
            HeaderValue::U32(_) => HeaderKind::U32,
        }
    }
}

/// A typed header: identifier plus value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    id: u8,
    value: HeaderValue,
}

impl Header {
    /// Create a header, checking the value against the identifier's kind.
    pub fn new(id: u8, value: HeaderValue) -> Result<Self> {
        if HeaderKind::of(id) != value.kind() {
            return Err(ObexError::Usage(format!(
                "header 0x{:02X} carries {:?} values",
                id,
                HeaderKind::of(id)
            )));
        }
        let header = Self { id, value };
        if header.encoded_len() > u16::MAX as usize {
            return Err(ObexError::Usage(format!(
                "header 0x{:02X} value too long for a 16-bit length field",
                id
            )));
        }
        Ok(header)
    }

    /// Create a Unicode-kind header.
    pub fn unicode(id: u8, value: impl Into<String>) -> Result<Self> {
        Self::new(id, HeaderValue::Unicode(value.into()))
    }

    /// Create a byte-sequence header.
    pub fn bytes(id: u8, value: impl Into<Bytes>) -> Result<Self> {
        Self::new(id, HeaderValue::Bytes(value.into()))
    }

    /// Create an 8-bit unsigned header.
    pub fn u8(id: u8, value: u8) -> Result<Self> {
        Self::new(id, HeaderValue::U8(value))
    }

    /// Create a 32-bit unsigned header.
    pub fn u32(id: u8, value: u32) -> Result<Self> {
        Self::new(id, HeaderValue::U32(value))
    }

    /// Create a header by mnemonic name (case-insensitive).
    pub fn by_name(name: &str, value: HeaderValue) -> Result<Self> {
        let id = id_for_name(name)
            .ok_or_else(|| ObexError::Usage(format!("unknown header name {:?}", name)))?;
        Self::new(id, value)
    }

    /// Identifier byte.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Mnemonic name, synthetic for unregistered identifiers.
    pub fn name(&self) -> Cow<'static, str> {
        name_for_id(self.id)
    }

    /// The typed value.
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }

    /// String value, when Unicode-kind.
    pub fn as_unicode(&self) -> Option<&str> {
        match &self.value {
            HeaderValue::Unicode(s) => Some(s),
            _ => None,
        }
    }

    /// Byte-sequence value, when byte-kind.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.value {
            HeaderValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// 32-bit value, when u32-kind.
    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            HeaderValue::U32(v) => Some(v),
            _ => None,
        }
    }

    /// 8-bit value, when u8-kind.
    pub fn as_u8(&self) -> Option<u8> {
        match self.value {
            HeaderValue::U8(v) => Some(v),
            _ => None,
        }
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        match &self.value {
            HeaderValue::Unicode(s) => 3 + unicode::encode_utf16be(s).len() + 2,
            HeaderValue::Bytes(b) => 3 + b.len(),
            HeaderValue::U8(_) => 2,
            HeaderValue::U32(_) => 5,
        }
    }

    /// Encode this header to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.id);
        match &self.value {
            HeaderValue::Unicode(s) => {
                let utf16 = unicode::encode_utf16be(s);
                let total_len = (3 + utf16.len() + 2) as u16;
                out.extend_from_slice(&total_len.to_be_bytes());
                out.extend_from_slice(&utf16);
                out.extend_from_slice(&[0x00, 0x00]);
            }
            HeaderValue::Bytes(b) => {
                let total_len = (3 + b.len()) as u16;
                out.extend_from_slice(&total_len.to_be_bytes());
                out.extend_from_slice(b);
            }
            HeaderValue::U8(v) => out.push(*v),
            HeaderValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
        out
    }

    /// Decode one header at `start`, returning it and the next offset.
    pub fn decode(buf: &[u8], start: usize) -> Result<(Self, usize)> {
        let remaining = buf.len().saturating_sub(start);
        if remaining == 0 {
            return Err(ObexError::Decode("empty header buffer".to_string()));
        }

        let id = buf[start];
        match HeaderKind::of(id) {
            HeaderKind::Unicode => {
                let total_len = variable_len(buf, start, remaining, 5)?;
                let value =
                    unicode::decode_utf16be(&buf[start + 3..start + total_len - 2])?;
                Ok((
                    Self {
                        id,
                        value: HeaderValue::Unicode(value),
                    },
                    start + total_len,
                ))
            }
            HeaderKind::Bytes => {
                let total_len = variable_len(buf, start, remaining, 3)?;
                let value = Bytes::copy_from_slice(&buf[start + 3..start + total_len]);
                Ok((
                    Self {
                        id,
                        value: HeaderValue::Bytes(value),
                    },
                    start + total_len,
                ))
            }
            HeaderKind::U8 => {
                if remaining < 2 {
                    return Err(ObexError::Decode(format!(
                        "truncated u8 header 0x{:02X}",
                        id
                    )));
                }
                Ok((
                    Self {
                        id,
                        value: HeaderValue::U8(buf[start + 1]),
                    },
                    start + 2,
                ))
            }
            HeaderKind::U32 => {
                if remaining < 5 {
                    return Err(ObexError::Decode(format!(
                        "truncated u32 header 0x{:02X}",
                        id
                    )));
                }
                let value = u32::from_be_bytes([
                    buf[start + 1],
                    buf[start + 2],
                    buf[start + 3],
                    buf[start + 4],
                ]);
                Ok((
                    Self {
                        id,
                        value: HeaderValue::U32(value),
                    },
                    start + 5,
                ))
            }
        }
    }
}

/// Read and validate the u16 length field of a variable-length header.
fn variable_len(buf: &[u8], start: usize, remaining: usize, min: usize) -> Result<usize> {
    if remaining < 3 {
        return Err(ObexError::Decode(format!(
            "truncated header 0x{:02X}",
            buf[start]
        )));
    }
    let total_len = u16::from_be_bytes([buf[start + 1], buf[start + 2]]) as usize;
    if total_len < min || total_len > remaining {
        return Err(ObexError::Decode(format!(
            "invalid header length {} for header 0x{:02X}",
            total_len, buf[start]
        )));
    }
    Ok(total_len)
}

/// Encode a header list in order.
pub fn encode_headers(headers: &[Header]) -> Vec<u8> {
    let mut out = Vec::with_capacity(headers.iter().map(Header::encoded_len).sum());
    for header in headers {
        out.extend_from_slice(&header.encode());
    }
    out
}

/// Decode all headers in a buffer. An under-run is a fatal decode error.
pub fn decode_headers(buf: &[u8]) -> Result<Vec<Header>> {
    let mut headers = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let (header, next) = Header::decode(buf, offset)?;
        headers.push(header);
        offset = next;
    }
    Ok(headers)
}

/// Find the first header matching `name` (case-insensitive).
pub fn find<'a>(headers: &'a [Header], name: &str) -> Option<&'a Header> {
    headers
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case(name))
}

/// Find all headers matching `name` (case-insensitive), in order.
pub fn find_all<'a>(headers: &'a [Header], name: &str) -> Vec<&'a Header> {
    headers
        .iter()
        .filter(|h| h.name().eq_ignore_ascii_case(name))
        .collect()
}
