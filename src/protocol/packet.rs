//! Packet codec.
//!
//! Every OBEX packet starts with a 3-byte prefix:
//!
//! ```text
//! ┌────────────────┬──────────────┐
//! │ opcode/status  │ length       │
//! │ 1 byte         │ u16 BE       │
//! └────────────────┴──────────────┘
//! ```
//!
//! `length` covers the whole packet including the prefix. Connect packets
//! (request and success response) carry four fixed bytes after the prefix
//! (version, flags, max packet length); setpath requests carry two (flags,
//! constants). Everything after the fixed fields is a header list.

use crate::error::{ObexError, Result};
use crate::protocol::header::{self, Header};
use crate::protocol::opcode::{Opcode, FINAL_BIT};

/// Prefix size: code byte plus u16 length.
pub const PACKET_PREFIX: usize = 3;

/// Smallest legal packet: prefix only.
pub const MIN_PACKET_LEN: u16 = PACKET_PREFIX as u16;

/// OBEX protocol version 1.0, major/minor nibbles.
pub const OBEX_VERSION: u8 = 0x10;

/// Fixed-field length of connect packets.
pub const CONNECT_FIELDS_LEN: usize = 4;

/// Fixed-field length of setpath request packets.
pub const SETPATH_FIELDS_LEN: usize = 2;

/// Declared packet length, once at least the prefix is buffered.
pub fn declared_len(buf: &[u8]) -> Option<u16> {
    if buf.len() < PACKET_PREFIX {
        return None;
    }
    Some(u16::from_be_bytes([buf[1], buf[2]]))
}

/// Whether the buffer holds at least one complete packet.
pub fn is_complete(buf: &[u8]) -> bool {
    match declared_len(buf) {
        Some(len) => buf.len() >= len as usize,
        None => false,
    }
}

/// Fixed fields of a connect request or success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectFields {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u8,
    pub max_packet_len: u16,
}

/// Fixed fields of a setpath request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPathFields {
    pub flags: u8,
    pub constants: u8,
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Opcode or response status byte, final bit included.
    pub code: u8,
    /// Declared packet length.
    pub length: u16,
    /// Connect fixed fields, when present.
    pub connect: Option<ConnectFields>,
    /// SetPath fixed fields, when present.
    pub setpath: Option<SetPathFields>,
    /// Header list in wire order.
    pub headers: Vec<Header>,
}

impl Packet {
    /// Whether the final bit is set.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.code & FINAL_BIT != 0
    }

    /// Code with the final bit cleared.
    #[inline]
    pub fn status_code(&self) -> u8 {
        self.code & !FINAL_BIT
    }
}

/// Serialize a packet from its parts. The length field is computed.
pub fn encode_packet(code: u8, fixed: &[u8], header_bytes: &[u8]) -> Vec<u8> {
    let total = PACKET_PREFIX + fixed.len() + header_bytes.len();
    debug_assert!(total <= u16::MAX as usize);
    let mut out = Vec::with_capacity(total);
    out.push(code);
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.extend_from_slice(fixed);
    out.extend_from_slice(header_bytes);
    out
}

/// Decode a request packet; the fixed-field layout follows its opcode.
pub fn decode_request(buf: &[u8]) -> Result<(Opcode, Packet)> {
    let code = probe(buf)?;
    let op = Opcode::from_wire(code).ok_or_else(|| {
        ObexError::Decode(format!("unknown request opcode 0x{:02X}", code))
    })?;

    let packet = match op {
        Opcode::Connect => decode_with_connect_fields(buf)?,
        Opcode::SetPath => decode_with_setpath_fields(buf)?,
        _ => decode_plain(buf)?,
    };
    Ok((op, packet))
}

/// Decode a response packet; the caller supplies the request op so the
/// fixed fields can be interpreted.
pub fn decode_response(buf: &[u8], op: Opcode) -> Result<Packet> {
    probe(buf)?;
    match op {
        // Connect success responses echo the connect fixed fields. Failure
        // responses from the field carry them too, so parse whenever the
        // packet is long enough.
        Opcode::Connect if buf.len() >= PACKET_PREFIX + CONNECT_FIELDS_LEN => {
            decode_with_connect_fields(buf)
        }
        _ => decode_plain(buf),
    }
}

/// Validate the prefix and declared length against the supplied slice.
fn probe(buf: &[u8]) -> Result<u8> {
    let declared = declared_len(buf).ok_or_else(|| {
        ObexError::Decode(format!("packet shorter than prefix: {} bytes", buf.len()))
    })?;
    if declared < MIN_PACKET_LEN {
        return Err(ObexError::Decode(format!(
            "declared packet length {} below minimum {}",
            declared, MIN_PACKET_LEN
        )));
    }
    if declared as usize != buf.len() {
        return Err(ObexError::Decode(format!(
            "declared packet length {} does not match {} buffered bytes",
            declared,
            buf.len()
        )));
    }
    Ok(buf[0])
}

fn decode_plain(buf: &[u8]) -> Result<Packet> {
    Ok(Packet {
        code: buf[0],
        length: buf.len() as u16,
        connect: None,
        setpath: None,
        headers: header::decode_headers(&buf[PACKET_PREFIX..])?,
    })
}

fn decode_with_connect_fields(buf: &[u8]) -> Result<Packet> {
    if buf.len() < PACKET_PREFIX + CONNECT_FIELDS_LEN {
        return Err(ObexError::Decode(
            "connect packet too short for fixed fields".to_string(),
        ));
    }
    let version = buf[3];
    let fields = ConnectFields {
        major_version: version >> 4,
        minor_version: version & 0x0F,
        flags: buf[4],
        max_packet_len: u16::from_be_bytes([buf[5], buf[6]]),
    };
    Ok(Packet {
        code: buf[0],
        length: buf.len() as u16,
        connect: Some(fields),
        setpath: None,
        headers: header::decode_headers(&buf[PACKET_PREFIX + CONNECT_FIELDS_LEN..])?,
    })
}

fn decode_with_setpath_fields(buf: &[u8]) -> Result<Packet> {
    if buf.len() < PACKET_PREFIX + SETPATH_FIELDS_LEN {
        return Err(ObexError::Decode(
            "setpath packet too short for fixed fields".to_string(),
        ));
    }
    let fields = SetPathFields {
        flags: buf[3],
        constants: buf[4],
    };
    Ok(Packet {
        code: buf[0],
        length: buf.len() as u16,
        connect: None,
        setpath: Some(fields),
        headers: header::decode_headers(&buf[PACKET_PREFIX + SETPATH_FIELDS_LEN..])?,
    })
}
