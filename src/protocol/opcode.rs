//! Opcode and response-code registries.
//!
//! Request opcodes and response status codes are seven-bit values; the high
//! bit (0x80) of the leading packet byte is the *final* bit. The canonical
//! opcode constants below carry the final bit where OBEX defines the
//! operation as single-packet (connect, disconnect, setpath, session,
//! abort) and leave it clear for the multi-packet operations (put, get).

/// Final bit: marks the last packet of a request or response.
pub const FINAL_BIT: u8 = 0x80;

/// Canonical request opcode values.
pub mod opcode {
    /// Connect (final bit canonical).
    pub const CONNECT: u8 = 0x80;
    /// Disconnect (final bit canonical).
    pub const DISCONNECT: u8 = 0x81;
    /// Put (final bit set per packet).
    pub const PUT: u8 = 0x02;
    /// Get (final bit set per packet).
    pub const GET: u8 = 0x03;
    /// SetPath (final bit canonical).
    pub const SETPATH: u8 = 0x85;
    /// Session (final bit canonical; rejected by this engine).
    pub const SESSION: u8 = 0x87;
    /// Abort (final bit canonical).
    pub const ABORT: u8 = 0xFF;
}

/// Response status codes, bare (final bit clear).
pub mod response {
    /// More request packets expected.
    pub const CONTINUE: u8 = 0x10;
    /// Success.
    pub const OK: u8 = 0x20;
    /// Synthetic local code for protocol violations; never on the wire.
    pub const PROTOCOL_ERROR: u8 = 0x7F;
    /// Not implemented.
    pub const NOT_IMPLEMENTED: u8 = 0x51;
}

/// A request operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Connect,
    Disconnect,
    Put,
    Get,
    SetPath,
    Session,
    Abort,
}

impl Opcode {
    /// Canonical wire value (final bit included where canonical).
    pub fn code(self) -> u8 {
        match self {
            Opcode::Connect => opcode::CONNECT,
            Opcode::Disconnect => opcode::DISCONNECT,
            Opcode::Put => opcode::PUT,
            Opcode::Get => opcode::GET,
            Opcode::SetPath => opcode::SETPATH,
            Opcode::Session => opcode::SESSION,
            Opcode::Abort => opcode::ABORT,
        }
    }

    /// Map a wire byte (final bit ignored) back to the operation.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte & !FINAL_BIT {
            0x00 => Some(Opcode::Connect),
            0x01 => Some(Opcode::Disconnect),
            0x02 => Some(Opcode::Put),
            0x03 => Some(Opcode::Get),
            0x05 => Some(Opcode::SetPath),
            0x07 => Some(Opcode::Session),
            0x7F => Some(Opcode::Abort),
            _ => None,
        }
    }

    /// Lowercase operation name.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Connect => "connect",
            Opcode::Disconnect => "disconnect",
            Opcode::Put => "put",
            Opcode::Get => "get",
            Opcode::SetPath => "setpath",
            Opcode::Session => "session",
            Opcode::Abort => "abort",
        }
    }

    /// Whether the operation may span multiple request packets.
    pub fn is_multi_packet(self) -> bool {
        matches!(self, Opcode::Put | Opcode::Get)
    }
}

/// Response-code registry: bare code to lowercase mnemonic.
const RESPONSE_NAMES: &[(u8, &str)] = &[
    (0x10, "continue"),
    (0x20, "ok"),
    (0x21, "created"),
    (0x22, "accepted"),
    (0x23, "nonauthoritative"),
    (0x24, "nocontent"),
    (0x25, "resetcontent"),
    (0x26, "partialcontent"),
    (0x30, "multiplechoices"),
    (0x31, "movedpermanently"),
    (0x32, "movedtemporarily"),
    (0x33, "seeother"),
    (0x34, "notmodified"),
    (0x35, "useproxy"),
    (0x40, "badrequest"),
    (0x41, "unauthorized"),
    (0x42, "paymentrequired"),
    (0x43, "forbidden"),
    (0x44, "notfound"),
    (0x45, "methodnotallowed"),
    (0x46, "notacceptable"),
    (0x47, "proxyauthenticationrequired"),
    (0x48, "requesttimeout"),
    (0x49, "conflict"),
    (0x4A, "gone"),
    (0x4B, "lengthrequired"),
    (0x4C, "preconditionfailed"),
    (0x4D, "requestedentitytoolarge"),
    (0x4E, "requesturltoolarge"),
    (0x4F, "unsupportedmediatype"),
    (0x50, "internalservererror"),
    (0x51, "notimplemented"),
    (0x52, "badgateway"),
    (0x53, "serviceunavailable"),
    (0x54, "gatewaytimeout"),
    (0x55, "httpversionnotsupported"),
    (0x60, "databasefull"),
    (0x61, "databaselocked"),
    (0x7F, "protocolerror"),
];

/// Mnemonic name for a response code (final bit ignored).
///
/// Unregistered codes render as their hex value.
pub fn response_name(code: u8) -> String {
    let bare = code & !FINAL_BIT;
    RESPONSE_NAMES
        .iter()
        .find(|(c, _)| *c == bare)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("0x{:02X}", bare))
}

/// Status category of a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    ProtocolError,
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
    DatabaseError,
    Unknown,
}

impl StatusCategory {
    /// Lowercase category name.
    pub fn name(self) -> &'static str {
        match self {
            StatusCategory::ProtocolError => "protocolerror",
            StatusCategory::Informational => "informational",
            StatusCategory::Success => "success",
            StatusCategory::Redirect => "redirect",
            StatusCategory::ClientError => "clienterror",
            StatusCategory::ServerError => "servererror",
            StatusCategory::DatabaseError => "databaseerror",
            StatusCategory::Unknown => "unknown",
        }
    }
}

/// Categorize a response code (final bit ignored).
pub fn categorize(code: u8) -> StatusCategory {
    match code & !FINAL_BIT {
        c if c < 0x10 => StatusCategory::ProtocolError,
        c if c < 0x20 => StatusCategory::Informational,
        c if c < 0x30 => StatusCategory::Success,
        c if c < 0x40 => StatusCategory::Redirect,
        c if c < 0x50 => StatusCategory::ClientError,
        c if c < 0x60 => StatusCategory::ServerError,
        c if c < 0x70 => StatusCategory::DatabaseError,
        _ => StatusCategory::Unknown,
    }
}
