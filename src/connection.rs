//! Per-connection and per-request state shared by both state machines.
//!
//! `ConnectionState` lives for the span of the transport session;
//! `RequestState` tracks one in-flight exchange. The outgoing-packet
//! builder lives here as a free function over both structs so the client
//! and server assemble packets identically: ConnectionId first, queued
//! header blobs in FIFO order while they fit, final bit when the queue
//! drains outside streaming.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{ObexError, Result};
use crate::protocol::header::{header_id, Header};
use crate::protocol::opcode::{
    categorize, response, response_name, Opcode, StatusCategory, FINAL_BIT,
};
use crate::protocol::packet::{self, Packet, PACKET_PREFIX};
use crate::protocol::packet_buffer::PacketBuffer;

/// Initial outgoing packet budget before negotiation.
pub const DEFAULT_MAX_PACKET_LEN: u16 = 255;

/// Default advertised receive capacity.
pub const DEFAULT_LOCAL_MAX: u16 = u16::MAX;

/// Result of feeding bytes or issuing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The exchange needs more packets; keep feeding transport bytes.
    Continue,
    /// The request or response completed.
    Done,
    /// Streaming put is ready for the next chunk.
    Writable,
    /// The exchange failed; see `status_detail` for the recorded message.
    Failed,
    /// Server only: a complete request arrived and awaits `respond`.
    Respond(Opcode),
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Busy,
    Streaming,
    Responding,
    Error,
}

/// Snapshot of the connection for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: State,
    pub connected: bool,
    pub connection_id: Option<u32>,
    pub max_packet_len: u16,
    pub error_message: Option<String>,
}

/// Decoded status of the latest exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDetail {
    /// Category of the response code.
    pub status: StatusCategory,
    /// Wire status byte, or the synthetic 0x7F after a protocol failure.
    pub code: Option<u8>,
    /// Mnemonic name of the code.
    pub code_name: Option<String>,
    /// Recorded failure message, when any.
    pub error_message: Option<String>,
}

/// Per-connection state.
#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub(crate) state: State,
    pub(crate) max_packet_len: u16,
    pub(crate) local_max: u16,
    pub(crate) connected: bool,
    pub(crate) connection_id: Option<u32>,
    pub(crate) connection_id_header: Option<Vec<u8>>,
    pub(crate) error_message: Option<String>,
    pub(crate) error_code: Option<u8>,
}

impl ConnectionState {
    pub(crate) fn new(local_max: u16) -> Self {
        Self {
            state: State::Idle,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            local_max,
            connected: false,
            connection_id: None,
            connection_id_header: None,
            error_message: None,
            error_code: None,
        }
    }

    /// Persist a connection id together with its pre-encoded header form.
    pub(crate) fn set_connection_id(&mut self, id: u32) {
        let header =
            Header::u32(header_id::CONNECTION_ID, id).expect("connection id is u32-kind");
        self.connection_id = Some(id);
        self.connection_id_header = Some(header.encode());
    }

    pub(crate) fn clear_connection_id(&mut self) {
        self.connection_id = None;
        self.connection_id_header = None;
    }

    /// Record a fatal failure: Error state plus the synthetic 0x7F code.
    pub(crate) fn record_error(&mut self, message: String) {
        self.state = State::Error;
        self.error_message = Some(message);
        self.error_code = Some(response::PROTOCOL_ERROR);
    }

    pub(crate) fn clear_error(&mut self) {
        if self.state == State::Error {
            self.state = State::Idle;
        }
        self.error_message = None;
        self.error_code = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.local_max);
    }
}

/// Per-request state.
#[derive(Debug)]
pub(crate) struct RequestState {
    pub(crate) op: Option<Opcode>,
    pub(crate) input: PacketBuffer,
    pub(crate) outgoing: VecDeque<Vec<u8>>,
    pub(crate) headers_in: Vec<Header>,
    pub(crate) latest: Option<Packet>,
    pub(crate) streaming: bool,
}

impl RequestState {
    pub(crate) fn new(local_max: u16) -> Self {
        Self {
            op: None,
            input: PacketBuffer::new(local_max),
            outgoing: VecDeque::new(),
            headers_in: Vec::new(),
            latest: None,
            streaming: false,
        }
    }

    /// Encode and queue a header for the next outgoing packets.
    pub(crate) fn queue_header(&mut self, header: &Header) {
        self.outgoing.push_back(header.encode());
    }

    /// Total bytes currently queued.
    pub(crate) fn queued_bytes(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    /// Drop request-local accumulation, keeping the input buffer intact.
    pub(crate) fn begin(&mut self, op: Opcode) {
        self.op = Some(op);
        self.outgoing.clear();
        self.headers_in.clear();
        self.latest = None;
        self.streaming = false;
    }

    pub(crate) fn clear(&mut self) {
        self.op = None;
        self.input.clear();
        self.outgoing.clear();
        self.headers_in.clear();
        self.latest = None;
        self.streaming = false;
    }
}

/// Which side of the exchange a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketRole {
    Request,
    Response,
}

/// Build one outgoing packet from the queued header blobs.
///
/// Capacity failures (a single header that can never fit) put the
/// connection into the Error state before returning.
pub(crate) fn build_packet(
    conn: &mut ConnectionState,
    req: &mut RequestState,
    mut code: u8,
    fixed: &[u8],
    role: PacketRole,
    include_connection_id: bool,
) -> Result<Vec<u8>> {
    let budget = conn.max_packet_len as usize;
    let mut free = match budget.checked_sub(PACKET_PREFIX + fixed.len()) {
        Some(free) => free,
        None => {
            let message = format!(
                "packet prefix and fixed fields exceed max packet length {}",
                budget
            );
            conn.record_error(message.clone());
            return Err(ObexError::Capacity(message));
        }
    };

    let mut header_bytes = Vec::new();
    if include_connection_id {
        if let Some(blob) = &conn.connection_id_header {
            if blob.len() > free {
                let message = "connection id header exceeds packet budget".to_string();
                conn.record_error(message.clone());
                return Err(ObexError::Capacity(message));
            }
            free -= blob.len();
            header_bytes.extend_from_slice(blob);
        }
    }

    let mut popped = 0usize;
    while let Some(front) = req.outgoing.front() {
        if front.len() > free {
            break;
        }
        free -= front.len();
        header_bytes.extend_from_slice(front);
        req.outgoing.pop_front();
        popped += 1;
    }

    if popped == 0 && !req.outgoing.is_empty() {
        let message = format!(
            "header of {} bytes can never fit max packet length {}",
            req.outgoing.front().map(Vec::len).unwrap_or(0),
            budget
        );
        conn.record_error(message.clone());
        return Err(ObexError::Capacity(message));
    }

    match role {
        PacketRole::Request => {
            if req.outgoing.is_empty() && !req.streaming {
                code |= FINAL_BIT;
            }
        }
        PacketRole::Response => {
            code |= FINAL_BIT;
            if !req.outgoing.is_empty() && (code & !FINAL_BIT) == response::OK {
                code = response::CONTINUE | FINAL_BIT;
            }
        }
    }

    Ok(packet::encode_packet(code, fixed, &header_bytes))
}

/// Concatenate `Body` and `EndOfBody` values in arrival order.
pub(crate) fn collect_bodies(headers: &[Header]) -> Vec<Bytes> {
    headers
        .iter()
        .filter(|h| h.id() == header_id::BODY || h.id() == header_id::END_OF_BODY)
        .filter_map(|h| h.as_bytes().cloned())
        .collect()
}

/// Status summary for the application, shared by client and server.
pub(crate) fn status_detail(conn: &ConnectionState, req: &RequestState) -> StatusDetail {
    if let Some(code) = conn.error_code {
        return StatusDetail {
            status: StatusCategory::ProtocolError,
            code: Some(code),
            code_name: Some(response_name(code)),
            error_message: conn.error_message.clone(),
        };
    }

    match &req.latest {
        Some(packet) => StatusDetail {
            status: categorize(packet.code),
            code: Some(packet.code),
            code_name: Some(response_name(packet.code)),
            error_message: conn.error_message.clone(),
        },
        None => StatusDetail {
            status: StatusCategory::Unknown,
            code: None,
            code_name: None,
            error_message: conn.error_message.clone(),
        },
    }
}
