//! Server-side response state machine.
//!
//! The server accumulates request packets, acking non-final ones with a
//! bare continue, and surfaces a complete request as
//! [`Action::Respond`]. The application then calls [`Server::respond`] or
//! [`Server::respond_content`]; connect responses mint a connection id
//! from the server's monotonic allocator and carry the negotiation fixed
//! fields. Responses are single-packet in this release: an overflowing
//! response is a fatal capacity failure rather than a guess at
//! multi-packet semantics.

use bytes::Bytes;

use crate::connection::{
    build_packet, collect_bodies, status_detail, Action, ConnectionInfo, ConnectionState,
    PacketRole, RequestState, State, StatusDetail, DEFAULT_LOCAL_MAX,
    DEFAULT_MAX_PACKET_LEN,
};
use crate::error::{ObexError, Result};
use crate::protocol::header::{self, header_id, Header, HeaderValue};
use crate::protocol::opcode::{response, Opcode, FINAL_BIT};
use crate::protocol::packet::{self, Packet, OBEX_VERSION};

/// Monotonic connection-id allocator.
///
/// Ids start at 1 and never repeat; minting fails once the 32-bit space
/// is exhausted rather than wrapping.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Allocator starting at id 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocator starting at an arbitrary id.
    pub fn starting_at(next: u32) -> Self {
        Self { next: next as u64 }
    }

    /// Mint the next id, failing on wrap past 0xFFFFFFFF.
    pub fn mint(&mut self) -> Result<u32> {
        if self.next > u32::MAX as u64 {
            return Err(ObexError::IdExhausted);
        }
        let id = self.next as u32;
        self.next += 1;
        Ok(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// OBEX server state machine.
pub struct Server {
    conn: ConnectionState,
    req: RequestState,
    ids: IdAllocator,
}

impl Server {
    /// Create a server with the default advertised receive capacity.
    pub fn new() -> Self {
        Self::with_local_max(DEFAULT_LOCAL_MAX)
    }

    /// Create a server advertising `local_max` in connect responses.
    pub fn with_local_max(local_max: u16) -> Self {
        let local_max = local_max.max(DEFAULT_MAX_PACKET_LEN);
        Self {
            conn: ConnectionState::new(local_max),
            req: RequestState::new(local_max),
            ids: IdAllocator::new(),
        }
    }

    /// Feed request bytes from the transport.
    ///
    /// Non-final request packets are acknowledged with a bare continue in
    /// the returned bytes. A final packet transitions to the response
    /// phase and returns [`Action::Respond`] naming the received op.
    pub fn input(&mut self, data: &[u8]) -> Result<(Action, Vec<u8>)> {
        if self.conn.state == State::Error {
            return Ok((Action::Failed, Vec::new()));
        }
        if self.conn.state == State::Responding {
            return Ok(self.protocol_failure(
                "request packet received while a response is pending".to_string(),
            ));
        }

        self.req.input.extend(data);
        let mut out = Vec::new();
        loop {
            let raw = match self.req.input.try_extract() {
                Ok(Some(raw)) => raw,
                Ok(None) => return Ok((Action::Continue, out)),
                Err(err) => return Ok(self.fail(err)),
            };
            let (op, packet) = match packet::decode_request(&raw) {
                Ok(decoded) => decoded,
                Err(err) => return Ok(self.fail(err)),
            };
            tracing::debug!(op = op.name(), len = packet.length, "request received");

            let has_target = packet.headers.iter().any(|h| h.id() == header_id::TARGET);
            let has_id = packet
                .headers
                .iter()
                .any(|h| h.id() == header_id::CONNECTION_ID);
            if has_target && has_id {
                return Ok(self.protocol_failure(
                    "Target and ConnectionId must not appear in the same request".to_string(),
                ));
            }

            if op == Opcode::Session {
                // Reliable sessions are rejected without involving the
                // application.
                out.extend_from_slice(&packet::encode_packet(
                    response::NOT_IMPLEMENTED | FINAL_BIT,
                    &[],
                    &[],
                ));
                continue;
            }

            match self.req.op {
                None => {
                    self.req.begin(op);
                    self.conn.state = State::Busy;
                }
                Some(current) if current == op => {}
                // An abort may land mid-way through a multi-packet request.
                Some(_) if op == Opcode::Abort => {
                    self.req.begin(op);
                }
                Some(current) => {
                    return Ok(self.protocol_failure(format!(
                        "opcode changed from {} to {} mid-request",
                        current.name(),
                        op.name()
                    )));
                }
            }

            if op == Opcode::Connect {
                if let Some(fields) = packet.connect {
                    if fields.max_packet_len > DEFAULT_MAX_PACKET_LEN {
                        self.conn.max_packet_len = fields.max_packet_len;
                    }
                }
            }
            self.observe_connection_id(&packet);

            let is_final = packet.is_final();
            self.req.headers_in.extend(packet.headers.iter().cloned());
            self.req.latest = Some(packet);

            if is_final {
                self.conn.state = State::Responding;
                return Ok((Action::Respond(op), out));
            }
            if !op.is_multi_packet() {
                return Ok(self.protocol_failure(format!(
                    "non-final {} request packet",
                    op.name()
                )));
            }
            out.extend_from_slice(&packet::encode_packet(
                response::CONTINUE | FINAL_BIT,
                &[],
                &[],
            ));
        }
    }

    /// Answer the pending request with a status and headers.
    pub fn respond(&mut self, status: u8, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.respond_inner(status, headers, None)
    }

    /// Answer the pending request with a status, content, and headers.
    ///
    /// The content travels as a single `EndOfBody` header; responses are
    /// single-packet, so content that cannot fit is a capacity failure.
    pub fn respond_content(
        &mut self,
        status: u8,
        content: &[u8],
        headers: Vec<Header>,
    ) -> Result<(Action, Vec<u8>)> {
        self.respond_inner(status, headers, Some(content))
    }

    fn respond_inner(
        &mut self,
        status: u8,
        headers: Vec<Header>,
        content: Option<&[u8]>,
    ) -> Result<(Action, Vec<u8>)> {
        if self.conn.state != State::Responding {
            return Err(ObexError::Usage(
                "no request awaiting a response".to_string(),
            ));
        }
        let op = self.req.op.expect("responding state implies an op");
        let ok = (status & !FINAL_BIT) == response::OK;
        if let Some(content) = content {
            if content.len() + 3 > u16::MAX as usize {
                return Err(ObexError::Usage(
                    "content too long for a single EndOfBody header".to_string(),
                ));
            }
        }

        let mut fixed = Vec::new();
        if op == Opcode::Connect {
            if ok {
                let id = match self.ids.mint() {
                    Ok(id) => id,
                    Err(err) => {
                        self.conn.record_error(err.to_string());
                        return Err(err);
                    }
                };
                self.conn.set_connection_id(id);
                // The minted id leads the response header list.
                let blob = self
                    .conn
                    .connection_id_header
                    .clone()
                    .expect("connection id was just set");
                self.req.outgoing.push_back(blob);
                tracing::debug!(id, "connection id minted");
            }
            let max = self.conn.local_max.to_be_bytes();
            fixed.extend_from_slice(&[OBEX_VERSION, 0x00, max[0], max[1]]);
        }

        for header in &headers {
            self.req.queue_header(header);
        }
        if let Some(content) = content {
            let body = Header::bytes(header_id::END_OF_BODY, Bytes::copy_from_slice(content))
                .expect("EndOfBody kind and length were checked");
            self.req.queue_header(&body);
        }

        let bytes = build_packet(
            &mut self.conn,
            &mut self.req,
            status,
            &fixed,
            PacketRole::Response,
            false,
        )?;
        if !self.req.outgoing.is_empty() {
            let message = format!(
                "response to {} request does not fit a single packet",
                op.name()
            );
            self.conn.record_error(message.clone());
            return Err(ObexError::Capacity(message));
        }

        if op == Opcode::Connect && ok {
            self.conn.connected = true;
        }
        if op == Opcode::Disconnect {
            self.conn.connected = false;
            self.conn.clear_connection_id();
            self.conn.max_packet_len = DEFAULT_MAX_PACKET_LEN;
        }

        tracing::debug!(code = bytes[0], len = bytes.len(), "response emitted");
        self.conn.state = State::Idle;
        self.req.op = None;
        Ok((Action::Done, bytes))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Connection lifecycle state.
    pub fn state(&self) -> State {
        self.conn.state
    }

    /// Snapshot of the connection.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.conn.state,
            connected: self.conn.connected,
            connection_id: self.conn.connection_id,
            max_packet_len: self.conn.max_packet_len,
            error_message: self.conn.error_message.clone(),
        }
    }

    /// The minted connection id for the current logical connection.
    pub fn connection_id(&self) -> Option<u32> {
        self.conn.connection_id
    }

    /// Current outgoing packet budget (the client's advertised capacity).
    pub fn max_packet_len(&self) -> u16 {
        self.conn.max_packet_len
    }

    /// Detailed status of the latest exchange.
    pub fn status_detail(&self) -> StatusDetail {
        status_detail(&self.conn, &self.req)
    }

    /// Latest decoded request packet.
    pub fn request(&self) -> Option<&Packet> {
        self.req.latest.as_ref()
    }

    /// `Body` and `EndOfBody` values accumulated from the request.
    pub fn bodies(&self) -> Vec<Bytes> {
        collect_bodies(&self.req.headers_in)
    }

    /// All accumulated request header values matching `name`.
    pub fn headers(&self, name: &str) -> Vec<&HeaderValue> {
        header::find_all(&self.req.headers_in, name)
            .into_iter()
            .map(Header::value)
            .collect()
    }

    /// Drop request-local state and recover to Idle.
    pub fn clear(&mut self) {
        self.req.clear();
        self.conn.clear_error();
        self.conn.state = State::Idle;
    }

    /// Reinitialize connection state; the id allocator keeps its place so
    /// ids stay unique across transport sessions.
    pub fn reset(&mut self) {
        self.conn.reset();
        self.req = RequestState::new(self.conn.local_max);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Warn on a request connection id that differs from the minted one.
    fn observe_connection_id(&self, packet: &Packet) {
        let id = header::find(&packet.headers, "ConnectionId").and_then(Header::as_u32);
        if let (Some(minted), Some(received)) = (self.conn.connection_id, id) {
            if minted != received {
                tracing::warn!(minted, received, "connection id mismatch in request");
            }
        }
    }

    fn fail(&mut self, err: ObexError) -> (Action, Vec<u8>) {
        tracing::error!(error = %err, "server exchange failed");
        self.conn.record_error(err.to_string());
        (Action::Failed, Vec::new())
    }

    fn protocol_failure(&mut self, message: String) -> (Action, Vec<u8>) {
        self.fail(ObexError::Protocol(message))
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::transport::Engine for Server {
    fn input(&mut self, data: &[u8]) -> Result<(Action, Vec<u8>)> {
        Server::input(self, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECT_REQUEST: &[u8] = &[0x80, 0x00, 0x07, 0x10, 0x00, 0x04, 0x00];

    fn respond_ok(server: &mut Server) -> Vec<u8> {
        let (action, bytes) = server.respond(response::OK, vec![]).unwrap();
        assert_eq!(action, Action::Done);
        bytes
    }

    #[test]
    fn test_id_allocator_is_strictly_increasing() {
        let mut ids = IdAllocator::new();
        let first = ids.mint().unwrap();
        let second = ids.mint().unwrap();
        let third = ids.mint().unwrap();
        assert_eq!(first, 1);
        assert!(second > first && third > second);
    }

    #[test]
    fn test_id_allocator_fails_on_wrap() {
        let mut ids = IdAllocator::starting_at(u32::MAX);
        assert_eq!(ids.mint().unwrap(), u32::MAX);
        assert!(matches!(ids.mint(), Err(ObexError::IdExhausted)));
    }

    #[test]
    fn test_connect_mints_id_and_negotiates() {
        let mut server = Server::with_local_max(1024);
        let (action, out) = server.input(CONNECT_REQUEST).unwrap();
        assert_eq!(action, Action::Respond(Opcode::Connect));
        assert!(out.is_empty());
        assert_eq!(server.max_packet_len(), 1024);

        let bytes = respond_ok(&mut server);
        assert_eq!(
            bytes,
            vec![0xA0, 0x00, 0x0C, 0x10, 0x00, 0x04, 0x00, 0xCB, 0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(server.connection_id(), Some(1));
        assert_eq!(server.state(), State::Idle);
    }

    #[test]
    fn test_connect_below_minimum_keeps_budget() {
        let mut server = Server::new();
        // Client advertises 200; the outgoing budget stays at 255.
        let (_, _) = server
            .input(&[0x80, 0x00, 0x07, 0x10, 0x00, 0x00, 0xC8])
            .unwrap();
        assert_eq!(server.max_packet_len(), 255);
    }

    #[test]
    fn test_multi_packet_put_gets_continue_acks() {
        let mut server = Server::new();

        // Non-final put packet with a Body fragment.
        let (action, out) = server
            .input(&[0x02, 0x00, 0x0B, 0x48, 0x00, 0x08, 0x41, 0x42, 0x43, 0x44, 0x45])
            .unwrap();
        assert_eq!(action, Action::Continue);
        assert_eq!(out, vec![0x90, 0x00, 0x03]);
        assert_eq!(server.state(), State::Busy);

        // Final packet completes the request.
        let (action, out) = server
            .input(&[0x82, 0x00, 0x08, 0x48, 0x00, 0x05, 0x46, 0x47])
            .unwrap();
        assert_eq!(action, Action::Respond(Opcode::Put));
        assert!(out.is_empty());

        let bodies = server.bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].as_ref(), b"ABCDE");
        assert_eq!(bodies[1].as_ref(), b"FG");

        let bytes = respond_ok(&mut server);
        assert_eq!(bytes, vec![0xA0, 0x00, 0x03]);
    }

    #[test]
    fn test_get_respond_content() {
        let mut server = Server::new();
        let (action, _) = server.input(&[0x83, 0x00, 0x03]).unwrap();
        assert_eq!(action, Action::Respond(Opcode::Get));

        let (action, bytes) = server
            .respond_content(response::OK, b"ABCDEFG", vec![])
            .unwrap();
        assert_eq!(action, Action::Done);
        assert_eq!(
            bytes,
            vec![0xA0, 0x00, 0x0D, 0x49, 0x00, 0x0A, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47]
        );
    }

    #[test]
    fn test_disconnect_resets_connection() {
        let mut server = Server::new();
        server.input(CONNECT_REQUEST).unwrap();
        respond_ok(&mut server);
        assert!(server.connection_id().is_some());
        assert_eq!(server.max_packet_len(), 1024);

        let (action, _) = server.input(&[0x81, 0x00, 0x03]).unwrap();
        assert_eq!(action, Action::Respond(Opcode::Disconnect));
        let bytes = respond_ok(&mut server);
        assert_eq!(bytes, vec![0xA0, 0x00, 0x03]);
        assert_eq!(server.connection_id(), None);
        assert_eq!(server.max_packet_len(), 255);
        assert!(!server.info().connected);
    }

    #[test]
    fn test_minted_ids_survive_reset() {
        let mut server = Server::new();
        server.input(CONNECT_REQUEST).unwrap();
        respond_ok(&mut server);
        assert_eq!(server.connection_id(), Some(1));

        server.reset();
        server.input(CONNECT_REQUEST).unwrap();
        respond_ok(&mut server);
        assert_eq!(server.connection_id(), Some(2));
    }

    #[test]
    fn test_session_request_rejected_without_application() {
        let mut server = Server::new();
        let (action, out) = server.input(&[0x87, 0x00, 0x03]).unwrap();
        assert_eq!(action, Action::Continue);
        assert_eq!(out, vec![0xD1, 0x00, 0x03]);
        assert_eq!(server.state(), State::Idle);
    }

    #[test]
    fn test_response_overflow_is_fatal() {
        let mut server = Server::new(); // budget 255 before connect
        server.input(&[0x83, 0x00, 0x03]).unwrap();

        let err = server
            .respond_content(response::OK, &vec![0u8; 400], vec![])
            .unwrap_err();
        assert!(matches!(err, ObexError::Capacity(_)));
        assert_eq!(server.state(), State::Error);
    }

    #[test]
    fn test_respond_without_request_rejected() {
        let mut server = Server::new();
        assert!(matches!(
            server.respond(response::OK, vec![]),
            Err(ObexError::Usage(_))
        ));
    }

    #[test]
    fn test_non_final_single_packet_op_rejected() {
        let mut server = Server::new();
        // A non-final setpath packet is a protocol violation.
        let (action, _) = server.input(&[0x05, 0x00, 0x05, 0x00, 0x00]).unwrap();
        assert_eq!(action, Action::Failed);
        assert_eq!(server.state(), State::Error);
    }

    #[test]
    fn test_abort_mid_put_supersedes_request() {
        let mut server = Server::new();
        server
            .input(&[0x02, 0x00, 0x0B, 0x48, 0x00, 0x08, 0x41, 0x42, 0x43, 0x44, 0x45])
            .unwrap();

        let (action, _) = server.input(&[0xFF, 0x00, 0x03]).unwrap();
        assert_eq!(action, Action::Respond(Opcode::Abort));
        let bytes = respond_ok(&mut server);
        assert_eq!(bytes, vec![0xA0, 0x00, 0x03]);
        // The superseded put's accumulation is gone.
        assert!(server.bodies().is_empty());
    }

    #[test]
    fn test_target_with_connection_id_rejected() {
        let mut server = Server::new();
        // A put packet carrying both Target and ConnectionId headers.
        let (action, out) = server
            .input(&[
                0x82, 0x00, 0x0F, 0x46, 0x00, 0x07, 0x41, 0x42, 0x43, 0x44, 0xCB, 0x00, 0x00,
                0x00, 0x2A,
            ])
            .unwrap();
        assert_eq!(action, Action::Failed);
        assert!(out.is_empty());
        assert_eq!(server.state(), State::Error);
        assert!(server
            .status_detail()
            .error_message
            .unwrap()
            .contains("Target and ConnectionId"));
    }

    #[test]
    fn test_opcode_change_mid_request_rejected() {
        let mut server = Server::new();
        server
            .input(&[0x02, 0x00, 0x0B, 0x48, 0x00, 0x08, 0x41, 0x42, 0x43, 0x44, 0x45])
            .unwrap();
        let (action, _) = server.input(&[0x03, 0x00, 0x03]).unwrap();
        assert_eq!(action, Action::Failed);
    }

    #[test]
    fn test_declared_length_over_advertised_capacity_fails() {
        let mut server = Server::with_local_max(255);
        // Prefix declares 300 bytes, above the advertised 255.
        let (action, _) = server.input(&[0x02, 0x01, 0x2C]).unwrap();
        assert_eq!(action, Action::Failed);
    }
}
