//! Client-side request state machine.
//!
//! The client drives one multi-packet request at a time to completion:
//! each operation queues encoded headers, emits the first packet, and
//! [`Client::input`] consumes response bytes and produces any follow-up
//! packets. The engine never touches a transport; callers shuttle the
//! returned bytes themselves or use a [`crate::transport`] adapter.
//!
//! # Example
//!
//! ```ignore
//! use obex_engine::{Action, Client, Header, header_id};
//!
//! let mut client = Client::new();
//! let (_, bytes) = client.connect(vec![])?;
//! transport.write_all(&bytes)?;
//! // feed response bytes back:
//! let (action, out) = client.input(&response_bytes)?;
//! assert_eq!(action, Action::Done);
//! ```

use bytes::Bytes;

use crate::connection::{
    build_packet, collect_bodies, status_detail, Action, ConnectionInfo, ConnectionState,
    PacketRole, RequestState, State, StatusDetail, DEFAULT_LOCAL_MAX,
    DEFAULT_MAX_PACKET_LEN,
};
use crate::error::{ObexError, Result};
use crate::protocol::header::{self, header_id, Header, HeaderValue};
use crate::protocol::opcode::{response, Opcode, StatusCategory};
use crate::protocol::packet::{
    self, ConnectFields, Packet, CONNECT_FIELDS_LEN, OBEX_VERSION, PACKET_PREFIX,
    SETPATH_FIELDS_LEN,
};

/// Flag bits for the setpath request.
const SETPATH_FLAG_PARENT: u8 = 0x01;
const SETPATH_FLAG_NOCREATE: u8 = 0x02;

/// Options for [`Client::setpath`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetPathOptions {
    /// Go to the parent directory.
    pub parent: bool,
    /// Do not create the directory if it is missing.
    pub nocreate: bool,
}

/// OBEX client state machine.
pub struct Client {
    conn: ConnectionState,
    req: RequestState,
}

impl Client {
    /// Create a client with the default advertised receive capacity.
    pub fn new() -> Self {
        Self::with_local_max(DEFAULT_LOCAL_MAX)
    }

    /// Create a client advertising `local_max` as its receive capacity in
    /// the connect proposal.
    pub fn with_local_max(local_max: u16) -> Self {
        let local_max = local_max.max(DEFAULT_MAX_PACKET_LEN);
        Self {
            conn: ConnectionState::new(local_max),
            req: RequestState::new(local_max),
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Open a logical connection, proposing this client's receive capacity.
    ///
    /// Connect cannot span packets: all headers must fit in one.
    pub fn connect(&mut self, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        if self.conn.connected {
            return Err(ObexError::Usage("already connected".to_string()));
        }
        self.ensure_single_packet(Opcode::Connect, CONNECT_FIELDS_LEN, &headers, false)?;

        self.begin_request(Opcode::Connect, headers);
        let max = self.conn.local_max.to_be_bytes();
        let fixed = [OBEX_VERSION, 0x00, max[0], max[1]];
        let bytes = self.emit(Opcode::Connect.code(), &fixed, false)?;
        Ok((Action::Continue, bytes))
    }

    /// Close the logical connection. `connected` drops on emit.
    pub fn disconnect(&mut self, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        if !self.conn.connected {
            return Err(ObexError::Usage("not connected".to_string()));
        }
        self.ensure_no_target_conflict(&headers)?;
        self.ensure_single_packet(Opcode::Disconnect, 0, &headers, true)?;

        self.begin_request(Opcode::Disconnect, headers);
        let bytes = self.emit(Opcode::Disconnect.code(), &[], true)?;
        self.conn.connected = false;
        self.conn.clear_connection_id();
        Ok((Action::Continue, bytes))
    }

    /// Push an object with its full content known up front.
    ///
    /// Content is split into `Body` fragments sized to the negotiated
    /// packet budget; a `Length` header precedes them.
    pub fn put(&mut self, content: &[u8], headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        self.ensure_no_target_conflict(&headers)?;
        if content.len() > u32::MAX as usize {
            return Err(ObexError::Usage(
                "content length does not fit a 32-bit Length header".to_string(),
            ));
        }

        self.begin_request(Opcode::Put, headers);
        let length = Header::u32(header_id::LENGTH, content.len() as u32)
            .expect("Length is u32-kind");
        self.req.queue_header(&length);
        self.queue_body_fragments(content);
        let bytes = self.emit(Opcode::Put.code(), &[], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Push a delete request: a put with no body and no length.
    pub fn put_delete(&mut self, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        self.ensure_no_target_conflict(&headers)?;
        self.begin_request(Opcode::Put, headers);
        let bytes = self.emit(Opcode::Put.code(), &[], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Push an object in caller-paced chunks.
    ///
    /// The first call initiates the request and may carry headers; later
    /// calls must not. An empty chunk sends an empty `EndOfBody` with the
    /// final bit and ends the stream.
    pub fn put_stream(&mut self, chunk: &[u8], headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        match self.conn.state {
            State::Idle => {
                self.ensure_no_target_conflict(&headers)?;
                self.begin_request(Opcode::Put, headers);
                self.req.streaming = true;
            }
            State::Streaming => {
                if !headers.is_empty() {
                    return Err(ObexError::Usage(
                        "headers are only accepted on the first streaming call".to_string(),
                    ));
                }
                self.conn.state = State::Busy;
            }
            State::Error => {
                return Err(ObexError::Usage(
                    "connection is in the error state; call reset or clear".to_string(),
                ));
            }
            _ => {
                return Err(ObexError::Usage(
                    "a request is already outstanding".to_string(),
                ));
            }
        }

        if chunk.is_empty() {
            self.req.streaming = false;
            let end = Header::bytes(header_id::END_OF_BODY, Bytes::new())
                .expect("EndOfBody is byte-kind");
            self.req.queue_header(&end);
        } else {
            self.queue_body_fragments(chunk);
        }
        let bytes = self.emit(Opcode::Put.code(), &[], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Fetch an object.
    pub fn get(&mut self, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        self.ensure_no_target_conflict(&headers)?;
        self.begin_request(Opcode::Get, headers);
        let bytes = self.emit(Opcode::Get.code(), &[], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Change the remote working directory.
    pub fn setpath(
        &mut self,
        headers: Vec<Header>,
        options: SetPathOptions,
    ) -> Result<(Action, Vec<u8>)> {
        self.ensure_idle()?;
        self.ensure_no_target_conflict(&headers)?;
        self.ensure_single_packet(Opcode::SetPath, SETPATH_FIELDS_LEN, &headers, true)?;

        self.begin_request(Opcode::SetPath, headers);
        let mut flags = 0u8;
        if options.parent {
            flags |= SETPATH_FLAG_PARENT;
        }
        if options.nocreate {
            flags |= SETPATH_FLAG_NOCREATE;
        }
        let bytes = self.emit(Opcode::SetPath.code(), &[flags, 0x00], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Terminate the current operation.
    pub fn abort(&mut self, headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        if self.conn.state == State::Error {
            return Err(ObexError::Usage(
                "connection is in the error state; call reset or clear".to_string(),
            ));
        }
        self.ensure_no_target_conflict(&headers)?;
        self.ensure_single_packet(Opcode::Abort, 0, &headers, true)?;

        self.begin_request(Opcode::Abort, headers);
        let bytes = self.emit(Opcode::Abort.code(), &[], true)?;
        Ok((Action::Continue, bytes))
    }

    /// Reliable sessions are not supported.
    pub fn session(&mut self, _headers: Vec<Header>) -> Result<(Action, Vec<u8>)> {
        Err(ObexError::Unsupported("session"))
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed response bytes from the transport.
    ///
    /// Incomplete packets buffer internally and return `Continue` with no
    /// output. Decode and protocol failures surface as `Failed` with the
    /// message recorded on the connection state.
    pub fn input(&mut self, data: &[u8]) -> Result<(Action, Vec<u8>)> {
        if self.conn.state == State::Error {
            return Ok((Action::Failed, Vec::new()));
        }
        let op = match self.req.op {
            Some(op) => op,
            None => {
                return Err(ObexError::Usage(
                    "no request in flight".to_string(),
                ))
            }
        };

        self.req.input.extend(data);
        let mut out = Vec::new();
        loop {
            let raw = match self.req.input.try_extract() {
                Ok(Some(raw)) => raw,
                Ok(None) => return Ok((Action::Continue, out)),
                Err(err) => return Ok(self.fail(err)),
            };
            let packet = match packet::decode_response(&raw, op) {
                Ok(packet) => packet,
                Err(err) => return Ok(self.fail(err)),
            };
            tracing::debug!(code = packet.code, len = packet.length, "response received");

            let code = packet.status_code();
            let is_final = packet.is_final();
            let connect_fields = packet.connect;
            let response_id = self.observe_connection_id(&packet);

            self.req.headers_in.extend(packet.headers.iter().cloned());
            self.req.latest = Some(packet);

            let (action, bytes) = self.dispatch(op, code, is_final, connect_fields, response_id);
            out.extend_from_slice(&bytes);
            if action != Action::Continue {
                return Ok((action, out));
            }
        }
    }

    fn dispatch(
        &mut self,
        op: Opcode,
        code: u8,
        is_final: bool,
        connect_fields: Option<ConnectFields>,
        response_id: Option<u32>,
    ) -> (Action, Vec<u8>) {
        match op {
            Opcode::Connect => {
                if code == response::CONTINUE {
                    return self.protocol_failure(format!(
                        "CONTINUE packet received for {} request",
                        op.name()
                    ));
                }
                if !is_final {
                    return self.protocol_failure(format!(
                        "response 0x{:02X} to connect request lacks the final bit",
                        code
                    ));
                }
                if code == response::OK {
                    self.conn.connected = true;
                    if let Some(fields) = connect_fields {
                        if fields.max_packet_len > DEFAULT_MAX_PACKET_LEN {
                            self.conn.max_packet_len = fields.max_packet_len;
                        }
                    }
                    if let Some(id) = response_id {
                        self.conn.set_connection_id(id);
                    }
                }
                self.finish();
                (Action::Done, Vec::new())
            }
            Opcode::Put | Opcode::Get => {
                if code == response::CONTINUE {
                    if !self.req.outgoing.is_empty() {
                        match self.emit(op.code(), &[], true) {
                            Ok(bytes) => (Action::Continue, bytes),
                            Err(err) => self.fail(err),
                        }
                    } else if self.req.streaming {
                        self.conn.state = State::Streaming;
                        (Action::Writable, Vec::new())
                    } else if op == Opcode::Get {
                        // The response spans further packets; keep reading.
                        (Action::Continue, Vec::new())
                    } else {
                        self.protocol_failure(
                            "CONTINUE packet received after final put packet".to_string(),
                        )
                    }
                } else if is_final {
                    self.finish();
                    (Action::Done, Vec::new())
                } else {
                    self.protocol_failure(format!(
                        "non-final response 0x{:02X} to {} request",
                        code,
                        op.name()
                    ))
                }
            }
            Opcode::Disconnect | Opcode::SetPath | Opcode::Abort | Opcode::Session => {
                if code == response::CONTINUE {
                    self.protocol_failure(format!(
                        "CONTINUE packet received for {} request",
                        op.name()
                    ))
                } else if !is_final {
                    self.protocol_failure(format!(
                        "response 0x{:02X} to {} request lacks the final bit",
                        code,
                        op.name()
                    ))
                } else {
                    self.finish();
                    (Action::Done, Vec::new())
                }
            }
        }
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

    /// Whether a connect exchange has completed successfully.
    pub fn is_connected(&self) -> bool {
        self.conn.connected
    }

    /// The persisted connection id, when the server minted one.
    pub fn connection_id(&self) -> Option<u32> {
        self.conn.connection_id
    }

    /// Current outgoing packet budget.
    pub fn max_packet_len(&self) -> u16 {
        self.conn.max_packet_len
    }

    /// Category of the latest response (or of the synthesized failure).
    pub fn status(&self) -> StatusCategory {
        self.status_detail().status
    }

    /// Detailed status of the latest exchange.
    pub fn status_detail(&self) -> StatusDetail {
        status_detail(&self.conn, &self.req)
    }

    /// Latest decoded response packet.
    pub fn response(&self) -> Option<&Packet> {
        self.req.latest.as_ref()
    }

    /// `Body` and `EndOfBody` values accumulated from the response, in
    /// arrival order.
    pub fn bodies(&self) -> Vec<Bytes> {
        collect_bodies(&self.req.headers_in)
    }

    /// All accumulated response header values matching `name`.
    pub fn headers(&self, name: &str) -> Vec<&HeaderValue> {
        header::find_all(&self.req.headers_in, name)
            .into_iter()
            .map(Header::value)
            .collect()
    }

    /// Drop request-local state and recover to Idle; the connection
    /// (id, negotiated budget) survives.
    pub fn clear(&mut self) {
        self.req.clear();
        self.conn.clear_error();
        self.conn.state = State::Idle;
    }

    /// Reinitialize the whole state, as freshly constructed.
    pub fn reset(&mut self) {
        self.conn.reset();
        self.req = RequestState::new(self.conn.local_max);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<()> {
        match self.conn.state {
            State::Idle => Ok(()),
            State::Error => Err(ObexError::Usage(
                "connection is in the error state; call reset or clear".to_string(),
            )),
            _ => Err(ObexError::Usage(
                "a request is already outstanding".to_string(),
            )),
        }
    }

    fn ensure_no_target_conflict(&self, headers: &[Header]) -> Result<()> {
        if self.conn.connection_id.is_some()
            && headers.iter().any(|h| h.id() == header_id::TARGET)
        {
            return Err(ObexError::Usage(
                "Target and ConnectionId must not appear in the same request".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject single-packet operations whose headers cannot fit one packet.
    fn ensure_single_packet(
        &self,
        op: Opcode,
        fixed_len: usize,
        headers: &[Header],
        with_connection_id: bool,
    ) -> Result<()> {
        let id_len = if with_connection_id {
            self.conn.connection_id_header.as_ref().map_or(0, Vec::len)
        } else {
            0
        };
        let need = PACKET_PREFIX
            + fixed_len
            + id_len
            + headers.iter().map(Header::encoded_len).sum::<usize>();
        if need > self.conn.max_packet_len as usize {
            return Err(ObexError::Usage(format!(
                "{} headers do not fit in a single packet",
                op.name()
            )));
        }
        Ok(())
    }

    fn begin_request(&mut self, op: Opcode, headers: Vec<Header>) {
        self.req.begin(op);
        for header in &headers {
            self.req.queue_header(header);
        }
        self.conn.state = State::Busy;
    }

    fn emit(&mut self, code: u8, fixed: &[u8], include_connection_id: bool) -> Result<Vec<u8>> {
        let bytes = build_packet(
            &mut self.conn,
            &mut self.req,
            code,
            fixed,
            PacketRole::Request,
            include_connection_id,
        )?;
        tracing::debug!(code = bytes[0], len = bytes.len(), "request emitted");
        Ok(bytes)
    }

    /// Split content into `Body` fragments. The first fragment tops off
    /// the first packet after the queued headers; the rest use the full
    /// per-packet budget.
    fn queue_body_fragments(&mut self, content: &[u8]) {
        const HEADER_OVERHEAD: usize = 3;
        let id_len = self.conn.connection_id_header.as_ref().map_or(0, Vec::len);
        let per_packet = self.conn.max_packet_len as usize - PACKET_PREFIX - id_len;
        let max_fragment = per_packet - HEADER_OVERHEAD;

        if content.is_empty() {
            let body =
                Header::bytes(header_id::BODY, Bytes::new()).expect("Body is byte-kind");
            self.req.queue_header(&body);
            return;
        }

        let mut offset = 0;
        let queued = self.req.queued_bytes();
        if per_packet > queued + HEADER_OVERHEAD {
            let take = (per_packet - queued - HEADER_OVERHEAD).min(content.len());
            self.queue_body(&content[..take]);
            offset = take;
        }
        while offset < content.len() {
            let take = max_fragment.min(content.len() - offset);
            self.queue_body(&content[offset..offset + take]);
            offset += take;
        }
    }

    fn queue_body(&mut self, fragment: &[u8]) {
        let body = Header::bytes(header_id::BODY, Bytes::copy_from_slice(fragment))
            .expect("Body is byte-kind");
        self.req.queue_header(&body);
    }

    /// Warn on a response connection id that differs from the stored one.
    fn observe_connection_id(&self, packet: &Packet) -> Option<u32> {
        let id = header::find(&packet.headers, "ConnectionId").and_then(Header::as_u32);
        if let (Some(stored), Some(received)) = (self.conn.connection_id, id) {
            if stored != received {
                tracing::warn!(stored, received, "connection id mismatch in response");
            }
        }
        id
    }

    fn finish(&mut self) {
        self.conn.state = State::Idle;
        self.req.op = None;
        self.req.streaming = false;
    }

    fn fail(&mut self, err: ObexError) -> (Action, Vec<u8>) {
        tracing::error!(error = %err, "client exchange failed");
        self.conn.record_error(err.to_string());
        self.req.streaming = false;
        (Action::Failed, Vec::new())
    }

    fn protocol_failure(&mut self, message: String) -> (Action, Vec<u8>) {
        self.fail(ObexError::Protocol(message))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::transport::Engine for Client {
    fn input(&mut self, data: &[u8]) -> Result<(Action, Vec<u8>)> {
        Client::input(self, data)
    }
}
