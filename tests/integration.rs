//! Integration tests for obex-engine.
//!
//! These drive a real `Client` against a real `Server`, shuttling the
//! byte buffers between them the way a transport driver would.

use bytes::Bytes;
use obex_engine::protocol::opcode::response;
use obex_engine::{header_id, Action, Client, Header, Opcode, Server, State};

/// Pump client-emitted bytes into the server until the server surfaces a
/// complete request, relaying continue acks back into the client.
fn relay_request(client: &mut Client, server: &mut Server, mut bytes: Vec<u8>) -> Opcode {
    loop {
        let (action, acks) = server.input(&bytes).unwrap();
        match action {
            Action::Respond(op) => return op,
            Action::Continue => {
                assert!(!acks.is_empty(), "request stalled without an ack");
                let (action, next) = client.input(&acks).unwrap();
                assert_eq!(action, Action::Continue);
                bytes = next;
            }
            other => panic!("unexpected server action {:?}", other),
        }
    }
}

/// Feed a server response into the client, expecting completion.
fn finish(client: &mut Client, response_bytes: Vec<u8>) {
    let (action, out) = client.input(&response_bytes).unwrap();
    assert_eq!(action, Action::Done);
    assert!(out.is_empty());
}

/// Full connect handshake; returns the negotiated state on both sides.
fn connect(client: &mut Client, server: &mut Server) {
    let (action, bytes) = client.connect(vec![]).unwrap();
    assert_eq!(action, Action::Continue);

    let op = relay_request(client, server, bytes);
    assert_eq!(op, Opcode::Connect);

    let (action, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    assert_eq!(action, Action::Done);
    finish(client, response_bytes);
}

#[test]
fn test_connect_negotiates_id_and_budget() {
    let mut client = Client::new();
    let mut server = Server::with_local_max(1024);

    connect(&mut client, &mut server);

    assert!(client.is_connected());
    assert_eq!(client.connection_id(), server.connection_id());
    assert!(client.connection_id().is_some());
    // The client adopts the server's advertised capacity; the server
    // adopts the client's 65535 proposal.
    assert_eq!(client.max_packet_len(), 1024);
    assert_eq!(server.max_packet_len(), 65535);
}

#[test]
fn test_put_round_trips_content() {
    let mut client = Client::new();
    let mut server = Server::with_local_max(255);

    connect(&mut client, &mut server);
    assert_eq!(client.max_packet_len(), 255);

    // Three packets' worth of content under the 255-byte budget.
    let content: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
    let name = Header::unicode(header_id::NAME, "blob.bin").unwrap();
    let (action, bytes) = client.put(&content, vec![name]).unwrap();
    assert_eq!(action, Action::Continue);

    let op = relay_request(&mut client, &mut server, bytes);
    assert_eq!(op, Opcode::Put);

    let received: Vec<u8> = server
        .bodies()
        .iter()
        .flat_map(|b| b.iter().copied())
        .collect();
    assert_eq!(received, content);
    assert_eq!(
        server.headers("Length"),
        vec![&obex_engine::HeaderValue::U32(600)]
    );

    let (_, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    finish(&mut client, response_bytes);
    assert_eq!(client.state(), State::Idle);
}

#[test]
fn test_get_round_trips_content() {
    let mut client = Client::new();
    let mut server = Server::new();

    connect(&mut client, &mut server);

    let mime = Header::bytes(header_id::TYPE, &b"text/x-vcard\0"[..]).unwrap();
    let (_, bytes) = client.get(vec![mime]).unwrap();
    let op = relay_request(&mut client, &mut server, bytes);
    assert_eq!(op, Opcode::Get);

    let requested = server.headers("Type");
    assert_eq!(
        requested,
        vec![&obex_engine::HeaderValue::Bytes(Bytes::from_static(
            b"text/x-vcard\0"
        ))]
    );

    let (_, response_bytes) = server
        .respond_content(response::OK, b"BEGIN:VCARD", vec![])
        .unwrap();
    finish(&mut client, response_bytes);

    let bodies = client.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].as_ref(), b"BEGIN:VCARD");
}

#[test]
fn test_streaming_put_against_server() {
    let mut client = Client::new();
    let mut server = Server::new();

    connect(&mut client, &mut server);

    let name = Header::unicode(header_id::NAME, "log.txt").unwrap();
    let chunks: [&[u8]; 3] = [b"first ", b"second ", b"third"];

    let (_, mut bytes) = client.put_stream(chunks[0], vec![name]).unwrap();
    for next in &chunks[1..] {
        // Each non-final packet draws a continue ack from the server.
        let (action, ack) = server.input(&bytes).unwrap();
        assert_eq!(action, Action::Continue);
        let (action, out) = client.input(&ack).unwrap();
        assert_eq!(action, Action::Writable);
        assert!(out.is_empty());

        let (action, emitted) = client.put_stream(next, vec![]).unwrap();
        assert_eq!(action, Action::Continue);
        bytes = emitted;
    }

    let (action, ack) = server.input(&bytes).unwrap();
    assert_eq!(action, Action::Continue);
    let (action, _) = client.input(&ack).unwrap();
    assert_eq!(action, Action::Writable);

    // Empty chunk terminates the stream with a final EndOfBody packet.
    let (_, final_bytes) = client.put_stream(b"", vec![]).unwrap();
    let (action, _) = server.input(&final_bytes).unwrap();
    assert_eq!(action, Action::Respond(Opcode::Put));

    let received: Vec<u8> = server
        .bodies()
        .iter()
        .flat_map(|b| b.iter().copied())
        .collect();
    assert_eq!(received, b"first second third");

    let (_, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    finish(&mut client, response_bytes);
}

#[test]
fn test_disconnect_tears_down_both_sides() {
    let mut client = Client::new();
    let mut server = Server::with_local_max(1024);

    connect(&mut client, &mut server);
    assert!(client.connection_id().is_some());

    let (_, bytes) = client.disconnect(vec![]).unwrap();
    // The disconnect request still carries the connection id.
    assert_eq!(bytes[3], 0xCB);

    let op = relay_request(&mut client, &mut server, bytes);
    assert_eq!(op, Opcode::Disconnect);

    let (_, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    finish(&mut client, response_bytes);

    assert!(!client.is_connected());
    assert_eq!(client.connection_id(), None);
    assert_eq!(server.connection_id(), None);
    assert_eq!(server.max_packet_len(), 255);
}

#[test]
fn test_setpath_exchange() {
    let mut client = Client::new();
    let mut server = Server::new();

    connect(&mut client, &mut server);

    let dir = Header::unicode(header_id::NAME, "photos").unwrap();
    let (_, bytes) = client.setpath(vec![dir], Default::default()).unwrap();
    let op = relay_request(&mut client, &mut server, bytes);
    assert_eq!(op, Opcode::SetPath);
    assert_eq!(server.request().unwrap().setpath.unwrap().flags, 0);

    let (_, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    finish(&mut client, response_bytes);
}

#[test]
fn test_app_parameters_round_trip_through_get() {
    use obex_engine::codec::app_params::{self, TagParam};

    let mut client = Client::new();
    let mut server = Server::new();

    connect(&mut client, &mut server);

    // Profile parameters ride inside the AppParameters payload.
    let params = vec![
        TagParam::new(0x01, &[0x00, 0x02][..]),
        TagParam::new(0x02, &b"name"[..]),
    ];
    let payload = app_params::encode(&params).unwrap();
    let header = Header::bytes(header_id::APP_PARAMETERS, payload).unwrap();

    let (_, bytes) = client.get(vec![header]).unwrap();
    relay_request(&mut client, &mut server, bytes);

    let received = server.headers("AppParameters");
    let obex_engine::HeaderValue::Bytes(raw) = received[0] else {
        panic!("AppParameters is byte-kind");
    };
    assert_eq!(app_params::decode(raw).unwrap(), params);

    let (_, response_bytes) = server.respond(response::OK, vec![]).unwrap();
    finish(&mut client, response_bytes);
}

#[test]
fn test_not_found_response_surfaces_category() {
    let mut client = Client::new();
    let mut server = Server::new();

    connect(&mut client, &mut server);

    let (_, bytes) = client.get(vec![]).unwrap();
    relay_request(&mut client, &mut server, bytes);

    let (_, response_bytes) = server.respond(0x44, vec![]).unwrap();
    let (action, _) = client.input(&response_bytes).unwrap();
    assert_eq!(action, Action::Done);

    let detail = client.status_detail();
    assert_eq!(detail.status, obex_engine::StatusCategory::ClientError);
    assert_eq!(detail.code_name.as_deref(), Some("notfound"));
}

#[test]
fn test_blocking_adapter_end_to_end() {
    use std::io::{Read, Write};

    /// In-memory transport pairing a client with a scripted server.
    struct Loopback {
        server: Server,
        to_client: Vec<u8>,
        status: u8,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.to_client.len());
            buf[..n].copy_from_slice(&self.to_client[..n]);
            self.to_client.drain(..n);
            Ok(n)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let (action, out) = self.server.input(buf).unwrap();
            self.to_client.extend_from_slice(&out);
            if let Action::Respond(_) = action {
                let (_, response_bytes) = self.server.respond(self.status, vec![]).unwrap();
                self.to_client.extend_from_slice(&response_bytes);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut transport = Loopback {
        server: Server::with_local_max(512),
        to_client: Vec::new(),
        status: response::OK,
    };
    let mut client = Client::new();

    let initial = client.connect(vec![]).unwrap();
    let action = obex_engine::transport::sync::complete(&mut transport, &mut client, initial)
        .unwrap();
    assert_eq!(action, Action::Done);
    assert!(client.is_connected());
    assert_eq!(client.max_packet_len(), 512);

    let initial = client.put(&vec![0x5A; 900], vec![]).unwrap();
    let action = obex_engine::transport::sync::complete(&mut transport, &mut client, initial)
        .unwrap();
    assert_eq!(action, Action::Done);

    let received: Vec<u8> = transport
        .server
        .bodies()
        .iter()
        .flat_map(|b| b.iter().copied())
        .collect();
    assert_eq!(received, vec![0x5A; 900]);
}
