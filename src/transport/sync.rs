//! Blocking completion adapter.
//!
//! Drives one exchange to completion over a blocking `Read + Write`
//! handle (a TCP stream, an RFCOMM socket file, a serial port). Rust
//! handles are binary and blocking by default, so no mode switching is
//! involved; the loop reads exactly one packet per iteration so no
//! partial packet is ever left in the transport.

use std::io::{Read, Write};

use crate::connection::Action;
use crate::error::{ObexError, Result};
use crate::protocol::packet::{MIN_PACKET_LEN, PACKET_PREFIX};

use super::Engine;

/// Drive an exchange until it completes.
///
/// `initial` is the `(action, bytes)` pair returned by the operation that
/// started the exchange (e.g. [`crate::Client::put`]). Returns the
/// terminal action: `Done`, `Writable`, `Failed`, or — for servers —
/// `Respond`.
pub fn complete<T, E>(
    transport: &mut T,
    engine: &mut E,
    initial: (Action, Vec<u8>),
) -> Result<Action>
where
    T: Read + Write,
    E: Engine,
{
    let (mut action, mut out) = initial;
    loop {
        if !out.is_empty() {
            transport.write_all(&out)?;
            transport.flush()?;
        }
        if action != Action::Continue {
            return Ok(action);
        }

        let packet = read_packet(transport)?;
        let fed = engine.input(&packet)?;
        action = fed.0;
        out = fed.1;
    }
}

/// Read exactly one packet: the 3-byte prefix, then `length - 3` more.
fn read_packet<T: Read>(transport: &mut T) -> Result<Vec<u8>> {
    let mut prefix = [0u8; PACKET_PREFIX];
    transport.read_exact(&mut prefix)?;

    let declared = u16::from_be_bytes([prefix[1], prefix[2]]);
    if declared < MIN_PACKET_LEN {
        return Err(ObexError::Decode(format!(
            "declared packet length {} below minimum {}",
            declared, MIN_PACKET_LEN
        )));
    }

    let mut packet = vec![0u8; declared as usize];
    packet[..PACKET_PREFIX].copy_from_slice(&prefix);
    transport.read_exact(&mut packet[PACKET_PREFIX..])?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted transport: hands out queued packets, records writes.
    struct Scripted {
        incoming: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(packets: &[&[u8]]) -> Self {
            Self {
                incoming: packets.iter().flat_map(|p| p.iter().copied()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.incoming.len());
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
            }
            for slot in buf.iter_mut().take(n) {
                *slot = self.incoming.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_completes_connect_exchange() {
        let mut client = crate::Client::new();
        let initial = client.connect(vec![]).unwrap();

        let mut transport = Scripted::new(&[&[0xA0, 0x00, 0x07, 0x10, 0x00, 0x04, 0x00]]);
        let action = complete(&mut transport, &mut client, initial).unwrap();

        assert_eq!(action, Action::Done);
        assert!(client.is_connected());
        assert_eq!(transport.written[0], 0x80);
    }

    #[test]
    fn test_writes_follow_up_packets() {
        let mut client = crate::Client::new();
        let initial = client.put(&vec![0xAB; 400], vec![]).unwrap();

        let mut transport = Scripted::new(&[&[0x90, 0x00, 0x03], &[0xA0, 0x00, 0x03]]);
        let action = complete(&mut transport, &mut client, initial).unwrap();

        assert_eq!(action, Action::Done);
        // Initial packet plus the fragment released by the continue.
        assert!(transport.written.len() > 400);
    }

    #[test]
    fn test_returns_failed_without_hanging() {
        let mut client = crate::Client::new();
        let initial = client.connect(vec![]).unwrap();

        // A continue in response to connect is a protocol error.
        let mut transport = Scripted::new(&[&[0x90, 0x00, 0x03]]);
        let action = complete(&mut transport, &mut client, initial).unwrap();
        assert_eq!(action, Action::Failed);
    }

    #[test]
    fn test_truncated_transport_errors() {
        let mut client = crate::Client::new();
        let initial = client.get(vec![]).unwrap();

        let mut transport = Scripted::new(&[&[0xA0, 0x00]]);
        let err = complete(&mut transport, &mut client, initial).unwrap_err();
        assert!(matches!(err, ObexError::Io(_)));
    }
}
