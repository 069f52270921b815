//! Async completion adapter over tokio streams.
//!
//! The same loop as [`super::sync`], for transports exposing tokio's
//! `AsyncRead + AsyncWrite` (TCP streams, Bluetooth socket wrappers,
//! in-memory duplex pipes in tests).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::connection::Action;
use crate::error::{ObexError, Result};
use crate::protocol::packet::{MIN_PACKET_LEN, PACKET_PREFIX};

use super::Engine;

/// Drive an exchange until it completes.
pub async fn complete<T, E>(
    transport: &mut T,
    engine: &mut E,
    initial: (Action, Vec<u8>),
) -> Result<Action>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: Engine,
{
    let (mut action, mut out) = initial;
    loop {
        if !out.is_empty() {
            transport.write_all(&out).await?;
            transport.flush().await?;
        }
        if action != Action::Continue {
            return Ok(action);
        }

        let packet = read_packet(transport).await?;
        let fed = engine.input(&packet)?;
        action = fed.0;
        out = fed.1;
    }
}

/// Read exactly one packet: the 3-byte prefix, then `length - 3` more.
async fn read_packet<T: AsyncRead + Unpin>(transport: &mut T) -> Result<Vec<u8>> {
    let mut prefix = [0u8; PACKET_PREFIX];
    transport.read_exact(&mut prefix).await?;

    let declared = u16::from_be_bytes([prefix[1], prefix[2]]);
    if declared < MIN_PACKET_LEN {
        return Err(ObexError::Decode(format!(
            "declared packet length {} below minimum {}",
            declared, MIN_PACKET_LEN
        )));
    }

    let mut packet = vec![0u8; declared as usize];
    packet[..PACKET_PREFIX].copy_from_slice(&prefix);
    transport.read_exact(&mut packet[PACKET_PREFIX..]).await?;
    Ok(packet)
}
