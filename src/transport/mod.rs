//! Completion adapters binding the pure engine to real transports.
//!
//! The engine itself never performs I/O: operations and [`Engine::input`]
//! exchange byte buffers. The adapters here own the read/write loop — one
//! whole packet at a time, 3-byte prefix then `length - 3` — against a
//! blocking handle ([`sync`]) or a tokio stream ([`stream`]).

pub mod stream;
pub mod sync;

use crate::connection::Action;
use crate::error::Result;

/// The seam between a state machine and a transport driver.
///
/// Implemented by [`crate::Client`] and [`crate::Server`].
pub trait Engine {
    /// Feed transport bytes; returns the resulting action and any bytes
    /// to send back.
    fn input(&mut self, data: &[u8]) -> Result<(Action, Vec<u8>)>;
}
