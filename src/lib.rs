//! # obex-engine
//!
//! Transport-independent OBEX protocol engine: a bit-exact packet/header
//! codec plus client- and server-side state machines for the Generic
//! Object Exchange Profile.
//!
//! The engine is pure "bytes in, bytes out": every operation returns an
//! [`Action`] and the bytes to hand to the transport, and [`Client::input`]
//! / [`Server::input`] consume whatever the transport read. Nothing here
//! owns a socket; the [`transport`] adapters bind an exchange to a
//! blocking or tokio stream when that is convenient.
//!
//! ## Architecture
//!
//! - **Codecs** ([`codec`], [`protocol`]): UTF-16BE and AppParameters
//!   value codecs, the four-kind header codec, the packet codec, and the
//!   accumulation buffer that reassembles packets from arbitrary reads.
//! - **State machines** ([`Client`], [`Server`]): one request outstanding
//!   per connection, multi-packet continuation, streaming put, connection
//!   id persistence, and packet-size negotiation.
//!
//! ## Example
//!
//! ```ignore
//! use obex_engine::{Action, Client, Header, header_id};
//!
//! let mut client = Client::new();
//! let (_, bytes) = client.connect(vec![])?;
//! transport.write_all(&bytes)?;
//!
//! let (action, out) = client.input(&transport_bytes)?;
//! if action == Action::Done {
//!     println!("connected, budget {}", client.max_packet_len());
//! }
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod connection;
mod server;

pub use client::{Client, SetPathOptions};
pub use connection::{Action, ConnectionInfo, State, StatusDetail};
pub use error::{ObexError, Result};
pub use protocol::header::{header_id, Header, HeaderKind, HeaderValue};
pub use protocol::opcode::{Opcode, StatusCategory};
pub use protocol::packet::Packet;
pub use server::{IdAllocator, Server};
