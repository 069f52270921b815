//! Wire-level protocol layer: registries, header codec, packet codec, and
//! the packet accumulation buffer.

pub mod header;
pub mod opcode;
pub mod packet;
pub mod packet_buffer;

pub use header::{header_id, Header, HeaderKind, HeaderValue};
pub use opcode::{categorize, response_name, Opcode, StatusCategory, FINAL_BIT};
pub use packet::{ConnectFields, Packet, SetPathFields};
pub use packet_buffer::PacketBuffer;
