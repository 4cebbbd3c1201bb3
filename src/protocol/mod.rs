//! NTP wire protocol implementation
//!
//! This module defines the packet types, their binary codecs, and the parser
//! for textual READVAR payloads.

pub mod client_server;
pub mod codec;
pub mod control;
pub mod packet;
pub mod peer_status;
pub mod variables;

pub use self::client_server::{reference_id_description, stratum_text, ClientServerPacket};
pub use self::codec::PacketCodec;
pub use self::control::{ControlData, ControlPacket, Opcode, SystemStatus};
pub use self::packet::{decode_header, encode_header, LeapIndicator, Mode, Packet};
pub use self::peer_status::{PeerStatus, Selection};
pub use self::variables::{Value, Variables};
