//! UDP transport and query client
//!
//! One datagram carries one packet in each direction; there is no framing
//! beyond the datagram boundary and no retransmission.

pub mod client;

pub use self::client::Client;
