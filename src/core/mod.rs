//! Core types and constants for the NTP client
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;

pub use self::error::{Error, Result};

/// NTP protocol version spoken by this client
pub const PROTOCOL_VERSION: u8 = 4;

/// Default port for the NTP protocol
pub const DEFAULT_PORT: u16 = 123;

/// Maximum datagram size read from the server, sufficient for every packet
/// type implemented here
pub const MAX_DATAGRAM_SIZE: usize = 960;
