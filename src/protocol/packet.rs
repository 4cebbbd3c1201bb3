use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::protocol::{ClientServerPacket, ControlPacket};

/// Warning of an impending leap second, packed into the top two bits of the
/// first header byte
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeapIndicator {
    /// No leap second warning
    #[default]
    NoWarning = 0,
    /// Last minute of the day has 61 seconds
    AddSecond = 1,
    /// Last minute of the day has 59 seconds
    SubSecond = 2,
    /// Clock unsynchronized
    Unsynchronized = 3,
}

impl LeapIndicator {
    /// Decodes a leap indicator from the low two bits of `bits`
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => LeapIndicator::NoWarning,
            1 => LeapIndicator::AddSecond,
            2 => LeapIndicator::SubSecond,
            _ => LeapIndicator::Unsynchronized,
        }
    }

    /// Human-readable meaning of this leap indicator
    pub fn text(&self) -> &'static str {
        match self {
            LeapIndicator::NoWarning => "no warning",
            LeapIndicator::AddSecond => "last minute has 61 seconds",
            LeapIndicator::SubSecond => "last minute has 59 seconds",
            LeapIndicator::Unsynchronized => "unknown (clock unsynchronized)",
        }
    }
}

/// Association mode, packed into the low three bits of the first header byte
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Reserved (value 0)
    #[default]
    Reserved = 0,
    /// Symmetric active (value 1)
    SymmetricActive = 1,
    /// Symmetric passive (value 2)
    SymmetricPassive = 2,
    /// Client request (value 3)
    Client = 3,
    /// Server response (value 4)
    Server = 4,
    /// Broadcast (value 5)
    Broadcast = 5,
    /// NTP control message (value 6)
    Control = 6,
    /// Reserved for private use (value 7)
    Private = 7,
}

impl Mode {
    /// Decodes a mode from the low three bits of `bits`
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Mode::Reserved,
            1 => Mode::SymmetricActive,
            2 => Mode::SymmetricPassive,
            3 => Mode::Client,
            4 => Mode::Server,
            5 => Mode::Broadcast,
            6 => Mode::Control,
            _ => Mode::Private,
        }
    }

    /// Human-readable meaning of this mode
    pub fn text(&self) -> &'static str {
        match self {
            Mode::Reserved => "reserved",
            Mode::SymmetricActive => "symmetric active",
            Mode::SymmetricPassive => "symmetric passive",
            Mode::Client => "client",
            Mode::Server => "server",
            Mode::Broadcast => "broadcast",
            Mode::Control => "reserved for NTP control message",
            Mode::Private => "reserved for private use",
        }
    }
}

/// Packs the leap indicator, version, and mode flags into the first byte of
/// an NTP packet
///
/// Each field is masked to its bit width before shifting; out-of-range inputs
/// are truncated rather than rejected, matching the wire format's bit
/// allocation.
pub fn encode_header(leap_indicator: u8, version: u8, mode: u8) -> u8 {
    ((leap_indicator & 0b11) << 6) | ((version & 0b111) << 3) | (mode & 0b111)
}

/// Unpacks the leap indicator, version, and mode flags from the first byte of
/// an NTP packet
pub fn decode_header(byte: u8) -> (u8, u8, u8) {
    let leap_indicator = (byte & 0xc0) >> 6;
    let version = (byte & 0x38) >> 3;
    let mode = byte & 0x07;

    (leap_indicator, version, mode)
}

/// A decoded NTP packet, one variant per concrete packet type
///
/// Decoding dispatches on the mode field of the first header byte. Modes with
/// no corresponding packet type fail with `Error::UnknownMode`.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client request or server response (mode 3/4)
    ClientServer(ClientServerPacket),
    /// Control protocol request or response (mode 6)
    Control(ControlPacket),
}

impl Packet {
    /// Decodes a raw datagram into the packet type registered for its mode
    pub fn decode(data: &[u8]) -> Result<Packet> {
        let first = *data
            .first()
            .ok_or_else(|| Error::malformed("empty datagram"))?;
        let (_, _, mode) = decode_header(first);

        match mode {
            3 | 4 => Ok(Packet::ClientServer(ClientServerPacket::decode(data)?)),
            6 => Ok(Packet::Control(ControlPacket::decode(data)?)),
            mode => Err(Error::UnknownMode { mode }),
        }
    }

    /// Appends the wire encoding of this packet to `dst`
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Packet::ClientServer(packet) => packet.encode(dst),
            Packet::Control(packet) => {
                packet.encode(dst);
                Ok(())
            }
        }
    }
}
