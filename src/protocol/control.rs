use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, PROTOCOL_VERSION};
use crate::protocol::packet::{decode_header, encode_header, LeapIndicator, Mode};
use crate::protocol::peer_status::PeerStatus;

/// Wire size of the fixed control packet header
pub const HEADER_SIZE: usize = 12;

/// Control protocol operation codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Read peer status words for all associations
    Readstat = 1,
    /// Read peer or system variables
    Readvar = 2,
    /// Write variables
    Writevar = 3,
    /// Read clock variables
    Readclock = 4,
    /// Write clock variables
    Writeclock = 5,
    /// Set trap address
    Settrap = 6,
    /// Asynchronous message
    Asyncmsg = 7,
    /// Runtime configuration
    Configure = 8,
    /// Save runtime configuration
    Saveconfig = 9,
    /// Retrieve MRU list
    ReadMru = 10,
    /// Retrieve ordered list
    ReadOrdlist = 11,
    /// Request a client nonce
    ReqNonce = 12,
    /// Unset trap address
    Unsettrap = 31,
}

impl Opcode {
    /// Name of this opcode as used by the reference implementation
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Readstat => "READSTAT",
            Opcode::Readvar => "READVAR",
            Opcode::Writevar => "WRITEVAR",
            Opcode::Readclock => "READCLOCK",
            Opcode::Writeclock => "WRITECLOCK",
            Opcode::Settrap => "SETTRAP",
            Opcode::Asyncmsg => "ASYNCMSG",
            Opcode::Configure => "CONFIGURE",
            Opcode::Saveconfig => "SAVECONFIG",
            Opcode::ReadMru => "READ_MRU",
            Opcode::ReadOrdlist => "READ_ORDLIST",
            Opcode::ReqNonce => "REQ_NONCE",
            Opcode::Unsettrap => "UNSETTRAP",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, ()> {
        match value {
            1 => Ok(Opcode::Readstat),
            2 => Ok(Opcode::Readvar),
            3 => Ok(Opcode::Writevar),
            4 => Ok(Opcode::Readclock),
            5 => Ok(Opcode::Writeclock),
            6 => Ok(Opcode::Settrap),
            7 => Ok(Opcode::Asyncmsg),
            8 => Ok(Opcode::Configure),
            9 => Ok(Opcode::Saveconfig),
            10 => Ok(Opcode::ReadMru),
            11 => Ok(Opcode::ReadOrdlist),
            12 => Ok(Opcode::ReqNonce),
            31 => Ok(Opcode::Unsettrap),
            _ => Err(()),
        }
    }
}

/// System status word carried in control protocol responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Leap indicator reported by the server
    pub leap_indicator: u8,
    /// Source of the server clock
    pub clock_source: u8,
    /// System event counter
    pub event_counter: u8,
    /// Code of the most recent system event
    pub event_code: u8,
}

impl SystemStatus {
    /// Extracts the status fields from the 16-bit status `word`
    pub fn decode(word: u16) -> SystemStatus {
        SystemStatus {
            leap_indicator: (word >> 12) as u8,
            clock_source: ((word >> 8) & 0b11_1111) as u8,
            event_counter: ((word >> 4) & 0b1111) as u8,
            event_code: (word & 0b1111) as u8,
        }
    }
}

/// Opcode-specific payload of a control packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlData {
    /// No payload
    None,
    /// Raw request payload bytes
    Raw(Vec<u8>),
    /// Peer status words from a READSTAT response
    PeerStatuses(Vec<PeerStatus>),
    /// Text fragment from a READVAR response
    Text(String),
}

impl ControlData {
    fn to_wire(&self) -> Vec<u8> {
        match self {
            ControlData::None => Vec::new(),
            ControlData::Raw(bytes) => bytes.clone(),
            ControlData::PeerStatuses(peers) => {
                let mut bytes = Vec::with_capacity(peers.len() * 4);
                for peer in peers {
                    bytes.extend_from_slice(&peer.association_id.to_be_bytes());
                    bytes.extend_from_slice(&encode_peer_word(peer).to_be_bytes());
                }
                bytes
            }
            ControlData::Text(text) => text.as_bytes().to_vec(),
        }
    }
}

fn encode_peer_word(peer: &PeerStatus) -> u16 {
    ((peer.configured as u16) << 15)
        | ((peer.authenable as u16) << 14)
        | ((peer.authentic as u16) << 13)
        | ((peer.reach as u16) << 12)
        | (((peer.reserved & 0b1) as u16) << 11)
        | (((peer.selection as u16) & 0b111) << 8)
        | (((peer.event_count & 0b1111) as u16) << 4)
        | ((peer.event_code & 0b1111) as u16)
}

/// Packet for querying an NTP server over the mode-6 control protocol
///
/// A logical response may span several physical packets; each carries its
/// fragment of the payload at `offset` with the `more` flag set on all but
/// the last.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPacket {
    /// Warning of an impending leap second
    pub leap_indicator: LeapIndicator,
    /// NTP protocol version
    pub version: u8,
    /// Packet mode, always `Mode::Control` for packets built here
    pub mode: Mode,
    /// True if this is a request packet
    pub request: bool,
    /// True if there was an error in this response
    pub error: bool,
    /// True if another packet follows in this logical response
    pub more: bool,
    /// Operation code
    pub opcode: Opcode,
    /// Sequence number of this packet
    pub sequence: u16,
    /// System status word, only populated on responses
    pub status: Option<SystemStatus>,
    /// Association id to request data for, 0 for system-wide queries
    pub association_id: u16,
    /// Byte offset of this fragment's payload within the logical response
    pub offset: u16,
    /// Byte length of this fragment's payload
    pub count: u16,
    /// Opcode-specific payload
    pub data: ControlData,
}

impl ControlPacket {
    /// Creates a request packet for `opcode`.
    ///
    /// Request packets always clear the error and more flags.
    pub fn request(opcode: Opcode) -> ControlPacket {
        ControlPacket {
            leap_indicator: LeapIndicator::NoWarning,
            version: PROTOCOL_VERSION,
            mode: Mode::Control,
            request: true,
            error: false,
            more: false,
            opcode,
            sequence: 0,
            status: None,
            association_id: 0,
            offset: 0,
            count: 0,
            data: ControlData::None,
        }
    }

    /// Appends the wire encoding of this packet to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let payload = self.data.to_wire();

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u8(encode_header(
            self.leap_indicator as u8,
            self.version,
            self.mode as u8,
        ));
        dst.put_u8(self.encode_response_error_more_opcode());
        dst.put_u16(self.sequence);
        dst.put_u16(self.status.map(encode_status).unwrap_or(0));
        dst.put_u16(self.association_id);
        dst.put_u16(self.offset);
        dst.put_u16(payload.len() as u16);
        dst.put_slice(&payload);
    }

    /// Decodes a control packet, interpreting the payload according to the
    /// opcode.
    ///
    /// Only READSTAT and READVAR payloads are understood; any other opcode
    /// fails with `Error::UnknownOpcode` carrying the raw packet bytes.
    pub fn decode(data: &[u8]) -> Result<ControlPacket> {
        if data.len() < HEADER_SIZE {
            return Err(Error::malformed(format!(
                "control packet is {} bytes, the header alone is {HEADER_SIZE}",
                data.len()
            )));
        }

        let mut buf = data;
        let (leap_indicator, version, mode) = decode_header(buf.get_u8());
        let (request, error, more, opcode) = decode_response_error_more_opcode(buf.get_u8());
        let sequence = buf.get_u16();
        let status_word = buf.get_u16();
        let association_id = buf.get_u16();
        let offset = buf.get_u16();
        let count = buf.get_u16();

        let end = HEADER_SIZE + count as usize;
        if data.len() < end {
            return Err(Error::malformed(format!(
                "control packet payload is truncated: count is {count} but only {} bytes follow \
                 the header",
                data.len() - HEADER_SIZE
            )));
        }
        let payload = &data[HEADER_SIZE..end];

        let opcode = Opcode::try_from(opcode).map_err(|_| Error::UnknownOpcode {
            opcode,
            data: data.to_vec(),
        })?;

        let payload = match opcode {
            Opcode::Readstat => ControlData::PeerStatuses(decode_peer_statuses(payload)),
            Opcode::Readvar => {
                ControlData::Text(String::from_utf8_lossy(payload).into_owned())
            }
            _ => {
                return Err(Error::UnknownOpcode {
                    opcode: opcode as u8,
                    data: data.to_vec(),
                })
            }
        };

        Ok(ControlPacket {
            leap_indicator: LeapIndicator::from_bits(leap_indicator),
            version,
            mode: Mode::from_bits(mode),
            request,
            error,
            more,
            opcode,
            sequence,
            status: (!request).then(|| SystemStatus::decode(status_word)),
            association_id,
            offset,
            count,
            data: payload,
        })
    }

    /// Packs the response, error, more, and opcode fields into the second
    /// header byte
    fn encode_response_error_more_opcode(&self) -> u8 {
        let response = if self.request { 0 } else { 1 << 7 };
        let error = if self.error { 1 << 6 } else { 0 };
        let more = if self.more { 1 << 5 } else { 0 };

        response | error | more | (self.opcode as u8 & 0b1_1111)
    }
}

fn encode_status(status: SystemStatus) -> u16 {
    ((status.leap_indicator as u16) << 12)
        | (((status.clock_source & 0b11_1111) as u16) << 8)
        | (((status.event_counter & 0b1111) as u16) << 4)
        | ((status.event_code & 0b1111) as u16)
}

/// Unpacks the response, error, and more bits and the opcode from the second
/// header byte
fn decode_response_error_more_opcode(byte: u8) -> (bool, bool, bool, u8) {
    let request = byte & 0b1000_0000 == 0;
    let error = byte & 0b0100_0000 != 0;
    let more = byte & 0b0010_0000 != 0;
    let opcode = byte & 0b0001_1111;

    (request, error, more, opcode)
}

/// Decodes a READSTAT payload as (association id, status word) pairs
fn decode_peer_statuses(payload: &[u8]) -> Vec<PeerStatus> {
    payload
        .chunks_exact(4)
        .map(|pair| {
            let association_id = u16::from_be_bytes([pair[0], pair[1]]);
            let word = u16::from_be_bytes([pair[2], pair[3]]);
            PeerStatus::decode(association_id, word)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::peer_status::Selection;

    fn response_bytes(
        opcode: u8,
        more: bool,
        sequence: u16,
        status: u16,
        association_id: u16,
        offset: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut bytes = vec![0x26, 0x80 | if more { 0x20 } else { 0 } | opcode];
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes.extend_from_slice(&status.to_be_bytes());
        bytes.extend_from_slice(&association_id.to_be_bytes());
        bytes.extend_from_slice(&offset.to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_encode_readstat_request() {
        let packet = ControlPacket::request(Opcode::Readstat);

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        let expected = [0x26, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(&expected[..], &encoded[..]);
    }

    #[test]
    fn test_encode_request_with_payload() {
        let mut packet = ControlPacket::request(Opcode::Readvar);
        packet.sequence = 2;
        packet.association_id = 0x892a;
        packet.data = ControlData::Raw(b"leap".to_vec());

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(HEADER_SIZE + 4, encoded.len());
        assert_eq!(4, u16::from_be_bytes([encoded[10], encoded[11]]));
        assert_eq!(b"leap", &encoded[12..]);
    }

    #[test]
    fn test_decode_readstat_response() {
        let payload: Vec<u8> = [
            (0x892au16, 0x163au16),
            (0x8929, 0x143a),
            (0x8928, 0x1314),
            (0x8927, 0x1414),
            (0x8926, 0x9314),
            (0x8925, 0x9314),
            (0x8924, 0x8811),
        ]
        .iter()
        .flat_map(|(id, word)| {
            let mut pair = id.to_be_bytes().to_vec();
            pair.extend_from_slice(&word.to_be_bytes());
            pair
        })
        .collect();

        let bytes = response_bytes(1, false, 1, 0x0615, 0, 0, &payload);
        let packet = ControlPacket::decode(&bytes).unwrap();

        assert!(!packet.request);
        assert!(!packet.error);
        assert!(!packet.more);
        assert_eq!(Opcode::Readstat, packet.opcode);
        assert_eq!(1, packet.sequence);
        assert_eq!(0, packet.association_id);
        assert_eq!(0, packet.offset);
        assert_eq!(28, packet.count);

        let status = packet.status.unwrap();
        assert_eq!(0, status.leap_indicator);
        assert_eq!(6, status.clock_source);
        assert_eq!(1, status.event_counter);
        assert_eq!(5, status.event_code);

        let ControlData::PeerStatuses(peers) = packet.data else {
            panic!("expected peer statuses");
        };
        assert_eq!(7, peers.len());
        assert_eq!(Selection::SystemPeer, peers[0].selection);
        assert_eq!(3, peers[0].event_count);
        assert_eq!(10, peers[0].event_code);
    }

    #[test]
    fn test_decode_readvar_response() {
        let text = b"filtdisp= 0.00 1.94 3.96 5.90\r\n";
        let bytes = response_bytes(2, true, 3, 0, 0x3bb2, 468, text);

        let packet = ControlPacket::decode(&bytes).unwrap();

        assert!(!packet.request);
        assert!(packet.more);
        assert_eq!(Opcode::Readvar, packet.opcode);
        assert_eq!(0x3bb2, packet.association_id);
        assert_eq!(468, packet.offset);
        assert_eq!(text.len() as u16, packet.count);
        assert_eq!(
            ControlData::Text("filtdisp= 0.00 1.94 3.96 5.90\r\n".to_string()),
            packet.data
        );
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let bytes = response_bytes(15, false, 1, 0, 0, 0, b"");

        let err = ControlPacket::decode(&bytes).unwrap_err();

        let Error::UnknownOpcode { opcode, data } = err else {
            panic!("expected UnknownOpcode");
        };
        assert_eq!(15, opcode);
        assert_eq!(bytes, data);
    }

    #[test]
    fn test_decode_known_but_unhandled_opcode() {
        // UNSETTRAP is a valid opcode but its payload has no decoder.
        let bytes = response_bytes(31, false, 1, 0, 0, 0, b"");

        let err = ControlPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownOpcode { opcode: 31, .. }));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            ControlPacket::decode(&[]).unwrap_err(),
            Error::MalformedPacket(_)
        ));
        assert!(matches!(
            ControlPacket::decode(&[0x26; 11]).unwrap_err(),
            Error::MalformedPacket(_)
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        // count claims 10 bytes but only 4 follow.
        let mut bytes = response_bytes(2, false, 1, 0, 0, 0, b"leap");
        bytes[11] = 10;

        let err = ControlPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn test_response_error_more_opcode_bits() {
        assert_eq!((false, true, true, 31), decode_response_error_more_opcode(0xff));
        assert_eq!((true, false, false, 1), decode_response_error_more_opcode(0x01));
    }

    #[test]
    fn test_readstat_round_trip() {
        let peers = vec![
            PeerStatus::decode(0x892a, 0x963a),
            PeerStatus::decode(0x8929, 0x143a),
        ];
        let mut packet = ControlPacket::request(Opcode::Readstat);
        packet.request = false;
        packet.status = Some(SystemStatus::decode(0x0615));
        packet.data = ControlData::PeerStatuses(peers.clone());

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        let decoded = ControlPacket::decode(&encoded).unwrap();
        assert_eq!(ControlData::PeerStatuses(peers), decoded.data);
        assert_eq!(8, decoded.count);
    }
}
