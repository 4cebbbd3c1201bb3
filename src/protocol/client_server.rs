use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, PROTOCOL_VERSION};
use crate::protocol::packet::{decode_header, encode_header, LeapIndicator, Mode};
use crate::time::{
    datetime_to_timestamp, f64_to_short, short_to_f64, timestamp_to_datetime, unix_seconds,
};

/// Wire size of a client/server packet
pub const PACKET_SIZE: usize = 48;

/// An incomplete list of possible meanings of a reference id.
///
/// Values come from RFC5905 and other sources.
const REFERENCE_ID_DESCRIPTIONS: &[(&str, &str)] = &[
    ("ACTS", "NIST telephone modem"),
    ("CHU", "HF Radio CHU Ottawa, Ontario"),
    ("DCF", "LF Radio DCF77 Mainflingen, DE 77.5 kHz"),
    ("GOES", "Geostationary Orbit Environment Satellite"),
    ("GPS", "Global Position System"),
    ("GAL", "Galileo Positioning System"),
    ("HBG", "LF Radio HBG Prangins, HB 75 kHz"),
    ("IRIG", "Inter-Range Instrumentation Group"),
    ("JJY", "LF Radio JJY Fukushima, JP 40 kHz, Saga, JP 60 kHz"),
    ("LOCL", "Uncalibrated local clock"),
    ("LORC", "MF Radio LORAN C station, 100 kHz"),
    ("MSF", "LF Radio MSF Anthorn, UK 60 kHz"),
    ("NIST", "NIST telephone modem"),
    ("OMEG", "OMEGA radionavigation system"),
    ("PPS", "Generic pulse-per-second"),
    ("PTB", "European telephone modem"),
    ("TDF", "MF Radio Allouis, FR 162 kHz"),
    ("USNO", "USNO telephone modem"),
    ("WWV", "HF Radio WWV Ft. Collins, CO"),
    ("WWVB", "LF Radio WWVB Ft. Collins, CO 60 kHz"),
    ("WWVH", "HF Radio WWVH Kauai, HI"),
];

/// Server stratum in text form
pub fn stratum_text(stratum: u8) -> &'static str {
    match stratum {
        0 => "unspecified or invalid",
        1 => "primary server",
        2..=15 => "secondary server",
        16 => "unsynchronized",
        _ => "reserved",
    }
}

/// A description of `reference_id`, if one is available.
///
/// If one is not available the reference id is returned.
pub fn reference_id_description(reference_id: &str) -> &str {
    REFERENCE_ID_DESCRIPTIONS
        .iter()
        .find(|(id, _)| *id == reference_id)
        .map(|(_, description)| *description)
        .unwrap_or(reference_id)
}

/// Packet for NTP time exchange (RFC5905 mode 3/4)
///
/// The packet may be used to construct an outgoing time request or hold a
/// decoded server response. Timestamps that are zero on the wire decode as
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientServerPacket {
    /// Warning of an impending leap second
    pub leap_indicator: LeapIndicator,
    /// NTP protocol version
    pub version: u8,
    /// Packet mode
    pub mode: Mode,
    /// Server stratum
    pub stratum: u8,
    /// Maximum interval between successive messages in log2 seconds
    pub poll_interval: i8,
    /// Precision of the system clock in log2 seconds
    pub precision: i8,
    /// Total round-trip delay to the reference clock
    pub root_delay: f64,
    /// Total dispersion to the reference clock
    pub root_dispersion: f64,
    /// Identifier for a server, reference clock, or a "kiss code".
    ///
    /// For reference clock identifiers a meaning may be available from
    /// `reference_id_description`.
    pub reference_id: String,
    /// Time when the system clock was last set or corrected
    pub reference_time: Option<DateTime<Utc>>,
    /// Time at the client when the request departed for the server
    pub origin_time: Option<DateTime<Utc>>,
    /// Time at the server when the request arrived from the client
    pub receive_time: Option<DateTime<Utc>>,
    /// Time at the server when the response left for the client
    pub transmit_time: Option<DateTime<Utc>>,
    /// Time the response was received, stamped by the caller at receipt
    pub client_time_received: Option<DateTime<Utc>>,
}

impl Default for ClientServerPacket {
    fn default() -> Self {
        ClientServerPacket {
            leap_indicator: LeapIndicator::NoWarning,
            version: PROTOCOL_VERSION,
            mode: Mode::Reserved,
            stratum: 0,
            poll_interval: 0,
            precision: 0,
            root_delay: 0.0,
            root_dispersion: 0.0,
            reference_id: String::new(),
            reference_time: None,
            origin_time: None,
            receive_time: None,
            transmit_time: None,
            client_time_received: None,
        }
    }
}

impl ClientServerPacket {
    /// Creates a time request with `transmit_time` set to `now`, as sent by
    /// `Client::get`
    pub fn request(now: DateTime<Utc>) -> Self {
        ClientServerPacket {
            leap_indicator: LeapIndicator::Unsynchronized,
            mode: Mode::Client,
            transmit_time: Some(now),
            ..ClientServerPacket::default()
        }
    }

    /// Appends the 48-byte wire encoding of this packet to `dst`
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(PACKET_SIZE);
        dst.put_u8(encode_header(
            self.leap_indicator as u8,
            self.version,
            self.mode as u8,
        ));
        dst.put_u8(self.stratum);
        dst.put_i8(self.poll_interval);
        dst.put_i8(self.precision);
        dst.put_u32(f64_to_short(self.root_delay));
        dst.put_u32(f64_to_short(self.root_dispersion));
        dst.put_slice(&self.encode_reference_id()?);
        dst.put_u64(datetime_to_timestamp(self.reference_time));
        dst.put_u64(datetime_to_timestamp(self.origin_time));
        dst.put_u64(datetime_to_timestamp(self.receive_time));
        dst.put_u64(datetime_to_timestamp(self.transmit_time));

        Ok(())
    }

    /// Decodes a 48-byte client/server packet.
    ///
    /// `client_time_received` is left unset; the caller stamps it from the
    /// receipt time of the datagram.
    pub fn decode(data: &[u8]) -> Result<ClientServerPacket> {
        if data.len() < PACKET_SIZE {
            return Err(Error::malformed(format!(
                "client/server packet is {} bytes, expected {PACKET_SIZE}",
                data.len()
            )));
        }

        let mut buf = data;
        let (leap_indicator, version, mode) = decode_header(buf.get_u8());
        let stratum = buf.get_u8();
        let poll_interval = buf.get_i8();
        let precision = buf.get_i8();
        let root_delay = short_to_f64(buf.get_u32());
        let root_dispersion = short_to_f64(buf.get_u32());

        let mut reference_id = [0u8; 4];
        buf.copy_to_slice(&mut reference_id);
        let reference_id = decode_reference_id(stratum, reference_id);

        let reference_time = decode_timestamp(buf.get_u64())?;
        let origin_time = decode_timestamp(buf.get_u64())?;
        let receive_time = decode_timestamp(buf.get_u64())?;
        let transmit_time = decode_timestamp(buf.get_u64())?;

        Ok(ClientServerPacket {
            leap_indicator: LeapIndicator::from_bits(leap_indicator),
            version,
            mode: Mode::from_bits(mode),
            stratum,
            poll_interval,
            precision,
            root_delay,
            root_dispersion,
            reference_id,
            reference_time,
            origin_time,
            receive_time,
            transmit_time,
            client_time_received: None,
        })
    }

    /// The current time reported by the server
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.receive_time
    }

    /// Leap indicator in text form
    pub fn leap_indicator_text(&self) -> &'static str {
        self.leap_indicator.text()
    }

    /// Packet mode in text form
    pub fn mode_text(&self) -> &'static str {
        self.mode.text()
    }

    /// Server stratum in text form
    pub fn stratum_text(&self) -> &'static str {
        stratum_text(self.stratum)
    }

    /// A description of the reference id, if one is available
    pub fn reference_id_description(&self) -> &str {
        reference_id_description(&self.reference_id)
    }

    /// Calculates the clock offset between server and client as described in
    /// RFC5905.
    ///
    /// Note: this does not reject bogus or replay packets nor does it use
    /// maximum precision.
    pub fn offset(&self) -> Result<f64> {
        let origin = self
            .origin_time
            .ok_or_else(|| Error::incomplete("origin timestamp is not set"))?;
        let receive = self
            .receive_time
            .ok_or_else(|| Error::incomplete("receive timestamp is not set"))?;
        let transmit = self
            .transmit_time
            .ok_or_else(|| Error::incomplete("transmit timestamp is not set"))?;
        let received = self
            .client_time_received
            .ok_or_else(|| Error::incomplete("client receive time is not set"))?;

        let offset = ((unix_seconds(receive) - unix_seconds(origin))
            + (unix_seconds(transmit) - unix_seconds(received)))
            / 2.0;

        Ok(offset)
    }

    /// Encodes the reference id based on the stratum: a left-justified,
    /// zero-padded ASCII string below stratum 2, an IPv4 address otherwise
    fn encode_reference_id(&self) -> Result<[u8; 4]> {
        if self.stratum < 2 {
            let mut field = [0u8; 4];
            for (dst, src) in field.iter_mut().zip(self.reference_id.bytes()) {
                *dst = src;
            }
            Ok(field)
        } else {
            let addr: Ipv4Addr = self.reference_id.parse().map_err(|_| {
                Error::format(format!(
                    "reference id {:?} is not an IPv4 address",
                    self.reference_id
                ))
            })?;
            Ok(addr.octets())
        }
    }
}

/// Decodes the reference id `field` based on the `stratum`
fn decode_reference_id(stratum: u8, field: [u8; 4]) -> String {
    if stratum < 2 {
        // Only padding zeros come off; interior bytes are the server's
        // problem.
        let end = field.iter().rposition(|byte| *byte != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&field[..end]).into_owned()
    } else {
        format!("{}.{}.{}.{}", field[0], field[1], field[2], field[3])
    }
}

/// Decodes a wire timestamp, mapping the all-zero value to `None`
fn decode_timestamp(timestamp: u64) -> Result<Option<DateTime<Utc>>> {
    if timestamp == 0 {
        return Ok(None);
    }

    timestamp_to_datetime(timestamp).map(Some)
}
