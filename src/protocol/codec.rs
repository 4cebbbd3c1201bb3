use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use crate::protocol::Packet;

/// Packet codec for encoding/decoding NTP datagrams
///
/// Datagram oriented: every buffer handed to `decode` is one complete
/// datagram, so a short buffer is a malformed packet rather than a request
/// for more data.
#[derive(Clone, Default)]
pub struct PacketCodec;

impl PacketCodec {
    /// Creates a new packet codec
    pub fn new() -> Self {
        PacketCodec
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split_to(src.len());

        Packet::decode(&datagram).map(Some)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)
    }
}
