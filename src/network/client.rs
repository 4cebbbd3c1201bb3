use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::core::{Error, Result, MAX_DATAGRAM_SIZE};
use crate::protocol::{
    ClientServerPacket, ControlData, ControlPacket, Opcode, Packet, PacketCodec, PeerStatus,
    Variables,
};

/// NTP query client
///
/// Owns a connected UDP socket and drives the request/response exchanges of
/// both the time protocol and the mode-6 control protocol. Exactly one
/// round-trip is in flight at a time; a timeout or decode failure mid-exchange
/// surfaces immediately and discards any partially accumulated response.
pub struct Client {
    /// Host this client queries
    host: String,
    /// Port this client queries
    port: u16,
    /// Timeout for reading a response to a packet
    timeout: Duration,
    /// Sequence number for control packet requests
    sequence: u16,
    /// Connected UDP socket
    socket: UdpSocket,
    /// Packet codec
    codec: PacketCodec,
    /// Encoded bytes of the most recently sent request, kept for timeout
    /// error context
    last_request: Vec<u8>,
}

impl Client {
    /// Default timeout when waiting for responses to packets
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Creates a new client connected to `host`:`port`.
    ///
    /// Host names are resolved through the system resolver; a name that does
    /// not resolve fails with `Error::UnknownHost`.
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Client> {
        let host = host.into();
        let addr = resolve(&host).await?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(SocketAddr::new(addr, port)).await?;

        Ok(Client {
            host,
            port,
            timeout: Client::DEFAULT_TIMEOUT,
            sequence: 1,
            socket,
            codec: PacketCodec::new(),
            last_request: Vec::new(),
        })
    }

    /// Sets the timeout for reading a response to a packet
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Host this client queries
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port this client queries
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queries the server for the current time.
    ///
    /// The current time of the remote server is in the returned packet's
    /// `time()`.
    pub async fn get(&mut self) -> Result<ClientServerPacket> {
        let request = ClientServerPacket::request(Utc::now());
        self.write(Packet::ClientServer(request)).await?;

        let (packet, received) = self.read().await?;
        match packet {
            Packet::ClientServer(mut packet) => {
                packet.client_time_received = Some(received);
                Ok(packet)
            }
            Packet::Control(_) => Err(Error::malformed(
                "expected a client/server packet, received a control packet",
            )),
        }
    }

    /// Reads peer statistics for all associations
    pub async fn readstat(&mut self) -> Result<Vec<PeerStatus>> {
        let responses = self.control_exchange(Opcode::Readstat, 0).await?;

        let mut peers = Vec::new();
        for response in responses {
            match response.data {
                ControlData::PeerStatuses(fragment) => peers.extend(fragment),
                other => {
                    return Err(Error::malformed(format!(
                        "expected peer statuses in a READSTAT response, received {other:?}"
                    )))
                }
            }
        }

        Ok(peers)
    }

    /// Reads the peer variables of `association_id`, or the system variables
    /// when it is 0
    pub async fn readvar(&mut self, association_id: u16) -> Result<Variables> {
        let responses = self.control_exchange(Opcode::Readvar, association_id).await?;

        let mut text = String::new();
        for response in &responses {
            match &response.data {
                ControlData::Text(fragment) => text.push_str(fragment),
                other => {
                    return Err(Error::malformed(format!(
                        "expected text in a READVAR response, received {other:?}"
                    )))
                }
            }
        }

        Variables::parse(&text)
    }

    /// Sends one control request and reads response packets until the last
    /// one's `more` flag is clear.
    ///
    /// Fragments are accumulated in arrival order; see the crate design notes
    /// for the ordering assumption this makes.
    async fn control_exchange(
        &mut self,
        opcode: Opcode,
        association_id: u16,
    ) -> Result<Vec<ControlPacket>> {
        let mut request = ControlPacket::request(opcode);
        request.sequence = self.sequence;
        request.association_id = association_id;

        self.write(Packet::Control(request)).await?;

        let mut responses = Vec::new();
        loop {
            let (packet, _) = self.read().await?;
            let Packet::Control(response) = packet else {
                return Err(Error::malformed(
                    "expected a control packet, received a client/server packet",
                ));
            };

            trace!(
                opcode = response.opcode.name(),
                offset = response.offset,
                count = response.count,
                more = response.more,
                "received control fragment"
            );

            let more = response.more;
            responses.push(response);

            if !more {
                break;
            }
        }

        Ok(responses)
    }

    /// Writes `packet` to the server, advancing the sequence counter
    async fn write(&mut self, packet: Packet) -> Result<()> {
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = BytesMut::new();
        self.codec.encode(packet, &mut buf)?;

        debug!(
            host = %self.host,
            port = self.port,
            bytes = buf.len(),
            "sending request"
        );

        self.socket.send(&buf).await?;
        self.last_request = buf.to_vec();

        Ok(())
    }

    /// Reads one packet from the server, stamping the wall-clock time of
    /// receipt.
    ///
    /// A timeout surfaces as `Error::Timeout` carrying the request that went
    /// unanswered; it is never retried here.
    async fn read(&mut self) -> Result<(Packet, DateTime<Utc>)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let len = tokio::time::timeout(self.timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Timeout {
                host: self.host.clone(),
                port: self.port,
                request: self.last_request.clone(),
                timeout: self.timeout,
            })??;
        let received = Utc::now();

        let mut datagram = BytesMut::from(&buf[..len]);
        let packet = self
            .codec
            .decode(&mut datagram)?
            .ok_or_else(|| Error::malformed("empty datagram"))?;

        Ok((packet, received))
    }
}

/// Resolves `host` to an IP address at the transport boundary
async fn resolve(host: &str) -> Result<IpAddr> {
    if let Ok(addr) = host.parse() {
        return Ok(addr);
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|_| Error::unknown_host(host))?;

    lookup
        .iter()
        .next()
        .ok_or_else(|| Error::unknown_host(host))
}
