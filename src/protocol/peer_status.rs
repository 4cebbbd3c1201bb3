use serde::{Deserialize, Serialize};

/// Peer selection status, bits 10-8 of the peer status word
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selection {
    /// Discarded as not valid
    Reject = 0,
    /// Discarded by the intersection algorithm
    FalseTicker = 1,
    /// Discarded as not among the first survivors
    Excess = 2,
    /// Discarded by the cluster algorithm
    Outlier = 3,
    /// Included by the combine algorithm
    Candidate = 4,
    /// Backup source
    Backup = 5,
    /// System peer
    SystemPeer = 6,
    /// PPS peer
    PpsPeer = 7,
}

impl Selection {
    /// Decodes a selection status from the low three bits of `bits`
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Selection::Reject,
            1 => Selection::FalseTicker,
            2 => Selection::Excess,
            3 => Selection::Outlier,
            4 => Selection::Candidate,
            5 => Selection::Backup,
            6 => Selection::SystemPeer,
            _ => Selection::PpsPeer,
        }
    }

    /// Human-readable selection status
    pub fn text(&self) -> &'static str {
        match self {
            Selection::Reject => "reject",
            Selection::FalseTicker => "false ticker",
            Selection::Excess => "excess",
            Selection::Outlier => "outlier",
            Selection::Candidate => "candidate",
            Selection::Backup => "backup",
            Selection::SystemPeer => "system peer",
            Selection::PpsPeer => "pps peer",
        }
    }

    /// Single-character tally glyph used by peer displays
    pub fn tally(&self) -> char {
        match self {
            Selection::Reject => ' ',
            Selection::FalseTicker => 'x',
            Selection::Excess => '.',
            Selection::Outlier => '-',
            Selection::Candidate => '+',
            Selection::Backup => '#',
            Selection::SystemPeer => '*',
            Selection::PpsPeer => 'o',
        }
    }
}

/// Status fields for one NTP peer association, decoded from the 16-bit peer
/// status word of a READSTAT response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Peer association id
    pub association_id: u16,
    /// True if the peer is configured
    pub configured: bool,
    /// True if authentication is enabled
    pub authenable: bool,
    /// True if the peer authentication is ok
    pub authentic: bool,
    /// True if the peer is reachable
    pub reach: bool,
    /// Value of the reserved bit, kept as received
    pub reserved: u8,
    /// Peer selection status
    pub selection: Selection,
    /// Peer event count
    pub event_count: u8,
    /// Peer event code
    pub event_code: u8,
}

impl PeerStatus {
    /// Extracts peer status fields from the status `word` for
    /// `association_id`.
    ///
    /// No validation is performed; any bit pattern is accepted and stored
    /// verbatim.
    pub fn decode(association_id: u16, word: u16) -> PeerStatus {
        PeerStatus {
            association_id,
            configured: word >> 15 == 1,
            authenable: (word >> 14) & 0b1 == 1,
            authentic: (word >> 13) & 0b1 == 1,
            reach: (word >> 12) & 0b1 == 1,
            reserved: ((word >> 11) & 0b1) as u8,
            selection: Selection::from_bits(((word >> 8) & 0b111) as u8),
            event_count: ((word >> 4) & 0b1111) as u8,
            event_code: (word & 0b1111) as u8,
        }
    }

    /// Human-readable peer event, if the event code has a known meaning
    pub fn event_code_text(&self) -> Option<&'static str> {
        match self.event_code {
            1 => Some("peer IP error"),
            4 => Some("peer reachable"),
            _ => None,
        }
    }
}
