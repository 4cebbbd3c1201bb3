//! NTP query client
//!
//! This library implements the client side of the NTP wire protocol: the
//! RFC5905 mode 3/4 time exchange and the mode-6 control protocol used to
//! inspect a running server. It can fetch the current time from a server,
//! list its peer associations, and read peer or system variables.
//!
//! ```no_run
//! use ntp_query::network::Client;
//!
//! # async fn example() -> ntp_query::Result<()> {
//! let mut client = Client::connect("pool.ntp.org", 123).await?;
//! let packet = client.get().await?;
//! println!("server time: {:?}", packet.time());
//! println!("clock offset: {} s", packet.offset()?);
//! # Ok(())
//! # }
//! ```
pub mod core;
pub mod network;
pub mod protocol;
pub mod time;

// Re-export commonly used items
pub use crate::core::{Error, Result};
pub use crate::network::Client;
pub use crate::protocol::{ClientServerPacket, ControlPacket, Packet, PeerStatus, Variables};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
