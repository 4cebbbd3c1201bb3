use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom error types for the NTP client
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {timeout:?} waiting for a response from {host}:{port}")]
    Timeout {
        /// Host the request was sent to
        host: String,
        /// Port the request was sent to
        port: u16,
        /// Encoded bytes of the request that received no response
        request: Vec<u8>,
        /// Timeout that was exceeded
        timeout: Duration,
    },

    #[error("unknown host {host}")]
    UnknownHost {
        /// Host name that failed to resolve
        host: String,
    },

    #[error("no packet decoder for mode {mode}")]
    UnknownMode {
        /// Mode field extracted from the packet header byte
        mode: u8,
    },

    #[error("unknown opcode {opcode} unpacking a control packet")]
    UnknownOpcode {
        /// Opcode field of the offending packet
        opcode: u8,
        /// Raw bytes of the offending packet, for diagnostics
        data: Vec<u8>,
    },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("incomplete packet: {0}")]
    IncompletePacket(String),

    #[error("format error: {0}")]
    Format(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed packet error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPacket(msg.into())
    }

    /// Creates a new incomplete packet error
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Error::IncompletePacket(msg.into())
    }

    /// Creates a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Creates a new unknown host error
    pub fn unknown_host(host: impl Into<String>) -> Self {
        Error::UnknownHost { host: host.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::malformed("buffer too short");
        assert!(matches!(err, Error::MalformedPacket(_)));
        assert_eq!(err.to_string(), "malformed packet: buffer too short");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            host: "pool.ntp.org".to_string(),
            port: 123,
            request: vec![0x23],
            timeout: Duration::from_secs(2),
        };
        let text = err.to_string();
        assert!(text.contains("pool.ntp.org:123"));
        assert!(text.contains("2s"));
    }
}
