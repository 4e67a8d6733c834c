//! DTLS/TLS handshake and record layer
//!
//! Server-side handshake engine for DTLS 1.0/1.2 over datagrams and
//! TLS 1.0-1.2 over a byte stream, following RFC 6347 (DTLS) and RFC 5764
//! (DTLS-SRTP). Both transports share one record layer and one state
//! machine; only the record framing and handshake headers differ.

pub mod alert;
pub mod engine;
pub mod message;
pub mod record;
pub mod transport;

pub use alert::{Alert, AlertDescription, AlertLevel};

use crate::error::Error;
use crate::Result;

/// Protocol version negotiated for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// TLS 1.0
    Tls10,

    /// TLS 1.1
    Tls11,

    /// TLS 1.2
    Tls12,

    /// DTLS 1.0 (equivalent to TLS 1.1)
    Dtls10,

    /// DTLS 1.2 (equivalent to TLS 1.2)
    Dtls12,
}

impl ProtocolVersion {
    /// Wire encoding of the version field
    pub fn wire(&self) -> u16 {
        match self {
            ProtocolVersion::Tls10 => 0x0301,
            ProtocolVersion::Tls11 => 0x0302,
            ProtocolVersion::Tls12 => 0x0303,
            ProtocolVersion::Dtls10 => 0xFEFF,
            ProtocolVersion::Dtls12 => 0xFEFD,
        }
    }

    /// Decode a wire version field
    pub fn from_wire(value: u16) -> Result<Self> {
        match value {
            0x0301 => Ok(ProtocolVersion::Tls10),
            0x0302 => Ok(ProtocolVersion::Tls11),
            0x0303 => Ok(ProtocolVersion::Tls12),
            0xFEFF => Ok(ProtocolVersion::Dtls10),
            0xFEFD => Ok(ProtocolVersion::Dtls12),
            other => Err(Error::VersionMismatch(other)),
        }
    }

    /// Whether this version runs over an unreliable datagram transport
    pub fn is_datagram(&self) -> bool {
        matches!(self, ProtocolVersion::Dtls10 | ProtocolVersion::Dtls12)
    }

    pub fn transport_mode(&self) -> TransportMode {
        if self.is_datagram() {
            TransportMode::Datagram
        } else {
            TransportMode::Stream
        }
    }
}

/// Record framing style for the session's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// DTLS framing: records carry an explicit epoch and sequence number
    Datagram,

    /// TLS framing: records are length-delimited on a reliable stream
    Stream,
}
