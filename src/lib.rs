//! Secure media transport core: DTLS handshake and SRTP packet protection.
//!
//! This crate provides the security layer of a peer-to-peer media stack: a
//! DTLS/TLS handshake engine that derives a shared secret over a datagram or
//! stream transport, and an SRTP engine that uses exported keying material to
//! encrypt and authenticate RTP/RTCP packets with replay protection.
//!
//! The library is organized into three modules:
//!
//! - `crypto`: cipher-suite descriptors, TLS PRF/key schedule, record ciphers
//! - `dtls`: record layer, handshake messages, state-machine engine, transport glue
//! - `srtp`: key derivation, replay window, crypto contexts, stream protectors

mod error;

pub mod crypto;
pub mod dtls;
pub mod srtp;

// Re-export core types
pub use error::Error;

pub use dtls::{ProtocolVersion, TransportMode};
pub use dtls::engine::{HandshakeEngine, HandshakeConfig, HandshakeEvent, PrivateKey, RsaKeyPair};
pub use dtls::transport::{PacketTransport, SecureTransport};
pub use srtp::{SrtpSession, SrtpCryptoSuite, SRTP_AES128_CM_SHA1_80, SRTP_AES128_CM_SHA1_32};
pub use srtp::context::{CryptoContext, CryptoContextRegistry};
pub use srtp::stream::{StreamProtector, Direction};

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Result type for DTLS/SRTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Error, Result, RtpSsrc, RtpSequenceNumber,
        HandshakeEngine, HandshakeConfig, HandshakeEvent, PrivateKey,
        SrtpSession, CryptoContext, CryptoContextRegistry, StreamProtector, Direction,
        SrtpCryptoSuite, SRTP_AES128_CM_SHA1_80, SRTP_AES128_CM_SHA1_32,
    };
}
