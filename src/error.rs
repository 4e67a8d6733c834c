use thiserror::Error;
use std::io;

/// Error type for DTLS and SRTP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Error when decoding a record or handshake message
    #[error("Failed to decode message: {0}")]
    DecodeError(String),

    /// Invalid packet format
    #[error("Invalid packet format: {0}")]
    InvalidPacket(String),

    /// Packet or record shorter than its framing requires
    #[error("Packet too short")]
    PacketTooShort,

    /// Message type not valid for the current handshake state
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Protocol version offered by the peer is not supported
    #[error("Unsupported protocol version: {0:#06x}")]
    VersionMismatch(u16),

    /// No mutually supported cipher suite or SRTP profile
    #[error("Handshake failure: {0}")]
    HandshakeFailure(String),

    /// Peer's Finished verification data did not match the transcript
    #[error("Handshake verification failed")]
    HandshakeVerificationFailed,

    /// Authentication tag mismatch on a protected record or packet
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Hash or cipher algorithm not supported by this build
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Allocation or quota failure, retryable by the caller
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Operation invoked in a state that does not permit it
    #[error("Wrong state: {0}")]
    WrongState(String),

    /// A stream protector was driven in the opposite direction
    /// from the one fixed on first use
    #[error("Stream protector direction cannot change after first use")]
    WrongDirection,

    /// No crypto context registered for this stream identifier
    #[error("No crypto context for stream {0:#010x}")]
    NoCryptoContext(u32),

    /// An exact crypto context is already registered for this stream
    #[error("Crypto context already exists for stream {0:#010x}")]
    AlreadyExists(u32),

    /// SRTCP encryption-flag bit does not match the negotiated suite
    #[error("SRTCP e-bit does not match negotiated suite")]
    EBitMismatch,

    /// Feature is recognized but deliberately not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Packet index fell behind the replay window
    #[error("Packet index {0} is older than the replay window")]
    TooOld(u64),

    /// Packet index was already accepted
    #[error("Packet index {0} already received")]
    AlreadyReceived(u64),

    /// IO error surfaced by the transport glue
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoCryptoContext(0x1234_5678);
        assert_eq!(err.to_string(), "No crypto context for stream 0x12345678");

        let err = Error::VersionMismatch(0xfeff);
        assert_eq!(err.to_string(), "Unsupported protocol version: 0xfeff");

        let err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.to_string().contains("IO error"));
    }
}
