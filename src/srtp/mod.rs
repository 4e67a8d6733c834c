//! Secure RTP (SRTP) implementation
//!
//! This module provides encryption, authentication and replay protection
//! for RTP/RTCP packets, keyed from DTLS exported keying material or any
//! other out-of-band exchange.

pub mod auth;
pub mod context;
pub mod crypto;
pub mod key_derivation;
pub mod replay;
pub mod stream;

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::Error;
use crate::{Result, RtpSsrc};
pub use auth::SrtpAuthenticator;
pub use context::{CryptoContext, CryptoContextRegistry};
pub use key_derivation::{derive_session_key, packet_iv, KeyDerivationLabel};
pub use replay::{ReplayCheck, ReplayWindow, REPLAY_WINDOW_SIZE};
pub use stream::{Direction, StreamProtector};

/// SRTP encryption algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpEncryptionAlgorithm {
    /// AES Counter Mode (Default in SRTP)
    AesCm,

    /// Null encryption (for debugging/testing only)
    Null,
}

/// SRTP authentication algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpAuthenticationAlgorithm {
    /// HMAC-SHA1 truncated to 80 bits (Default in SRTP)
    HmacSha1_80,

    /// HMAC-SHA1 truncated to 32 bits
    HmacSha1_32,

    /// Null authentication (for debugging/testing only)
    Null,
}

/// SRTP crypto suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtpCryptoSuite {
    /// Display name
    pub name: &'static str,

    /// Encryption algorithm
    pub encryption: SrtpEncryptionAlgorithm,

    /// Authentication algorithm
    pub authentication: SrtpAuthenticationAlgorithm,

    /// Master key length in bytes
    pub key_length: usize,

    /// Session authentication key length in bytes
    pub auth_key_length: usize,

    /// Authentication tag length in bytes (truncated)
    pub tag_length: usize,

    /// Keystream prefix length for auth-prefix mode; non-zero values are
    /// rejected with `NotImplemented`
    pub prefix_length: usize,
}

/// Default SRTP crypto suite: AES-CM-128 + HMAC-SHA1-80
pub const SRTP_AES128_CM_SHA1_80: SrtpCryptoSuite = SrtpCryptoSuite {
    name: "SRTP_AES128_CM_SHA1_80",
    encryption: SrtpEncryptionAlgorithm::AesCm,
    authentication: SrtpAuthenticationAlgorithm::HmacSha1_80,
    key_length: 16,
    auth_key_length: 20,
    tag_length: 10,
    prefix_length: 0,
};

/// Smaller tag SRTP crypto suite: AES-CM-128 + HMAC-SHA1-32
pub const SRTP_AES128_CM_SHA1_32: SrtpCryptoSuite = SrtpCryptoSuite {
    name: "SRTP_AES128_CM_SHA1_32",
    encryption: SrtpEncryptionAlgorithm::AesCm,
    authentication: SrtpAuthenticationAlgorithm::HmacSha1_32,
    key_length: 16,
    auth_key_length: 20,
    tag_length: 4,
    prefix_length: 0,
};

/// Null encryption with full authentication (for testing/debugging only)
pub const SRTP_NULL_SHA1_80: SrtpCryptoSuite = SrtpCryptoSuite {
    name: "SRTP_NULL_SHA1_80",
    encryption: SrtpEncryptionAlgorithm::Null,
    authentication: SrtpAuthenticationAlgorithm::HmacSha1_80,
    key_length: 16,
    auth_key_length: 20,
    tag_length: 10,
    prefix_length: 0,
};

/// Map a DTLS use_srtp protection-profile identifier to a crypto suite
pub fn suite_for_profile(profile: u16) -> Option<SrtpCryptoSuite> {
    match profile {
        0x0001 => Some(SRTP_AES128_CM_SHA1_80),
        0x0002 => Some(SRTP_AES128_CM_SHA1_32),
        _ => None,
    }
}

/// SRTP session: a crypto-context registry plus lazily created per-stream
/// protectors.
///
/// Protectors are created on the first packet for an unseen stream
/// identifier and cached for the lifetime of the session. A lookup miss is
/// not cached: a context registered later makes the stream usable.
#[derive(Default)]
pub struct SrtpSession {
    registry: CryptoContextRegistry,
    streams: HashMap<RtpSsrc, StreamProtector>,
}

impl SrtpSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the crypto-context registry
    pub fn registry_mut(&mut self) -> &mut CryptoContextRegistry {
        &mut self.registry
    }

    fn protector(&mut self, ssrc: RtpSsrc) -> Result<&mut StreamProtector> {
        match self.streams.entry(ssrc) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let context = self
                    .registry
                    .lookup(ssrc)
                    .ok_or(Error::NoCryptoContext(ssrc))?;
                Ok(entry.insert(StreamProtector::new(ssrc, context)?))
            }
        }
    }

    /// Protect an outbound RTP packet
    pub fn protect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let ssrc = stream::rtp_ssrc(packet)?;
        self.protector(ssrc)?.protect_rtp(packet)
    }

    /// Unprotect an inbound SRTP packet
    pub fn unprotect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let ssrc = stream::rtp_ssrc(packet)?;
        self.protector(ssrc)?.unprotect_rtp(packet)
    }

    /// Protect an outbound RTCP packet
    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let ssrc = stream::rtcp_ssrc(packet)?;
        self.protector(ssrc)?.protect_rtcp(packet)
    }

    /// Unprotect an inbound SRTCP packet
    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let ssrc = stream::rtcp_ssrc(packet)?;
        self.protector(ssrc)?.unprotect_rtcp(packet)
    }
}
