use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::Error;
use crate::Result;
use super::SrtpAuthenticationAlgorithm;

// Define type for HMAC-SHA1
type HmacSha1 = Hmac<Sha1>;

/// SRTP Authentication Handler
pub struct SrtpAuthenticator {
    /// Authentication algorithm
    algorithm: SrtpAuthenticationAlgorithm,

    /// Authentication key
    auth_key: Vec<u8>,

    /// Authentication tag length in bytes
    tag_length: usize,
}

impl SrtpAuthenticator {
    /// Create a new SRTP authenticator
    pub fn new(
        algorithm: SrtpAuthenticationAlgorithm,
        auth_key: Vec<u8>,
        tag_length: usize,
    ) -> Self {
        Self {
            algorithm,
            auth_key,
            tag_length,
        }
    }

    /// Calculate the authentication tag over packet bytes, with the
    /// rollover counter appended for RTP (`roc = None` for RTCP, whose
    /// index is already part of the authenticated bytes).
    pub fn calculate_auth_tag(&self, packet_data: &[u8], roc: Option<u32>) -> Result<Vec<u8>> {
        if self.algorithm == SrtpAuthenticationAlgorithm::Null {
            return Ok(Vec::new());
        }

        let mut mac = HmacSha1::new_from_slice(&self.auth_key)
            .map_err(|_| Error::UnsupportedAlgorithm("HMAC-SHA1 key".to_string()))?;
        mac.update(packet_data);
        if let Some(roc) = roc {
            mac.update(&roc.to_be_bytes());
        }

        let result = mac.finalize().into_bytes();
        Ok(result.as_slice()[..self.tag_length].to_vec())
    }

    /// Verify an authentication tag with a constant-effort comparison
    pub fn verify_auth_tag(&self, packet_data: &[u8], tag: &[u8], roc: Option<u32>) -> Result<()> {
        if self.algorithm == SrtpAuthenticationAlgorithm::Null {
            return Ok(());
        }

        if tag.len() != self.tag_length {
            return Err(Error::AuthenticationFailed);
        }

        let expected = self.calculate_auth_tag(packet_data, roc)?;
        if !crate::crypto::cipher::constant_time_eq(&expected, tag) {
            return Err(Error::AuthenticationFailed);
        }
        Ok(())
    }

    /// Get the authentication tag length
    pub fn tag_length(&self) -> usize {
        self.tag_length
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.algorithm != SrtpAuthenticationAlgorithm::Null
    }
}
