//! SRTP payload cipher (AES-CM)
//!
//! AES-128 in counter mode over the per-packet IV from
//! [`super::key_derivation::packet_iv`]. Counter mode is its own inverse,
//! so encryption and decryption share one code path.

use aes::Aes128;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::Error;
use crate::Result;
use super::SrtpEncryptionAlgorithm;

type Aes128Ctr = Ctr128BE<Aes128>;

/// SRTP payload cipher for one direction of one stream
pub struct SrtpCipher {
    algorithm: SrtpEncryptionAlgorithm,
    key: Vec<u8>,
}

impl SrtpCipher {
    pub fn new(algorithm: SrtpEncryptionAlgorithm, key: Vec<u8>) -> Result<Self> {
        if algorithm == SrtpEncryptionAlgorithm::AesCm && key.len() != 16 {
            return Err(Error::UnsupportedAlgorithm(format!(
                "AES-CM requires a 128-bit session key, got {} bytes",
                key.len()
            )));
        }
        Ok(Self { algorithm, key })
    }

    /// Whether this cipher actually transforms the payload
    pub fn is_null(&self) -> bool {
        self.algorithm == SrtpEncryptionAlgorithm::Null
    }

    /// Apply the keystream to `payload` in place. Symmetric for
    /// encryption and decryption.
    pub fn apply_keystream(&self, iv: &[u8; 16], payload: &mut [u8]) -> Result<()> {
        match self.algorithm {
            SrtpEncryptionAlgorithm::Null => Ok(()),
            SrtpEncryptionAlgorithm::AesCm => {
                let mut cipher = Aes128Ctr::new(
                    self.key.as_slice().into(),
                    iv.as_slice().into(),
                );
                cipher.apply_keystream(payload);
                Ok(())
            }
        }
    }
}
