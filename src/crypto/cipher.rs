//! Record-layer bulk ciphers and MAC
//!
//! TLS 1.2 MAC-then-encrypt: the record MAC is computed over the sequence
//! number and plaintext record, appended, padded, and the whole fragment is
//! CBC-encrypted under an explicit per-record IV. Decryption reverses the
//! steps and verifies the MAC with a constant-effort comparison before the
//! plaintext is interpreted.

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::Error;
use crate::Result;
use super::suites::{BulkCipher, CipherSuite, HashAlgorithm};

const AES_BLOCK: usize = 16;

/// Record MAC keyed for one direction
#[derive(Clone)]
pub struct RecordMac {
    algorithm: HashAlgorithm,
    key: Vec<u8>,
}

impl RecordMac {
    pub fn new(algorithm: HashAlgorithm, key: Vec<u8>) -> Self {
        Self { algorithm, key }
    }

    /// MAC over seq_num || type || version || length || fragment
    pub fn compute(
        &self,
        seq: u64,
        content_type: u8,
        version: u16,
        fragment: &[u8],
    ) -> Result<Vec<u8>> {
        let mut header = [0u8; 13];
        header[..8].copy_from_slice(&seq.to_be_bytes());
        header[8] = content_type;
        header[9..11].copy_from_slice(&version.to_be_bytes());
        header[11..13].copy_from_slice(&(fragment.len() as u16).to_be_bytes());

        match self.algorithm {
            // Fully qualified: `aes::cipher::KeyInit` is also in scope and
            // supplies a colliding `new_from_slice`.
            HashAlgorithm::Sha1 => {
                let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(&self.key)
                    .map_err(|_| Error::UnsupportedAlgorithm("HMAC key".to_string()))?;
                mac.update(&header);
                mac.update(fragment);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha256 => {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.key)
                    .map_err(|_| Error::UnsupportedAlgorithm("HMAC key".to_string()))?;
                mac.update(&header);
                mac.update(fragment);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Md5 => Err(Error::UnsupportedAlgorithm("MD5 record MAC".to_string())),
        }
    }
}

/// Constant-effort byte comparison; accumulates differences instead of
/// returning early
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn cbc_encrypt(key: &[u8], iv: &[u8; AES_BLOCK], data: &mut [u8]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = *iv;
    for block in data.chunks_exact_mut(AES_BLOCK) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        let ga = GenericArray::from_mut_slice(block);
        cipher.encrypt_block(ga);
        prev.copy_from_slice(block);
    }
}

fn cbc_decrypt(key: &[u8], iv: &[u8; AES_BLOCK], data: &mut [u8]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = *iv;
    for block in data.chunks_exact_mut(AES_BLOCK) {
        let mut saved = [0u8; AES_BLOCK];
        saved.copy_from_slice(block);
        let ga = GenericArray::from_mut_slice(block);
        cipher.decrypt_block(ga);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = saved;
    }
}

/// Bulk cipher state for one direction of the record layer
#[derive(Clone)]
pub enum RecordCipher {
    /// Identity transform; records carry only a MAC
    Null { mac: RecordMac },

    /// AES-128-CBC with explicit IV, MAC-then-encrypt
    Aes128Cbc { key: Vec<u8>, mac: RecordMac },
}

impl RecordCipher {
    /// Build the cipher state for a negotiated suite and one direction's
    /// key material
    pub fn new(suite: &CipherSuite, cipher_key: Vec<u8>, mac_key: Vec<u8>) -> Self {
        let mac = RecordMac::new(suite.mac, mac_key);
        match suite.cipher {
            BulkCipher::Null => RecordCipher::Null { mac },
            BulkCipher::Aes128Cbc => RecordCipher::Aes128Cbc { key: cipher_key, mac },
        }
    }

    /// Protect a plaintext record fragment
    pub fn encrypt(
        &self,
        seq: u64,
        content_type: u8,
        version: u16,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            RecordCipher::Null { mac } => {
                let tag = mac.compute(seq, content_type, version, plaintext)?;
                let mut out = Vec::with_capacity(plaintext.len() + tag.len());
                out.extend_from_slice(plaintext);
                out.extend_from_slice(&tag);
                Ok(out)
            }
            RecordCipher::Aes128Cbc { key, mac } => {
                let tag = mac.compute(seq, content_type, version, plaintext)?;

                let content_len = plaintext.len() + tag.len();
                let pad_len = AES_BLOCK - (content_len + 1) % AES_BLOCK;
                let mut body = Vec::with_capacity(content_len + pad_len + 1);
                body.extend_from_slice(plaintext);
                body.extend_from_slice(&tag);
                body.resize(content_len + pad_len + 1, pad_len as u8);

                let mut iv = [0u8; AES_BLOCK];
                rand::thread_rng().fill_bytes(&mut iv);

                cbc_encrypt(key, &iv, &mut body);

                let mut out = Vec::with_capacity(AES_BLOCK + body.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&body);
                Ok(out)
            }
        }
    }

    /// Unprotect a record fragment; verifies the MAC before the plaintext
    /// is returned. All failure paths report `AuthenticationFailed` so the
    /// caller cannot distinguish bad padding from a bad tag.
    pub fn decrypt(
        &self,
        seq: u64,
        content_type: u8,
        version: u16,
        fragment: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            RecordCipher::Null { mac } => {
                let tag_len = mac.algorithm.digest_len();
                if fragment.len() < tag_len {
                    return Err(Error::AuthenticationFailed);
                }
                let (plaintext, tag) = fragment.split_at(fragment.len() - tag_len);
                let expected = mac.compute(seq, content_type, version, plaintext)?;
                if !constant_time_eq(&expected, tag) {
                    return Err(Error::AuthenticationFailed);
                }
                Ok(plaintext.to_vec())
            }
            RecordCipher::Aes128Cbc { key, mac } => {
                let tag_len = mac.algorithm.digest_len();
                if fragment.len() < AES_BLOCK * 2 || (fragment.len() - AES_BLOCK) % AES_BLOCK != 0 {
                    return Err(Error::AuthenticationFailed);
                }

                let mut iv = [0u8; AES_BLOCK];
                iv.copy_from_slice(&fragment[..AES_BLOCK]);
                let mut body = fragment[AES_BLOCK..].to_vec();
                cbc_decrypt(key, &iv, &mut body);

                let pad_len = *body.last().ok_or(Error::AuthenticationFailed)? as usize;
                if pad_len + 1 + tag_len > body.len() {
                    return Err(Error::AuthenticationFailed);
                }
                let pad_start = body.len() - pad_len - 1;
                if body[pad_start..].iter().any(|&b| b as usize != pad_len) {
                    return Err(Error::AuthenticationFailed);
                }

                let (plaintext, tag) = body[..pad_start].split_at(pad_start - tag_len);
                let expected = mac.compute(seq, content_type, version, plaintext)?;
                if !constant_time_eq(&expected, tag) {
                    return Err(Error::AuthenticationFailed);
                }
                Ok(plaintext.to_vec())
            }
        }
    }
}
