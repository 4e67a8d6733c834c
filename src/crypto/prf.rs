//! TLS 1.2 PRF and key schedule
//!
//! The PRF is a deterministic expansion over HMAC: P_hash iterates
//! `HMAC(secret, A(i) || label || seed)` and concatenates the output until
//! the requested length is produced, truncating the final block. It is used
//! for master-secret derivation, key-block expansion, Finished verification
//! data, and exported keying material.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::Error;
use crate::Result;
use super::suites::{CipherSuite, HashAlgorithm};

/// Master secret length in bytes
pub const MASTER_SECRET_LEN: usize = 48;

/// Finished verification data length in bytes
pub const VERIFY_DATA_LEN: usize = 12;

fn p_hash_sha256(secret: &[u8], seed: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let new_mac = || {
        Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|_| Error::UnsupportedAlgorithm("HMAC key".to_string()))
    };

    let mut out = Vec::with_capacity(out_len);
    let mut mac = new_mac()?;
    mac.update(seed);
    let mut a = mac.finalize().into_bytes().to_vec();

    while out.len() < out_len {
        let mut mac = new_mac()?;
        mac.update(&a);
        mac.update(seed);
        let block = mac.finalize().into_bytes();
        let take = (out_len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);

        let mut mac = new_mac()?;
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();
    }

    Ok(out)
}

fn p_hash_sha1(secret: &[u8], seed: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let new_mac = || {
        Hmac::<Sha1>::new_from_slice(secret)
            .map_err(|_| Error::UnsupportedAlgorithm("HMAC key".to_string()))
    };

    let mut out = Vec::with_capacity(out_len);
    let mut mac = new_mac()?;
    mac.update(seed);
    let mut a = mac.finalize().into_bytes().to_vec();

    while out.len() < out_len {
        let mut mac = new_mac()?;
        mac.update(&a);
        mac.update(seed);
        let block = mac.finalize().into_bytes();
        let take = (out_len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);

        let mut mac = new_mac()?;
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();
    }

    Ok(out)
}

/// Expand `secret` under `label` and `seeds` into `out_len` bytes.
///
/// Stateless; fails only when the hash algorithm is not supported.
pub fn prf(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    seeds: &[&[u8]],
    out_len: usize,
) -> Result<Vec<u8>> {
    let mut seed = Vec::with_capacity(label.len() + seeds.iter().map(|s| s.len()).sum::<usize>());
    seed.extend_from_slice(label);
    for s in seeds {
        seed.extend_from_slice(s);
    }

    match hash {
        HashAlgorithm::Sha256 => p_hash_sha256(secret, &seed, out_len),
        HashAlgorithm::Sha1 => p_hash_sha1(secret, &seed, out_len),
        HashAlgorithm::Md5 => Err(Error::UnsupportedAlgorithm("MD5 PRF".to_string())),
    }
}

/// Compute the 48-byte master secret from the pre-master secret and the
/// hello randoms
pub fn calculate_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<[u8; MASTER_SECRET_LEN]> {
    let out = prf(
        HashAlgorithm::Sha256,
        pre_master_secret,
        b"master secret",
        &[client_random, server_random],
        MASTER_SECRET_LEN,
    )?;

    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&out);
    Ok(master)
}

/// Per-direction key material expanded from the master secret
#[derive(Clone)]
pub struct KeyBlock {
    /// Client write MAC key
    pub client_mac_key: Vec<u8>,

    /// Server write MAC key
    pub server_mac_key: Vec<u8>,

    /// Client write cipher key
    pub client_cipher_key: Vec<u8>,

    /// Server write cipher key
    pub server_cipher_key: Vec<u8>,

    /// Client write IV
    pub client_iv: Vec<u8>,

    /// Server write IV
    pub server_iv: Vec<u8>,
}

/// Expand the key block for the negotiated suite.
///
/// Key expansion seeds are server random then client random, the reverse of
/// master-secret derivation.
pub fn derive_key_block(
    suite: &CipherSuite,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<KeyBlock> {
    let mac_len = suite.mac_key_len;
    let key_len = suite.cipher.key_len();
    let iv_len = suite.cipher.iv_len();
    let total = 2 * mac_len + 2 * key_len + 2 * iv_len;

    let block = prf(
        HashAlgorithm::Sha256,
        master_secret,
        b"key expansion",
        &[server_random, client_random],
        total,
    )?;

    let mut at = 0;
    let mut next = |len: usize| {
        let part = block[at..at + len].to_vec();
        at += len;
        part
    };

    Ok(KeyBlock {
        client_mac_key: next(mac_len),
        server_mac_key: next(mac_len),
        client_cipher_key: next(key_len),
        server_cipher_key: next(key_len),
        client_iv: next(iv_len),
        server_iv: next(iv_len),
    })
}

/// Compute Finished verification data over the transcript hash.
///
/// `finished_label` is `"client finished"` or `"server finished"`; the
/// transcript hash must cover every handshake message up to but excluding
/// the Finished message being verified or emitted.
pub fn calculate_verify_data(
    master_secret: &[u8],
    finished_label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>> {
    prf(
        HashAlgorithm::Sha256,
        master_secret,
        finished_label,
        &[transcript_hash],
        VERIFY_DATA_LEN,
    )
}

/// Export keying material under an arbitrary label (RFC 5705)
pub fn export_keying_material(
    master_secret: &[u8],
    label: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    context: Option<&[u8]>,
    out_len: usize,
) -> Result<Vec<u8>> {
    match context {
        None => prf(
            HashAlgorithm::Sha256,
            master_secret,
            label,
            &[client_random, server_random],
            out_len,
        ),
        Some(ctx) => {
            let ctx_len = (ctx.len() as u16).to_be_bytes();
            prf(
                HashAlgorithm::Sha256,
                master_secret,
                label,
                &[client_random, server_random, &ctx_len, ctx],
                out_len,
            )
        }
    }
}
