//! SRTP key derivation (RFC 3711 section 4.3)
//!
//! Session keys are derived from the master key and salt with AES in
//! counter mode: the label and the key-derivation-rate-reduced packet index
//! are XORed into fixed salt-relative byte offsets, and successive all-zero
//! blocks are encrypted under the master key until enough keystream has
//! been produced.

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};

use crate::error::Error;
use crate::Result;

/// Master salt length in bytes
pub const SALT_LEN: usize = 14;

/// Label values for SRTP key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationLabel {
    /// RTP encryption key
    RtpEncryption = 0,

    /// RTP authentication key
    RtpAuthentication = 1,

    /// RTP salt (for IV creation)
    RtpSalt = 2,

    /// RTCP encryption key
    RtcpEncryption = 3,

    /// RTCP authentication key
    RtcpAuthentication = 4,

    /// RTCP salt (for IV creation)
    RtcpSalt = 5,
}

/// Derive `out_len` bytes of session key material.
///
/// `index` is the packet index at derivation time and `kdr` the key
/// derivation rate; a rate of zero means keys are derived once, with a
/// zero index contribution.
pub fn derive_session_key(
    master_key: &[u8],
    master_salt: &[u8],
    label: KeyDerivationLabel,
    index: u64,
    kdr: u64,
    out_len: usize,
) -> Result<Vec<u8>> {
    if master_key.len() != 16 {
        return Err(Error::UnsupportedAlgorithm(format!(
            "SRTP KDF requires a 128-bit master key, got {} bytes",
            master_key.len()
        )));
    }
    if master_salt.len() != SALT_LEN {
        return Err(Error::InvalidPacket(format!(
            "master salt must be {} bytes, got {}",
            SALT_LEN,
            master_salt.len()
        )));
    }

    // key_id = label || (index / kdr), XORed into the salt right-aligned:
    // label lands at byte 7, the reduced index at bytes 8..14.
    let reduced = if kdr == 0 { 0 } else { index / kdr };

    let mut input = [0u8; 16];
    input[..SALT_LEN].copy_from_slice(master_salt);
    input[7] ^= label as u8;
    let reduced_be = reduced.to_be_bytes();
    for i in 0..6 {
        input[8 + i] ^= reduced_be[2 + i];
    }

    let cipher = Aes128::new(GenericArray::from_slice(master_key));
    let mut out = Vec::with_capacity(out_len);
    let mut round: u16 = 0;

    while out.len() < out_len {
        let mut block = input;
        block[14..].copy_from_slice(&round.to_be_bytes());
        let ga = GenericArray::from_mut_slice(&mut block);
        cipher.encrypt_block(ga);

        let take = (out_len - out.len()).min(16);
        out.extend_from_slice(&block[..take]);
        round = round.wrapping_add(1);
    }

    Ok(out)
}

/// Build the per-packet AES-CM IV (RFC 3711 section 4.1.1):
/// `(salt * 2^16) XOR (ssrc * 2^64) XOR (index * 2^16)`, low 16 bits zero
/// as the block counter.
pub fn packet_iv(session_salt: &[u8], ssrc: u32, index: u64) -> Result<[u8; 16]> {
    if session_salt.len() != SALT_LEN {
        return Err(Error::InvalidPacket(format!(
            "session salt must be {} bytes, got {}",
            SALT_LEN,
            session_salt.len()
        )));
    }

    let mut iv = [0u8; 16];
    iv[..SALT_LEN].copy_from_slice(session_salt);

    let ssrc_be = ssrc.to_be_bytes();
    for i in 0..4 {
        iv[4 + i] ^= ssrc_be[i];
    }

    let index_be = index.to_be_bytes();
    for i in 0..6 {
        iv[8 + i] ^= index_be[2 + i];
    }

    Ok(iv)
}
