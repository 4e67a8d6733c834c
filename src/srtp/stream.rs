//! Per-stream SRTP/SRTCP packet protection
//!
//! A [`StreamProtector`] owns the derived session keys, replay windows and
//! index state for a single stream identifier. Each protector is pinned to
//! one direction (protect or unprotect) by its first use; mixing directions
//! on the same instance is a keystream-reuse hazard and is rejected.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Error;
use crate::{Result, RtpSsrc};
use super::auth::SrtpAuthenticator;
use super::context::CryptoContext;
use super::crypto::SrtpCipher;
use super::key_derivation::{derive_session_key, packet_iv, KeyDerivationLabel, SALT_LEN};
use super::replay::{ReplayCheck, ReplayWindow};

/// Minimum RTP header length (no CSRCs, no extension)
const RTP_HEADER_MIN: usize = 12;

/// RTCP header plus sender SSRC; everything after this is encrypted
const RTCP_PLAIN_PREFIX: usize = 8;

/// SRTCP index mask (31 bits, top bit is the encryption flag)
const SRTCP_INDEX_MASK: u32 = 0x7FFF_FFFF;

/// Direction a protector is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Protecting outbound packets
    Outbound,

    /// Unprotecting inbound packets
    Inbound,
}

/// Keys and replay state for one packet class (RTP or RTCP)
struct ProtectionState {
    cipher: SrtpCipher,
    auth: SrtpAuthenticator,
    salt: Vec<u8>,
    replay: ReplayWindow,
    seen_any: bool,
}

impl ProtectionState {
    fn derive(
        context: &CryptoContext,
        cipher_label: KeyDerivationLabel,
        auth_label: KeyDerivationLabel,
        salt_label: KeyDerivationLabel,
    ) -> Result<Self> {
        let suite = &context.suite;
        let cipher_key = derive_session_key(
            context.master_key(),
            context.master_salt(),
            cipher_label,
            0,
            0,
            suite.key_length,
        )?;
        let auth_key = derive_session_key(
            context.master_key(),
            context.master_salt(),
            auth_label,
            0,
            0,
            suite.auth_key_length,
        )?;
        let salt = derive_session_key(
            context.master_key(),
            context.master_salt(),
            salt_label,
            0,
            0,
            SALT_LEN,
        )?;

        Ok(Self {
            cipher: SrtpCipher::new(suite.encryption, cipher_key)?,
            auth: SrtpAuthenticator::new(suite.authentication, auth_key, suite.tag_length),
            salt,
            replay: ReplayWindow::new(),
            seen_any: false,
        })
    }

    fn check_replay(&self, index: u64) -> Result<()> {
        match self.replay.check(index) {
            ReplayCheck::Accept => Ok(()),
            ReplayCheck::TooOld => Err(Error::TooOld(index)),
            ReplayCheck::AlreadyReceived => Err(Error::AlreadyReceived(index)),
        }
    }

    fn commit(&mut self, index: u64) {
        self.replay.commit(index);
        self.seen_any = true;
    }

    /// Reconstruct the 48-bit packet index closest to the replay anchor
    /// for a wire 16-bit sequence number.
    fn estimate_index(&self, seq: u16) -> u64 {
        if !self.seen_any {
            return seq as u64;
        }
        let anchor = self.replay.anchor();
        let roc = anchor >> 16;

        let base = (roc << 16) | seq as u64;
        let mut best = base;
        if roc > 0 {
            let lower = base - (1 << 16);
            if lower.abs_diff(anchor) < best.abs_diff(anchor) {
                best = lower;
            }
        }
        if roc < u32::MAX as u64 {
            let upper = base + (1 << 16);
            if upper.abs_diff(anchor) < best.abs_diff(anchor) {
                best = upper;
            }
        }
        best
    }
}

/// SRTP/SRTCP protection for a single stream identifier
pub struct StreamProtector {
    ssrc: RtpSsrc,
    direction: Option<Direction>,
    rtp: ProtectionState,
    rtcp: ProtectionState,

    /// Next outbound SRTCP index (31 bits)
    rtcp_index: u32,
}

impl StreamProtector {
    /// Derive session keys from `context` for stream `ssrc`
    pub fn new(ssrc: RtpSsrc, context: Arc<CryptoContext>) -> Result<Self> {
        if context.suite.prefix_length != 0 {
            return Err(Error::NotImplemented(
                "keystream-prefix authentication".to_string(),
            ));
        }

        let rtp = ProtectionState::derive(
            &context,
            KeyDerivationLabel::RtpEncryption,
            KeyDerivationLabel::RtpAuthentication,
            KeyDerivationLabel::RtpSalt,
        )?;
        let rtcp = ProtectionState::derive(
            &context,
            KeyDerivationLabel::RtcpEncryption,
            KeyDerivationLabel::RtcpAuthentication,
            KeyDerivationLabel::RtcpSalt,
        )?;

        debug!(ssrc, suite = context.suite.name, "SRTP stream keys derived");

        Ok(Self {
            ssrc,
            direction: None,
            rtp,
            rtcp,
            rtcp_index: 0,
        })
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn pin_direction(&mut self, wanted: Direction) -> Result<()> {
        match self.direction {
            None => {
                self.direction = Some(wanted);
                Ok(())
            }
            Some(d) if d == wanted => Ok(()),
            Some(_) => Err(Error::WrongDirection),
        }
    }

    fn check_ssrc(&self, packet_ssrc: RtpSsrc) -> Result<()> {
        if packet_ssrc != self.ssrc {
            return Err(Error::InvalidPacket(format!(
                "packet SSRC {:#010x} does not match stream {:#010x}",
                packet_ssrc, self.ssrc
            )));
        }
        Ok(())
    }

    /// Protect an outbound RTP packet, returning header || ciphertext || tag
    pub fn protect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.pin_direction(Direction::Outbound)?;
        self.check_ssrc(rtp_ssrc(packet)?)?;

        let header_len = rtp_header_len(packet)?;
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        let index = self.rtp.estimate_index(seq);
        self.rtp.check_replay(index)?;

        let mut out = packet.to_vec();
        let iv = packet_iv(&self.rtp.salt, self.ssrc, index)?;
        self.rtp.cipher.apply_keystream(&iv, &mut out[header_len..])?;

        let roc = (index >> 16) as u32;
        let tag = self.rtp.auth.calculate_auth_tag(&out, Some(roc))?;
        out.extend_from_slice(&tag);

        self.rtp.commit(index);
        trace!(ssrc = self.ssrc, seq, index, "protected RTP packet");
        Ok(out)
    }

    /// Unprotect an inbound SRTP packet.
    ///
    /// The authentication tag is verified before any decryption, and the
    /// packet index is only recorded as seen after it passes.
    pub fn unprotect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.pin_direction(Direction::Inbound)?;

        let tag_len = self.rtp.auth.tag_length();
        let header_len = rtp_header_len(packet)?;
        if packet.len() < header_len + tag_len {
            return Err(Error::PacketTooShort);
        }
        self.check_ssrc(rtp_ssrc(packet)?)?;

        let (body, tag) = packet.split_at(packet.len() - tag_len);
        let seq = u16::from_be_bytes([body[2], body[3]]);
        let index = self.rtp.estimate_index(seq);
        self.rtp.check_replay(index)?;

        let roc = (index >> 16) as u32;
        self.rtp.auth.verify_auth_tag(body, tag, Some(roc))?;

        let mut out = body.to_vec();
        let iv = packet_iv(&self.rtp.salt, self.ssrc, index)?;
        self.rtp.cipher.apply_keystream(&iv, &mut out[header_len..])?;

        self.rtp.commit(index);
        trace!(ssrc = self.ssrc, seq, index, "unprotected RTP packet");
        Ok(out)
    }

    /// Protect an outbound RTCP packet, returning
    /// header || ciphertext || E-flag+index || tag
    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.pin_direction(Direction::Outbound)?;
        if packet.len() < RTCP_PLAIN_PREFIX {
            return Err(Error::PacketTooShort);
        }
        self.check_ssrc(rtcp_ssrc(packet)?)?;

        let index = self.rtcp_index;
        self.rtcp.check_replay(index as u64)?;

        let mut out = packet.to_vec();
        let encrypted = !self.rtcp.cipher.is_null();
        if encrypted {
            let iv = packet_iv(&self.rtcp.salt, self.ssrc, index as u64)?;
            self.rtcp
                .cipher
                .apply_keystream(&iv, &mut out[RTCP_PLAIN_PREFIX..])?;
        }

        let index_word = if encrypted {
            index | !SRTCP_INDEX_MASK
        } else {
            index
        };
        out.extend_from_slice(&index_word.to_be_bytes());

        // The SRTCP index word is inside the authenticated bytes, so no
        // trailing ROC is appended here.
        let tag = self.rtcp.auth.calculate_auth_tag(&out, None)?;
        out.extend_from_slice(&tag);

        self.rtcp.commit(index as u64);
        self.rtcp_index = index.wrapping_add(1) & SRTCP_INDEX_MASK;
        trace!(ssrc = self.ssrc, index, "protected RTCP packet");
        Ok(out)
    }

    /// Unprotect an inbound SRTCP packet.
    ///
    /// The encryption flag must match what the suite requires; a mismatch
    /// is rejected before the index is even considered.
    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.pin_direction(Direction::Inbound)?;

        let tag_len = self.rtcp.auth.tag_length();
        if packet.len() < RTCP_PLAIN_PREFIX + 4 + tag_len {
            return Err(Error::PacketTooShort);
        }
        self.check_ssrc(rtcp_ssrc(packet)?)?;

        let (authed, tag) = packet.split_at(packet.len() - tag_len);
        let index_pos = authed.len() - 4;
        let word = u32::from_be_bytes([
            authed[index_pos],
            authed[index_pos + 1],
            authed[index_pos + 2],
            authed[index_pos + 3],
        ]);
        let encrypted = word & !SRTCP_INDEX_MASK != 0;
        if encrypted == self.rtcp.cipher.is_null() {
            return Err(Error::EBitMismatch);
        }
        let index = word & SRTCP_INDEX_MASK;

        self.rtcp.check_replay(index as u64)?;
        self.rtcp.auth.verify_auth_tag(authed, tag, None)?;

        let mut out = authed[..index_pos].to_vec();
        if encrypted {
            let iv = packet_iv(&self.rtcp.salt, self.ssrc, index as u64)?;
            self.rtcp
                .cipher
                .apply_keystream(&iv, &mut out[RTCP_PLAIN_PREFIX..])?;
        }

        self.rtcp.commit(index as u64);
        trace!(ssrc = self.ssrc, index, "unprotected RTCP packet");
        Ok(out)
    }
}

/// Read the SSRC from an RTP packet
pub(crate) fn rtp_ssrc(packet: &[u8]) -> Result<RtpSsrc> {
    if packet.len() < RTP_HEADER_MIN {
        return Err(Error::PacketTooShort);
    }
    if packet[0] >> 6 != 2 {
        return Err(Error::InvalidPacket(format!(
            "unsupported RTP version {}",
            packet[0] >> 6
        )));
    }
    Ok(u32::from_be_bytes([
        packet[8], packet[9], packet[10], packet[11],
    ]))
}

/// Read the sender SSRC from an RTCP packet
pub(crate) fn rtcp_ssrc(packet: &[u8]) -> Result<RtpSsrc> {
    if packet.len() < RTCP_PLAIN_PREFIX {
        return Err(Error::PacketTooShort);
    }
    if packet[0] >> 6 != 2 {
        return Err(Error::InvalidPacket(format!(
            "unsupported RTCP version {}",
            packet[0] >> 6
        )));
    }
    Ok(u32::from_be_bytes([
        packet[4], packet[5], packet[6], packet[7],
    ]))
}

/// Length of the unencrypted RTP header: fixed part, CSRC list and, when
/// the X bit is set, the header extension
fn rtp_header_len(packet: &[u8]) -> Result<usize> {
    if packet.len() < RTP_HEADER_MIN {
        return Err(Error::PacketTooShort);
    }
    let csrc_count = (packet[0] & 0x0F) as usize;
    let mut len = RTP_HEADER_MIN + 4 * csrc_count;

    if packet[0] & 0x10 != 0 {
        if packet.len() < len + 4 {
            return Err(Error::PacketTooShort);
        }
        let ext_words = u16::from_be_bytes([packet[len + 2], packet[len + 3]]) as usize;
        len += 4 + 4 * ext_words;
    }

    if packet.len() < len {
        return Err(Error::PacketTooShort);
    }
    Ok(len)
}
