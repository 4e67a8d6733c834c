//! Hello extension types
//!
//! The engine recognizes the extensions that matter for a DTLS-SRTP peer:
//! use_srtp (RFC 5764), session_ticket (RFC 5077, present-but-inert) and
//! renegotiation_info (RFC 5746, always empty since renegotiation is not
//! supported). Everything else is carried opaquely.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::error::Error;
use crate::Result;

/// SRTP protection profile: AES-CM-128 with HMAC-SHA1-80 (RFC 5764)
pub const SRTP_PROFILE_AES128_CM_SHA1_80: u16 = 0x0001;

/// SRTP protection profile: AES-CM-128 with HMAC-SHA1-32 (RFC 5764)
pub const SRTP_PROFILE_AES128_CM_SHA1_32: u16 = 0x0002;

/// Extension type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    /// Use SRTP (RFC 5764)
    UseSrtp,

    /// Session ticket (RFC 5077)
    SessionTicket,

    /// Renegotiation info (RFC 5746)
    RenegotiationInfo,

    /// Any extension this engine does not interpret
    Unknown(u16),
}

impl From<u16> for ExtensionType {
    fn from(value: u16) -> Self {
        match value {
            14 => ExtensionType::UseSrtp,
            35 => ExtensionType::SessionTicket,
            0xff01 => ExtensionType::RenegotiationInfo,
            other => ExtensionType::Unknown(other),
        }
    }
}

impl From<ExtensionType> for u16 {
    fn from(value: ExtensionType) -> Self {
        match value {
            ExtensionType::UseSrtp => 14,
            ExtensionType::SessionTicket => 35,
            ExtensionType::RenegotiationInfo => 0xff01,
            ExtensionType::Unknown(value) => value,
        }
    }
}

/// A hello extension
#[derive(Debug, Clone)]
pub enum Extension {
    /// Use SRTP extension (RFC 5764)
    UseSrtp(UseSrtpExtension),

    /// Session ticket blob; empty in a hello that merely signals support
    SessionTicket(Bytes),

    /// Renegotiation info payload (always empty here)
    RenegotiationInfo(Bytes),

    /// Unknown extension, carried opaquely
    Unknown {
        /// Extension type
        typ: u16,

        /// Extension data
        data: Bytes,
    },
}

impl Extension {
    /// Get the extension type
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            Self::UseSrtp(_) => ExtensionType::UseSrtp,
            Self::SessionTicket(_) => ExtensionType::SessionTicket,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Unknown { typ, .. } => ExtensionType::from(*typ),
        }
    }

    /// Serialize the extension (type, length, data)
    pub fn serialize(&self) -> Result<Bytes> {
        let data = match self {
            Self::UseSrtp(ext) => ext.serialize()?,
            Self::SessionTicket(data) => data.clone(),
            Self::RenegotiationInfo(data) => {
                // renegotiation_info carries a 1-byte length-prefixed
                // verify-data field.
                let mut buf = BytesMut::with_capacity(1 + data.len());
                buf.put_u8(data.len() as u8);
                buf.extend_from_slice(data);
                buf.freeze()
            }
            Self::Unknown { data, .. } => data.clone(),
        };

        let mut buf = BytesMut::with_capacity(4 + data.len());
        buf.put_u16(self.extension_type().into());
        buf.put_u16(data.len() as u16);
        buf.extend_from_slice(&data);
        Ok(buf.freeze())
    }

    /// Parse one extension, returning it and the bytes consumed
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let typ = cursor.get_u16();
        let length = cursor.get_u16() as usize;

        if data.len() < 4 + length {
            return Err(Error::PacketTooShort);
        }
        let ext_data = &data[4..4 + length];

        let extension = match ExtensionType::from(typ) {
            ExtensionType::UseSrtp => Extension::UseSrtp(UseSrtpExtension::parse(ext_data)?),
            ExtensionType::SessionTicket => {
                Extension::SessionTicket(Bytes::copy_from_slice(ext_data))
            }
            ExtensionType::RenegotiationInfo => {
                if ext_data.is_empty() {
                    return Err(Error::PacketTooShort);
                }
                let verify_len = ext_data[0] as usize;
                if ext_data.len() < 1 + verify_len {
                    return Err(Error::PacketTooShort);
                }
                Extension::RenegotiationInfo(Bytes::copy_from_slice(&ext_data[1..1 + verify_len]))
            }
            ExtensionType::Unknown(typ) => Extension::Unknown {
                typ,
                data: Bytes::copy_from_slice(ext_data),
            },
        };

        Ok((extension, 4 + length))
    }
}

/// Serialize an extension block: 2-byte total length plus each extension
pub fn serialize_extensions(extensions: &[Extension]) -> Result<Bytes> {
    let mut body = BytesMut::new();
    for ext in extensions {
        body.extend_from_slice(&ext.serialize()?);
    }

    let mut buf = BytesMut::with_capacity(2 + body.len());
    buf.put_u16(body.len() as u16);
    buf.extend_from_slice(&body);
    Ok(buf.freeze())
}

/// Parse an extension block (2-byte total length prefix)
pub fn parse_extensions(data: &[u8]) -> Result<(Vec<Extension>, usize)> {
    if data.len() < 2 {
        return Err(Error::PacketTooShort);
    }
    let total = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + total {
        return Err(Error::PacketTooShort);
    }

    let mut extensions = Vec::new();
    let mut at = 2;
    let end = 2 + total;
    while at < end {
        let (ext, consumed) = Extension::parse(&data[at..end])?;
        extensions.push(ext);
        at += consumed;
    }

    Ok((extensions, end))
}

/// Use SRTP extension (RFC 5764)
#[derive(Debug, Clone)]
pub struct UseSrtpExtension {
    /// Offered/selected SRTP protection profiles, in preference order
    pub profiles: Vec<u16>,

    /// MKI (Master Key Identifier) value
    pub mki: Bytes,
}

impl UseSrtpExtension {
    /// Create a new Use SRTP extension with no MKI
    pub fn with_profiles(profiles: Vec<u16>) -> Self {
        Self {
            profiles,
            mki: Bytes::new(),
        }
    }

    /// Serialize the extension body
    pub fn serialize(&self) -> Result<Bytes> {
        let profiles_len = self.profiles.len() * 2;
        let mut buf = BytesMut::with_capacity(2 + profiles_len + 1 + self.mki.len());

        buf.put_u16(profiles_len as u16);
        for profile in &self.profiles {
            buf.put_u16(*profile);
        }

        buf.put_u8(self.mki.len() as u8);
        if !self.mki.is_empty() {
            buf.extend_from_slice(&self.mki);
        }

        Ok(buf.freeze())
    }

    /// Parse a Use SRTP extension body
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let profiles_len = cursor.get_u16() as usize;

        if profiles_len % 2 != 0 {
            return Err(Error::InvalidPacket(
                "SRTP profiles length must be a multiple of 2".to_string(),
            ));
        }
        if data.len() < 3 + profiles_len {
            return Err(Error::PacketTooShort);
        }

        let mut profiles = Vec::with_capacity(profiles_len / 2);
        for _ in 0..(profiles_len / 2) {
            profiles.push(cursor.get_u16());
        }

        let mki_len = cursor.get_u8() as usize;
        if data.len() < 3 + profiles_len + mki_len {
            return Err(Error::PacketTooShort);
        }

        let mki = if mki_len > 0 {
            let offset = 3 + profiles_len;
            Bytes::copy_from_slice(&data[offset..offset + mki_len])
        } else {
            Bytes::new()
        };

        Ok(Self { profiles, mki })
    }
}
