//! DTLS/TLS alert protocol
//!
//! Alerts signal protocol errors and orderly closure. A fatal alert in
//! either direction terminates the session; the engine maps every internal
//! error kind to the matching alert description before entering its
//! terminal state.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::error::Error;
use crate::Result;

/// Alert level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    /// Warning alert (not fatal)
    Warning = 1,

    /// Fatal alert (connection must be terminated)
    Fatal = 2,

    /// Invalid alert level
    Invalid = 255,
}

impl From<u8> for AlertLevel {
    fn from(value: u8) -> Self {
        match value {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => AlertLevel::Invalid,
        }
    }
}

/// Alert description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    /// Close notification (sent when closing connection)
    CloseNotify = 0,

    /// Unexpected message received
    UnexpectedMessage = 10,

    /// Bad record MAC
    BadRecordMac = 20,

    /// Record overflow
    RecordOverflow = 22,

    /// Handshake failure
    HandshakeFailure = 40,

    /// Illegal parameter
    IllegalParameter = 47,

    /// Decode error
    DecodeError = 50,

    /// Decrypt error
    DecryptError = 51,

    /// Protocol version
    ProtocolVersion = 70,

    /// Internal error
    InternalError = 80,

    /// Unsupported extension
    UnsupportedExtension = 110,

    /// Invalid alert description
    Invalid = 255,
}

impl From<u8> for AlertDescription {
    fn from(value: u8) -> Self {
        match value {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            22 => AlertDescription::RecordOverflow,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            80 => AlertDescription::InternalError,
            110 => AlertDescription::UnsupportedExtension,
            _ => AlertDescription::Invalid,
        }
    }
}

/// Alert message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Alert level
    pub level: AlertLevel,

    /// Alert description
    pub description: AlertDescription,
}

impl Alert {
    /// Create a new alert message
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Self { level, description }
    }

    /// Create a close notify alert
    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    /// Fatal alert matching an engine error
    pub fn from_error(error: &Error) -> Self {
        let description = match error {
            Error::VersionMismatch(_) => AlertDescription::ProtocolVersion,
            Error::HandshakeFailure(_) => AlertDescription::HandshakeFailure,
            Error::HandshakeVerificationFailed => AlertDescription::DecryptError,
            Error::AuthenticationFailed => AlertDescription::BadRecordMac,
            Error::UnexpectedMessage(_) | Error::WrongState(_) => {
                AlertDescription::UnexpectedMessage
            }
            Error::DecodeError(_) | Error::InvalidPacket(_) | Error::PacketTooShort => {
                AlertDescription::DecodeError
            }
            _ => AlertDescription::InternalError,
        };
        Self::new(AlertLevel::Fatal, description)
    }

    /// Check if this is a fatal alert
    pub fn is_fatal(&self) -> bool {
        self.level == AlertLevel::Fatal
    }

    /// Serialize the alert to bytes
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(2);

        buf.put_u8(self.level as u8);
        buf.put_u8(self.description as u8);

        Ok(buf.freeze())
    }

    /// Parse an alert from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);

        let level = AlertLevel::from(cursor.get_u8());
        let description = AlertDescription::from(cursor.get_u8());

        Ok(Self { level, description })
    }
}
