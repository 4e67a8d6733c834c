//! Handshake message types and wire codec
//!
//! Handshake messages are framed by a header carrying the message type and
//! 24-bit body length; the datagram variant additionally carries a message
//! sequence number and fragment fields (RFC 6347). Handshake fragmentation
//! is not performed by this engine and fragmented inbound messages are
//! rejected rather than silently mis-reassembled.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use std::io::Cursor;

use crate::error::Error;
use crate::Result;
use super::super::TransportMode;
use super::extension::{parse_extensions, serialize_extensions, Extension};

/// Handshake message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    /// HelloRequest message (sent by server)
    HelloRequest = 0,

    /// ClientHello message (sent by client)
    ClientHello = 1,

    /// ServerHello message (sent by server)
    ServerHello = 2,

    /// HelloVerifyRequest message (sent by server for DTLS)
    HelloVerifyRequest = 3,

    /// NewSessionTicket message (RFC 5077)
    NewSessionTicket = 4,

    /// Certificate message
    Certificate = 11,

    /// ServerKeyExchange message
    ServerKeyExchange = 12,

    /// CertificateRequest message
    CertificateRequest = 13,

    /// ServerHelloDone message
    ServerHelloDone = 14,

    /// CertificateVerify message
    CertificateVerify = 15,

    /// ClientKeyExchange message
    ClientKeyExchange = 16,

    /// Finished message
    Finished = 20,

    /// Invalid message type
    Invalid = 255,
}

impl From<u8> for HandshakeType {
    fn from(value: u8) -> Self {
        match value {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            4 => HandshakeType::NewSessionTicket,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            _ => HandshakeType::Invalid,
        }
    }
}

/// Handshake message header.
///
/// Datagram framing is 12 bytes (type, length, message_seq, fragment
/// offset/length); stream framing is the 4-byte TLS header and the extra
/// fields stay zero.
#[derive(Debug, Clone)]
pub struct HandshakeHeader {
    /// Message type
    pub msg_type: HandshakeType,

    /// Message length (24 bits)
    pub length: u32,

    /// Message sequence number (datagram only)
    pub message_seq: u16,

    /// Fragment offset (24 bits, datagram only)
    pub fragment_offset: u32,

    /// Fragment length (24 bits, datagram only)
    pub fragment_length: u32,
}

impl HandshakeHeader {
    /// Header for an unfragmented message
    pub fn new(msg_type: HandshakeType, length: u32, message_seq: u16) -> Self {
        Self {
            msg_type,
            length,
            message_seq,
            fragment_offset: 0,
            fragment_length: length,
        }
    }

    /// Wire size of the header for a transport mode
    pub fn wire_len(mode: TransportMode) -> usize {
        match mode {
            TransportMode::Datagram => 12,
            TransportMode::Stream => 4,
        }
    }

    /// Serialize the handshake header
    pub fn serialize(&self, mode: TransportMode) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(Self::wire_len(mode));

        buf.put_u8(self.msg_type as u8);
        buf.put_uint(self.length as u64, 3);

        if mode == TransportMode::Datagram {
            buf.put_u16(self.message_seq);
            buf.put_uint(self.fragment_offset as u64, 3);
            buf.put_uint(self.fragment_length as u64, 3);
        }

        Ok(buf)
    }

    /// Parse a handshake header, returning it and the bytes consumed
    pub fn parse(mode: TransportMode, data: &[u8]) -> Result<(Self, usize)> {
        let wire_len = Self::wire_len(mode);
        if data.len() < wire_len {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let msg_type = HandshakeType::from(cursor.get_u8());
        let length = cursor.get_uint(3) as u32;

        let (message_seq, fragment_offset, fragment_length) = match mode {
            TransportMode::Datagram => {
                let seq = cursor.get_u16();
                let offset = cursor.get_uint(3) as u32;
                let frag_len = cursor.get_uint(3) as u32;
                (seq, offset, frag_len)
            }
            TransportMode::Stream => (0, 0, length),
        };

        if fragment_offset != 0 || fragment_length != length {
            return Err(Error::NotImplemented(
                "handshake message fragmentation".to_string(),
            ));
        }

        Ok((
            Self {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
            wire_len,
        ))
    }
}

/// Fill a 32-byte hello random from the thread RNG
pub fn generate_random() -> [u8; 32] {
    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    random
}

/// A parsed handshake message body
#[derive(Debug, Clone)]
pub enum HandshakeMessage {
    /// ClientHello message
    ClientHello(ClientHello),

    /// ServerHello message
    ServerHello(ServerHello),

    /// HelloVerifyRequest message
    HelloVerifyRequest(HelloVerifyRequest),

    /// NewSessionTicket message
    NewSessionTicket(NewSessionTicket),

    /// Certificate message
    Certificate(Certificate),

    /// ServerHelloDone message
    ServerHelloDone,

    /// ClientKeyExchange message
    ClientKeyExchange(ClientKeyExchange),

    /// Finished message
    Finished(Finished),
}

impl HandshakeMessage {
    /// Get the handshake message type
    pub fn message_type(&self) -> HandshakeType {
        match self {
            Self::ClientHello(_) => HandshakeType::ClientHello,
            Self::ServerHello(_) => HandshakeType::ServerHello,
            Self::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            Self::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
            Self::Certificate(_) => HandshakeType::Certificate,
            Self::ServerHelloDone => HandshakeType::ServerHelloDone,
            Self::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            Self::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Serialize the message body
    pub fn serialize(&self, mode: TransportMode) -> Result<Bytes> {
        match self {
            Self::ClientHello(msg) => msg.serialize(mode),
            Self::ServerHello(msg) => msg.serialize(),
            Self::HelloVerifyRequest(msg) => msg.serialize(),
            Self::NewSessionTicket(msg) => msg.serialize(),
            Self::Certificate(msg) => msg.serialize(),
            Self::ServerHelloDone => Ok(Bytes::new()),
            Self::ClientKeyExchange(msg) => msg.serialize(),
            Self::Finished(msg) => msg.serialize(),
        }
    }

    /// Parse a message body of a known type
    pub fn parse(msg_type: HandshakeType, data: &[u8], mode: TransportMode) -> Result<Self> {
        match msg_type {
            HandshakeType::ClientHello => Ok(Self::ClientHello(ClientHello::parse(data, mode)?)),
            HandshakeType::ServerHello => Ok(Self::ServerHello(ServerHello::parse(data)?)),
            HandshakeType::HelloVerifyRequest => {
                Ok(Self::HelloVerifyRequest(HelloVerifyRequest::parse(data)?))
            }
            HandshakeType::NewSessionTicket => {
                Ok(Self::NewSessionTicket(NewSessionTicket::parse(data)?))
            }
            HandshakeType::Certificate => Ok(Self::Certificate(Certificate::parse(data)?)),
            HandshakeType::ServerHelloDone => Ok(Self::ServerHelloDone),
            HandshakeType::ClientKeyExchange => {
                Ok(Self::ClientKeyExchange(ClientKeyExchange::parse(data)?))
            }
            HandshakeType::Finished => Ok(Self::Finished(Finished::parse(data)?)),
            other => Err(Error::DecodeError(format!(
                "unsupported handshake message type {:?}",
                other
            ))),
        }
    }

    /// Full handshake-layer wire bytes: header plus body.
    ///
    /// These are the bytes that enter the transcript hash.
    pub fn to_wire(&self, mode: TransportMode, message_seq: u16) -> Result<Bytes> {
        let body = self.serialize(mode)?;
        let header = HandshakeHeader::new(self.message_type(), body.len() as u32, message_seq);

        let mut wire = header.serialize(mode)?;
        wire.extend_from_slice(&body);
        Ok(wire.freeze())
    }
}

/// ClientHello message
#[derive(Debug, Clone)]
pub struct ClientHello {
    /// Offered protocol version (wire encoding)
    pub client_version: u16,

    /// Client random nonce
    pub random: [u8; 32],

    /// Session identifier (resumption is not supported, normally empty)
    pub session_id: Bytes,

    /// Stateless cookie (datagram transport only)
    pub cookie: Bytes,

    /// Offered cipher suites in client preference order
    pub cipher_suites: Vec<u16>,

    /// Offered compression methods (must include null)
    pub compression_methods: Vec<u8>,

    /// Hello extensions
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn serialize(&self, mode: TransportMode) -> Result<Bytes> {
        let mut buf = BytesMut::new();

        buf.put_u16(self.client_version);
        buf.extend_from_slice(&self.random);

        buf.put_u8(self.session_id.len() as u8);
        buf.extend_from_slice(&self.session_id);

        if mode == TransportMode::Datagram {
            buf.put_u8(self.cookie.len() as u8);
            buf.extend_from_slice(&self.cookie);
        }

        buf.put_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            buf.put_u16(*suite);
        }

        buf.put_u8(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            buf.put_u8(*method);
        }

        if !self.extensions.is_empty() {
            buf.extend_from_slice(&serialize_extensions(&self.extensions)?);
        }

        Ok(buf.freeze())
    }

    pub fn parse(data: &[u8], mode: TransportMode) -> Result<Self> {
        // version + random + session_id length
        if data.len() < 35 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);

        let client_version = cursor.get_u16();
        let mut random = [0u8; 32];
        cursor.copy_to_slice(&mut random);

        let session_id = read_vec8(&mut cursor)?;
        let cookie = if mode == TransportMode::Datagram {
            read_vec8(&mut cursor)?
        } else {
            Bytes::new()
        };

        if cursor.remaining() < 2 {
            return Err(Error::PacketTooShort);
        }
        let suites_len = cursor.get_u16() as usize;
        if suites_len % 2 != 0 || cursor.remaining() < suites_len {
            return Err(Error::DecodeError(
                "malformed cipher suite list".to_string(),
            ));
        }
        let mut cipher_suites = Vec::with_capacity(suites_len / 2);
        for _ in 0..(suites_len / 2) {
            cipher_suites.push(cursor.get_u16());
        }

        if cursor.remaining() < 1 {
            return Err(Error::PacketTooShort);
        }
        let compression_len = cursor.get_u8() as usize;
        if cursor.remaining() < compression_len {
            return Err(Error::PacketTooShort);
        }
        let mut compression_methods = Vec::with_capacity(compression_len);
        for _ in 0..compression_len {
            compression_methods.push(cursor.get_u8());
        }

        let extensions = if cursor.has_remaining() {
            let at = cursor.position() as usize;
            let (extensions, _) = parse_extensions(&data[at..])?;
            extensions
        } else {
            Vec::new()
        };

        Ok(Self {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    /// First use_srtp extension, if the client offered one
    pub fn use_srtp(&self) -> Option<&super::extension::UseSrtpExtension> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::UseSrtp(u) => Some(u),
            _ => None,
        })
    }

    /// Whether the client signalled session-ticket support
    pub fn offers_session_ticket(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::SessionTicket(_)))
    }
}

/// ServerHello message
#[derive(Debug, Clone)]
pub struct ServerHello {
    /// Negotiated protocol version (wire encoding)
    pub server_version: u16,

    /// Server random nonce
    pub random: [u8; 32],

    /// Session identifier
    pub session_id: Bytes,

    /// Selected cipher suite
    pub cipher_suite: u16,

    /// Selected compression method
    pub compression_method: u8,

    /// Hello extensions
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();

        buf.put_u16(self.server_version);
        buf.extend_from_slice(&self.random);

        buf.put_u8(self.session_id.len() as u8);
        buf.extend_from_slice(&self.session_id);

        buf.put_u16(self.cipher_suite);
        buf.put_u8(self.compression_method);

        if !self.extensions.is_empty() {
            buf.extend_from_slice(&serialize_extensions(&self.extensions)?);
        }

        Ok(buf.freeze())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 38 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);

        let server_version = cursor.get_u16();
        let mut random = [0u8; 32];
        cursor.copy_to_slice(&mut random);

        let session_id = read_vec8(&mut cursor)?;

        if cursor.remaining() < 3 {
            return Err(Error::PacketTooShort);
        }
        let cipher_suite = cursor.get_u16();
        let compression_method = cursor.get_u8();

        let extensions = if cursor.has_remaining() {
            let at = cursor.position() as usize;
            let (extensions, _) = parse_extensions(&data[at..])?;
            extensions
        } else {
            Vec::new()
        };

        Ok(Self {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    /// The SRTP profile selected by the server, if any
    pub fn selected_srtp_profile(&self) -> Option<u16> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::UseSrtp(u) => u.profiles.first().copied(),
            _ => None,
        })
    }
}

/// HelloVerifyRequest message (DTLS cookie exchange)
#[derive(Debug, Clone)]
pub struct HelloVerifyRequest {
    /// Server version (wire encoding)
    pub server_version: u16,

    /// Stateless cookie the client must echo
    pub cookie: Bytes,
}

impl HelloVerifyRequest {
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(3 + self.cookie.len());
        buf.put_u16(self.server_version);
        buf.put_u8(self.cookie.len() as u8);
        buf.extend_from_slice(&self.cookie);
        Ok(buf.freeze())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let server_version = cursor.get_u16();
        let cookie = read_vec8(&mut cursor)?;

        Ok(Self {
            server_version,
            cookie,
        })
    }
}

/// NewSessionTicket message (RFC 5077).
///
/// Issued as an opaque blob when one was supplied at configuration time;
/// this engine never consumes tickets for resumption.
#[derive(Debug, Clone)]
pub struct NewSessionTicket {
    /// Ticket lifetime hint in seconds
    pub lifetime_hint: u32,

    /// Opaque ticket bytes
    pub ticket: Bytes,
}

impl NewSessionTicket {
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(6 + self.ticket.len());
        buf.put_u32(self.lifetime_hint);
        buf.put_u16(self.ticket.len() as u16);
        buf.extend_from_slice(&self.ticket);
        Ok(buf.freeze())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let lifetime_hint = cursor.get_u32();
        let ticket_len = cursor.get_u16() as usize;
        if cursor.remaining() < ticket_len {
            return Err(Error::PacketTooShort);
        }
        let at = cursor.position() as usize;
        let ticket = Bytes::copy_from_slice(&data[at..at + ticket_len]);

        Ok(Self {
            lifetime_hint,
            ticket,
        })
    }
}

/// Certificate message: a list of DER certificate blobs, leaf first.
///
/// Certificate contents are opaque to this engine; parsing and validation
/// belong to the caller's certificate layer.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Certificate chain in wire order
    pub certificate_list: Vec<Bytes>,
}

impl Certificate {
    pub fn serialize(&self) -> Result<Bytes> {
        let list_len: usize = self.certificate_list.iter().map(|c| 3 + c.len()).sum();

        let mut buf = BytesMut::with_capacity(3 + list_len);
        buf.put_uint(list_len as u64, 3);
        for cert in &self.certificate_list {
            buf.put_uint(cert.len() as u64, 3);
            buf.extend_from_slice(cert);
        }

        Ok(buf.freeze())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::PacketTooShort);
        }

        let mut cursor = Cursor::new(data);
        let list_len = cursor.get_uint(3) as usize;
        if data.len() < 3 + list_len {
            return Err(Error::PacketTooShort);
        }

        let mut certificate_list = Vec::new();
        let end = 3 + list_len;
        while (cursor.position() as usize) < end {
            if cursor.remaining() < 3 {
                return Err(Error::PacketTooShort);
            }
            let cert_len = cursor.get_uint(3) as usize;
            let at = cursor.position() as usize;
            if at + cert_len > end {
                return Err(Error::DecodeError(
                    "certificate entry overruns list".to_string(),
                ));
            }
            certificate_list.push(Bytes::copy_from_slice(&data[at..at + cert_len]));
            cursor.set_position((at + cert_len) as u64);
        }

        Ok(Self { certificate_list })
    }
}

/// ClientKeyExchange message.
///
/// For the RSA key exchange the body is a 2-byte length-prefixed
/// PKCS#1 v1.5 encryption of the pre-master secret.
#[derive(Debug, Clone)]
pub struct ClientKeyExchange {
    /// Raw exchange body
    pub exchange_data: Bytes,
}

impl ClientKeyExchange {
    pub fn new(exchange_data: Bytes) -> Self {
        Self { exchange_data }
    }

    /// Wrap an RSA-encrypted pre-master secret
    pub fn new_rsa(encrypted_premaster: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(2 + encrypted_premaster.len());
        buf.put_u16(encrypted_premaster.len() as u16);
        buf.extend_from_slice(encrypted_premaster);
        Self {
            exchange_data: buf.freeze(),
        }
    }

    /// The RSA-encrypted pre-master secret, stripped of its length prefix
    pub fn rsa_ciphertext(&self) -> Result<&[u8]> {
        if self.exchange_data.len() < 2 {
            return Err(Error::PacketTooShort);
        }
        let len = u16::from_be_bytes([self.exchange_data[0], self.exchange_data[1]]) as usize;
        if self.exchange_data.len() != 2 + len {
            return Err(Error::DecodeError(
                "key exchange length prefix mismatch".to_string(),
            ));
        }
        Ok(&self.exchange_data[2..])
    }

    pub fn serialize(&self) -> Result<Bytes> {
        Ok(self.exchange_data.clone())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            exchange_data: Bytes::copy_from_slice(data),
        })
    }
}

/// Finished message
#[derive(Debug, Clone)]
pub struct Finished {
    /// PRF output over the transcript hash
    pub verify_data: Bytes,
}

impl Finished {
    pub fn new(verify_data: Bytes) -> Self {
        Self { verify_data }
    }

    pub fn serialize(&self) -> Result<Bytes> {
        Ok(self.verify_data.clone())
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::PacketTooShort);
        }
        Ok(Self {
            verify_data: Bytes::copy_from_slice(data),
        })
    }
}

fn read_vec8(cursor: &mut Cursor<&[u8]>) -> Result<Bytes> {
    if cursor.remaining() < 1 {
        return Err(Error::PacketTooShort);
    }
    let len = cursor.get_u8() as usize;
    if cursor.remaining() < len {
        return Err(Error::PacketTooShort);
    }

    let at = cursor.position() as usize;
    let out = Bytes::copy_from_slice(&cursor.get_ref()[at..at + len]);
    cursor.advance(len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::extension::{UseSrtpExtension, SRTP_PROFILE_AES128_CM_SHA1_80};

    fn sample_client_hello() -> ClientHello {
        ClientHello {
            client_version: 0xFEFD,
            random: [7u8; 32],
            session_id: Bytes::new(),
            cookie: Bytes::from_static(b"cookie!!"),
            cipher_suites: vec![0x003C, 0x002F],
            compression_methods: vec![0],
            extensions: vec![Extension::UseSrtp(UseSrtpExtension::with_profiles(vec![
                SRTP_PROFILE_AES128_CM_SHA1_80,
            ]))],
        }
    }

    #[test]
    fn test_client_hello_round_trip_datagram() {
        let hello = sample_client_hello();
        let bytes = hello.serialize(TransportMode::Datagram).unwrap();
        let parsed = ClientHello::parse(&bytes, TransportMode::Datagram).unwrap();

        assert_eq!(parsed.client_version, 0xFEFD);
        assert_eq!(parsed.random, [7u8; 32]);
        assert_eq!(&parsed.cookie[..], b"cookie!!");
        assert_eq!(parsed.cipher_suites, vec![0x003C, 0x002F]);
        assert!(parsed.use_srtp().is_some());
        assert!(!parsed.offers_session_ticket());
    }

    #[test]
    fn test_client_hello_stream_has_no_cookie() {
        let mut hello = sample_client_hello();
        hello.client_version = 0x0303;
        hello.cookie = Bytes::new();

        let bytes = hello.serialize(TransportMode::Stream).unwrap();
        let parsed = ClientHello::parse(&bytes, TransportMode::Stream).unwrap();
        assert!(parsed.cookie.is_empty());
        assert_eq!(parsed.cipher_suites, vec![0x003C, 0x002F]);
    }

    #[test]
    fn test_server_hello_round_trip() {
        let hello = ServerHello {
            server_version: 0xFEFD,
            random: [9u8; 32],
            session_id: Bytes::new(),
            cipher_suite: 0x003C,
            compression_method: 0,
            extensions: vec![Extension::UseSrtp(UseSrtpExtension::with_profiles(vec![
                SRTP_PROFILE_AES128_CM_SHA1_80,
            ]))],
        };

        let bytes = hello.serialize().unwrap();
        let parsed = ServerHello::parse(&bytes).unwrap();
        assert_eq!(parsed.cipher_suite, 0x003C);
        assert_eq!(parsed.selected_srtp_profile(), Some(0x0001));
    }

    #[test]
    fn test_handshake_header_both_framings() {
        let header = HandshakeHeader::new(HandshakeType::ClientHello, 100, 3);

        let datagram = header.serialize(TransportMode::Datagram).unwrap();
        assert_eq!(datagram.len(), 12);
        let (parsed, consumed) = HandshakeHeader::parse(TransportMode::Datagram, &datagram).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(parsed.msg_type, HandshakeType::ClientHello);
        assert_eq!(parsed.length, 100);
        assert_eq!(parsed.message_seq, 3);

        let stream = header.serialize(TransportMode::Stream).unwrap();
        assert_eq!(stream.len(), 4);
        let (parsed, consumed) = HandshakeHeader::parse(TransportMode::Stream, &stream).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(parsed.length, 100);
    }

    #[test]
    fn test_fragmented_header_rejected() {
        let mut header = HandshakeHeader::new(HandshakeType::Certificate, 100, 0);
        header.fragment_length = 60;
        let bytes = header.serialize(TransportMode::Datagram).unwrap();

        assert!(matches!(
            HandshakeHeader::parse(TransportMode::Datagram, &bytes).unwrap_err(),
            Error::NotImplemented(_)
        ));
    }

    #[test]
    fn test_certificate_round_trip() {
        let cert = Certificate {
            certificate_list: vec![Bytes::from_static(b"leaf"), Bytes::from_static(b"issuer")],
        };
        let bytes = cert.serialize().unwrap();
        let parsed = Certificate::parse(&bytes).unwrap();
        assert_eq!(parsed.certificate_list.len(), 2);
        assert_eq!(&parsed.certificate_list[0][..], b"leaf");
        assert_eq!(&parsed.certificate_list[1][..], b"issuer");
    }

    #[test]
    fn test_client_key_exchange_rsa_prefix() {
        let cke = ClientKeyExchange::new_rsa(b"ciphertext");
        assert_eq!(cke.rsa_ciphertext().unwrap(), b"ciphertext");

        let bad = ClientKeyExchange::new(Bytes::from_static(&[0x00, 0x20, 0x01]));
        assert!(bad.rsa_ciphertext().is_err());
    }

    #[test]
    fn test_new_session_ticket_round_trip() {
        let ticket = NewSessionTicket {
            lifetime_hint: 3600,
            ticket: Bytes::from_static(b"opaque ticket"),
        };
        let bytes = ticket.serialize().unwrap();
        let parsed = NewSessionTicket::parse(&bytes).unwrap();
        assert_eq!(parsed.lifetime_hint, 3600);
        assert_eq!(&parsed.ticket[..], b"opaque ticket");
    }

    #[test]
    fn test_to_wire_includes_header() {
        let msg = HandshakeMessage::Finished(Finished::new(Bytes::from_static(&[0xAA; 12])));
        let wire = msg.to_wire(TransportMode::Datagram, 5).unwrap();
        assert_eq!(wire.len(), 12 + 12);
        assert_eq!(wire[0], HandshakeType::Finished as u8);

        let (header, consumed) = HandshakeHeader::parse(TransportMode::Datagram, &wire).unwrap();
        assert_eq!(header.message_seq, 5);
        assert_eq!(header.length as usize, wire.len() - consumed);
    }

    #[test]
    fn test_truncated_hello_rejected() {
        let hello = sample_client_hello();
        let bytes = hello.serialize(TransportMode::Datagram).unwrap();
        for cut in [5, 34, 40, bytes.len() - 1] {
            assert!(
                ClientHello::parse(&bytes[..cut], TransportMode::Datagram).is_err(),
                "cut {}",
                cut
            );
        }
    }
}
