//! Record layer: framing, epoch/sequence tracking, record protection
//!
//! Inbound bytes are buffered and cut into length-delimited records; the
//! datagram framing carries an explicit 16-bit epoch and 48-bit sequence
//! number per record, the stream framing counts records implicitly. Once a
//! cipher is activated for a direction, every record on that direction is
//! decrypted and MAC-verified (or MAC'd and encrypted) before anything else
//! looks at it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::crypto::cipher::RecordCipher;
use crate::error::Error;
use crate::Result;
use super::TransportMode;

/// Record content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    /// ChangeCipherSpec record
    ChangeCipherSpec = 20,

    /// Alert record
    Alert = 21,

    /// Handshake record
    Handshake = 22,

    /// Application data record
    ApplicationData = 23,

    /// Invalid content type
    Invalid = 255,
}

impl From<u8> for ContentType {
    fn from(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Invalid,
        }
    }
}

/// Maximum plaintext fragment per record (RFC 5246)
const MAX_PLAINTEXT_LEN: usize = 16_384;

/// Maximum protected fragment, allowing for MAC, padding and IV expansion
const MAX_FRAGMENT_LEN: usize = MAX_PLAINTEXT_LEN + 2_048;

/// 48-bit sequence number limit for datagram records
const MAX_DATAGRAM_SEQ: u64 = (1 << 48) - 1;

/// One record with its payload already unprotected
#[derive(Debug, Clone)]
pub struct Record {
    /// Record content type
    pub content_type: ContentType,

    /// Record-layer version field as received (wire encoding)
    pub version: u16,

    /// Record epoch (datagram transport; zero for stream)
    pub epoch: u16,

    /// Record sequence number
    pub sequence: u64,

    /// Plaintext payload
    pub payload: Bytes,
}

/// Record layer for one session: reassembly, sequencing and protection
pub struct RecordLayer {
    mode: TransportMode,

    /// Wire version written into emitted records and MAC headers
    version: u16,

    read_epoch: u16,
    write_epoch: u16,
    read_seq: u64,
    write_seq: u64,

    read_cipher: Option<RecordCipher>,
    write_cipher: Option<RecordCipher>,

    /// Inbound reassembly buffer
    inbound: BytesMut,
}

impl RecordLayer {
    pub fn new(mode: TransportMode, version: u16) -> Self {
        Self {
            mode,
            version,
            read_epoch: 0,
            write_epoch: 0,
            read_seq: 0,
            write_seq: 0,
            read_cipher: None,
            write_cipher: None,
            inbound: BytesMut::new(),
        }
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    fn header_len(&self) -> usize {
        match self.mode {
            TransportMode::Datagram => 13,
            TransportMode::Stream => 5,
        }
    }

    /// Append raw transport bytes to the reassembly buffer
    pub fn push_input(&mut self, data: &[u8]) {
        self.inbound.extend_from_slice(data);
    }

    /// Cut and unprotect the next complete record, if one is buffered.
    ///
    /// Datagram records from a non-current epoch are silently discarded,
    /// as are datagram tails too short to hold a record header.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let header_len = self.header_len();
            if self.inbound.len() < header_len {
                return Ok(None);
            }

            let length = match self.mode {
                TransportMode::Datagram => {
                    u16::from_be_bytes([self.inbound[11], self.inbound[12]]) as usize
                }
                TransportMode::Stream => {
                    u16::from_be_bytes([self.inbound[3], self.inbound[4]]) as usize
                }
            };
            if length > MAX_FRAGMENT_LEN {
                return Err(Error::DecodeError(format!(
                    "record fragment of {} bytes exceeds the record-size limit",
                    length
                )));
            }
            if self.inbound.len() < header_len + length {
                return Ok(None);
            }

            let raw = self.inbound.split_to(header_len + length);
            let mut cursor = std::io::Cursor::new(&raw[..]);

            let content_type = ContentType::from(cursor.get_u8());
            if content_type == ContentType::Invalid {
                return Err(Error::DecodeError(format!(
                    "invalid record content type {}",
                    raw[0]
                )));
            }
            let version = cursor.get_u16();

            let (epoch, sequence) = match self.mode {
                TransportMode::Datagram => {
                    let epoch = cursor.get_u16();
                    let sequence = cursor.get_uint(6);
                    (epoch, sequence)
                }
                TransportMode::Stream => (0, self.read_seq),
            };
            cursor.advance(2); // length, already read
            let fragment = &raw[header_len..];

            if self.mode == TransportMode::Datagram && epoch != self.read_epoch {
                debug!(epoch, active = self.read_epoch, "discarding record from wrong epoch");
                continue;
            }

            let payload = match &self.read_cipher {
                Some(cipher) => {
                    let mac_seq = match self.mode {
                        TransportMode::Datagram => (epoch as u64) << 48 | sequence,
                        TransportMode::Stream => sequence,
                    };
                    let plaintext =
                        cipher.decrypt(mac_seq, content_type as u8, version, fragment)?;
                    Bytes::from(plaintext)
                }
                None => Bytes::copy_from_slice(fragment),
            };

            if self.mode == TransportMode::Stream {
                self.read_seq += 1;
            }

            return Ok(Some(Record {
                content_type,
                version,
                epoch,
                sequence,
                payload,
            }));
        }
    }

    /// Protect and frame one outgoing record
    pub fn seal(&mut self, content_type: ContentType, payload: &[u8]) -> Result<Bytes> {
        if payload.len() > MAX_PLAINTEXT_LEN {
            return Err(Error::InvalidPacket(format!(
                "record payload of {} bytes exceeds the plaintext limit",
                payload.len()
            )));
        }
        if self.mode == TransportMode::Datagram && self.write_seq > MAX_DATAGRAM_SEQ {
            return Err(Error::ResourceExhausted(
                "write sequence number space exhausted".to_string(),
            ));
        }

        let sequence = self.write_seq;
        let mac_seq = match self.mode {
            TransportMode::Datagram => (self.write_epoch as u64) << 48 | sequence,
            TransportMode::Stream => sequence,
        };

        let fragment = match &self.write_cipher {
            Some(cipher) => cipher.encrypt(mac_seq, content_type as u8, self.version, payload)?,
            None => payload.to_vec(),
        };

        let mut buf = BytesMut::with_capacity(self.header_len() + fragment.len());
        buf.put_u8(content_type as u8);
        buf.put_u16(self.version);
        if self.mode == TransportMode::Datagram {
            buf.put_u16(self.write_epoch);
            buf.put_uint(sequence, 6);
        }
        buf.put_u16(fragment.len() as u16);
        buf.extend_from_slice(&fragment);

        self.write_seq += 1;
        Ok(buf.freeze())
    }

    /// Activate the read cipher: the read epoch increments and the
    /// implicit sequence count restarts at zero
    pub fn activate_read_cipher(&mut self, cipher: RecordCipher) {
        self.read_cipher = Some(cipher);
        self.read_epoch += 1;
        self.read_seq = 0;
    }

    /// Activate the write cipher: the write epoch increments and the
    /// sequence number resets to zero
    pub fn activate_write_cipher(&mut self, cipher: RecordCipher) {
        self.write_cipher = Some(cipher);
        self.write_epoch += 1;
        self.write_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::{lookup_suite, TLS_RSA_WITH_AES_128_CBC_SHA};

    const DTLS12: u16 = 0xFEFD;
    const TLS12: u16 = 0x0303;

    fn cbc_pair() -> (RecordCipher, RecordCipher) {
        let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
        (
            RecordCipher::new(suite, vec![0x11; 16], vec![0x22; 20]),
            RecordCipher::new(suite, vec![0x11; 16], vec![0x22; 20]),
        )
    }

    #[test]
    fn test_datagram_framing_round_trip() {
        let mut writer = RecordLayer::new(TransportMode::Datagram, DTLS12);
        let mut reader = RecordLayer::new(TransportMode::Datagram, DTLS12);

        let wire = writer.seal(ContentType::Handshake, b"hello").unwrap();
        // type(1) + version(2) + epoch(2) + seq(6) + len(2) + payload.
        assert_eq!(wire.len(), 13 + 5);

        reader.push_input(&wire);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::Handshake);
        assert_eq!(record.epoch, 0);
        assert_eq!(record.sequence, 0);
        assert_eq!(&record.payload[..], b"hello");

        // Sequence advances per record.
        let wire = writer.seal(ContentType::Handshake, b"again").unwrap();
        reader.push_input(&wire);
        assert_eq!(reader.next_record().unwrap().unwrap().sequence, 1);
    }

    #[test]
    fn test_stream_reassembly_across_chunks() {
        let mut writer = RecordLayer::new(TransportMode::Stream, TLS12);
        let mut reader = RecordLayer::new(TransportMode::Stream, TLS12);

        let a = writer.seal(ContentType::Handshake, b"first record").unwrap();
        let b = writer.seal(ContentType::Alert, &[1, 0]).unwrap();

        // Deliver both records byte by byte.
        let mut wire = Vec::new();
        wire.extend_from_slice(&a);
        wire.extend_from_slice(&b);
        let mut got = Vec::new();
        for byte in wire {
            reader.push_input(&[byte]);
            while let Some(record) = reader.next_record().unwrap() {
                got.push(record);
            }
        }

        assert_eq!(got.len(), 2);
        assert_eq!(&got[0].payload[..], b"first record");
        assert_eq!(got[1].content_type, ContentType::Alert);
        assert_eq!(got[1].sequence, 1);
    }

    #[test]
    fn test_wrong_epoch_discarded() {
        let mut writer = RecordLayer::new(TransportMode::Datagram, DTLS12);
        let mut reader = RecordLayer::new(TransportMode::Datagram, DTLS12);

        // Writer jumps ahead an epoch without the reader following.
        let (wc, _) = cbc_pair();
        writer.activate_write_cipher(wc);
        let stale = writer.seal(ContentType::Handshake, b"future epoch").unwrap();

        reader.push_input(&stale);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_protected_round_trip_and_tamper() {
        let mut writer = RecordLayer::new(TransportMode::Datagram, DTLS12);
        let mut reader = RecordLayer::new(TransportMode::Datagram, DTLS12);

        let (wc, rc) = cbc_pair();
        writer.activate_write_cipher(wc);
        reader.activate_read_cipher(rc);
        assert_eq!(writer.write_epoch(), 1);
        assert_eq!(reader.read_epoch(), 1);

        let wire = writer.seal(ContentType::ApplicationData, b"secret media").unwrap();
        assert!(!wire.windows(12).any(|w| w == b"secret media"));

        reader.push_input(&wire);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(&record.payload[..], b"secret media");

        // A flipped ciphertext byte fails the MAC.
        let wire2 = writer.seal(ContentType::ApplicationData, b"secret media").unwrap();
        let mut tampered = wire2.to_vec();
        let mid = tampered.len() - 5;
        tampered[mid] ^= 0x01;
        reader.push_input(&tampered);
        assert_eq!(
            reader.next_record().unwrap_err(),
            Error::AuthenticationFailed
        );
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let mut writer = RecordLayer::new(TransportMode::Stream, TLS12);
        let err = writer
            .seal(ContentType::ApplicationData, &vec![0u8; MAX_PLAINTEXT_LEN + 1])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPacket(_)));
    }

    #[test]
    fn test_invalid_content_type() {
        let mut reader = RecordLayer::new(TransportMode::Stream, TLS12);
        reader.push_input(&[99, 0x03, 0x03, 0x00, 0x01, 0xAA]);
        assert!(matches!(
            reader.next_record().unwrap_err(),
            Error::DecodeError(_)
        ));
    }
}
