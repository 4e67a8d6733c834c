//! Transport glue
//!
//! Binds a [`HandshakeEngine`] to a caller-supplied packet transport and,
//! once the handshake completes, turns exported keying material into SRTP
//! crypto contexts (RFC 5764).

use bytes::Bytes;
use tracing::debug;

use crate::error::Error;
use crate::srtp::context::CryptoContext;
use crate::srtp::key_derivation::SALT_LEN;
use crate::srtp::{suite_for_profile, SrtpCryptoSuite};
use crate::Result;
use super::engine::{HandshakeConfig, HandshakeEngine, HandshakeEvent};

/// Exporter label for DTLS-SRTP keying material (RFC 5764 section 4.2)
pub const DTLS_SRTP_EXTRACTOR_LABEL: &[u8] = b"EXTRACTOR-dtls_srtp";

/// Outbound half of a packet transport.
///
/// The engine never performs I/O itself; each sealed record is handed to
/// this trait as one datagram (or one stream chunk).
pub trait PacketTransport {
    /// Send one wire record to the peer
    fn send(&mut self, data: &[u8]) -> Result<()>;
}

impl PacketTransport for Vec<Bytes> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.push(Bytes::copy_from_slice(data));
        Ok(())
    }
}

/// SRTP keying material exported from a completed handshake.
///
/// The raw material is split per RFC 5764: client write key, server write
/// key, client write salt, server write salt. Key bytes are only reachable
/// through the context constructors.
pub struct SrtpKeyingMaterial {
    /// Suite matching the negotiated protection profile
    pub suite: SrtpCryptoSuite,

    client_key: Vec<u8>,
    client_salt: Vec<u8>,
    server_key: Vec<u8>,
    server_salt: Vec<u8>,
}

impl SrtpKeyingMaterial {
    /// Context keyed for packets the client sends (server receive side)
    pub fn client_context(&self) -> Result<CryptoContext> {
        CryptoContext::new(
            self.suite,
            self.client_key.clone(),
            self.client_salt.clone(),
        )
    }

    /// Context keyed for packets the server sends
    pub fn server_context(&self) -> Result<CryptoContext> {
        CryptoContext::new(
            self.suite,
            self.server_key.clone(),
            self.server_salt.clone(),
        )
    }
}

/// A handshake engine bound to a packet transport.
///
/// Incoming bytes go through [`SecureTransport::handle_incoming`]; every
/// record the engine queues (handshake flights, alerts, application data)
/// is flushed to the transport immediately.
pub struct SecureTransport<T: PacketTransport> {
    engine: HandshakeEngine,
    transport: T,
}

impl<T: PacketTransport> SecureTransport<T> {
    pub fn new(config: HandshakeConfig, transport: T) -> Self {
        Self {
            engine: HandshakeEngine::new(config),
            transport,
        }
    }

    pub fn engine(&self) -> &HandshakeEngine {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Feed bytes received from the peer, flush any responses, and return
    /// the session events they produced.
    ///
    /// On a protocol failure the fatal alert is still flushed before the
    /// error is returned.
    pub fn handle_incoming(&mut self, data: &[u8]) -> Result<Vec<HandshakeEvent>> {
        let result = self.engine.process_input(data);
        self.flush()?;
        result?;
        Ok(self.engine.take_events())
    }

    /// Encrypt and send application data
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<()> {
        self.engine.send_application_data(data)?;
        self.flush()
    }

    /// Send close_notify and shut the session down
    pub fn close(&mut self) -> Result<()> {
        self.engine.close();
        self.flush()
    }

    /// Export the negotiated SRTP keying material.
    ///
    /// Only valid after handshake completion on a session that negotiated
    /// an SRTP protection profile.
    pub fn derive_srtp_keying_material(&self) -> Result<SrtpKeyingMaterial> {
        let profile = self.engine.srtp_profile().ok_or_else(|| {
            Error::WrongState("no SRTP protection profile negotiated".to_string())
        })?;
        let suite = suite_for_profile(profile).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("SRTP protection profile {:#06x}", profile))
        })?;

        let key_len = suite.key_length;
        let total = 2 * (key_len + SALT_LEN);
        let material =
            self.engine
                .export_keying_material(DTLS_SRTP_EXTRACTOR_LABEL, None, total)?;

        let (keys, salts) = material.split_at(2 * key_len);
        debug!(suite = suite.name, "SRTP keying material derived");

        Ok(SrtpKeyingMaterial {
            suite,
            client_key: keys[..key_len].to_vec(),
            server_key: keys[key_len..].to_vec(),
            client_salt: salts[..SALT_LEN].to_vec(),
            server_salt: salts[SALT_LEN..].to_vec(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        for record in self.engine.take_output() {
            self.transport.send(&record)?;
        }
        Ok(())
    }
}
