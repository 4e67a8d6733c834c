//! Handshake state machine
//!
//! Server-side engine driving a session from ClientHello to application
//! data. The engine is sans-I/O: raw transport bytes are pushed in with
//! [`HandshakeEngine::process_input`], outgoing records are drained with
//! [`HandshakeEngine::take_output`], and session events (completion,
//! inbound alerts, application data) with
//! [`HandshakeEngine::take_events`].
//!
//! Each state owns a handler for the next handshake message. A handler
//! either consumes the message and moves the machine strictly forward, or
//! reports `NotNeeded` so the dispatcher retries the same message against
//! the next state's handler (this is how optional steps such as a client
//! certificate are skipped). Any failure emits a fatal alert and parks the
//! machine in the terminal `Error` state.

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::crypto::cipher::{constant_time_eq, RecordCipher};
use crate::crypto::prf::{
    calculate_master_secret, calculate_verify_data, derive_key_block, export_keying_material,
    KeyBlock, MASTER_SECRET_LEN,
};
use crate::crypto::suites::{negotiate, CipherSuite};
use crate::error::Error;
use crate::Result;
use super::alert::Alert;
use super::message::extension::{Extension, UseSrtpExtension};
use super::message::handshake::{
    generate_random, Certificate, Finished, HandshakeHeader, HandshakeMessage,
    HelloVerifyRequest, NewSessionTicket, ServerHello,
};
use super::record::{ContentType, Record, RecordLayer};
use super::ProtocolVersion;

/// Cookie length issued during the DTLS cookie exchange
const COOKIE_LEN: usize = 20;

/// Session-ticket lifetime hint written into NewSessionTicket
const TICKET_LIFETIME_HINT: u32 = 3600;

/// Handshake machine states, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// Waiting for the first ClientHello (cookie exchange happens here)
    Initial,

    /// Negotiating and emitting the ServerHello flight
    ServerHello,

    /// Optional client certificate
    Certificate,

    /// Waiting for ClientKeyExchange
    KeyExchange,

    /// Waiting for the peer's ChangeCipherSpec
    ChangeCipher,

    /// Waiting for the peer's Finished
    Finished,

    /// Handshake complete, passing application data
    AppData,

    /// Terminal failure state; nothing is processed here
    Error,
}

impl HandshakeState {
    fn next(self) -> Option<Self> {
        match self {
            HandshakeState::Initial => Some(HandshakeState::ServerHello),
            HandshakeState::ServerHello => Some(HandshakeState::Certificate),
            HandshakeState::Certificate => Some(HandshakeState::KeyExchange),
            HandshakeState::KeyExchange => Some(HandshakeState::ChangeCipher),
            HandshakeState::ChangeCipher => Some(HandshakeState::Finished),
            HandshakeState::Finished => Some(HandshakeState::AppData),
            HandshakeState::AppData | HandshakeState::Error => None,
        }
    }
}

/// Outcome of offering a message to one state's handler
enum StepOutcome {
    /// Message consumed; the machine advances to the given state
    Handled(HandshakeState),

    /// This state has nothing to do with the message; try the next handler
    NotNeeded,
}

/// Asymmetric decryption capability for the key exchange.
///
/// Certificate parsing and key management live outside this crate; the
/// engine only needs the private-key operation itself.
pub trait PrivateKey {
    /// Decrypt a key-exchange ciphertext
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// RSA-backed [`PrivateKey`] using PKCS#1 v1.5 decryption
pub struct RsaKeyPair {
    key: rsa::RsaPrivateKey,
}

impl RsaKeyPair {
    pub fn new(key: rsa::RsaPrivateKey) -> Self {
        Self { key }
    }

    pub fn public_key(&self) -> rsa::RsaPublicKey {
        rsa::RsaPublicKey::from(&self.key)
    }
}

impl PrivateKey for RsaKeyPair {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.key
            .decrypt(rsa::Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| Error::HandshakeFailure("key exchange decryption failed".to_string()))
    }
}

/// Handshake engine configuration
#[derive(Clone)]
pub struct HandshakeConfig {
    /// Protocol version this server speaks; the client must offer it
    pub version: ProtocolVersion,

    /// DER certificate chain for the Certificate message, leaf first
    pub certificate_chain: Vec<Bytes>,

    /// Private key matching the leaf certificate
    pub private_key: Arc<dyn PrivateKey>,

    /// Acceptable SRTP protection profiles, in server preference order
    pub srtp_profiles: Vec<u16>,

    /// Opaque session-ticket blob; when present (and the client signals
    /// ticket support) it is issued verbatim after the peer's Finished.
    /// Tickets are never consumed for resumption.
    pub session_ticket: Option<Bytes>,

    /// Whether to demand a stateless-cookie round trip before negotiating
    pub cookie_exchange: bool,
}

/// Events surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Handshake completed; keying material can now be exported
    Completed {
        /// Negotiated cipher suite identifier
        cipher_suite: u16,

        /// Negotiated SRTP protection profile, if use_srtp was offered
        srtp_profile: Option<u16>,
    },

    /// A decrypted application-data record arrived
    ApplicationData(Bytes),

    /// The peer sent an alert
    AlertReceived(Alert),
}

/// DTLS/TLS server handshake engine
pub struct HandshakeEngine {
    config: HandshakeConfig,
    state: HandshakeState,
    record_layer: RecordLayer,

    /// Running hash over every handshake-layer message, both directions
    transcript: Sha256,

    client_random: [u8; 32],
    server_random: [u8; 32],
    suite: Option<&'static CipherSuite>,
    srtp_profile: Option<u16>,
    master_secret: Option<[u8; MASTER_SECRET_LEN]>,
    key_block: Option<KeyBlock>,

    /// Cookie issued in the HelloVerifyRequest round
    cookie: Vec<u8>,

    /// Whether the client signalled session-ticket support
    ticket_offered: bool,

    next_send_message_seq: u16,
    send_queue: Vec<Bytes>,
    events: Vec<HandshakeEvent>,
}

impl HandshakeEngine {
    pub fn new(config: HandshakeConfig) -> Self {
        let mode = config.version.transport_mode();
        let record_layer = RecordLayer::new(mode, config.version.wire());
        debug!(version = ?config.version, "handshake engine created");

        Self {
            config,
            state: HandshakeState::Initial,
            record_layer,
            transcript: Sha256::new(),
            client_random: [0; 32],
            server_random: [0; 32],
            suite: None,
            srtp_profile: None,
            master_secret: None,
            key_block: None,
            cookie: Vec::new(),
            ticket_offered: false,
            next_send_message_seq: 0,
            send_queue: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::AppData
    }

    /// Negotiated SRTP protection profile, once the hello exchange is done
    pub fn srtp_profile(&self) -> Option<u16> {
        self.srtp_profile
    }

    /// Drain the outgoing wire records queued so far
    pub fn take_output(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.send_queue)
    }

    /// Drain the session events raised so far
    pub fn take_events(&mut self) -> Vec<HandshakeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Feed raw transport bytes into the engine.
    ///
    /// On a protocol or cryptographic failure a fatal alert is queued for
    /// sending, the machine enters `Error`, and the error is returned;
    /// further input is rejected with `WrongState`.
    pub fn process_input(&mut self, data: &[u8]) -> Result<()> {
        if self.state == HandshakeState::Error {
            return Err(Error::WrongState(
                "session is in the error state".to_string(),
            ));
        }

        self.record_layer.push_input(data);
        loop {
            let record = match self.record_layer.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            };

            if let Err(e) = self.process_record(record) {
                self.fail(&e);
                return Err(e);
            }
            if self.state == HandshakeState::Error {
                return Ok(());
            }
        }
    }

    /// Abort the session without attempting any further writes
    pub fn abort(&mut self) {
        debug!("session aborted");
        self.state = HandshakeState::Error;
        self.send_queue.clear();
    }

    /// Export keying material under an arbitrary label (RFC 5705).
    ///
    /// Only valid after handshake completion.
    pub fn export_keying_material(
        &self,
        label: &[u8],
        context: Option<&[u8]>,
        length: usize,
    ) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(Error::WrongState(
                "keying material is only available after handshake completion".to_string(),
            ));
        }
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| Error::WrongState("no master secret".to_string()))?;

        export_keying_material(
            master,
            label,
            &self.client_random,
            &self.server_random,
            context,
            length,
        )
    }

    /// Queue an application-data record for sending
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_complete() {
            return Err(Error::WrongState(
                "application data cannot be sent before handshake completion".to_string(),
            ));
        }
        let record = self.record_layer.seal(ContentType::ApplicationData, data)?;
        self.send_queue.push(record);
        Ok(())
    }

    /// Queue a close_notify alert and enter the terminal state
    pub fn close(&mut self) {
        if self.state != HandshakeState::Error {
            self.queue_alert(Alert::close_notify());
            self.state = HandshakeState::Error;
        }
    }

    fn fail(&mut self, error: &Error) {
        if self.state == HandshakeState::Error {
            return;
        }
        warn!(%error, "handshake failed");
        self.queue_alert(Alert::from_error(error));
        self.state = HandshakeState::Error;
    }

    fn queue_alert(&mut self, alert: Alert) {
        // Best effort: an alert that cannot be framed is dropped.
        if let Ok(payload) = alert.serialize() {
            if let Ok(record) = self.record_layer.seal(ContentType::Alert, &payload) {
                self.send_queue.push(record);
            }
        }
    }

    fn process_record(&mut self, record: Record) -> Result<()> {
        match record.content_type {
            ContentType::Alert => {
                let alert = Alert::parse(&record.payload)?;
                debug!(?alert, "alert received");
                let ends_session = alert.is_fatal()
                    || alert.description == super::alert::AlertDescription::CloseNotify;
                self.events.push(HandshakeEvent::AlertReceived(alert));
                if ends_session {
                    self.state = HandshakeState::Error;
                }
                Ok(())
            }
            ContentType::ChangeCipherSpec => self.handle_change_cipher_spec(&record),
            ContentType::Handshake => {
                if self.state == HandshakeState::AppData {
                    debug!("ignoring handshake record after completion");
                    return Ok(());
                }
                let mode = self.config.version.transport_mode();
                let mut data = &record.payload[..];
                while !data.is_empty() {
                    let (header, header_len) = HandshakeHeader::parse(mode, data)?;
                    let total = header_len + header.length as usize;
                    if data.len() < total {
                        return Err(Error::PacketTooShort);
                    }
                    let message =
                        HandshakeMessage::parse(header.msg_type, &data[header_len..total], mode)?;
                    self.dispatch(&message, &data[..total])?;
                    data = &data[total..];
                }
                Ok(())
            }
            ContentType::ApplicationData => {
                if self.state != HandshakeState::AppData {
                    return Err(Error::UnexpectedMessage(
                        "application data before handshake completion".to_string(),
                    ));
                }
                self.events
                    .push(HandshakeEvent::ApplicationData(record.payload));
                Ok(())
            }
            ContentType::Invalid => Err(Error::DecodeError(
                "invalid record content type".to_string(),
            )),
        }
    }

    /// Offer a handshake message to the current state's handler, retrying
    /// against later handlers on `NotNeeded`. Transitions must be strictly
    /// forward.
    fn dispatch(&mut self, message: &HandshakeMessage, wire: &[u8]) -> Result<()> {
        let mut cursor = self.state;
        loop {
            let outcome = match cursor {
                HandshakeState::Initial => self.state_initial(message)?,
                HandshakeState::ServerHello => self.state_server_hello(message, wire)?,
                HandshakeState::Certificate => self.state_certificate(message, wire)?,
                HandshakeState::KeyExchange => self.state_key_exchange(message, wire)?,
                // ChangeCipherSpec travels as its own record content type,
                // so this state never consumes a handshake message.
                HandshakeState::ChangeCipher => StepOutcome::NotNeeded,
                HandshakeState::Finished => self.state_finished(message, wire)?,
                HandshakeState::AppData | HandshakeState::Error => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} in state {:?}",
                        message.message_type(),
                        self.state
                    )));
                }
            };

            match outcome {
                StepOutcome::Handled(next) => {
                    if next <= self.state {
                        return Err(Error::WrongState(format!(
                            "illegal backwards transition {:?} -> {:?}",
                            self.state, next
                        )));
                    }
                    debug!(from = ?self.state, to = ?next, "state transition");
                    self.state = next;
                    return Ok(());
                }
                StepOutcome::NotNeeded => {
                    cursor = cursor.next().ok_or_else(|| {
                        Error::UnexpectedMessage(format!(
                            "{:?} not acceptable in state {:?}",
                            message.message_type(),
                            self.state
                        ))
                    })?;
                }
            }
        }
    }

    /// Initial state: run the stateless-cookie round when configured.
    /// A ClientHello that already carries a cookie (or a configuration
    /// without cookie exchange) falls through to negotiation.
    fn state_initial(&mut self, message: &HandshakeMessage) -> Result<StepOutcome> {
        let HandshakeMessage::ClientHello(hello) = message else {
            return Ok(StepOutcome::NotNeeded);
        };
        if !self.config.cookie_exchange || !hello.cookie.is_empty() {
            return Ok(StepOutcome::NotNeeded);
        }

        let mut cookie = vec![0u8; COOKIE_LEN];
        rand::thread_rng().fill_bytes(&mut cookie);
        self.cookie = cookie.clone();

        debug!("issuing hello verify cookie");
        let request = HandshakeMessage::HelloVerifyRequest(HelloVerifyRequest {
            server_version: self.config.version.wire(),
            cookie: Bytes::from(cookie),
        });
        // The verify round is excluded from the transcript; hashing starts
        // over with the cookie-bearing ClientHello.
        let wire = request.to_wire(
            self.config.version.transport_mode(),
            self.next_send_message_seq,
        )?;
        self.next_send_message_seq += 1;
        let record = self.record_layer.seal(ContentType::Handshake, &wire)?;
        self.send_queue.push(record);

        Ok(StepOutcome::Handled(HandshakeState::ServerHello))
    }

    /// Negotiate version, cipher suite, compression and extensions, then
    /// emit the ServerHello..ServerHelloDone flight as a batch.
    fn state_server_hello(
        &mut self,
        message: &HandshakeMessage,
        wire: &[u8],
    ) -> Result<StepOutcome> {
        let HandshakeMessage::ClientHello(hello) = message else {
            return Ok(StepOutcome::NotNeeded);
        };

        if self.config.cookie_exchange
            && (hello.cookie.is_empty() || !constant_time_eq(&hello.cookie, &self.cookie))
        {
            return Err(Error::HandshakeFailure(
                "cookie verification failed".to_string(),
            ));
        }

        let offered = ProtocolVersion::from_wire(hello.client_version)?;
        if offered != self.config.version {
            return Err(Error::VersionMismatch(hello.client_version));
        }

        let suite = negotiate(&hello.cipher_suites).ok_or_else(|| {
            Error::HandshakeFailure("no mutually supported cipher suite".to_string())
        })?;
        if !hello.compression_methods.contains(&0) {
            return Err(Error::HandshakeFailure(
                "client did not offer null compression".to_string(),
            ));
        }

        // First profile by server preference that the client also offered.
        let srtp_profile = hello.use_srtp().and_then(|use_srtp| {
            self.config
                .srtp_profiles
                .iter()
                .copied()
                .find(|p| use_srtp.profiles.contains(p))
        });
        if hello.use_srtp().is_some() && !self.config.srtp_profiles.is_empty()
            && srtp_profile.is_none()
        {
            return Err(Error::HandshakeFailure(
                "no mutually supported SRTP protection profile".to_string(),
            ));
        }

        self.client_random = hello.random;
        self.server_random = generate_random();
        self.suite = Some(suite);
        self.srtp_profile = srtp_profile;
        self.ticket_offered = hello.offers_session_ticket();
        self.transcript.update(wire);

        debug!(
            suite = suite.name,
            srtp_profile = ?srtp_profile,
            "negotiation complete"
        );

        let mut extensions = vec![Extension::RenegotiationInfo(Bytes::new())];
        if let Some(profile) = srtp_profile {
            extensions.push(Extension::UseSrtp(UseSrtpExtension::with_profiles(vec![
                profile,
            ])));
        }
        if self.will_issue_ticket() {
            extensions.push(Extension::SessionTicket(Bytes::new()));
        }

        self.emit_handshake(HandshakeMessage::ServerHello(ServerHello {
            server_version: self.config.version.wire(),
            random: self.server_random,
            session_id: Bytes::new(),
            cipher_suite: suite.id,
            compression_method: 0,
            extensions,
        }))?;
        self.emit_handshake(HandshakeMessage::Certificate(Certificate {
            certificate_list: self.config.certificate_chain.clone(),
        }))?;
        self.emit_handshake(HandshakeMessage::ServerHelloDone)?;

        Ok(StepOutcome::Handled(HandshakeState::Certificate))
    }

    /// Optional client certificate. We never request one, but a peer that
    /// volunteers a certificate only needs it hashed into the transcript.
    fn state_certificate(
        &mut self,
        message: &HandshakeMessage,
        wire: &[u8],
    ) -> Result<StepOutcome> {
        let HandshakeMessage::Certificate(certificate) = message else {
            return Ok(StepOutcome::NotNeeded);
        };

        debug!(
            entries = certificate.certificate_list.len(),
            "client certificate received (not validated)"
        );
        self.transcript.update(wire);
        Ok(StepOutcome::Handled(HandshakeState::KeyExchange))
    }

    fn state_key_exchange(
        &mut self,
        message: &HandshakeMessage,
        wire: &[u8],
    ) -> Result<StepOutcome> {
        let HandshakeMessage::ClientKeyExchange(key_exchange) = message else {
            return Ok(StepOutcome::NotNeeded);
        };
        let suite = self.suite.ok_or_else(|| {
            Error::UnexpectedMessage("key exchange before negotiation".to_string())
        })?;

        self.transcript.update(wire);

        let premaster = self.recover_premaster(key_exchange);
        let master =
            calculate_master_secret(&premaster, &self.client_random, &self.server_random)?;
        let key_block =
            derive_key_block(suite, &master, &self.client_random, &self.server_random)?;

        self.master_secret = Some(master);
        self.key_block = Some(key_block);

        Ok(StepOutcome::Handled(HandshakeState::ChangeCipher))
    }

    /// Decrypt the pre-master secret, substituting a random one on any
    /// failure so a padding oracle cannot distinguish outcomes. The
    /// handshake then fails later, uniformly, at Finished verification.
    fn recover_premaster(
        &self,
        key_exchange: &super::message::handshake::ClientKeyExchange,
    ) -> [u8; MASTER_SECRET_LEN] {
        let mut premaster = [0u8; MASTER_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut premaster);
        premaster[..2].copy_from_slice(&self.config.version.wire().to_be_bytes());

        let decrypted = key_exchange
            .rsa_ciphertext()
            .and_then(|ciphertext| self.config.private_key.decrypt(ciphertext));

        if let Ok(plain) = decrypted {
            if plain.len() == MASTER_SECRET_LEN
                && plain[..2] == self.config.version.wire().to_be_bytes()
            {
                premaster.copy_from_slice(&plain);
            }
        }
        premaster
    }

    fn handle_change_cipher_spec(&mut self, record: &Record) -> Result<()> {
        if self.state != HandshakeState::ChangeCipher {
            return Err(Error::UnexpectedMessage(format!(
                "change cipher spec in state {:?}",
                self.state
            )));
        }
        if record.payload.as_ref() != [1] {
            return Err(Error::DecodeError(
                "malformed change cipher spec".to_string(),
            ));
        }

        let suite = self
            .suite
            .ok_or_else(|| Error::WrongState("no negotiated suite".to_string()))?;
        let key_block = self
            .key_block
            .as_ref()
            .ok_or_else(|| Error::WrongState("no key block".to_string()))?;

        let cipher = RecordCipher::new(
            suite,
            key_block.client_cipher_key.clone(),
            key_block.client_mac_key.clone(),
        );
        self.record_layer.activate_read_cipher(cipher);
        debug!(epoch = self.record_layer.read_epoch(), "read cipher activated");

        self.state = HandshakeState::Finished;
        Ok(())
    }

    /// Verify the peer's Finished against the transcript so far, then emit
    /// the closing flight: optional NewSessionTicket, ChangeCipherSpec and
    /// our own Finished.
    fn state_finished(&mut self, message: &HandshakeMessage, wire: &[u8]) -> Result<StepOutcome> {
        let HandshakeMessage::Finished(finished) = message else {
            return Ok(StepOutcome::NotNeeded);
        };
        let master = self
            .master_secret
            .ok_or_else(|| Error::UnexpectedMessage("finished before key exchange".to_string()))?;
        let suite = self
            .suite
            .ok_or_else(|| Error::WrongState("no negotiated suite".to_string()))?;

        // The verification hash covers every handshake message up to but
        // excluding the peer's Finished.
        let transcript_hash = self.transcript.clone().finalize();
        let expected = calculate_verify_data(&master, b"client finished", &transcript_hash)?;
        if !constant_time_eq(&expected, &finished.verify_data) {
            return Err(Error::HandshakeVerificationFailed);
        }
        self.transcript.update(wire);

        if self.will_issue_ticket() {
            let ticket = self
                .config
                .session_ticket
                .clone()
                .unwrap_or_default();
            self.emit_handshake(HandshakeMessage::NewSessionTicket(NewSessionTicket {
                lifetime_hint: TICKET_LIFETIME_HINT,
                ticket,
            }))?;
        }

        // ChangeCipherSpec still travels under the old epoch; everything
        // after it is protected with the server write keys.
        let ccs = self.record_layer.seal(ContentType::ChangeCipherSpec, &[1])?;
        self.send_queue.push(ccs);

        let key_block = self
            .key_block
            .as_ref()
            .ok_or_else(|| Error::WrongState("no key block".to_string()))?;
        let cipher = RecordCipher::new(
            suite,
            key_block.server_cipher_key.clone(),
            key_block.server_mac_key.clone(),
        );
        self.record_layer.activate_write_cipher(cipher);

        let transcript_hash = self.transcript.clone().finalize();
        let verify_data = calculate_verify_data(&master, b"server finished", &transcript_hash)?;
        self.emit_handshake(HandshakeMessage::Finished(Finished::new(Bytes::from(
            verify_data,
        ))))?;

        debug!(suite = suite.name, "handshake complete");
        self.events.push(HandshakeEvent::Completed {
            cipher_suite: suite.id,
            srtp_profile: self.srtp_profile,
        });

        Ok(StepOutcome::Handled(HandshakeState::AppData))
    }

    fn will_issue_ticket(&self) -> bool {
        self.config.session_ticket.is_some() && self.ticket_offered
    }

    /// Serialize, hash and frame one outgoing handshake message
    fn emit_handshake(&mut self, message: HandshakeMessage) -> Result<()> {
        let mode = self.config.version.transport_mode();
        let wire = message.to_wire(mode, self.next_send_message_seq)?;
        self.next_send_message_seq += 1;
        self.transcript.update(&wire);

        let record = self.record_layer.seal(ContentType::Handshake, &wire)?;
        self.send_queue.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::{
        lookup_suite, TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA256,
        TLS_RSA_WITH_NULL_SHA,
    };
    use crate::dtls::alert::{AlertDescription, AlertLevel};
    use crate::dtls::message::extension::{
        SRTP_PROFILE_AES128_CM_SHA1_32, SRTP_PROFILE_AES128_CM_SHA1_80,
    };
    use crate::dtls::message::handshake::{ClientHello, ClientKeyExchange};
    use crate::dtls::TransportMode;
    use rsa::Pkcs1v15Encrypt;

    const DTLS12_WIRE: u16 = 0xFEFD;
    const MODE: TransportMode = TransportMode::Datagram;

    fn test_engine(cookie_exchange: bool, ticket: Option<Bytes>) -> (HandshakeEngine, rsa::RsaPublicKey) {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pair = RsaKeyPair::new(key);
        let public = pair.public_key();

        let config = HandshakeConfig {
            version: ProtocolVersion::Dtls12,
            certificate_chain: vec![Bytes::from_static(b"leaf certificate der bytes")],
            private_key: Arc::new(pair),
            srtp_profiles: vec![
                SRTP_PROFILE_AES128_CM_SHA1_80,
                SRTP_PROFILE_AES128_CM_SHA1_32,
            ],
            session_ticket: ticket,
            cookie_exchange,
        };
        (HandshakeEngine::new(config), public)
    }

    /// Minimal in-test client: drives the server engine through a full
    /// handshake using the crate's own primitives.
    struct TestClient {
        public: rsa::RsaPublicKey,
        transcript: Sha256,
        random: [u8; 32],
        server_random: [u8; 32],
        suite: Option<&'static CipherSuite>,
        master: [u8; MASTER_SECRET_LEN],
        key_block: Option<KeyBlock>,
        write_layer: RecordLayer,
        read_layer: RecordLayer,
        msg_seq: u16,
    }

    impl TestClient {
        fn new(public: rsa::RsaPublicKey) -> Self {
            Self {
                public,
                transcript: Sha256::new(),
                random: [0x11; 32],
                server_random: [0; 32],
                suite: None,
                master: [0; MASTER_SECRET_LEN],
                key_block: None,
                write_layer: RecordLayer::new(MODE, DTLS12_WIRE),
                read_layer: RecordLayer::new(MODE, DTLS12_WIRE),
                msg_seq: 0,
            }
        }

        fn hello(&self, cookie: &[u8], suites: Vec<u16>, srtp: Vec<u16>) -> HandshakeMessage {
            let mut extensions = Vec::new();
            if !srtp.is_empty() {
                extensions.push(Extension::UseSrtp(UseSrtpExtension::with_profiles(srtp)));
            }
            HandshakeMessage::ClientHello(ClientHello {
                client_version: DTLS12_WIRE,
                random: self.random,
                session_id: Bytes::new(),
                cookie: Bytes::copy_from_slice(cookie),
                cipher_suites: suites,
                compression_methods: vec![0],
                extensions,
            })
        }

        fn send(&mut self, message: HandshakeMessage, hash: bool) -> Bytes {
            let wire = message.to_wire(MODE, self.msg_seq).unwrap();
            self.msg_seq += 1;
            if hash {
                self.transcript.update(&wire);
            }
            self.write_layer
                .seal(ContentType::Handshake, &wire)
                .unwrap()
        }

        /// Parse a server flight, hashing handshake messages, activating
        /// the read cipher on ChangeCipherSpec, and returning the parsed
        /// messages.
        fn read_flight(&mut self, flight: Vec<Bytes>) -> Vec<HandshakeMessage> {
            for wire in &flight {
                self.read_layer.push_input(wire);
            }
            let mut messages = Vec::new();
            while let Some(record) = self.read_layer.next_record().unwrap() {
                match record.content_type {
                    ContentType::Handshake => {
                        let mut data = &record.payload[..];
                        while !data.is_empty() {
                            let (header, hlen) = HandshakeHeader::parse(MODE, data).unwrap();
                            let total = hlen + header.length as usize;
                            let message =
                                HandshakeMessage::parse(header.msg_type, &data[hlen..total], MODE)
                                    .unwrap();
                            // The verify round and the server's own Finished
                            // are not part of the transcript the client
                            // checks against.
                            if !matches!(
                                message,
                                HandshakeMessage::HelloVerifyRequest(_)
                                    | HandshakeMessage::Finished(_)
                            ) {
                                self.transcript.update(&data[..total]);
                            }
                            messages.push(message);
                            data = &data[total..];
                        }
                    }
                    ContentType::ChangeCipherSpec => {
                        let suite = self.suite.unwrap();
                        let kb = self.key_block.as_ref().unwrap();
                        self.read_layer.activate_read_cipher(RecordCipher::new(
                            suite,
                            kb.server_cipher_key.clone(),
                            kb.server_mac_key.clone(),
                        ));
                    }
                    other => panic!("unexpected record {:?}", other),
                }
            }
            messages
        }

        fn absorb_server_hello(&mut self, messages: &[HandshakeMessage]) {
            let HandshakeMessage::ServerHello(hello) = &messages[0] else {
                panic!("expected ServerHello, got {:?}", messages[0].message_type());
            };
            self.server_random = hello.random;
            self.suite = Some(lookup_suite(hello.cipher_suite).unwrap());
        }

        /// Build ClientKeyExchange, ChangeCipherSpec and Finished records
        fn closing_flight(&mut self, tamper_finished: bool) -> Vec<Bytes> {
            let mut premaster = [0x42u8; MASTER_SECRET_LEN];
            premaster[..2].copy_from_slice(&DTLS12_WIRE.to_be_bytes());
            let ciphertext = self
                .public
                .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &premaster)
                .unwrap();

            let cke = HandshakeMessage::ClientKeyExchange(ClientKeyExchange::new_rsa(&ciphertext));
            let cke_record = self.send(cke, true);

            let suite = self.suite.unwrap();
            self.master =
                calculate_master_secret(&premaster, &self.random, &self.server_random).unwrap();
            let kb =
                derive_key_block(suite, &self.master, &self.random, &self.server_random).unwrap();

            let ccs_record = self
                .write_layer
                .seal(ContentType::ChangeCipherSpec, &[1])
                .unwrap();
            self.write_layer.activate_write_cipher(RecordCipher::new(
                suite,
                kb.client_cipher_key.clone(),
                kb.client_mac_key.clone(),
            ));
            self.key_block = Some(kb);

            let hash = self.transcript.clone().finalize();
            let mut verify_data =
                calculate_verify_data(&self.master, b"client finished", &hash).unwrap();
            if tamper_finished {
                verify_data[0] ^= 0xFF;
            }
            let finished = HandshakeMessage::Finished(Finished::new(Bytes::from(verify_data)));
            let finished_record = self.send(finished, true);

            vec![cke_record, ccs_record, finished_record]
        }
    }

    fn run_to_completion(
        engine: &mut HandshakeEngine,
        client: &mut TestClient,
        suites: Vec<u16>,
        srtp: Vec<u16>,
    ) -> Vec<HandshakeEvent> {
        let hello = client.hello(b"", suites, srtp);
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();

        let messages = client.read_flight(engine.take_output());
        client.absorb_server_hello(&messages);
        assert!(matches!(messages[1], HandshakeMessage::Certificate(_)));
        assert!(matches!(messages[2], HandshakeMessage::ServerHelloDone));

        for record in client.closing_flight(false) {
            engine.process_input(&record).unwrap();
        }
        engine.take_events()
    }

    #[test]
    fn test_full_handshake() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let events = run_to_completion(
            &mut engine,
            &mut client,
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![SRTP_PROFILE_AES128_CM_SHA1_80],
        );

        assert!(engine.is_complete());
        assert!(events.contains(&HandshakeEvent::Completed {
            cipher_suite: TLS_RSA_WITH_AES_128_CBC_SHA256,
            srtp_profile: Some(SRTP_PROFILE_AES128_CM_SHA1_80),
        }));

        // The closing flight decrypts under the server write keys and the
        // server Finished verifies against the shared transcript.
        let closing = client.read_flight(engine.take_output());
        let HandshakeMessage::Finished(finished) = &closing[0] else {
            panic!("expected Finished, got {:?}", closing[0].message_type());
        };
        let hash = client.transcript.clone().finalize();
        let expected =
            calculate_verify_data(&client.master, b"server finished", &hash).unwrap();
        assert_eq!(&finished.verify_data[..], &expected[..]);
    }

    #[test]
    fn test_application_data_both_ways() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);
        run_to_completion(
            &mut engine,
            &mut client,
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![],
        );
        client.read_flight(engine.take_output());

        // Client to server.
        let record = client
            .write_layer
            .seal(ContentType::ApplicationData, b"media payload")
            .unwrap();
        engine.process_input(&record).unwrap();
        assert_eq!(
            engine.take_events(),
            vec![HandshakeEvent::ApplicationData(Bytes::from_static(
                b"media payload"
            ))]
        );

        // Server to client.
        engine.send_application_data(b"reply payload").unwrap();
        for wire in engine.take_output() {
            client.read_layer.push_input(&wire);
        }
        let record = client.read_layer.next_record().unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::ApplicationData);
        assert_eq!(&record.payload[..], b"reply payload");
    }

    #[test]
    fn test_export_keying_material_gated_and_idempotent() {
        let (mut engine, public) = test_engine(false, None);
        assert!(matches!(
            engine.export_keying_material(b"EXTRACTOR-dtls_srtp", None, 60),
            Err(Error::WrongState(_))
        ));

        let mut client = TestClient::new(public);
        run_to_completion(
            &mut engine,
            &mut client,
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![],
        );

        let a = engine
            .export_keying_material(b"EXTRACTOR-dtls_srtp", None, 60)
            .unwrap();
        let b = engine
            .export_keying_material(b"EXTRACTOR-dtls_srtp", None, 60)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 60);

        // The client derives the same bytes from its own session state.
        let c = export_keying_material(
            &client.master,
            b"EXTRACTOR-dtls_srtp",
            &client.random,
            &client.server_random,
            None,
            60,
        )
        .unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_suite_negotiation_server_preference() {
        // Client offers {CBC_SHA, NULL_SHA}; the server prefers CBC_SHA of
        // the two and must pick it.
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(
            b"",
            vec![TLS_RSA_WITH_NULL_SHA, TLS_RSA_WITH_AES_128_CBC_SHA],
            vec![],
        );
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();

        let messages = client.read_flight(engine.take_output());
        let HandshakeMessage::ServerHello(hello) = &messages[0] else {
            panic!("expected ServerHello");
        };
        assert_eq!(hello.cipher_suite, TLS_RSA_WITH_AES_128_CBC_SHA);
    }

    #[test]
    fn test_no_common_suite_fails_with_alert() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(b"", vec![0xC02B], vec![]);
        let record = client.send(hello, true);
        let err = engine.process_input(&record).unwrap_err();
        assert!(matches!(err, Error::HandshakeFailure(_)));
        assert_eq!(engine.state(), HandshakeState::Error);

        // A fatal handshake_failure alert was queued.
        for wire in engine.take_output() {
            client.read_layer.push_input(&wire);
        }
        let record = client.read_layer.next_record().unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::Alert);
        let alert = Alert::parse(&record.payload).unwrap();
        assert_eq!(alert.level, AlertLevel::Fatal);
        assert_eq!(alert.description, AlertDescription::HandshakeFailure);

        // Nothing further is processed.
        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA], vec![]);
        let record = client.send(hello, true);
        assert!(matches!(
            engine.process_input(&record).unwrap_err(),
            Error::WrongState(_)
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (mut engine, public) = test_engine(false, None);
        let client = TestClient::new(public);

        let mut hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        if let HandshakeMessage::ClientHello(h) = &mut hello {
            h.client_version = 0xFEFF; // DTLS 1.0
        }
        let wire = hello.to_wire(MODE, 0).unwrap();
        let mut layer = RecordLayer::new(MODE, DTLS12_WIRE);
        let record = layer.seal(ContentType::Handshake, &wire).unwrap();

        assert_eq!(
            engine.process_input(&record).unwrap_err(),
            Error::VersionMismatch(0xFEFF)
        );
    }

    #[test]
    fn test_bad_finished_is_fatal_and_blocks_app_data() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();
        let messages = client.read_flight(engine.take_output());
        client.absorb_server_hello(&messages);

        let flight = client.closing_flight(true);
        let mut failed = false;
        for record in flight {
            if let Err(e) = engine.process_input(&record) {
                assert_eq!(e, Error::HandshakeVerificationFailed);
                failed = true;
            }
        }
        assert!(failed);
        assert_eq!(engine.state(), HandshakeState::Error);

        // No AppData is ever delivered on this session.
        engine.take_events();
        engine.take_output();
        let app = client
            .write_layer
            .seal(ContentType::ApplicationData, b"too late")
            .unwrap();
        assert!(engine.process_input(&app).is_err());
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_cookie_exchange_round_trip() {
        let (mut engine, public) = test_engine(true, None);
        let mut client = TestClient::new(public);

        // First hello without a cookie gets a HelloVerifyRequest; the
        // verify round stays out of the transcript.
        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let record = client.send(hello, false);
        engine.process_input(&record).unwrap();
        assert_eq!(engine.state(), HandshakeState::ServerHello);

        let messages = client.read_flight(engine.take_output());
        let HandshakeMessage::HelloVerifyRequest(request) = &messages[0] else {
            panic!("expected HelloVerifyRequest");
        };
        assert_eq!(request.cookie.len(), COOKIE_LEN);
        let cookie = request.cookie.clone();

        // Second hello echoes the cookie and negotiation proceeds.
        let hello = client.hello(&cookie, vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();

        let messages = client.read_flight(engine.take_output());
        client.absorb_server_hello(&messages);
        for record in client.closing_flight(false) {
            engine.process_input(&record).unwrap();
        }
        assert!(engine.is_complete());
    }

    #[test]
    fn test_wrong_cookie_rejected() {
        let (mut engine, public) = test_engine(true, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let record = client.send(hello, false);
        engine.process_input(&record).unwrap();
        engine.take_output();

        let hello = client.hello(
            &[0xAB; COOKIE_LEN],
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![],
        );
        let record = client.send(hello, true);
        assert!(matches!(
            engine.process_input(&record).unwrap_err(),
            Error::HandshakeFailure(_)
        ));
    }

    #[test]
    fn test_session_ticket_issued_when_supplied_and_offered() {
        let (mut engine, public) = test_engine(false, Some(Bytes::from_static(b"ticket blob")));
        let mut client = TestClient::new(public);

        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let mut hello = hello;
        if let HandshakeMessage::ClientHello(h) = &mut hello {
            h.extensions.push(Extension::SessionTicket(Bytes::new()));
        }
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();

        let messages = client.read_flight(engine.take_output());
        client.absorb_server_hello(&messages);
        for record in client.closing_flight(false) {
            engine.process_input(&record).unwrap();
        }
        assert!(engine.is_complete());

        let closing = client.read_flight(engine.take_output());
        let HandshakeMessage::NewSessionTicket(ticket) = &closing[0] else {
            panic!("expected NewSessionTicket, got {:?}", closing[0].message_type());
        };
        assert_eq!(&ticket.ticket[..], b"ticket blob");

        // The server Finished still verifies with the ticket hashed in.
        let HandshakeMessage::Finished(finished) = &closing[1] else {
            panic!("expected Finished");
        };
        let hash = client.transcript.clone().finalize();
        let expected =
            calculate_verify_data(&client.master, b"server finished", &hash).unwrap();
        assert_eq!(&finished.verify_data[..], &expected[..]);
    }

    #[test]
    fn test_srtp_profile_server_preference() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        // Client prefers the 32-bit tag profile; server preference wins.
        let events = run_to_completion(
            &mut engine,
            &mut client,
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![SRTP_PROFILE_AES128_CM_SHA1_32, SRTP_PROFILE_AES128_CM_SHA1_80],
        );
        assert!(events.contains(&HandshakeEvent::Completed {
            cipher_suite: TLS_RSA_WITH_AES_128_CBC_SHA256,
            srtp_profile: Some(SRTP_PROFILE_AES128_CM_SHA1_80),
        }));
    }

    #[test]
    fn test_unknown_srtp_profiles_fail() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(
            b"",
            vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            vec![0x0007, 0x0008],
        );
        let record = client.send(hello, true);
        assert!(matches!(
            engine.process_input(&record).unwrap_err(),
            Error::HandshakeFailure(_)
        ));
    }

    #[test]
    fn test_abort_stops_writes() {
        let (mut engine, public) = test_engine(false, None);
        let mut client = TestClient::new(public);

        let hello = client.hello(b"", vec![TLS_RSA_WITH_AES_128_CBC_SHA256], vec![]);
        let record = client.send(hello, true);
        engine.process_input(&record).unwrap();
        assert!(!engine.take_output().is_empty());

        engine.abort();
        assert_eq!(engine.state(), HandshakeState::Error);
        assert!(engine.take_output().is_empty());
        assert!(engine.send_application_data(b"x").is_err());
    }

    #[test]
    fn test_stream_mode_handshake() {
        // Same machine over TLS stream framing.
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pair = RsaKeyPair::new(key);
        let public = pair.public_key();
        let mut engine = HandshakeEngine::new(HandshakeConfig {
            version: ProtocolVersion::Tls12,
            certificate_chain: vec![Bytes::from_static(b"cert")],
            private_key: Arc::new(pair),
            srtp_profiles: vec![],
            session_ticket: None,
            cookie_exchange: false,
        });

        let mode = TransportMode::Stream;
        let mut transcript = Sha256::new();
        let mut write_layer = RecordLayer::new(mode, 0x0303);
        let mut read_layer = RecordLayer::new(mode, 0x0303);

        let hello = HandshakeMessage::ClientHello(ClientHello {
            client_version: 0x0303,
            random: [0x21; 32],
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: vec![TLS_RSA_WITH_AES_128_CBC_SHA256],
            compression_methods: vec![0],
            extensions: vec![],
        });
        let wire = hello.to_wire(mode, 0).unwrap();
        transcript.update(&wire);
        let record = write_layer.seal(ContentType::Handshake, &wire).unwrap();
        engine.process_input(&record).unwrap();

        let mut server_random = [0u8; 32];
        for out in engine.take_output() {
            read_layer.push_input(&out);
        }
        while let Some(record) = read_layer.next_record().unwrap() {
            let mut data = &record.payload[..];
            while !data.is_empty() {
                let (header, hlen) = HandshakeHeader::parse(mode, data).unwrap();
                let total = hlen + header.length as usize;
                transcript.update(&data[..total]);
                if let HandshakeMessage::ServerHello(sh) =
                    HandshakeMessage::parse(header.msg_type, &data[hlen..total], mode).unwrap()
                {
                    server_random = sh.random;
                }
                data = &data[total..];
            }
        }

        let mut premaster = [0x55u8; MASTER_SECRET_LEN];
        premaster[..2].copy_from_slice(&0x0303u16.to_be_bytes());
        let ciphertext = public
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &premaster)
            .unwrap();
        let cke = HandshakeMessage::ClientKeyExchange(ClientKeyExchange::new_rsa(&ciphertext));
        let wire = cke.to_wire(mode, 0).unwrap();
        transcript.update(&wire);
        engine
            .process_input(&write_layer.seal(ContentType::Handshake, &wire).unwrap())
            .unwrap();

        let master = calculate_master_secret(&premaster, &[0x21; 32], &server_random).unwrap();
        let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA256).unwrap();
        let kb = derive_key_block(suite, &master, &[0x21; 32], &server_random).unwrap();

        engine
            .process_input(&write_layer.seal(ContentType::ChangeCipherSpec, &[1]).unwrap())
            .unwrap();
        write_layer.activate_write_cipher(RecordCipher::new(
            suite,
            kb.client_cipher_key.clone(),
            kb.client_mac_key.clone(),
        ));

        let hash = transcript.clone().finalize();
        let verify = calculate_verify_data(&master, b"client finished", &hash).unwrap();
        let finished = HandshakeMessage::Finished(Finished::new(Bytes::from(verify)));
        let wire = finished.to_wire(mode, 0).unwrap();
        transcript.update(&wire);
        engine
            .process_input(&write_layer.seal(ContentType::Handshake, &wire).unwrap())
            .unwrap();

        assert!(engine.is_complete());
    }
}
