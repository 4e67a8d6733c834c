//! SRTP crypto context registry
//!
//! Maps a stream identifier (SSRC) to a negotiated suite and master
//! key/salt. Contexts are registered once per negotiated key, are immutable
//! after creation, and are resolved exact-match first, then against filter
//! masks in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::{Result, RtpSsrc};
use super::SrtpCryptoSuite;
use super::key_derivation::SALT_LEN;

/// Immutable crypto context: one master key and salt under one suite
#[derive(Debug, Clone)]
pub struct CryptoContext {
    /// Negotiated crypto suite
    pub suite: SrtpCryptoSuite,

    /// Master key
    master_key: Vec<u8>,

    /// Master salt
    master_salt: Vec<u8>,
}

impl CryptoContext {
    pub fn new(suite: SrtpCryptoSuite, master_key: Vec<u8>, master_salt: Vec<u8>) -> Result<Self> {
        if master_key.len() != suite.key_length {
            return Err(Error::InvalidPacket(format!(
                "master key must be {} bytes for {}, got {}",
                suite.key_length,
                suite.name,
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
        Ok(Self {
            suite,
            master_key,
            master_salt,
        })
    }

    pub fn master_key(&self) -> &[u8] {
        &self.master_key
    }

    pub fn master_salt(&self) -> &[u8] {
        &self.master_salt
    }
}

/// Registry of crypto contexts keyed by stream identifier
#[derive(Default)]
pub struct CryptoContextRegistry {
    /// Exact-match entries
    exact: HashMap<RtpSsrc, Arc<CryptoContext>>,

    /// Filter-mask entries, matched in registration order
    filters: Vec<(RtpSsrc, Arc<CryptoContext>)>,
}

impl CryptoContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context for exactly one stream identifier.
    ///
    /// Fails with `AlreadyExists` when an exact entry is present; replacing
    /// a key requires removing and re-registering.
    pub fn register_exact(&mut self, ssrc: RtpSsrc, context: CryptoContext) -> Result<()> {
        if self.exact.contains_key(&ssrc) {
            return Err(Error::AlreadyExists(ssrc));
        }
        self.exact.insert(ssrc, Arc::new(context));
        Ok(())
    }

    /// Register a context matching every stream identifier covered by
    /// `mask` (a filter matches when `mask & ssrc == ssrc`)
    pub fn register_filter(&mut self, mask: RtpSsrc, context: CryptoContext) {
        self.filters.push((mask, Arc::new(context)));
    }

    /// Remove an exact entry, returning whether one was present
    pub fn remove_exact(&mut self, ssrc: RtpSsrc) -> bool {
        self.exact.remove(&ssrc).is_some()
    }

    /// Resolve the context for a stream identifier
    pub fn lookup(&self, ssrc: RtpSsrc) -> Option<Arc<CryptoContext>> {
        if let Some(ctx) = self.exact.get(&ssrc) {
            return Some(ctx.clone());
        }
        self.filters
            .iter()
            .find(|(mask, _)| mask & ssrc == ssrc)
            .map(|(_, ctx)| ctx.clone())
    }
}
