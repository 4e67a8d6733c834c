//! Cryptographic operations for the handshake engine
//!
//! This module contains the cipher-suite descriptor table, the TLS 1.2
//! PRF/key schedule, and the record-layer bulk ciphers.

pub mod suites;
pub mod prf;
pub mod cipher;

pub use suites::{CipherSuite, CipherSuiteId, HashAlgorithm, BulkCipher, lookup_suite, SERVER_PRIORITY};
pub use prf::{prf, calculate_master_secret, derive_key_block, calculate_verify_data, KeyBlock};
pub use cipher::{RecordCipher, RecordMac};
