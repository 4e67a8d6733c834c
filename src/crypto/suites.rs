//! Cipher suite descriptors
//!
//! The descriptor table is immutable, statically initialized, and shared by
//! every session. Suites are looked up by their negotiated identifier and
//! never mutated.

/// CipherSuite identifier (16 bits)
pub type CipherSuiteId = u16;

/// TLS_RSA_WITH_NULL_SHA
pub const TLS_RSA_WITH_NULL_SHA: CipherSuiteId = 0x0002;

/// TLS_RSA_WITH_AES_128_CBC_SHA
pub const TLS_RSA_WITH_AES_128_CBC_SHA: CipherSuiteId = 0x002F;

/// TLS_RSA_WITH_AES_128_CBC_SHA256
pub const TLS_RSA_WITH_AES_128_CBC_SHA256: CipherSuiteId = 0x003C;

/// Hash algorithms used for record MACs and the PRF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1 (160-bit digest)
    Sha1,

    /// SHA-256 (256-bit digest)
    Sha256,

    /// MD5 (legacy, present for completeness of the identifier space)
    Md5,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Md5 => 16,
        }
    }
}

/// Bulk cipher algorithms for the record layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    /// No encryption, MAC only
    Null,

    /// AES-128 in CBC mode with explicit per-record IV
    Aes128Cbc,
}

impl BulkCipher {
    /// Cipher key length in bytes
    pub fn key_len(&self) -> usize {
        match self {
            BulkCipher::Null => 0,
            BulkCipher::Aes128Cbc => 16,
        }
    }

    /// IV / block length in bytes
    pub fn iv_len(&self) -> usize {
        match self {
            BulkCipher::Null => 0,
            BulkCipher::Aes128Cbc => 16,
        }
    }
}

/// Cipher suite descriptor
///
/// Immutable description of one negotiable suite: the bulk cipher, the
/// record MAC, and the tag truncation applied on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    /// Negotiated identifier
    pub id: CipherSuiteId,

    /// Display name
    pub name: &'static str,

    /// Bulk cipher for record protection
    pub cipher: BulkCipher,

    /// MAC algorithm for record authentication
    pub mac: HashAlgorithm,

    /// MAC key length in bytes
    pub mac_key_len: usize,

    /// MAC tag length on the wire (untruncated for these suites)
    pub mac_tag_len: usize,
}

/// The static descriptor table, in server priority order.
///
/// `SERVER_PRIORITY` doubles as the tie-break order during negotiation:
/// the first entry also offered by the client wins.
pub static SERVER_PRIORITY: &[CipherSuite] = &[
    CipherSuite {
        id: TLS_RSA_WITH_AES_128_CBC_SHA256,
        name: "TLS_RSA_WITH_AES_128_CBC_SHA256",
        cipher: BulkCipher::Aes128Cbc,
        mac: HashAlgorithm::Sha256,
        mac_key_len: 32,
        mac_tag_len: 32,
    },
    CipherSuite {
        id: TLS_RSA_WITH_AES_128_CBC_SHA,
        name: "TLS_RSA_WITH_AES_128_CBC_SHA",
        cipher: BulkCipher::Aes128Cbc,
        mac: HashAlgorithm::Sha1,
        mac_key_len: 20,
        mac_tag_len: 20,
    },
    CipherSuite {
        id: TLS_RSA_WITH_NULL_SHA,
        name: "TLS_RSA_WITH_NULL_SHA",
        cipher: BulkCipher::Null,
        mac: HashAlgorithm::Sha1,
        mac_key_len: 20,
        mac_tag_len: 20,
    },
];

/// Look up a suite descriptor by its negotiated identifier
pub fn lookup_suite(id: CipherSuiteId) -> Option<&'static CipherSuite> {
    SERVER_PRIORITY.iter().find(|s| s.id == id)
}

/// Select the first suite, by server priority, that the client also offers
pub fn negotiate(client_suites: &[CipherSuiteId]) -> Option<&'static CipherSuite> {
    SERVER_PRIORITY
        .iter()
        .find(|s| client_suites.contains(&s.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
        assert_eq!(suite.name, "TLS_RSA_WITH_AES_128_CBC_SHA");
        assert_eq!(suite.cipher.key_len(), 16);
        assert_eq!(suite.mac_key_len, 20);

        assert!(lookup_suite(0xC02B).is_none());
    }

    #[test]
    fn test_negotiation_prefers_server_order() {
        // Client offers SHA and SHA256 variants; server prefers SHA256.
        let chosen = negotiate(&[TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA256]);
        assert_eq!(chosen.unwrap().id, TLS_RSA_WITH_AES_128_CBC_SHA256);

        // No overlap yields no suite.
        assert!(negotiate(&[0xC02B, 0xC02F]).is_none());
    }
}
