// Cipher suite registry.
//
// Each 16-bit suite id is statically bound to a key exchange, a signature
// algorithm family, a bulk cipher description and the PRF/HMAC hash. The
// cryptographic implementations themselves live behind the Crypto
// capability; this module only carries the data.

use crate::alert::AlertDescription;
use crate::auth::KeyAlgorithm;
use crate::crypto::HashAlgorithm;
use crate::errors::{Error, Result};
use crate::handshake::{ProtocolVersion, TLS_1_2_VERSION};

tls_enum_u16!(
    #[allow(non_camel_case_types)] CipherSuite => {
    TLS_RSA_WITH_AES_128_CBC_SHA = 0x002f,
    TLS_RSA_WITH_AES_256_CBC_SHA = 0x0035,
    TLS_RSA_WITH_AES_128_GCM_SHA256 = 0x009c,
    TLS_RSA_WITH_AES_256_GCM_SHA384 = 0x009d,
    TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA = 0xc009,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA = 0xc013,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 = 0xc02b,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 = 0xc02c,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 = 0xc02f,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 = 0xc030,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 = 0xcca8,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256 = 0xcca9,
    TLS_EMPTY_RENEGOTIATION_INFO_SCSV = 0x00ff
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    Rsa,
    EcdheRsa,
    EcdheEcdsa,
}

impl KeyExchangeAlgorithm {
    /// The type of private key the server must hold to use this exchange.
    pub fn server_key_type(&self) -> KeyAlgorithm {
        match self {
            KeyExchangeAlgorithm::Rsa | KeyExchangeAlgorithm::EcdheRsa => KeyAlgorithm::Rsa,
            KeyExchangeAlgorithm::EcdheEcdsa => KeyAlgorithm::Ecdsa,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        match self {
            KeyExchangeAlgorithm::Rsa => false,
            KeyExchangeAlgorithm::EcdheRsa | KeyExchangeAlgorithm::EcdheEcdsa => true,
        }
    }

    /// The authType string handed to the trust capability.
    pub fn auth_type(&self) -> &'static str {
        match self {
            KeyExchangeAlgorithm::Rsa => "RSA",
            KeyExchangeAlgorithm::EcdheRsa => "ECDHE_RSA",
            KeyExchangeAlgorithm::EcdheEcdsa => "ECDHE_ECDSA",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkCipher {
    pub aead: bool,
    pub key_length: usize,
    /// Implicit IV bytes taken from the key block.
    pub fixed_iv_length: usize,
    /// Per record nonce bytes carried on the wire (AEAD suites).
    pub explicit_nonce_length: usize,
    pub tag_length: usize,
    /// HMAC key bytes from the key block; zero for AEAD suites.
    pub mac_key_length: usize,
}

impl BulkCipher {
    /// Worst case growth from plaintext fragment to ciphertext fragment.
    pub fn max_expansion(&self) -> usize {
        if self.aead {
            self.explicit_nonce_length + self.tag_length
        } else {
            // Explicit CBC IV + maximal padding + MAC.
            self.explicit_nonce_length + 16 + self.tag_length
        }
    }
}

const AES_128_GCM: BulkCipher = BulkCipher {
    aead: true,
    key_length: 16,
    fixed_iv_length: 4,
    explicit_nonce_length: 8,
    tag_length: 16,
    mac_key_length: 0,
};

const AES_256_GCM: BulkCipher = BulkCipher {
    aead: true,
    key_length: 32,
    fixed_iv_length: 4,
    explicit_nonce_length: 8,
    tag_length: 16,
    mac_key_length: 0,
};

const CHACHA20_POLY1305: BulkCipher = BulkCipher {
    aead: true,
    key_length: 32,
    fixed_iv_length: 12,
    explicit_nonce_length: 0,
    tag_length: 16,
    mac_key_length: 0,
};

const AES_128_CBC_SHA: BulkCipher = BulkCipher {
    aead: false,
    key_length: 16,
    fixed_iv_length: 0,
    explicit_nonce_length: 16,
    tag_length: 20,
    mac_key_length: 20,
};

const AES_256_CBC_SHA: BulkCipher = BulkCipher {
    aead: false,
    key_length: 32,
    fixed_iv_length: 0,
    explicit_nonce_length: 16,
    tag_length: 20,
    mac_key_length: 20,
};

#[derive(Clone, Copy, Debug)]
pub struct CipherSuiteParts {
    pub key_exchange: KeyExchangeAlgorithm,
    pub bulk: BulkCipher,
    /// Hash used with the TLS 1.2 PRF and the HMAC; versions below 1.2
    /// always use the MD5+SHA-1 PRF instead.
    pub prf_hash: HashAlgorithm,
}

impl CipherSuite {
    /// Looks up the static parameters of the suite. Unknown or
    /// pseudo-suites (the SCSV) have no parameters.
    pub fn decode(&self) -> Result<CipherSuiteParts> {
        use CipherSuite::*;
        use KeyExchangeAlgorithm::*;

        let (key_exchange, bulk, prf_hash) = match self {
            TLS_RSA_WITH_AES_128_CBC_SHA => (Rsa, AES_128_CBC_SHA, HashAlgorithm::Sha256),
            TLS_RSA_WITH_AES_256_CBC_SHA => (Rsa, AES_256_CBC_SHA, HashAlgorithm::Sha256),
            TLS_RSA_WITH_AES_128_GCM_SHA256 => (Rsa, AES_128_GCM, HashAlgorithm::Sha256),
            TLS_RSA_WITH_AES_256_GCM_SHA384 => (Rsa, AES_256_GCM, HashAlgorithm::Sha384),
            TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA => {
                (EcdheEcdsa, AES_128_CBC_SHA, HashAlgorithm::Sha256)
            }
            TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => {
                (EcdheRsa, AES_128_CBC_SHA, HashAlgorithm::Sha256)
            }
            TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => {
                (EcdheEcdsa, AES_128_GCM, HashAlgorithm::Sha256)
            }
            TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => {
                (EcdheEcdsa, AES_256_GCM, HashAlgorithm::Sha384)
            }
            TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => {
                (EcdheRsa, AES_128_GCM, HashAlgorithm::Sha256)
            }
            TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => {
                (EcdheRsa, AES_256_GCM, HashAlgorithm::Sha384)
            }
            TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 => {
                (EcdheRsa, CHACHA20_POLY1305, HashAlgorithm::Sha256)
            }
            TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256 => {
                (EcdheEcdsa, CHACHA20_POLY1305, HashAlgorithm::Sha256)
            }
            _ => {
                return Err(Error::fatal(
                    AlertDescription::handshake_failure,
                    "Bad cipher suite",
                ));
            }
        };

        Ok(CipherSuiteParts {
            key_exchange,
            bulk,
            prf_hash,
        })
    }

    /// Whether the suite may be negotiated at all under the given protocol
    /// version. GCM and ChaCha suites are TLS 1.2 constructions.
    pub fn usable_with_version(&self, version: ProtocolVersion) -> bool {
        match self.decode() {
            Ok(parts) => !parts.bulk.aead || version >= TLS_1_2_VERSION,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_value_roundtrip() {
        let suite = CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256;
        assert_eq!(suite.to_value(), 0xc02f);
        assert_eq!(CipherSuite::from_value(0xc02f), suite);

        let unknown = CipherSuite::from_value(0x1301);
        assert_eq!(unknown, CipherSuite::Unknown(0x1301));
        assert!(unknown.decode().is_err());
    }

    #[test]
    fn scsv_has_no_parameters() {
        assert!(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV.decode().is_err());
    }

    #[test]
    fn gcm_suites_need_tls12() {
        let gcm = CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256;
        assert!(!gcm.usable_with_version(crate::handshake::TLS_1_1_VERSION));
        assert!(gcm.usable_with_version(TLS_1_2_VERSION));

        let cbc = CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA;
        assert!(cbc.usable_with_version(crate::handshake::TLS_1_0_VERSION));
    }

    #[test]
    fn key_block_sizes() {
        let parts = CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
            .decode()
            .unwrap();
        assert!(parts.bulk.aead);
        assert_eq!(parts.bulk.key_length, 16);
        assert_eq!(parts.bulk.fixed_iv_length, 4);
        assert_eq!(parts.bulk.max_expansion(), 24);
        assert_eq!(parts.key_exchange.server_key_type(), KeyAlgorithm::Rsa);
    }
}
