// Cryptographic capability consumed by the engine.
//
// The engine owns the protocol; the host owns the primitives. Everything
// the handshake and record layers need is reachable through the Crypto
// trait so that the engine itself never touches key material math. All
// implementations must be safe for concurrent use across engines.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::auth::{Certificate, PrivateKey};
use crate::cipher::{ChaChaPoly1305NonceGenerator, GcmNonceGenerator, NonceGenerator};
use crate::cipher_suite::CipherSuite;
use crate::errors::Result;
use crate::extensions::{NamedGroup, SignatureScheme};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    /// MD5(m) || SHA1(m): the digest used by TLS < 1.2 transcripts and
    /// legacy RSA signatures.
    Md5Sha1,
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub fn output_size(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Md5Sha1 => 36,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }
}

/// Authenticated encryption bound to one key and one implicit IV.
///
/// The additional data passed in excludes the plaintext length field;
/// implementations append the length themselves per RFC 5246 6.2.3.3
/// (for CBC suites the true length is only known after depadding).
pub trait Aead: Send + Sync {
    fn encrypt(&self, nonce: &[u8], plaintext: &[u8], additional_data: &[u8], out: &mut Vec<u8>);

    /// Any failure means the record was tampered with; the caller turns it
    /// into a fatal bad_record_mac.
    fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()>;

    /// Worst case ciphertext growth, excluding the explicit nonce.
    fn expansion(&self) -> usize;
}

/// One side of an (EC)DHE exchange. Instances are single-use and owned by
/// one handshake.
pub trait KeyExchange: Send {
    fn public_value(&self) -> Result<Vec<u8>>;
    fn agree(&self, remote_public: &[u8]) -> Result<Vec<u8>>;
}

pub trait Crypto: Send + Sync {
    fn hash(&self, alg: HashAlgorithm, data: &[u8]) -> Vec<u8>;

    fn hmac(&self, alg: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8>;

    fn random_bytes(&self, out: &mut [u8]) -> Result<()>;

    /// Instantiates the record protection for one direction of a
    /// connection. mac_key is empty for AEAD suites.
    fn create_aead(
        &self,
        suite: CipherSuite,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
    ) -> Result<Box<dyn Aead>>;

    fn create_key_exchange(&self, group: NamedGroup) -> Result<Box<dyn KeyExchange>>;

    /// RSA key exchange: encrypt the 48 byte pre-master secret to the
    /// server's end-entity certificate.
    fn encrypt_pre_master_secret(
        &self,
        server_certificate: &Certificate,
        pre_master_secret: &[u8],
    ) -> Result<Vec<u8>>;

    fn decrypt_pre_master_secret(
        &self,
        private_key: &PrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>>;

    fn sign(
        &self,
        scheme: SignatureScheme,
        private_key: &PrivateKey,
        data: &[u8],
    ) -> Result<Vec<u8>>;

    fn verify_signature(
        &self,
        scheme: SignatureScheme,
        certificate: &Certificate,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool>;

    /// Builds the per-connection explicit nonce source for the suite.
    /// The seed comes from the process-wide counter so that no two
    /// connections ever share an explicit nonce sequence.
    fn create_nonce_generator(
        &self,
        suite: CipherSuite,
        seed: u64,
    ) -> Result<Box<dyn NonceGenerator>> {
        let parts = suite.decode()?;
        Ok(if parts.bulk.explicit_nonce_length > 0 {
            Box::new(GcmNonceGenerator::new(seed, parts.bulk.explicit_nonce_length))
        } else {
            Box::new(ChaChaPoly1305NonceGenerator::new())
        })
    }
}

static NONCE_SEED_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Next value of the process-wide counter seeding per-connection nonce
/// generators. Collisions are unacceptable, hence the atomic increment.
pub fn next_nonce_seed() -> u64 {
    NONCE_SEED_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_seeds_are_unique() {
        let a = next_nonce_seed();
        let b = next_nonce_seed();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_output_sizes() {
        assert_eq!(HashAlgorithm::Sha256.output_size(), 32);
        assert_eq!(HashAlgorithm::Sha384.output_size(), 48);
        assert_eq!(
            HashAlgorithm::Md5Sha1.output_size(),
            HashAlgorithm::Md5.output_size() + HashAlgorithm::Sha1.output_size()
        );
    }
}
