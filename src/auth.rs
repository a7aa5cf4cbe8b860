// Identity and trust capabilities.
//
// Certificates are opaque DER blobs here: parsing, path building and
// expiration checks all belong to the host's trust/key stores, reached
// through the two manager traits.

use std::sync::Arc;

use bytes::Bytes;

use crate::extensions::NamedGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub der: Bytes,
}

impl Certificate {
    pub fn new(der: Bytes) -> Self {
        Certificate { der }
    }
}

/// Sender's certificate first, each subsequent one certifying the previous.
pub type CertificateChain = Vec<Arc<Certificate>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ecdsa,
}

/// Opaque private key handle. Only the Crypto capability knows how to use
/// the inner encoding.
#[derive(Debug, Clone)]
pub enum PrivateKey {
    Rsa(Bytes),
    Ecdsa { group: NamedGroup, data: Bytes },
}

impl PrivateKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PrivateKey::Rsa(_) => KeyAlgorithm::Rsa,
            PrivateKey::Ecdsa { .. } => KeyAlgorithm::Ecdsa,
        }
    }
}

/// Why a chain was rejected. The engine maps this onto the TLS alert sent
/// to the peer.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("certificate expired")]
    Expired,
    #[error("certificate revoked")]
    Revoked,
    #[error("certificate not trusted: {0}")]
    Untrusted(String),
}

pub trait TrustManager: Send + Sync {
    fn check_client_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
    ) -> core::result::Result<(), TrustError>;

    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
    ) -> core::result::Result<(), TrustError>;
}

pub trait KeyManager: Send + Sync {
    /// Picks an identity matching any of the key types and (when issuers is
    /// given) one of the issuer names.
    fn choose_client_alias(
        &self,
        key_types: &[KeyAlgorithm],
        issuers: Option<&[Bytes]>,
    ) -> Option<String>;

    fn choose_server_alias(
        &self,
        key_type: KeyAlgorithm,
        issuers: Option<&[Bytes]>,
    ) -> Option<String>;

    fn private_key(&self, alias: &str) -> Option<Arc<PrivateKey>>;

    fn certificate_chain(&self, alias: &str) -> Option<CertificateChain>;
}
