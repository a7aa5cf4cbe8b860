use std::sync::Arc;

use bytes::Bytes;

use crate::auth::{KeyManager, TrustManager};
use crate::callbacks::HandshakeListener;
use crate::cipher_suite::CipherSuite;
use crate::crypto::Crypto;
use crate::extensions::{NamedGroup, SignatureScheme};
use crate::handshake::{ProtocolVersion, TLS_1_0_VERSION, TLS_1_1_VERSION, TLS_1_2_VERSION};
use crate::session_cache::SessionContext;

/// Client certificate policy for a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuth {
    /// Never request one.
    None,
    /// Request one; proceed anonymously if the client declines.
    Want,
    /// Request one; a declining client is fatally rejected.
    Need,
}

lazy_static! {
    /// Ordered preference, highest first. SSL 3.0 is recognized on the
    /// wire but never enabled.
    static ref RECOMMENDED_VERSIONS: Vec<ProtocolVersion> =
        vec![TLS_1_2_VERSION, TLS_1_1_VERSION, TLS_1_0_VERSION];

    static ref RECOMMENDED_CIPHER_SUITES: Vec<CipherSuite> = vec![
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
    ];

    static ref RECOMMENDED_GROUPS: Vec<NamedGroup> = vec![
        NamedGroup::x25519,
        NamedGroup::secp256r1,
        NamedGroup::secp384r1,
    ];

    static ref RECOMMENDED_SIGNATURE_ALGORITHMS: Vec<SignatureScheme> = vec![
        SignatureScheme::ecdsa_secp256r1_sha256,
        SignatureScheme::ecdsa_secp384r1_sha384,
        SignatureScheme::rsa_pkcs1_sha256,
        SignatureScheme::rsa_pkcs1_sha384,
    ];
}

/// Configuration for how a client engine negotiates: which algorithms are
/// acceptable, what identity it can present, and where the peer lives for
/// session resumption.
pub struct ClientOptions {
    /// DNS name of the remote server, e.g. "example.com". Sent as SNI and
    /// used for resumption matching. May be empty when connecting by
    /// address.
    pub hostname: String,
    pub peer_port: u16,

    /// ALPN ids to offer, most preferred first.
    pub alpn_ids: Vec<Bytes>,

    /// Enabled protocol versions, highest first.
    pub supported_versions: Vec<ProtocolVersion>,

    pub supported_cipher_suites: Vec<CipherSuite>,

    /// Supported groups for ECDHE key exchange.
    pub supported_groups: Vec<NamedGroup>,

    /// Algorithms acceptable for peer signatures (TLS 1.2).
    pub supported_signature_algorithms: Vec<SignatureScheme>,

    /// Offer RFC 7627 extended master secret binding.
    pub extended_master_secret: bool,

    pub crypto: Arc<dyn Crypto>,
    pub trust_manager: Option<Arc<dyn TrustManager>>,
    /// Needed only when the server may request client authentication.
    pub key_manager: Option<Arc<dyn KeyManager>>,
    pub listener: Option<Arc<dyn HandshakeListener>>,

    /// Shared across every connection of one configuration.
    pub session_context: Arc<SessionContext>,
}

impl ClientOptions {
    pub fn recommended(crypto: Arc<dyn Crypto>, trust_manager: Arc<dyn TrustManager>) -> Self {
        ClientOptions {
            hostname: String::new(),
            peer_port: 0,
            alpn_ids: vec![],
            supported_versions: RECOMMENDED_VERSIONS.clone(),
            supported_cipher_suites: RECOMMENDED_CIPHER_SUITES.clone(),
            supported_groups: RECOMMENDED_GROUPS.clone(),
            supported_signature_algorithms: RECOMMENDED_SIGNATURE_ALGORITHMS.clone(),
            extended_master_secret: true,
            crypto,
            trust_manager: Some(trust_manager),
            key_manager: None,
            listener: None,
            session_context: Arc::new(SessionContext::new()),
        }
    }

    pub fn max_version(&self) -> ProtocolVersion {
        self.supported_versions.iter().copied().max().unwrap_or(TLS_1_2_VERSION)
    }
}

pub struct ServerOptions {
    /// ALPN ids the server will select from, most preferred first.
    pub alpn_ids: Vec<Bytes>,

    pub supported_versions: Vec<ProtocolVersion>,
    pub supported_cipher_suites: Vec<CipherSuite>,
    pub supported_groups: Vec<NamedGroup>,
    pub supported_signature_algorithms: Vec<SignatureScheme>,
    pub extended_master_secret: bool,

    pub client_auth: ClientAuth,

    pub crypto: Arc<dyn Crypto>,
    /// Supplies the server identity; required.
    pub key_manager: Arc<dyn KeyManager>,
    /// Required when client_auth is Want or Need.
    pub trust_manager: Option<Arc<dyn TrustManager>>,
    pub listener: Option<Arc<dyn HandshakeListener>>,

    pub session_context: Arc<SessionContext>,
}

impl ServerOptions {
    pub fn recommended(crypto: Arc<dyn Crypto>, key_manager: Arc<dyn KeyManager>) -> Self {
        ServerOptions {
            alpn_ids: vec![],
            supported_versions: RECOMMENDED_VERSIONS.clone(),
            supported_cipher_suites: RECOMMENDED_CIPHER_SUITES.clone(),
            supported_groups: RECOMMENDED_GROUPS.clone(),
            supported_signature_algorithms: RECOMMENDED_SIGNATURE_ALGORITHMS.clone(),
            extended_master_secret: true,
            client_auth: ClientAuth::None,
            crypto,
            key_manager,
            trust_manager: None,
            listener: None,
            session_context: Arc::new(SessionContext::new()),
        }
    }

    pub fn max_version(&self) -> ProtocolVersion {
        self.supported_versions.iter().copied().max().unwrap_or(TLS_1_2_VERSION)
    }
}
