// The authoritative negotiated state shared between the handshake machine
// and the record layer.
//
// Two slots exist per connection: the parameters being negotiated (owned
// by the running handshake machine) and the parameters of the last
// completed handshake (owned by the engine). Exactly one transition
// happens per handshake: the handshake slot is frozen into the connection
// slot and cleared.

use crate::auth::CertificateChain;
use crate::cipher_suite::CipherSuite;
use crate::crypto::HashAlgorithm;
use crate::handshake::{ProtocolVersion, TLS_1_0_VERSION};
use crate::key_schedule::{CLIENT_FINISHED_LABEL, SERVER_FINISHED_LABEL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Client,
    Server,
}

impl Entity {
    pub fn finished_label(&self) -> &'static [u8] {
        match self {
            Entity::Client => CLIENT_FINISHED_LABEL,
            Entity::Server => SERVER_FINISHED_LABEL,
        }
    }

    pub fn peer(&self) -> Entity {
        match self {
            Entity::Client => Entity::Server,
            Entity::Server => Entity::Client,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SecurityParameters {
    pub entity: Entity,
    pub negotiated_version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub prf_hash: HashAlgorithm,

    pub client_random: [u8; 32],
    pub server_random: [u8; 32],

    /// 48 bytes once derived. Zeroized on teardown.
    pub master_secret: Vec<u8>,

    /// Transcript hash through ClientKeyExchange, kept when
    /// extended_master_secret is active.
    pub session_hash: Option<Vec<u8>>,
    pub extended_master_secret: bool,

    pub peer_certificate: Option<CertificateChain>,
    pub local_certificate: Option<CertificateChain>,

    /// Whether the peer signalled RFC 5746 support on the initial
    /// handshake. Renegotiation itself is rejected by this engine.
    pub secure_renegotiation: bool,
    pub renegotiating: bool,

    pub local_verify_data: Vec<u8>,
    pub peer_verify_data: Vec<u8>,

    /// Channel bindings, populated at handshake completion.
    pub tls_unique: Vec<u8>,
    pub tls_server_end_point: Vec<u8>,
}

impl SecurityParameters {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            negotiated_version: TLS_1_0_VERSION,
            cipher_suite: CipherSuite::Unknown(0),
            prf_hash: HashAlgorithm::Sha256,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            master_secret: vec![],
            session_hash: None,
            extended_master_secret: false,
            peer_certificate: None,
            local_certificate: None,
            secure_renegotiation: false,
            renegotiating: false,
            local_verify_data: vec![],
            peer_verify_data: vec![],
            tls_unique: vec![],
            tls_server_end_point: vec![],
        }
    }
}

impl Drop for SecurityParameters {
    fn drop(&mut self) {
        for b in self.master_secret.iter_mut() {
            *b = 0;
        }
        if let Some(hash) = self.session_hash.as_mut() {
            for b in hash.iter_mut() {
                *b = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_labels() {
        assert_eq!(Entity::Client.finished_label(), b"client finished");
        assert_eq!(Entity::Server.finished_label(), b"server finished");
        assert_eq!(Entity::Client.peer(), Entity::Server);
    }
}
