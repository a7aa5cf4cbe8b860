// Bridge between the handshake machines and the host's key/trust
// capabilities and listeners.
//
// Trust failures are translated to the alert the peer should see:
// certificate_expired when the capability says so, certificate_unknown
// otherwise. Listener hooks are best-effort observers and must not be
// able to corrupt engine state, so they receive shared references only.

use std::sync::Arc;

use bytes::Bytes;
use log::debug;

use crate::alert::AlertDescription;
use crate::auth::{CertificateChain, KeyAlgorithm, KeyManager, TrustError, TrustManager};
use crate::errors::{Error, Result};
use crate::session::Session;

/// Host observer for handshake lifecycle events.
pub trait HandshakeListener: Send + Sync {
    /// Called with the in-progress session before the Finished messages
    /// are validated.
    fn handshake_session(&self, _session: &Arc<Session>) {}

    /// Called exactly once per handshake, after both Finished messages
    /// have verified.
    fn handshake_complete(&self, _session: &Arc<Session>) {}
}

#[derive(Clone)]
pub struct CallbackBridge {
    pub key_manager: Option<Arc<dyn KeyManager>>,
    pub trust_manager: Option<Arc<dyn TrustManager>>,
    pub listener: Option<Arc<dyn HandshakeListener>>,
}

impl CallbackBridge {
    pub fn choose_client_alias(
        &self,
        key_types: &[KeyAlgorithm],
        issuers: Option<&[Bytes]>,
    ) -> Option<String> {
        self.key_manager
            .as_ref()
            .and_then(|km| km.choose_client_alias(key_types, issuers))
    }

    pub fn choose_server_alias(
        &self,
        key_type: KeyAlgorithm,
        issuers: Option<&[Bytes]>,
    ) -> Option<String> {
        self.key_manager
            .as_ref()
            .and_then(|km| km.choose_server_alias(key_type, issuers))
    }

    pub fn check_server_trusted(&self, chain: &CertificateChain, auth_type: &str) -> Result<()> {
        let tm = self.trust_manager.as_ref().ok_or_else(|| {
            Error::fatal(
                AlertDescription::certificate_unknown,
                "No trust capability configured",
            )
        })?;
        tm.check_server_trusted(chain, auth_type)
            .map_err(trust_error_to_alert)
    }

    pub fn check_client_trusted(&self, chain: &CertificateChain, auth_type: &str) -> Result<()> {
        let tm = self.trust_manager.as_ref().ok_or_else(|| {
            Error::fatal(
                AlertDescription::certificate_unknown,
                "No trust capability configured",
            )
        })?;
        tm.check_client_trusted(chain, auth_type)
            .map_err(trust_error_to_alert)
    }

    pub fn notify_handshake_session(&self, session: &Arc<Session>) {
        if let Some(listener) = &self.listener {
            listener.handshake_session(session);
        }
    }

    pub fn notify_handshake_complete(&self, session: &Arc<Session>) {
        debug!(
            "Handshake complete: version {:04x} suite {:?}",
            session.protocol_version, session.cipher_suite
        );
        if let Some(listener) = &self.listener {
            listener.handshake_complete(session);
        }
    }
}

fn trust_error_to_alert(e: TrustError) -> Error {
    let description = match &e {
        TrustError::Expired => AlertDescription::certificate_expired,
        TrustError::Revoked => AlertDescription::certificate_revoked,
        TrustError::Untrusted(_) => AlertDescription::certificate_unknown,
    };
    Error::fatal(description, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingTrust;

    impl TrustManager for RejectingTrust {
        fn check_client_trusted(
            &self,
            _chain: &CertificateChain,
            _auth_type: &str,
        ) -> core::result::Result<(), TrustError> {
            Err(TrustError::Untrusted("nope".into()))
        }

        fn check_server_trusted(
            &self,
            _chain: &CertificateChain,
            _auth_type: &str,
        ) -> core::result::Result<(), TrustError> {
            Err(TrustError::Expired)
        }
    }

    #[test]
    fn trust_failures_map_to_alerts() {
        let bridge = CallbackBridge {
            key_manager: None,
            trust_manager: Some(Arc::new(RejectingTrust)),
            listener: None,
        };

        match bridge.check_server_trusted(&vec![], "RSA").unwrap_err() {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::certificate_expired)
            }
            _ => panic!("Expected alert"),
        }

        match bridge.check_client_trusted(&vec![], "RSA").unwrap_err() {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::certificate_unknown)
            }
            _ => panic!("Expected alert"),
        }
    }
}
