// Resumable TLS sessions.
//
// A session freezes the parameters of one completed handshake. The engine
// treats it as immutable except for invalidation and the host-visible
// binding-value map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::auth::CertificateChain;
use crate::cipher_suite::CipherSuite;
use crate::handshake::ProtocolVersion;

/// Opaque values the host attaches to a session. Implementors that care
/// about their binding lifecycle override the notification hooks.
pub trait SessionValue: Send + Sync {
    fn value_bound(&self, _name: &str) {}
    fn value_unbound(&self, _name: &str) {}
}

pub struct Session {
    /// 0-32 bytes. Empty means the server refused to cache the session.
    pub id: Bytes,
    pub protocol_version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub extended_master_secret: bool,
    pub peer_certificate: Option<CertificateChain>,
    pub local_certificate: Option<CertificateChain>,
    pub creation_time: DateTime<Utc>,

    /// Where the peer lives, recorded so a client only offers this session
    /// back to the same endpoint.
    pub peer_host: String,
    pub peer_port: u16,

    master_secret: Vec<u8>,

    invalidated: AtomicBool,

    values: Mutex<HashMap<String, Arc<dyn SessionValue>>>,
}

impl Session {
    pub fn new(
        id: Bytes,
        protocol_version: ProtocolVersion,
        cipher_suite: CipherSuite,
        master_secret: Vec<u8>,
        extended_master_secret: bool,
        peer_certificate: Option<CertificateChain>,
        local_certificate: Option<CertificateChain>,
        peer_host: String,
        peer_port: u16,
    ) -> Self {
        Self {
            id,
            protocol_version,
            cipher_suite,
            extended_master_secret,
            peer_certificate,
            local_certificate,
            creation_time: Utc::now(),
            peer_host,
            peer_port,
            master_secret,
            invalidated: AtomicBool::new(false),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    /// A session can drive an abbreviated handshake iff it has an id and
    /// has not been invalidated.
    pub fn is_resumable(&self) -> bool {
        !self.id.is_empty() && !self.is_invalidated()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Idempotent. Handshakes that already picked the session up may still
    /// finish resuming; it just never appears in lookups again.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Binds a value under a name. The displaced value (if any) gets its
    /// unbind notification before the new value's bind notification, and
    /// both fire outside the map lock so listeners may call back into the
    /// session.
    pub fn put_value(&self, name: &str, value: Arc<dyn SessionValue>) {
        let old = {
            let mut values = self.values.lock().unwrap();
            values.insert(name.to_string(), value.clone())
        };

        if let Some(old) = old {
            old.value_unbound(name);
        }
        value.value_bound(name);
    }

    pub fn get_value(&self, name: &str) -> Option<Arc<dyn SessionValue>> {
        self.values.lock().unwrap().get(name).cloned()
    }

    pub fn remove_value(&self, name: &str) {
        let old = {
            let mut values = self.values.lock().unwrap();
            values.remove(name)
        };

        if let Some(old) = old {
            old.value_unbound(name);
        }
    }

    pub fn value_names(&self) -> Vec<String> {
        self.values.lock().unwrap().keys().cloned().collect()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for b in self.master_secret.iter_mut() {
            *b = 0;
        }
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("protocol_version", &self.protocol_version)
            .field("cipher_suite", &self.cipher_suite)
            .field("peer_host", &self.peer_host)
            .field("peer_port", &self.peer_port)
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn sample_session(id: &'static [u8]) -> Session {
        Session::new(
            Bytes::from_static(id),
            crate::handshake::TLS_1_2_VERSION,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            vec![3u8; 48],
            true,
            None,
            None,
            "example.com".to_string(),
            443,
        )
    }

    struct CountingValue {
        // bind count minus unbind count
        balance: AtomicI32,
    }

    impl SessionValue for CountingValue {
        fn value_bound(&self, _name: &str) {
            self.balance.fetch_add(1, Ordering::SeqCst);
        }
        fn value_unbound(&self, _name: &str) {
            self.balance.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn resumable_until_invalidated() {
        let session = sample_session(b"0123456789abcdef0123456789abcdef");
        assert!(session.is_resumable());

        session.invalidate();
        assert!(!session.is_resumable());

        // Idempotent.
        session.invalidate();
        assert!(session.is_invalidated());
    }

    #[test]
    fn empty_id_is_not_resumable() {
        let session = sample_session(b"");
        assert!(!session.is_resumable());
    }

    #[test]
    fn bind_unbind_balance() {
        let session = sample_session(b"id");
        let a = Arc::new(CountingValue {
            balance: AtomicI32::new(0),
        });
        let b = Arc::new(CountingValue {
            balance: AtomicI32::new(0),
        });

        session.put_value("k", a.clone());
        assert_eq!(a.balance.load(Ordering::SeqCst), 1);

        // Replacing fires unbind on the old value before bind on the new.
        session.put_value("k", b.clone());
        assert_eq!(a.balance.load(Ordering::SeqCst), 0);
        assert_eq!(b.balance.load(Ordering::SeqCst), 1);

        session.remove_value("k");
        assert_eq!(b.balance.load(Ordering::SeqCst), 0);
        assert!(session.get_value("k").is_none());
    }

    #[test]
    fn listener_may_reenter_session() {
        struct Reentrant {
            session: Mutex<Option<Arc<Session>>>,
        }
        impl SessionValue for Reentrant {
            fn value_bound(&self, name: &str) {
                // Would deadlock if notifications fired under the map lock.
                if let Some(session) = self.session.lock().unwrap().as_ref() {
                    let _ = session.get_value(name);
                }
            }
        }

        let session = Arc::new(sample_session(b"id"));
        let value = Arc::new(Reentrant {
            session: Mutex::new(Some(session.clone())),
        });
        session.put_value("k", value);
        assert!(session.get_value("k").is_some());
    }
}
