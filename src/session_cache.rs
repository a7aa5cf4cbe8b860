// Shared session store for one TLS configuration.
//
// Identifier-keyed with a bounded capacity and a TTL. Expiry is lazy:
// entries past the timeout are simply never returned and are removed when
// encountered. Eviction under capacity pressure removes the least
// recently accessed live entry. All of it sits behind one lock; the
// per-session value maps have their own locks so listener callbacks can
// re-enter sessions freely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::session::Session;

pub const DEFAULT_CACHE_SIZE: usize = 20480;
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 86400;

struct Entry {
    session: Arc<Session>,
    last_accessed: DateTime<Utc>,
}

struct State {
    sessions: HashMap<Bytes, Entry>,
    /// Secondary index so a client can find the session to offer for a
    /// given endpoint.
    by_peer: HashMap<(String, u16), Bytes>,
    /// 0 means unbounded.
    capacity: usize,
    timeout: Duration,
}

pub struct SessionContext {
    state: Mutex<State>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CACHE_SIZE, DEFAULT_TIMEOUT_SECONDS)
    }

    pub fn with_limits(capacity: usize, timeout_seconds: i64) -> Self {
        Self {
            state: Mutex::new(State {
                sessions: HashMap::new(),
                by_peer: HashMap::new(),
                capacity,
                timeout: Duration::seconds(timeout_seconds),
            }),
        }
    }

    pub fn get(&self, id: &[u8]) -> Option<Arc<Session>> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: &[u8], now: DateTime<Utc>) -> Option<Arc<Session>> {
        let mut state = self.state.lock().unwrap();
        let timeout = state.timeout;

        let mut expired = false;
        let mut found = None;

        if let Some(entry) = state.sessions.get_mut(id) {
            if now - entry.last_accessed > timeout || entry.session.is_invalidated() {
                expired = true;
            } else {
                // Monotonic touch: a clock stepping backwards must not
                // rejuvenate the entry.
                if now > entry.last_accessed {
                    entry.last_accessed = now;
                }
                found = Some(entry.session.clone());
            }
        }

        if expired {
            Self::remove_locked(&mut state, id);
        }
        found
    }

    pub fn put(&self, session: Arc<Session>) {
        self.put_at(session, Utc::now())
    }

    fn put_at(&self, session: Arc<Session>, now: DateTime<Utc>) {
        if session.id.is_empty() {
            return;
        }

        let mut state = self.state.lock().unwrap();

        // Lazily drop expired entries before measuring occupancy.
        let timeout = state.timeout;
        let expired: Vec<Bytes> = state
            .sessions
            .iter()
            .filter(|(_, e)| now - e.last_accessed > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            Self::remove_locked(&mut state, &id);
        }

        while state.capacity != 0
            && state.sessions.len() >= state.capacity
            && !state.sessions.contains_key(&session.id)
        {
            let lru = state
                .sessions
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(id, _)| id.clone());
            match lru {
                Some(id) => Self::remove_locked(&mut state, &id),
                None => break,
            }
        }

        if !session.peer_host.is_empty() {
            state.by_peer.insert(
                (session.peer_host.clone(), session.peer_port),
                session.id.clone(),
            );
        }
        state.sessions.insert(
            session.id.clone(),
            Entry {
                session,
                last_accessed: now,
            },
        );
    }

    /// The resumable session last stored for this endpoint, if any.
    pub fn lookup_by_peer(&self, host: &str, port: u16) -> Option<Arc<Session>> {
        let id = {
            let state = self.state.lock().unwrap();
            state.by_peer.get(&(host.to_string(), port))?.clone()
        };
        self.get(&id)
    }

    /// Idempotent. The session never again appears in lookups; handshakes
    /// that already obtained it may still complete resumption.
    pub fn invalidate(&self, id: &[u8]) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.sessions.get(id) {
            entry.session.invalidate();
        }
        Self::remove_locked(&mut state, id);
    }

    pub fn set_cache_size(&self, capacity: usize) {
        let mut state = self.state.lock().unwrap();
        state.capacity = capacity;

        while capacity != 0 && state.sessions.len() > capacity {
            let lru = state
                .sessions
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(id, _)| id.clone());
            match lru {
                Some(id) => Self::remove_locked(&mut state, &id),
                None => break,
            }
        }
    }

    pub fn set_timeout(&self, timeout_seconds: i64) {
        self.state.lock().unwrap().timeout = Duration::seconds(timeout_seconds);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    fn remove_locked(state: &mut State, id: &[u8]) {
        if let Some(entry) = state.sessions.remove(id) {
            let key = (
                entry.session.peer_host.clone(),
                entry.session.peer_port,
            );
            if state.by_peer.get(&key).map(|v| &v[..]) == Some(id) {
                state.by_peer.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::CipherSuite;
    use crate::handshake::TLS_1_2_VERSION;

    fn session(id: &[u8], host: &str) -> Arc<Session> {
        Arc::new(Session::new(
            Bytes::from(id.to_vec()),
            TLS_1_2_VERSION,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            vec![1u8; 48],
            true,
            None,
            None,
            host.to_string(),
            443,
        ))
    }

    #[test]
    fn put_get_roundtrip() {
        let context = SessionContext::new();
        let s = session(b"alpha", "a.example");
        context.put(s.clone());

        let found = context.get(b"alpha").unwrap();
        assert!(Arc::ptr_eq(&found, &s));
        assert!(context.get(b"beta").is_none());
    }

    #[test]
    fn sessions_without_id_are_not_cached() {
        let context = SessionContext::new();
        context.put(session(b"", "a.example"));
        assert_eq!(context.len(), 0);
    }

    #[test]
    fn invalidation_is_permanent_and_idempotent() {
        let context = SessionContext::new();
        let s = session(b"alpha", "a.example");
        context.put(s.clone());

        context.invalidate(b"alpha");
        context.invalidate(b"alpha");

        assert!(context.get(b"alpha").is_none());
        assert!(s.is_invalidated());

        // A handshake holding the Arc may still read the secret.
        assert_eq!(s.master_secret().len(), 48);
    }

    #[test]
    fn lru_eviction_under_capacity() {
        let context = SessionContext::with_limits(2, 3600);

        let now = Utc::now();
        context.put_at(session(b"a", "a.example"), now);
        context.put_at(session(b"b", "b.example"), now + Duration::seconds(1));

        // Touch "a" so "b" becomes least recently used.
        assert!(context
            .get_at(b"a", now + Duration::seconds(2))
            .is_some());

        context.put_at(session(b"c", "c.example"), now + Duration::seconds(3));
        assert_eq!(context.len(), 2);
        assert!(context.get_at(b"b", now + Duration::seconds(4)).is_none());
        assert!(context.get_at(b"a", now + Duration::seconds(4)).is_some());
        assert!(context.get_at(b"c", now + Duration::seconds(4)).is_some());
    }

    #[test]
    fn capacity_zero_is_unbounded() {
        let context = SessionContext::with_limits(0, 3600);
        for i in 0..100u8 {
            context.put(session(&[i], "h.example"));
        }
        assert_eq!(context.len(), 100);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let context = SessionContext::with_limits(10, 10);

        let now = Utc::now();
        context.put_at(session(b"a", "a.example"), now);

        assert!(context.get_at(b"a", now + Duration::seconds(5)).is_some());
        assert!(context.get_at(b"a", now + Duration::seconds(30)).is_none());
        // Lazy removal happened.
        assert_eq!(context.len(), 0);
    }

    #[test]
    fn access_time_is_monotonic() {
        let context = SessionContext::with_limits(10, 10);

        let now = Utc::now();
        context.put_at(session(b"a", "a.example"), now);

        // A badly stepped clock must not rejuvenate the entry: accessing
        // "in the past" keeps the newest timestamp.
        assert!(context.get_at(b"a", now - Duration::seconds(60)).is_some());
        assert!(context.get_at(b"a", now + Duration::seconds(9)).is_some());
    }

    #[test]
    fn peer_index_finds_latest_session() {
        let context = SessionContext::new();
        context.put(session(b"one", "host.example"));
        context.put(session(b"two", "host.example"));

        let found = context.lookup_by_peer("host.example", 443).unwrap();
        assert_eq!(&found.id[..], b"two");
        assert!(context.lookup_by_peer("other.example", 443).is_none());
    }

    #[test]
    fn shrinking_cache_size_evicts() {
        let context = SessionContext::with_limits(10, 3600);
        let now = Utc::now();
        for (i, id) in [b"a", b"b", b"c"].iter().enumerate() {
            context.put_at(
                session(&id[..], "h.example"),
                now + Duration::seconds(i as i64),
            );
        }

        context.set_cache_size(1);
        assert_eq!(context.len(), 1);
        assert!(context.get_at(b"c", now + Duration::seconds(10)).is_some());
    }
}
