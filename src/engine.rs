// Non-blocking, buffer-oriented TLS engine.
//
// The engine does no I/O. The host offers inbound transport bytes to
// unwrap() and drains outbound bytes from wrap(); every would-be wait is
// a BUFFER_UNDERFLOW / BUFFER_OVERFLOW return instead of a suspension.
// A single mutex serializes all protocol advancement on one engine;
// parallelism is across engines.
//
// Failure sequencing: a fatal alert raised while unwrapping is buffered
// and that call reports {status: Ok, handshake_status: NeedWrap}. The
// next wrap drains the alert record; the stored error is only raised by
// the first wrap that finds nothing left to flush. Hosts that drain
// outbound buffers only after a successful wrap depend on this order.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, warn};

use crate::alert::AlertDescription;
use crate::client::ClientHandshake;
use crate::crypto::Crypto;
use crate::errors::{Error, Result};
use crate::handshake_summary::HandshakeSummary;
use crate::key_schedule::export_keying_material;
use crate::options::{ClientOptions, ServerOptions};
use crate::record::{Record, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH, RECORD_HEADER_SIZE};
use crate::record_layer::{InboundRecords, Message, OutboundRecords};
use crate::security_params::SecurityParameters;
use crate::server::ServerHandshake;
use crate::session::Session;

/// Host buffers sized to this always have room for one wrap call:
/// a split application record plus alert/handshake overhead.
pub const MAX_WRAP_OUTPUT: usize = MAX_PLAINTEXT_LENGTH + 1 + 2 * (RECORD_HEADER_SIZE + 1024);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// unwrap: the source does not yet hold one complete record.
    BufferUnderflow,
    /// The destination cannot hold the result. Nothing was consumed.
    BufferOverflow,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeStatus {
    NeedWrap,
    NeedUnwrap,
    /// Part of the signal vocabulary for hosts, but never produced: this
    /// engine runs trust/key decisions inline instead of delegating tasks.
    NeedTask,
    /// Returned exactly once, by the call that finished the handshake.
    Finished,
    NotHandshaking,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineResult {
    pub status: Status,
    pub handshake_status: HandshakeStatus,
    pub bytes_consumed: usize,
    pub bytes_produced: usize,
}

impl EngineResult {
    fn new(
        status: Status,
        handshake_status: HandshakeStatus,
        bytes_consumed: usize,
        bytes_produced: usize,
    ) -> Self {
        Self {
            status,
            handshake_status,
            bytes_consumed,
            bytes_produced,
        }
    }
}

enum Handshaker {
    ClientPending(Arc<ClientOptions>),
    ServerPending(Arc<ServerOptions>),
    Client(ClientHandshake),
    Server(ServerHandshake),
    Done,
}

struct EngineInner {
    crypto: Arc<dyn Crypto>,

    inbound: InboundRecords,
    outbound: OutboundRecords,

    handshaker: Handshaker,

    /// Present once the initial handshake completed.
    summary: Option<HandshakeSummary>,

    /// Completion happened but FINISHED has not been returned yet.
    finished_unreported: bool,

    /// Error whose alert is still being flushed; raised by a later wrap.
    deferred_error: Option<Error>,
}

pub struct Engine {
    inner: Mutex<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn client(options: ClientOptions) -> Result<Self> {
        validate_algorithm_lists(
            &options.supported_versions,
            options.supported_cipher_suites.len(),
        )?;
        let crypto = options.crypto.clone();
        Ok(Self {
            inner: Mutex::new(EngineInner {
                crypto,
                inbound: InboundRecords::new(),
                outbound: OutboundRecords::new(),
                handshaker: Handshaker::ClientPending(Arc::new(options)),
                summary: None,
                finished_unreported: false,
                deferred_error: None,
            }),
        })
    }

    pub fn server(options: ServerOptions) -> Result<Self> {
        validate_algorithm_lists(
            &options.supported_versions,
            options.supported_cipher_suites.len(),
        )?;
        let crypto = options.crypto.clone();
        Ok(Self {
            inner: Mutex::new(EngineInner {
                crypto,
                inbound: InboundRecords::new(),
                outbound: OutboundRecords::new(),
                handshaker: Handshaker::ServerPending(Arc::new(options)),
                summary: None,
                finished_unreported: false,
                deferred_error: None,
            }),
        })
    }

    /// Starts the initial handshake explicitly. The first wrap or unwrap
    /// does the same implicitly; calling this after the handshake has
    /// completed is the renegotiation attempt this engine rejects. The
    /// connection itself is unaffected by the rejection.
    pub fn begin_handshake(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.handshaker {
            Handshaker::Done => Err(Error::fatal(
                AlertDescription::no_renegotiation,
                "Renegotiation is not supported",
            )),
            _ => inner.ensure_started(),
        }
    }

    /// Encrypts application bytes from src into dst, or drains pending
    /// handshake/alert output. Consumes nothing on BUFFER_OVERFLOW.
    pub fn wrap(&self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        self.inner.lock().unwrap().wrap(src, dst)
    }

    /// Processes exactly one inbound record from src. Returns
    /// BUFFER_UNDERFLOW (consuming nothing) until src holds a complete
    /// record; the 5 byte header is peeked to learn the required size.
    pub fn unwrap(&self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        self.inner.lock().unwrap().unwrap(src, dst)
    }

    /// Queues a close_notify behind any pending output. No further
    /// records will be produced after it.
    pub fn close_outbound(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.outbound.is_closed() {
            inner.outbound.send_close_notify()?;
        }
        Ok(())
    }

    /// Marks the inbound side closed. If the peer's close_notify has not
    /// arrived this also initiates our own close.
    pub fn close_inbound(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.inbound.close();
        if !inner.outbound.is_closed() {
            inner.outbound.send_close_notify()?;
        }
        Ok(())
    }

    pub fn is_inbound_done(&self) -> bool {
        self.inner.lock().unwrap().inbound.is_closed()
    }

    pub fn is_outbound_done(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.outbound.is_closed() && inner.outbound.pending() == 0
    }

    /// The session of the completed handshake.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner
            .lock()
            .unwrap()
            .summary
            .as_ref()
            .map(|s| s.session.clone())
    }

    /// The in-progress session during a handshake, if one exists yet.
    pub fn handshake_session(&self) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        match &inner.handshaker {
            Handshaker::Client(h) => h.session().cloned(),
            Handshaker::Server(h) => h.session().cloned(),
            _ => None,
        }
    }

    /// Handshake-in-progress parameters if a handshake is running, else
    /// the parameters of the last completed handshake.
    pub fn security_parameters(&self) -> Option<SecurityParameters> {
        let inner = self.inner.lock().unwrap();
        match &inner.handshaker {
            Handshaker::Client(h) => Some(h.security_parameters().clone()),
            Handshaker::Server(h) => Some(h.security_parameters().clone()),
            _ => inner.summary.as_ref().map(|s| (*s.security).clone()),
        }
    }

    /// The ALPN protocol both sides agreed on.
    pub fn application_protocol(&self) -> Option<Bytes> {
        self.inner
            .lock()
            .unwrap()
            .summary
            .as_ref()
            .and_then(|s| s.selected_alpn_protocol.clone())
    }

    /// tls-unique channel binding: the first Finished message of the most
    /// recent handshake.
    pub fn tls_unique(&self) -> Result<Bytes> {
        let inner = self.inner.lock().unwrap();
        let summary = inner.completed_summary()?;
        Ok(Bytes::from(summary.security.tls_unique.clone()))
    }

    /// tls-server-end-point channel binding: hash of the server's
    /// end-entity certificate.
    pub fn tls_server_end_point(&self) -> Result<Bytes> {
        let inner = self.inner.lock().unwrap();
        let summary = inner.completed_summary()?;
        Ok(Bytes::from(summary.security.tls_server_end_point.clone()))
    }

    /// RFC 5705 exporter over the connection's master secret.
    pub fn export_keying_material(
        &self,
        label: &[u8],
        context: Option<&[u8]>,
        length: usize,
    ) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let summary = inner.completed_summary()?;
        let security = &summary.security;

        export_keying_material(
            inner.crypto.as_ref(),
            security.negotiated_version,
            security.prf_hash,
            &security.master_secret,
            label,
            &security.client_random,
            &security.server_random,
            context,
            length,
        )
    }
}

fn validate_algorithm_lists(versions: &[u16], suite_count: usize) -> Result<()> {
    if versions.is_empty() {
        return Err(Error::Config("No protocol versions enabled".into()));
    }
    if suite_count == 0 {
        return Err(Error::Config("No cipher suites enabled".into()));
    }
    Ok(())
}

impl EngineInner {
    fn completed_summary(&self) -> Result<&HandshakeSummary> {
        self.summary
            .as_ref()
            .ok_or_else(|| Error::Misuse("Handshake has not completed".into()))
    }

    /// First wrap-or-unwrap implicitly begins the handshake.
    fn ensure_started(&mut self) -> Result<()> {
        match core::mem::replace(&mut self.handshaker, Handshaker::Done) {
            Handshaker::ClientPending(options) => {
                let mut machine = ClientHandshake::new(options);
                let started = machine.start(&mut self.outbound);
                self.handshaker = Handshaker::Client(machine);
                started?;
            }
            Handshaker::ServerPending(options) => {
                self.handshaker = Handshaker::Server(ServerHandshake::new(options));
            }
            other => self.handshaker = other,
        }
        Ok(())
    }

    fn is_handshaking(&self) -> bool {
        match self.handshaker {
            Handshaker::Done => false,
            _ => true,
        }
    }

    /// Handshake status for the return value of the current call. The
    /// FINISHED transition fires on the call that both completed the
    /// handshake and drained the final flight.
    fn conclude_handshake_status(&mut self) -> HandshakeStatus {
        match &self.handshaker {
            Handshaker::Done => {
                if self.finished_unreported {
                    if self.outbound.pending() == 0 && self.deferred_error.is_none() {
                        self.finished_unreported = false;
                        HandshakeStatus::Finished
                    } else {
                        HandshakeStatus::NeedWrap
                    }
                } else {
                    HandshakeStatus::NotHandshaking
                }
            }
            _ => {
                if self.outbound.pending() > 0 {
                    HandshakeStatus::NeedWrap
                } else {
                    HandshakeStatus::NeedUnwrap
                }
            }
        }
    }

    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        // The alert for this error has been fully flushed by an earlier
        // wrap; now the failure surfaces.
        if self.deferred_error.is_some() && self.outbound.pending() == 0 {
            return Err(self.deferred_error.take().unwrap());
        }

        self.ensure_started()?;

        let mut produced = self.outbound.drain(dst);

        if self.outbound.pending() > 0 {
            // Destination exhausted before the backlog was.
            let status = if produced == 0 {
                Status::BufferOverflow
            } else {
                Status::Ok
            };
            let handshake_status = if self.deferred_error.is_some() {
                HandshakeStatus::NeedWrap
            } else {
                self.conclude_handshake_status()
            };
            return Ok(EngineResult::new(status, handshake_status, 0, produced));
        }

        if self.deferred_error.is_some() {
            // Alert flushed in full; the error raises on the next wrap.
            return Ok(EngineResult::new(
                Status::Closed,
                HandshakeStatus::NotHandshaking,
                0,
                produced,
            ));
        }

        if self.outbound.is_closed() {
            return Ok(EngineResult::new(
                Status::Closed,
                self.conclude_handshake_status(),
                0,
                produced,
            ));
        }

        if self.is_handshaking() {
            return Ok(EngineResult::new(
                Status::Ok,
                self.conclude_handshake_status(),
                0,
                produced,
            ));
        }

        // Application data phase.
        let mut consumed = 0;
        while consumed < src.len() {
            let n = core::cmp::min(src.len() - consumed, MAX_PLAINTEXT_LENGTH);
            let needed = self.outbound.max_encoded_size(n);

            if dst.len() - produced < needed {
                if consumed == 0 && produced == 0 {
                    return Ok(EngineResult::new(
                        Status::BufferOverflow,
                        HandshakeStatus::NotHandshaking,
                        0,
                        0,
                    ));
                }
                break;
            }

            self.outbound.send_application_data(&src[consumed..consumed + n])?;
            consumed += n;
            produced += self.outbound.drain(&mut dst[produced..]);
        }

        Ok(EngineResult::new(
            Status::Ok,
            self.conclude_handshake_status(),
            consumed,
            produced,
        ))
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        if self.deferred_error.is_some() {
            // An alert is waiting; keep pointing the host at wrap.
            return Ok(EngineResult::new(
                Status::Ok,
                HandshakeStatus::NeedWrap,
                0,
                0,
            ));
        }

        self.ensure_started()?;

        if self.inbound.is_closed() {
            return Ok(EngineResult::new(
                Status::Closed,
                self.conclude_handshake_status(),
                0,
                0,
            ));
        }

        // Peek the header to learn how many bytes one record needs.
        let total = match Record::peek_length(src) {
            Some(total) => total,
            None => {
                return Ok(EngineResult::new(
                    Status::BufferUnderflow,
                    self.conclude_handshake_status(),
                    0,
                    0,
                ));
            }
        };

        if total - RECORD_HEADER_SIZE > MAX_CIPHERTEXT_LENGTH {
            return self.fail_unwrap(
                Error::fatal(
                    AlertDescription::record_overflow,
                    "Record length exceeds 2^14 + 2048",
                ),
                0,
            );
        }

        if src.len() < total {
            return Ok(EngineResult::new(
                Status::BufferUnderflow,
                self.conclude_handshake_status(),
                0,
                0,
            ));
        }

        // Application data must fit the destination before any state
        // changes; ciphertext length bounds the plaintext.
        if !self.is_handshaking() && dst.len() < total - RECORD_HEADER_SIZE {
            return Ok(EngineResult::new(
                Status::BufferOverflow,
                HandshakeStatus::NotHandshaking,
                0,
                0,
            ));
        }

        let mut input = Bytes::copy_from_slice(&src[..total]);
        let record = match Record::parse(&mut input) {
            Ok(record) => record,
            Err(e) => return self.fail_unwrap(e, total),
        };

        let messages = match self.inbound.process_record(record) {
            Ok(messages) => messages,
            Err(e) => return self.fail_unwrap(e, total),
        };

        let mut produced = 0;
        for msg in messages {
            // Peer alerts are terminal on their own: nothing of ours needs
            // flushing, so no deferral applies.
            if let Message::Alert(alert) = &msg {
                if alert.description == AlertDescription::close_notify {
                    debug!("Received close_notify");
                    self.inbound.close();
                    continue;
                }
                if alert.is_fatal() {
                    self.inbound.close();
                    return Err(Error::Alert {
                        level: alert.level,
                        description: alert.description,
                        message: "Received fatal alert".into(),
                    });
                }
                warn!("Ignoring warning alert: {:?}", alert.description);
                continue;
            }

            match self.dispatch_message(msg, dst, &mut produced) {
                Ok(()) => {}
                Err(e) => return self.fail_unwrap(e, total),
            }
        }

        let status = if self.inbound.is_closed() {
            Status::Closed
        } else {
            Status::Ok
        };

        Ok(EngineResult::new(
            status,
            self.conclude_handshake_status(),
            total,
            produced,
        ))
    }

    fn dispatch_message(
        &mut self,
        msg: Message,
        dst: &mut [u8],
        produced: &mut usize,
    ) -> Result<()> {
        match msg {
            Message::Alert(_) => Err(Error::Misuse(
                "Alerts are handled before dispatch".into(),
            )),
            Message::ApplicationData(data) => {
                if self.is_handshaking() {
                    return Err(Error::fatal(
                        AlertDescription::unexpected_message,
                        "Application data during handshake",
                    ));
                }
                dst[*produced..*produced + data.len()].copy_from_slice(&data);
                *produced += data.len();
                Ok(())
            }
            Message::ChangeCipherSpec | Message::Handshake(..) => {
                let outcome = match &mut self.handshaker {
                    Handshaker::Client(machine) => {
                        machine.process(msg, &mut self.inbound, &mut self.outbound)?
                    }
                    Handshaker::Server(machine) => {
                        machine.process(msg, &mut self.inbound, &mut self.outbound)?
                    }
                    Handshaker::Done => {
                        // HelloRequest / ClientHello after completion is a
                        // renegotiation attempt.
                        return Err(Error::fatal(
                            AlertDescription::no_renegotiation,
                            "Renegotiation is not supported",
                        ));
                    }
                    _ => {
                        return Err(Error::Misuse("Handshake machine not started".into()));
                    }
                };

                if let Some(summary) = outcome {
                    self.handshaker = Handshaker::Done;
                    self.summary = Some(summary);
                    self.finished_unreported = true;
                }
                Ok(())
            }
        }
    }

    /// Deferred-exception sequencing: queue the alert, remember the
    /// error, and report {Ok, NeedWrap} so the host flushes the alert
    /// before anything raises.
    fn fail_unwrap(&mut self, e: Error, consumed: usize) -> Result<EngineResult> {
        match e.to_alert() {
            Some(alert) => {
                warn!("Failing connection: {}", e);
                let _ = self.outbound.send_alert(alert);
                self.inbound.close();
                self.deferred_error = Some(e);
                Ok(EngineResult::new(
                    Status::Ok,
                    HandshakeStatus::NeedWrap,
                    consumed,
                    0,
                ))
            }
            // Host misuse and configuration errors surface directly and
            // leave the connection alone.
            None => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::auth::KeyAlgorithm;
    use crate::cipher_suite::CipherSuite;
    use crate::options::ClientAuth;
    use crate::session_cache::SessionContext;
    use crate::testing::*;

    fn restrict(suite: CipherSuite, client: &mut ClientOptions, server: &mut ServerOptions) {
        client.supported_cipher_suites = vec![suite];
        server.supported_cipher_suites = vec![suite];
    }

    #[test]
    fn happy_path_tls12_rsa() {
        let mut client_options = test_client_options();
        let mut server_options = test_server_options();
        restrict(
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            &mut client_options,
            &mut server_options,
        );

        let client_context = client_options.session_context.clone();
        let server_context = server_options.session_context.clone();

        let client = Engine::client(client_options).unwrap();
        let server = Engine::server(server_options).unwrap();

        // Exactly one FINISHED from each side.
        assert_eq!(run_handshake(&client, &server), (1, 1));

        // 16 KiB delivered byte-identically.
        let data = vec![b'A'; 16384];
        assert_eq!(transfer(&client, &server, &data), data);
        assert_eq!(transfer(&server, &client, b"pong"), b"pong");

        // Both sides cached a session under the same 32 byte id.
        let session = client.session().unwrap();
        assert_eq!(session.id.len(), 32);
        assert_eq!(server.session().unwrap().id, session.id);
        assert!(server_context.get(&session.id).is_some());
        assert!(client_context
            .lookup_by_peer("server.test", 443)
            .is_some());

        // Channel bindings agree across the connection.
        assert_eq!(client.tls_unique().unwrap(), server.tls_unique().unwrap());
        assert_eq!(
            client.tls_server_end_point().unwrap(),
            server.tls_server_end_point().unwrap()
        );
        assert!(!client.tls_unique().unwrap().is_empty());

        // Subsequent calls are NOT_HANDSHAKING.
        let mut out = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(&[], &mut out).unwrap();
        assert_eq!(res.handshake_status, HandshakeStatus::NotHandshaking);
    }

    #[test]
    fn multi_record_transfer_is_ordered() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        run_handshake(&client, &server);

        // Forces three records and checks the byte bijection holds.
        let data: Vec<u8> = (0..40000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(transfer(&client, &server, &data), data);
    }

    #[test]
    fn ecdhe_ecdsa_with_alpn_h2() {
        let mut client_options = test_client_options();
        let mut server_options = test_server_options();
        restrict(
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            &mut client_options,
            &mut server_options,
        );

        client_options.alpn_ids = vec![
            Bytes::from_static(b"h2"),
            Bytes::from_static(b"http/1.1"),
        ];
        server_options.alpn_ids = vec![Bytes::from_static(b"h2")];

        let client = Engine::client(client_options).unwrap();
        let server = Engine::server(server_options).unwrap();
        assert_eq!(run_handshake(&client, &server), (1, 1));

        assert_eq!(
            client.application_protocol(),
            Some(Bytes::from_static(b"h2"))
        );
        assert_eq!(
            server.application_protocol(),
            Some(Bytes::from_static(b"h2"))
        );
    }

    #[test]
    fn resumption_abbreviates_the_handshake() {
        use std::sync::Arc;
        use crate::session_cache::SessionContext as Ctx;

        let client_context = Arc::new(Ctx::new());
        let server_context = Arc::new(SessionContext::new());
        let client_crypto = Arc::new(TestCrypto::new());
        let server_crypto = Arc::new(TestCrypto::new());
        let trust = Arc::new(TestTrustManager::allow_all());
        let key_manager = Arc::new(TestKeyManager::with_identity(
            KeyAlgorithm::Rsa,
            "rsa-identity",
        ));

        let make_client = || {
            let mut o = ClientOptions::recommended(client_crypto.clone(), trust.clone());
            o.hostname = "server.test".to_string();
            o.peer_port = 443;
            o.session_context = client_context.clone();
            o
        };
        let make_server = || {
            let mut o = ServerOptions::recommended(server_crypto.clone(), key_manager.clone());
            o.session_context = server_context.clone();
            o
        };

        let client1 = Engine::client(make_client()).unwrap();
        let server1 = Engine::server(make_server()).unwrap();
        assert_eq!(run_handshake(&client1, &server1), (1, 1));
        let first_session = client1.session().unwrap();
        assert_eq!(trust.server_checks.load(Ordering::SeqCst), 1);

        let client2 = Engine::client(make_client()).unwrap();
        let server2 = Engine::server(make_server()).unwrap();
        assert_eq!(run_handshake(&client2, &server2), (1, 1));

        // The cached session object itself was reused on the client...
        let second_session = client2.session().unwrap();
        assert!(Arc::ptr_eq(&first_session, &second_session));
        assert_eq!(server2.session().unwrap().id, first_session.id);

        // ...and no Certificate message flowed: the trust capability was
        // never consulted again.
        assert_eq!(trust.server_checks.load(Ordering::SeqCst), 1);

        // Application traffic works over the resumed parameters.
        assert_eq!(transfer(&client2, &server2, b"again"), b"again");

        // Exporters on both ends of the resumed connection agree.
        let label = b"EXPORTER-test";
        assert_eq!(
            client2.export_keying_material(label, None, 32).unwrap(),
            server2.export_keying_material(label, None, 32).unwrap()
        );
    }

    #[test]
    fn close_notify_after_pending_data() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        run_handshake(&client, &server);

        // The server queues 500 bytes and then closes; the data must be
        // delivered before the close_notify.
        let data = vec![b'x'; 500];
        let mut wire = vec![0u8; MAX_WRAP_OUTPUT];
        let res = server.wrap(&data, &mut wire).unwrap();
        assert_eq!(res.bytes_consumed, 500);
        let mut wire_len = res.bytes_produced;

        server.close_outbound().unwrap();
        assert!(!server.is_outbound_done());

        let res = server.wrap(&[], &mut wire[wire_len..]).unwrap();
        assert_eq!(res.status, Status::Closed);
        wire_len += res.bytes_produced;
        assert!(server.is_outbound_done());

        // Client sees the data first, then CLOSED.
        let mut dst = vec![0u8; 1 << 15];
        let res = client.unwrap(&wire[..wire_len], &mut dst).unwrap();
        assert_eq!(res.status, Status::Ok);
        assert_eq!(&dst[..res.bytes_produced], &data[..]);
        let consumed = res.bytes_consumed;

        let res = client
            .unwrap(&wire[consumed..wire_len], &mut dst)
            .unwrap();
        assert_eq!(res.status, Status::Closed);
        assert_eq!(res.bytes_produced, 0);
        assert!(client.is_inbound_done());
    }

    #[test]
    fn tampered_record_raises_after_alert_flush() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        run_handshake(&client, &server);

        let mut wire = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(b"attack at dawn", &mut wire).unwrap();
        let wire_len = res.bytes_produced;

        // Flip one ciphertext bit in flight.
        wire[RECORD_HEADER_SIZE + 3] ^= 1;

        // The failing unwrap buffers a fatal alert and defers the error.
        let mut dst = vec![0u8; 1 << 15];
        let res = server.unwrap(&wire[..wire_len], &mut dst).unwrap();
        assert_eq!(res.status, Status::Ok);
        assert_eq!(res.handshake_status, HandshakeStatus::NeedWrap);
        assert_eq!(res.bytes_produced, 0);

        // First wrap flushes the bad_record_mac alert...
        let mut alert_bytes = vec![0u8; MAX_WRAP_OUTPUT];
        let res = server.wrap(&[], &mut alert_bytes).unwrap();
        assert!(res.bytes_produced > 0);
        let alert_len = res.bytes_produced;

        // ...and the next wrap raises.
        let err = server.wrap(&[], &mut alert_bytes[alert_len..]).unwrap_err();
        match err {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::bad_record_mac)
            }
            other => panic!("Unexpected error: {:?}", other),
        }

        // The peer sees the fatal alert as a hard failure.
        let mut dst = vec![0u8; 1 << 15];
        let err = client.unwrap(&alert_bytes[..alert_len], &mut dst).unwrap_err();
        match err {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::bad_record_mac)
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn renegotiation_attempt_is_rejected() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        run_handshake(&client, &server);

        let err = client.begin_handshake().unwrap_err();
        match err {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::no_renegotiation)
            }
            other => panic!("Unexpected error: {:?}", other),
        }

        // The connection is untouched and still moves data.
        assert_eq!(transfer(&client, &server, b"still alive"), b"still alive");
    }

    #[test]
    fn unwrap_needs_a_complete_record() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();

        // Produce the ClientHello flight.
        let mut wire = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(&[], &mut wire).unwrap();
        let wire_len = res.bytes_produced;
        assert!(wire_len > RECORD_HEADER_SIZE);

        let mut dst = vec![0u8; 1 << 15];

        // Less than a header.
        let res = server.unwrap(&wire[..3], &mut dst).unwrap();
        assert_eq!(res.status, Status::BufferUnderflow);
        assert_eq!(res.bytes_consumed, 0);

        // A header but a truncated body.
        let res = server.unwrap(&wire[..wire_len - 1], &mut dst).unwrap();
        assert_eq!(res.status, Status::BufferUnderflow);
        assert_eq!(res.bytes_consumed, 0);

        // The whole record goes through.
        let res = server.unwrap(&wire[..wire_len], &mut dst).unwrap();
        assert_eq!(res.status, Status::Ok);
        assert_eq!(res.bytes_consumed, wire_len);
    }

    #[test]
    fn wrap_reports_overflow_without_consuming() {
        let client = Engine::client(test_client_options()).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        run_handshake(&client, &server);

        let mut tiny = [0u8; 16];
        let res = client.wrap(b"application data", &mut tiny).unwrap();
        assert_eq!(res.status, Status::BufferOverflow);
        assert_eq!(res.bytes_consumed, 0);
        assert_eq!(res.bytes_produced, 0);

        // Unwrap with an undersized application buffer also refuses
        // without consuming the record.
        let mut wire = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(b"application data", &mut wire).unwrap();
        let wire_len = res.bytes_produced;

        let mut small = [0u8; 4];
        let res = server.unwrap(&wire[..wire_len], &mut small).unwrap();
        assert_eq!(res.status, Status::BufferOverflow);
        assert_eq!(res.bytes_consumed, 0);

        let mut dst = vec![0u8; 1 << 15];
        let res = server.unwrap(&wire[..wire_len], &mut dst).unwrap();
        assert_eq!(res.status, Status::Ok);
        assert_eq!(&dst[..res.bytes_produced], b"application data");
    }

    #[test]
    fn client_authentication_under_need_policy() {
        let mut client_options = test_client_options();
        client_options.key_manager = Some(std::sync::Arc::new(
            TestKeyManager::with_identity(KeyAlgorithm::Rsa, "client-identity"),
        ));

        let mut server_options = test_server_options();
        server_options.client_auth = ClientAuth::Need;
        let trust = std::sync::Arc::new(TestTrustManager::allow_all());
        server_options.trust_manager = Some(trust.clone());

        let client = Engine::client(client_options).unwrap();
        let server = Engine::server(server_options).unwrap();
        assert_eq!(run_handshake(&client, &server), (1, 1));

        // The server validated the client chain and recorded it.
        assert_eq!(trust.client_checks.load(Ordering::SeqCst), 1);
        assert!(server.session().unwrap().peer_certificate.is_some());
        assert_eq!(transfer(&client, &server, b"hi"), b"hi");
    }

    #[test]
    fn listener_sees_session_then_completion() {
        let listener = std::sync::Arc::new(RecordingListener::new());

        let mut client_options = test_client_options();
        client_options.listener = Some(listener.clone());

        let client = Engine::client(client_options).unwrap();
        let server = Engine::server(test_server_options()).unwrap();
        assert_eq!(run_handshake(&client, &server), (1, 1));

        assert_eq!(listener.sessions_seen.load(Ordering::SeqCst), 1);
        assert_eq!(listener.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untrusted_server_fails_with_certificate_alert() {
        use crate::auth::TrustError;
        use std::sync::Arc;

        let mut client_options = test_client_options();
        client_options.trust_manager = Some(Arc::new(TestTrustManager::rejecting(|| {
            TrustError::Expired
        })));

        let client = Engine::client(client_options).unwrap();
        let server = Engine::server(test_server_options()).unwrap();

        // Client flight out, server flight back.
        let mut c2s = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(&[], &mut c2s).unwrap();
        let c2s_len = res.bytes_produced;

        let mut dst = vec![0u8; 1 << 15];
        let res = server.unwrap(&c2s[..c2s_len], &mut dst).unwrap();
        assert_eq!(res.bytes_consumed, c2s_len);

        let mut s2c = vec![0u8; MAX_WRAP_OUTPUT];
        let res = server.wrap(&[], &mut s2c).unwrap();
        let mut remaining = &s2c[..res.bytes_produced];

        // Client accepts the ServerHello but rejects the Certificate;
        // the alert is deferred so unwrap itself stays Ok.
        loop {
            let res = client.unwrap(remaining, &mut dst).unwrap();
            if res.bytes_consumed == 0 {
                assert_eq!(res.handshake_status, HandshakeStatus::NeedWrap);
                break;
            }
            remaining = &remaining[res.bytes_consumed..];
        }

        // Alert flushes first, then the error surfaces.
        let mut out = vec![0u8; MAX_WRAP_OUTPUT];
        let res = client.wrap(&[], &mut out).unwrap();
        assert!(res.bytes_produced > 0);

        match client.wrap(&[], &mut out).unwrap_err() {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::certificate_expired)
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn channel_bindings_require_completion() {
        let client = Engine::client(test_client_options()).unwrap();
        assert!(client.tls_unique().is_err());
        assert!(client.tls_server_end_point().is_err());
        assert!(client.export_keying_material(b"EXPORTER-x", None, 16).is_err());
    }

    #[test]
    fn empty_configuration_is_rejected() {
        let mut options = test_client_options();
        options.supported_versions.clear();
        match Engine::client(options).unwrap_err() {
            Error::Config(_) => {}
            other => panic!("Unexpected error: {:?}", other),
        }
    }
}
