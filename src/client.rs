// Client side of the handshake.
//
// The machine advances on each inbound message; any message outside the
// current state's permitted set is a fatal unexpected_message. Happy
// paths:
//
// full:    WaitServerHello -> WaitCertificate -> WaitServerKeyExchange?
//          -> WaitServerHelloDone -> (client flight) -> WaitChangeCipherSpec
//          -> WaitFinished -> Complete
// resumed: WaitServerHello -> WaitChangeCipherSpec -> WaitFinished
//          (server Finished first, then our flight) -> Complete

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};

use crate::alert::AlertDescription;
use crate::auth::{CertificateChain, KeyAlgorithm, PrivateKey};
use crate::callbacks::CallbackBridge;
use crate::cipher_suite::{CipherSuite, CipherSuiteParts};
use crate::constant_eq;
use crate::errors::{Error, Result};
use crate::extensions::*;
use crate::handshake::*;
use crate::handshake_summary::HandshakeSummary;
use crate::key_schedule::*;
use crate::key_schedule_helper::KeyScheduleHelper;
use crate::options::ClientOptions;
use crate::record_layer::{InboundRecords, Message, OutboundRecords};
use crate::security_params::{Entity, SecurityParameters};
use crate::session::Session;
use crate::transcript::Transcript;

enum ClientState {
    WaitServerHello,
    WaitCertificate,
    WaitServerKeyExchange,
    WaitServerHelloDone,
    WaitChangeCipherSpec,
    WaitFinished,
    Complete,
}

pub(crate) struct ClientHandshake {
    options: Arc<ClientOptions>,
    bridge: CallbackBridge,

    state: ClientState,
    transcript: Transcript,
    params: SecurityParameters,
    parts: Option<CipherSuiteParts>,

    /// Session offered for resumption in our ClientHello.
    offered_session: Option<Arc<Session>>,
    resumed: bool,

    /// Session id the server assigned to a fresh handshake.
    new_session_id: Bytes,

    certificate_request: Option<CertificateRequest>,
    server_key_exchange: Option<DecodedServerKeyExchange>,

    /// Identity presented to the server when client auth was requested.
    client_private_key: Option<Arc<PrivateKey>>,
    sent_client_certificate: bool,

    selected_alpn_protocol: Option<Bytes>,

    session: Option<Arc<Session>>,
}

impl ClientHandshake {
    pub fn new(options: Arc<ClientOptions>) -> Self {
        let bridge = CallbackBridge {
            key_manager: options.key_manager.clone(),
            trust_manager: options.trust_manager.clone(),
            listener: options.listener.clone(),
        };

        Self {
            options,
            bridge,
            state: ClientState::WaitServerHello,
            transcript: Transcript::new(),
            params: SecurityParameters::new(Entity::Client),
            parts: None,
            offered_session: None,
            resumed: false,
            new_session_id: Bytes::new(),
            certificate_request: None,
            server_key_exchange: None,
            client_private_key: None,
            sent_client_certificate: false,
            selected_alpn_protocol: None,
            session: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ClientState::Complete)
    }

    pub fn security_parameters(&self) -> &SecurityParameters {
        &self.params
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Emits the ClientHello.
    pub fn start(&mut self, outbound: &mut OutboundRecords) -> Result<()> {
        let crypto = self.options.crypto.clone();

        let mut random = [0u8; RANDOM_LENGTH];
        crypto.random_bytes(&mut random)?;
        self.params.client_random = random;

        // Only offer a cached session negotiated with this exact endpoint.
        let offered = if self.options.hostname.is_empty() {
            None
        } else {
            self.options
                .session_context
                .lookup_by_peer(&self.options.hostname, self.options.peer_port)
                .filter(|s| {
                    s.is_resumable()
                        && self.options.supported_versions.contains(&s.protocol_version)
                        && self
                            .options
                            .supported_cipher_suites
                            .contains(&s.cipher_suite)
                })
        };

        let session_id = offered
            .as_ref()
            .map(|s| s.id.clone())
            .unwrap_or_else(Bytes::new);
        self.offered_session = offered;

        let max_version = self.options.max_version();

        let mut extensions = vec![];

        if !self.options.hostname.is_empty() {
            extensions.push(Extension::ServerName(Some(ServerNameList::single_host(
                &self.options.hostname,
            ))));
        }

        // First handshake secure renegotiation signal (RFC 5746). The SCSV
        // below carries the same meaning for intolerant servers.
        extensions.push(Extension::RenegotiationInfo(RenegotiationInfo::initial()));

        extensions.push(Extension::SupportedGroups(NamedGroupList {
            groups: self.options.supported_groups.clone(),
        }));
        extensions.push(Extension::SupportedPointFormats(
            ECPointFormatList::uncompressed_only(),
        ));

        if max_version >= TLS_1_2_VERSION {
            extensions.push(Extension::SignatureAlgorithms(SignatureSchemeList {
                algorithms: self.options.supported_signature_algorithms.clone(),
            }));
        }

        if self.options.extended_master_secret {
            extensions.push(Extension::ExtendedMasterSecret);
        }

        if !self.options.alpn_ids.is_empty() {
            extensions.push(Extension::ALPN(ProtocolNameList {
                names: self.options.alpn_ids.clone(),
            }));
        }

        let mut cipher_suites = self.options.supported_cipher_suites.clone();
        cipher_suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);

        let client_hello = ClientHello {
            client_version: max_version,
            random: Bytes::from(random.to_vec()),
            session_id,
            cipher_suites,
            compression_methods: Bytes::from_static(&[0]),
            extensions,
        };

        debug!(
            "Sending ClientHello (offering resumption: {})",
            self.offered_session.is_some()
        );

        outbound.send_handshake(
            &Handshake::ClientHello(client_hello),
            Some(&mut self.transcript),
        )
    }

    /// Feeds one record layer message into the machine. Returns the
    /// summary once the handshake completes.
    pub fn process(
        &mut self,
        msg: Message,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<Option<HandshakeSummary>> {
        match msg {
            Message::ChangeCipherSpec => {
                match self.state {
                    ClientState::WaitChangeCipherSpec => {}
                    _ => {
                        return Err(Error::fatal(
                            AlertDescription::unexpected_message,
                            "ChangeCipherSpec at the wrong time",
                        ));
                    }
                }
                inbound.promote_cipher()?;
                self.state = ClientState::WaitFinished;
                Ok(None)
            }
            Message::Handshake(handshake, raw) => self.process_handshake(handshake, raw, inbound, outbound),
            Message::ApplicationData(_) => Err(Error::fatal(
                AlertDescription::unexpected_message,
                "Application data during handshake",
            )),
            Message::Alert(_) => Err(Error::Misuse(
                "Alerts are handled by the engine".into(),
            )),
        }
    }

    fn process_handshake(
        &mut self,
        handshake: Handshake,
        raw: Bytes,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<Option<HandshakeSummary>> {
        match (&self.state, handshake) {
            (ClientState::WaitServerHello, Handshake::ServerHello(hello)) => {
                self.transcript.push(raw);
                self.on_server_hello(hello, inbound, outbound)?;
                Ok(None)
            }
            (ClientState::WaitCertificate, Handshake::Certificate(cert)) => {
                self.transcript.push(raw);
                self.on_certificate(cert)?;
                Ok(None)
            }
            (ClientState::WaitServerKeyExchange, Handshake::ServerKeyExchange(ske)) => {
                self.transcript.push(raw);
                self.on_server_key_exchange(ske)?;
                Ok(None)
            }
            (ClientState::WaitServerHelloDone, Handshake::CertificateRequest(req)) => {
                if self.certificate_request.is_some() {
                    return Err(Error::fatal(
                        AlertDescription::unexpected_message,
                        "Duplicate CertificateRequest",
                    ));
                }
                self.transcript.push(raw);
                self.certificate_request = Some(req);
                Ok(None)
            }
            (ClientState::WaitServerHelloDone, Handshake::ServerHelloDone) => {
                self.transcript.push(raw);
                self.send_client_flight(inbound, outbound)?;
                Ok(None)
            }
            (ClientState::WaitFinished, Handshake::Finished(finished)) => {
                self.on_finished(finished, raw, outbound)
            }
            (_, msg) => Err(Error::fatal(
                AlertDescription::unexpected_message,
                format!("Unexpected handshake message {:?}", msg.typ()),
            )),
        }
    }

    fn on_server_hello(
        &mut self,
        hello: ServerHello,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        if !self.options.supported_versions.contains(&hello.server_version)
            || hello.server_version > self.options.max_version()
        {
            return Err(Error::fatal(
                AlertDescription::protocol_version,
                "Server selected an unsupported version",
            ));
        }

        if hello.compression_method != 0 {
            return Err(Error::fatal(
                AlertDescription::illegal_parameter,
                "Compression is never negotiated",
            ));
        }

        if !self
            .options
            .supported_cipher_suites
            .contains(&hello.cipher_suite)
            || !hello.cipher_suite.usable_with_version(hello.server_version)
        {
            return Err(Error::fatal(
                AlertDescription::illegal_parameter,
                "Server selected a suite we didn't offer",
            ));
        }

        let parts = hello.cipher_suite.decode()?;

        self.params
            .server_random
            .copy_from_slice(&hello.random);
        self.params.negotiated_version = hello.server_version;
        self.params.cipher_suite = hello.cipher_suite;
        self.params.prf_hash = parts.prf_hash;
        self.parts = Some(parts);

        outbound.set_negotiated_version(hello.server_version);
        inbound.protocol_version = hello.server_version;

        if let Some(info) = find_renegotiation_info(&hello.extensions) {
            if !info.renegotiated_connection.is_empty() {
                return Err(Error::fatal(
                    AlertDescription::handshake_failure,
                    "Non-empty renegotiation_info on initial handshake",
                ));
            }
            self.params.secure_renegotiation = true;
        }

        if has_extended_master_secret(&hello.extensions) {
            if !self.options.extended_master_secret {
                return Err(Error::fatal(
                    AlertDescription::unsupported_extension,
                    "Server acknowledged an extension we didn't offer",
                ));
            }
            self.params.extended_master_secret = true;
        }

        if let Some(alpn) = find_alpn(&hello.extensions) {
            if alpn.names.len() != 1 || !self.options.alpn_ids.contains(&alpn.names[0]) {
                return Err(Error::fatal(
                    AlertDescription::no_application_protocol,
                    "Server selected a protocol we didn't offer",
                ));
            }
            self.selected_alpn_protocol = Some(alpn.names[0].clone());
        }

        // Resumption: the server echoed the id we offered.
        let offered = self.offered_session.take();
        if let Some(session) = offered {
            if !hello.session_id.is_empty() && hello.session_id == session.id {
                if session.protocol_version != hello.server_version
                    || session.cipher_suite != hello.cipher_suite
                {
                    return Err(Error::fatal(
                        AlertDescription::illegal_parameter,
                        "Resumed session with different parameters",
                    ));
                }

                debug!("Resuming session");
                self.resumed = true;
                self.params.master_secret = session.master_secret().to_vec();
                self.params.extended_master_secret = session.extended_master_secret;
                self.params.peer_certificate = session.peer_certificate.clone();
                self.params.local_certificate = session.local_certificate.clone();

                let parts = self.parts.as_ref().unwrap();
                KeyScheduleHelper::stage_ciphers(
                    &self.options.crypto,
                    Entity::Client,
                    self.params.negotiated_version,
                    self.params.cipher_suite,
                    parts,
                    &self.params.master_secret,
                    &self.params.client_random,
                    &self.params.server_random,
                    inbound,
                    outbound,
                )?;

                self.session = Some(session.clone());
                self.bridge.notify_handshake_session(&session);

                // Server sends its ChangeCipherSpec and Finished first.
                self.state = ClientState::WaitChangeCipherSpec;
                return Ok(());
            }
        }

        self.new_session_id = hello.session_id;
        self.state = ClientState::WaitCertificate;
        Ok(())
    }

    fn on_certificate(&mut self, cert: Certificate) -> Result<()> {
        if cert.certificate_list.is_empty() {
            return Err(Error::fatal(
                AlertDescription::bad_certificate,
                "Server sent an empty certificate chain",
            ));
        }

        let chain: CertificateChain = cert
            .certificate_list
            .iter()
            .map(|der| Arc::new(crate::auth::Certificate::new(der.clone())))
            .collect();

        let parts = self.parts.as_ref().unwrap();
        self.bridge
            .check_server_trusted(&chain, parts.key_exchange.auth_type())?;

        self.params.peer_certificate = Some(chain);

        self.state = if parts.key_exchange.is_ephemeral() {
            ClientState::WaitServerKeyExchange
        } else {
            ClientState::WaitServerHelloDone
        };
        Ok(())
    }

    fn on_server_key_exchange(&mut self, ske: ServerKeyExchange) -> Result<()> {
        let decoded = ske.decode_ecdhe(self.params.negotiated_version)?;

        if !self.options.supported_groups.contains(&decoded.group) {
            return Err(Error::fatal(
                AlertDescription::illegal_parameter,
                "Server picked a group we didn't offer",
            ));
        }

        let scheme = match decoded.signature_algorithm {
            Some(scheme) => {
                if !self
                    .options
                    .supported_signature_algorithms
                    .contains(&scheme)
                {
                    return Err(Error::fatal(
                        AlertDescription::illegal_parameter,
                        "Server signed with an algorithm we didn't offer",
                    ));
                }
                scheme
            }
            None => {
                // Pre TLS 1.2 default by key exchange family.
                match self.parts.as_ref().unwrap().key_exchange.server_key_type() {
                    KeyAlgorithm::Rsa => SignatureScheme::rsa_pkcs1_sha1,
                    KeyAlgorithm::Ecdsa => SignatureScheme::ecdsa_sha1,
                }
            }
        };

        // signed_params = client_random + server_random + ServerECDHParams
        let mut signed = vec![];
        signed.extend_from_slice(&self.params.client_random);
        signed.extend_from_slice(&self.params.server_random);
        signed.extend_from_slice(&decoded.params_raw);

        let end_entity = &self.params.peer_certificate.as_ref().unwrap()[0];
        let valid = self.options.crypto.verify_signature(
            scheme,
            end_entity,
            &signed,
            &decoded.signature,
        )?;
        if !valid {
            return Err(Error::fatal(
                AlertDescription::decrypt_error,
                "Invalid ServerKeyExchange signature",
            ));
        }

        self.server_key_exchange = Some(decoded);
        self.state = ClientState::WaitServerHelloDone;
        Ok(())
    }

    /// Certificate? + ClientKeyExchange + CertificateVerify? +
    /// ChangeCipherSpec + Finished.
    fn send_client_flight(
        &mut self,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        let crypto = self.options.crypto.clone();
        let parts = *self.parts.as_ref().unwrap();
        let version = self.params.negotiated_version;

        // 1. Client certificate if one was requested.
        if let Some(request) = &self.certificate_request {
            let key_types: Vec<KeyAlgorithm> = request
                .certificate_types
                .iter()
                .filter_map(|t| match *t {
                    CERT_TYPE_RSA_SIGN => Some(KeyAlgorithm::Rsa),
                    CERT_TYPE_ECDSA_SIGN => Some(KeyAlgorithm::Ecdsa),
                    _ => None,
                })
                .collect();

            let issuers = if request.certificate_authorities.is_empty() {
                None
            } else {
                Some(&request.certificate_authorities[..])
            };

            let identity = self
                .bridge
                .choose_client_alias(&key_types, issuers)
                .and_then(|alias| {
                    let km = self.options.key_manager.as_ref()?;
                    Some((km.certificate_chain(&alias)?, km.private_key(&alias)?))
                });

            let certificate_list = match &identity {
                Some((chain, _)) => chain.iter().map(|c| c.der.clone()).collect(),
                // An empty Certificate tells the server we have nothing;
                // it decides whether that is fatal.
                None => vec![],
            };

            outbound.send_handshake(
                &Handshake::Certificate(Certificate { certificate_list }),
                Some(&mut self.transcript),
            )?;

            if let Some((chain, key)) = identity {
                self.params.local_certificate = Some(chain);
                self.client_private_key = Some(key);
                self.sent_client_certificate = true;
            }
        }

        // 2. ClientKeyExchange and the pre-master secret.
        let (client_key_exchange, pre_master_secret) = if parts.key_exchange.is_ephemeral() {
            let ske = self.server_key_exchange.as_ref().ok_or_else(|| {
                Error::fatal(
                    AlertDescription::unexpected_message,
                    "Missing ServerKeyExchange for an ephemeral suite",
                )
            })?;

            let exchange = crypto.create_key_exchange(ske.group)?;
            let public = exchange.public_value()?;
            let secret = exchange.agree(&ske.public)?;
            (ClientKeyExchange::new_ecdhe(&public), secret)
        } else {
            // RSA key exchange: {offered_version, 46 random bytes}
            // encrypted to the server's certificate.
            let mut pre_master = vec![0u8; PRE_MASTER_SECRET_LENGTH];
            crypto.random_bytes(&mut pre_master[2..])?;
            pre_master[0..2].copy_from_slice(&self.options.max_version().to_be_bytes());

            let end_entity = &self.params.peer_certificate.as_ref().unwrap()[0];
            let encrypted = crypto.encrypt_pre_master_secret(end_entity, &pre_master)?;
            (ClientKeyExchange::new_rsa(&encrypted), pre_master)
        };

        outbound.send_handshake(
            &Handshake::ClientKeyExchange(client_key_exchange),
            Some(&mut self.transcript),
        )?;

        // 3. Master secret, optionally bound to the transcript (RFC 7627).
        if self.params.extended_master_secret {
            let session_hash = self.transcript.hash(
                crypto.as_ref(),
                transcript_hash_alg(version, parts.prf_hash),
            );
            self.params.master_secret = extended_master_secret(
                crypto.as_ref(),
                version,
                parts.prf_hash,
                &pre_master_secret,
                &session_hash,
            );
            self.params.session_hash = Some(session_hash);
        } else {
            self.params.master_secret = master_secret(
                crypto.as_ref(),
                version,
                parts.prf_hash,
                &pre_master_secret,
                &self.params.client_random,
                &self.params.server_random,
            );
        }

        // 4. Prove possession of the client certificate's key.
        if self.sent_client_certificate {
            let key = self.client_private_key.as_ref().unwrap();

            let scheme = self.select_certificate_verify_scheme(key.algorithm())?;
            let signature = crypto.sign(scheme, key, &self.transcript.concat())?;

            let algorithm = if version >= TLS_1_2_VERSION {
                Some(scheme)
            } else {
                None
            };
            outbound.send_handshake(
                &Handshake::CertificateVerify(CertificateVerify {
                    algorithm,
                    signature: signature.into(),
                }),
                Some(&mut self.transcript),
            )?;
        }

        // 5. Keys for both directions; ours activate with the CCS below.
        KeyScheduleHelper::stage_ciphers(
            &crypto,
            Entity::Client,
            version,
            self.params.cipher_suite,
            &parts,
            &self.params.master_secret,
            &self.params.client_random,
            &self.params.server_random,
            inbound,
            outbound,
        )?;

        outbound.send_change_cipher_spec()?;

        // 6. Finished. In a full handshake ours is the first one, which
        // also makes it the tls-unique channel binding.
        let transcript_hash = self.transcript.hash(
            crypto.as_ref(),
            transcript_hash_alg(version, parts.prf_hash),
        );
        let local_verify_data = verify_data(
            crypto.as_ref(),
            version,
            parts.prf_hash,
            &self.params.master_secret,
            Entity::Client.finished_label(),
            &transcript_hash,
        );

        outbound.send_handshake(
            &Handshake::Finished(Finished {
                verify_data: Bytes::from(local_verify_data.clone()),
            }),
            Some(&mut self.transcript),
        )?;

        self.params.local_verify_data = local_verify_data.clone();
        self.params.tls_unique = local_verify_data;

        // The in-progress session becomes visible to observers before the
        // peer's Finished has been validated.
        let session = Arc::new(Session::new(
            self.new_session_id.clone(),
            version,
            self.params.cipher_suite,
            self.params.master_secret.clone(),
            self.params.extended_master_secret,
            self.params.peer_certificate.clone(),
            self.params.local_certificate.clone(),
            self.options.hostname.clone(),
            self.options.peer_port,
        ));
        self.session = Some(session.clone());
        self.bridge.notify_handshake_session(&session);

        self.state = ClientState::WaitChangeCipherSpec;
        Ok(())
    }

    fn select_certificate_verify_scheme(
        &self,
        key_algorithm: KeyAlgorithm,
    ) -> Result<SignatureScheme> {
        let request = self.certificate_request.as_ref().unwrap();

        let acceptable = |scheme: &SignatureScheme| -> bool {
            let family_ok = match key_algorithm {
                KeyAlgorithm::Rsa => matches!(
                    scheme,
                    SignatureScheme::rsa_pkcs1_sha1
                        | SignatureScheme::rsa_pkcs1_sha256
                        | SignatureScheme::rsa_pkcs1_sha384
                        | SignatureScheme::rsa_pkcs1_sha512
                ),
                KeyAlgorithm::Ecdsa => matches!(
                    scheme,
                    SignatureScheme::ecdsa_sha1
                        | SignatureScheme::ecdsa_secp256r1_sha256
                        | SignatureScheme::ecdsa_secp384r1_sha384
                ),
            };
            family_ok && self.options.supported_signature_algorithms.contains(scheme)
        };

        if self.params.negotiated_version < TLS_1_2_VERSION {
            return Ok(match key_algorithm {
                KeyAlgorithm::Rsa => SignatureScheme::rsa_pkcs1_sha1,
                KeyAlgorithm::Ecdsa => SignatureScheme::ecdsa_sha1,
            });
        }

        request
            .supported_signature_algorithms
            .iter()
            .find(|s| acceptable(s))
            .copied()
            .ok_or_else(|| {
                Error::fatal(
                    AlertDescription::handshake_failure,
                    "No mutually supported CertificateVerify algorithm",
                )
            })
    }

    fn on_finished(
        &mut self,
        finished: Finished,
        raw: Bytes,
        outbound: &mut OutboundRecords,
    ) -> Result<Option<HandshakeSummary>> {
        let crypto = self.options.crypto.clone();
        let parts = *self.parts.as_ref().unwrap();
        let version = self.params.negotiated_version;

        let transcript_hash = self.transcript.hash(
            crypto.as_ref(),
            transcript_hash_alg(version, parts.prf_hash),
        );
        let expected = verify_data(
            crypto.as_ref(),
            version,
            parts.prf_hash,
            &self.params.master_secret,
            Entity::Server.finished_label(),
            &transcript_hash,
        );

        if !constant_eq(&expected, &finished.verify_data) {
            warn!("Server Finished verify_data mismatch");
            return Err(Error::fatal(
                AlertDescription::decrypt_error,
                "Finished verify_data mismatch",
            ));
        }

        self.transcript.push(raw);
        self.params.peer_verify_data = expected.clone();

        if self.resumed {
            // Abbreviated handshake: the server's Finished came first, so
            // it is the tls-unique binding; our flight goes out now.
            self.params.tls_unique = expected;

            outbound.send_change_cipher_spec()?;

            let transcript_hash = self.transcript.hash(
                crypto.as_ref(),
                transcript_hash_alg(version, parts.prf_hash),
            );
            let local_verify_data = verify_data(
                crypto.as_ref(),
                version,
                parts.prf_hash,
                &self.params.master_secret,
                Entity::Client.finished_label(),
                &transcript_hash,
            );
            outbound.send_handshake(
                &Handshake::Finished(Finished {
                    verify_data: Bytes::from(local_verify_data.clone()),
                }),
                Some(&mut self.transcript),
            )?;
            self.params.local_verify_data = local_verify_data;
        }

        Ok(Some(self.complete()?))
    }

    fn complete(&mut self) -> Result<HandshakeSummary> {
        let session = self.session.clone().unwrap();

        // tls-server-end-point: hash of the server's end-entity cert.
        if let Some(chain) = &self.params.peer_certificate {
            self.params.tls_server_end_point = self
                .options
                .crypto
                .hash(self.params.prf_hash, &chain[0].der);
        }

        if !self.resumed && !session.id.is_empty() {
            self.options.session_context.put(session.clone());
        }

        self.bridge.notify_handshake_complete(&session);

        self.state = ClientState::Complete;

        Ok(HandshakeSummary {
            selected_alpn_protocol: self.selected_alpn_protocol.clone(),
            session,
            security: Arc::new(self.params.clone()),
        })
    }
}
