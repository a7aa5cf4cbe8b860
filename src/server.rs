// Server side of the handshake.
//
// Happy paths:
//
// full:    WaitClientHello -> (server flight) -> WaitClientCertificate?
//          -> WaitClientKeyExchange -> WaitCertificateVerify?
//          -> WaitChangeCipherSpec -> WaitFinished -> (CCS + Finished)
//          -> Complete
// resumed: WaitClientHello -> (ServerHello + CCS + Finished)
//          -> WaitChangeCipherSpec -> WaitFinished -> Complete

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};

use crate::alert::AlertDescription;
use crate::auth::{CertificateChain, KeyAlgorithm, PrivateKey};
use crate::callbacks::CallbackBridge;
use crate::cipher_suite::{CipherSuite, CipherSuiteParts};
use crate::constant_eq;
use crate::crypto::KeyExchange;
use crate::errors::{Error, Result};
use crate::extensions::*;
use crate::handshake::*;
use crate::handshake_summary::HandshakeSummary;
use crate::key_schedule::*;
use crate::key_schedule_helper::KeyScheduleHelper;
use crate::options::{ClientAuth, ServerOptions};
use crate::record_layer::{InboundRecords, Message, OutboundRecords};
use crate::security_params::{Entity, SecurityParameters};
use crate::session::Session;
use crate::transcript::Transcript;

enum ServerState {
    WaitClientHello,
    WaitClientCertificate,
    WaitClientKeyExchange,
    WaitCertificateVerify,
    WaitChangeCipherSpec,
    WaitFinished,
    Complete,
}

pub(crate) struct ServerHandshake {
    options: Arc<ServerOptions>,
    bridge: CallbackBridge,

    state: ServerState,
    transcript: Transcript,
    params: SecurityParameters,
    parts: Option<CipherSuiteParts>,

    resumed: bool,
    session_id: Bytes,

    /// Client preferences captured from the ClientHello.
    client_signature_algorithms: Vec<SignatureScheme>,

    /// Our identity for this handshake.
    local_private_key: Option<Arc<PrivateKey>>,

    /// Ephemeral exchange awaiting the ClientKeyExchange.
    key_exchange: Option<Box<dyn KeyExchange>>,

    /// Set when we asked for a client certificate and got a non-empty one;
    /// a CertificateVerify must follow.
    expect_certificate_verify: bool,

    selected_alpn_protocol: Option<Bytes>,

    session: Option<Arc<Session>>,
}

impl ServerHandshake {
    pub fn new(options: Arc<ServerOptions>) -> Self {
        let bridge = CallbackBridge {
            key_manager: Some(options.key_manager.clone()),
            trust_manager: options.trust_manager.clone(),
            listener: options.listener.clone(),
        };

        Self {
            options,
            bridge,
            state: ServerState::WaitClientHello,
            transcript: Transcript::new(),
            params: SecurityParameters::new(Entity::Server),
            parts: None,
            resumed: false,
            session_id: Bytes::new(),
            client_signature_algorithms: vec![],
            local_private_key: None,
            key_exchange: None,
            expect_certificate_verify: false,
            selected_alpn_protocol: None,
            session: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ServerState::Complete)
    }

    pub fn security_parameters(&self) -> &SecurityParameters {
        &self.params
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn process(
        &mut self,
        msg: Message,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<Option<HandshakeSummary>> {
        match msg {
            Message::ChangeCipherSpec => {
                match self.state {
                    ServerState::WaitChangeCipherSpec => {}
                    _ => {
                        return Err(Error::fatal(
                            AlertDescription::unexpected_message,
                            "ChangeCipherSpec at the wrong time",
                        ));
                    }
                }
                inbound.promote_cipher()?;
                self.state = ServerState::WaitFinished;
                Ok(None)
            }
            Message::Handshake(handshake, raw) => {
                self.process_handshake(handshake, raw, inbound, outbound)
            }
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
            (ServerState::WaitClientHello, Handshake::ClientHello(hello)) => {
                self.transcript.push(raw);
                self.on_client_hello(hello, inbound, outbound)?;
                Ok(None)
            }
            (ServerState::WaitClientCertificate, Handshake::Certificate(cert)) => {
                self.transcript.push(raw);
                self.on_client_certificate(cert)?;
                Ok(None)
            }
            (ServerState::WaitClientKeyExchange, Handshake::ClientKeyExchange(cke)) => {
                self.transcript.push(raw);
                self.on_client_key_exchange(cke, inbound, outbound)?;
                Ok(None)
            }
            (ServerState::WaitCertificateVerify, Handshake::CertificateVerify(verify)) => {
                self.on_certificate_verify(verify, raw)?;
                Ok(None)
            }
            (ServerState::WaitFinished, Handshake::Finished(finished)) => {
                self.on_finished(finished, raw, outbound)
            }
            (_, msg) => Err(Error::fatal(
                AlertDescription::unexpected_message,
                format!("Unexpected handshake message {:?}", msg.typ()),
            )),
        }
    }

    fn on_client_hello(
        &mut self,
        hello: ClientHello,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        // Version: the lower of the two maximums, provided we have it
        // enabled.
        let candidate = core::cmp::min(hello.client_version, self.options.max_version());
        let version = self
            .options
            .supported_versions
            .iter()
            .copied()
            .filter(|v| *v <= candidate)
            .max()
            .ok_or_else(|| {
                Error::fatal(
                    AlertDescription::protocol_version,
                    "No mutually supported protocol version",
                )
            })?;

        if !hello.compression_methods.contains(&0) {
            return Err(Error::fatal(
                AlertDescription::handshake_failure,
                "Client does not offer null compression",
            ));
        }

        // RFC 5746: either signal marks the peer as reneg-aware.
        if let Some(info) = find_renegotiation_info(&hello.extensions) {
            if !info.renegotiated_connection.is_empty() {
                return Err(Error::fatal(
                    AlertDescription::handshake_failure,
                    "Non-empty renegotiation_info on initial handshake",
                ));
            }
            self.params.secure_renegotiation = true;
        }
        if hello
            .cipher_suites
            .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV)
        {
            self.params.secure_renegotiation = true;
        }

        self.params.extended_master_secret =
            self.options.extended_master_secret && has_extended_master_secret(&hello.extensions);

        self.client_signature_algorithms = match find_signature_algorithms(&hello.extensions) {
            Some(list) => list.algorithms.clone(),
            // RFC 5246 7.4.1.4.1 defaults.
            None => vec![
                SignatureScheme::rsa_pkcs1_sha1,
                SignatureScheme::ecdsa_sha1,
            ],
        };

        let client_groups: Vec<NamedGroup> = match find_supported_groups(&hello.extensions) {
            Some(list) => list.groups.clone(),
            None => self.options.supported_groups.clone(),
        };

        let mut random = [0u8; RANDOM_LENGTH];
        self.options.crypto.random_bytes(&mut random)?;
        self.params.server_random = random;
        self.params
            .client_random
            .copy_from_slice(&hello.random);
        self.params.negotiated_version = version;

        outbound.set_negotiated_version(version);
        inbound.protocol_version = version;

        // Resumption lookup before suite selection: a hit pins both.
        let resumable = if hello.session_id.is_empty() {
            None
        } else {
            self.options
                .session_context
                .get(&hello.session_id)
                .filter(|s| {
                    s.is_resumable()
                        && s.protocol_version == version
                        && hello.cipher_suites.contains(&s.cipher_suite)
                        && self
                            .options
                            .supported_cipher_suites
                            .contains(&s.cipher_suite)
                })
        };

        let (suite, group) = match &resumable {
            Some(session) => (session.cipher_suite, None),
            None => self.select_cipher_suite(&hello, version, &client_groups)?,
        };

        let parts = suite.decode()?;
        self.params.cipher_suite = suite;
        self.params.prf_hash = parts.prf_hash;
        self.parts = Some(parts);

        // Our identity. Resumption reuses the cached chain.
        if resumable.is_none() {
            let alias = self
                .bridge
                .choose_server_alias(parts.key_exchange.server_key_type(), None)
                .ok_or_else(|| {
                    Error::fatal(
                        AlertDescription::handshake_failure,
                        "No server credentials for the selected suite",
                    )
                })?;
            let chain = self
                .options
                .key_manager
                .certificate_chain(&alias)
                .ok_or_else(|| Error::Capability("Key manager has no chain for alias".into()))?;
            let key = self
                .options
                .key_manager
                .private_key(&alias)
                .ok_or_else(|| Error::Capability("Key manager has no key for alias".into()))?;
            self.params.local_certificate = Some(chain);
            self.local_private_key = Some(key);
        }

        // Extensions we processed get reflected, nothing else.
        let mut extensions = vec![];
        if self.params.secure_renegotiation {
            extensions.push(Extension::RenegotiationInfo(RenegotiationInfo::initial()));
        }
        if self.params.extended_master_secret {
            extensions.push(Extension::ExtendedMasterSecret);
        }
        if find_server_name(&hello.extensions).is_some() {
            extensions.push(Extension::ServerName(None));
        }
        if let Some(client_alpn) = find_alpn(&hello.extensions) {
            if !self.options.alpn_ids.is_empty() {
                // Our preference order wins.
                let selected = self
                    .options
                    .alpn_ids
                    .iter()
                    .find(|id| client_alpn.names.contains(*id))
                    .cloned()
                    .ok_or_else(|| {
                        Error::fatal(
                            AlertDescription::no_application_protocol,
                            "No application protocol in common",
                        )
                    })?;
                extensions.push(Extension::ALPN(ProtocolNameList {
                    names: vec![selected.clone()],
                }));
                self.selected_alpn_protocol = Some(selected);
            }
        }

        self.session_id = match &resumable {
            Some(session) => session.id.clone(),
            None => {
                let mut id = vec![0u8; 32];
                self.options.crypto.random_bytes(&mut id)?;
                Bytes::from(id)
            }
        };

        let server_hello = ServerHello {
            server_version: version,
            random: Bytes::from(random.to_vec()),
            session_id: self.session_id.clone(),
            cipher_suite: suite,
            compression_method: 0,
            extensions,
        };

        debug!(
            "Negotiated version {:04x} suite {:?} (resumed: {})",
            version,
            suite,
            resumable.is_some()
        );

        outbound.send_handshake(
            &Handshake::ServerHello(server_hello),
            Some(&mut self.transcript),
        )?;

        if let Some(session) = resumable {
            return self.start_abbreviated(session, inbound, outbound);
        }

        self.send_server_flight(group, outbound)?;

        self.state = if self.wants_client_certificate() {
            ServerState::WaitClientCertificate
        } else {
            ServerState::WaitClientKeyExchange
        };
        Ok(())
    }

    /// First mutually enabled suite that we can actually serve: a usable
    /// credential, a signature algorithm the client accepts, and for
    /// ECDHE a group both sides support.
    fn select_cipher_suite(
        &self,
        hello: &ClientHello,
        version: ProtocolVersion,
        client_groups: &[NamedGroup],
    ) -> Result<(CipherSuite, Option<NamedGroup>)> {
        let shared_group = self
            .options
            .supported_groups
            .iter()
            .find(|g| client_groups.contains(g))
            .copied();

        for suite in &hello.cipher_suites {
            if !self.options.supported_cipher_suites.contains(suite)
                || !suite.usable_with_version(version)
            {
                continue;
            }

            let parts = match suite.decode() {
                Ok(parts) => parts,
                Err(_) => continue,
            };

            if self
                .bridge
                .choose_server_alias(parts.key_exchange.server_key_type(), None)
                .is_none()
            {
                continue;
            }

            if version >= TLS_1_2_VERSION && parts.key_exchange.is_ephemeral() {
                let signable = self
                    .client_signature_algorithms
                    .iter()
                    .any(|s| match parts.key_exchange.server_key_type() {
                        KeyAlgorithm::Rsa => matches!(
                            s,
                            SignatureScheme::rsa_pkcs1_sha1
                                | SignatureScheme::rsa_pkcs1_sha256
                                | SignatureScheme::rsa_pkcs1_sha384
                                | SignatureScheme::rsa_pkcs1_sha512
                        ),
                        KeyAlgorithm::Ecdsa => matches!(
                            s,
                            SignatureScheme::ecdsa_sha1
                                | SignatureScheme::ecdsa_secp256r1_sha256
                                | SignatureScheme::ecdsa_secp384r1_sha384
                        ),
                    });
                if !signable {
                    continue;
                }
            }

            if parts.key_exchange.is_ephemeral() {
                match shared_group {
                    Some(group) => return Ok((*suite, Some(group))),
                    None => continue,
                }
            }

            return Ok((*suite, None));
        }

        Err(Error::fatal(
            AlertDescription::handshake_failure,
            "Can't agree on a cipher suite with the client",
        ))
    }

    /// Certificate + ServerKeyExchange? + CertificateRequest? +
    /// ServerHelloDone.
    fn send_server_flight(
        &mut self,
        group: Option<NamedGroup>,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        let parts = *self.parts.as_ref().unwrap();
        let version = self.params.negotiated_version;

        let chain = self.params.local_certificate.clone().unwrap();
        outbound.send_handshake(
            &Handshake::Certificate(Certificate {
                certificate_list: chain.iter().map(|c| c.der.clone()).collect(),
            }),
            Some(&mut self.transcript),
        )?;

        if parts.key_exchange.is_ephemeral() {
            let group = group.ok_or_else(|| {
                Error::fatal(
                    AlertDescription::handshake_failure,
                    "No supported group in common",
                )
            })?;

            let exchange = self.options.crypto.create_key_exchange(group)?;
            let public = exchange.public_value()?;

            let mut params_raw = vec![];
            ServerKeyExchange::serialize_params(group, &public, &mut params_raw);

            let scheme = self.select_server_signature_scheme(&parts)?;

            let mut signed = vec![];
            signed.extend_from_slice(&self.params.client_random);
            signed.extend_from_slice(&self.params.server_random);
            signed.extend_from_slice(&params_raw);

            let key = self.local_private_key.as_ref().unwrap();
            let signature = self.options.crypto.sign(scheme, key, &signed)?;

            let algorithm = if version >= TLS_1_2_VERSION {
                Some(scheme)
            } else {
                None
            };
            outbound.send_handshake(
                &Handshake::ServerKeyExchange(ServerKeyExchange::for_ecdhe(
                    group, &public, algorithm, &signature,
                )),
                Some(&mut self.transcript),
            )?;

            self.key_exchange = Some(exchange);
        }

        if self.wants_client_certificate() {
            let request = CertificateRequest {
                certificate_types: Bytes::from_static(&[
                    CERT_TYPE_RSA_SIGN,
                    CERT_TYPE_ECDSA_SIGN,
                ]),
                supported_signature_algorithms: if version >= TLS_1_2_VERSION {
                    self.options.supported_signature_algorithms.clone()
                } else {
                    vec![]
                },
                certificate_authorities: vec![],
            };
            outbound.send_handshake(
                &Handshake::CertificateRequest(request),
                Some(&mut self.transcript),
            )?;
        }

        outbound.send_handshake(&Handshake::ServerHelloDone, Some(&mut self.transcript))
    }

    fn wants_client_certificate(&self) -> bool {
        self.options.client_auth != ClientAuth::None
    }

    fn select_server_signature_scheme(&self, parts: &CipherSuiteParts) -> Result<SignatureScheme> {
        let key_type = parts.key_exchange.server_key_type();

        if self.params.negotiated_version < TLS_1_2_VERSION {
            return Ok(match key_type {
                KeyAlgorithm::Rsa => SignatureScheme::rsa_pkcs1_sha1,
                KeyAlgorithm::Ecdsa => SignatureScheme::ecdsa_sha1,
            });
        }

        self.options
            .supported_signature_algorithms
            .iter()
            .filter(|s| self.client_signature_algorithms.contains(s))
            .find(|s| match key_type {
                KeyAlgorithm::Rsa => matches!(
                    s,
                    SignatureScheme::rsa_pkcs1_sha1
                        | SignatureScheme::rsa_pkcs1_sha256
                        | SignatureScheme::rsa_pkcs1_sha384
                        | SignatureScheme::rsa_pkcs1_sha512
                ),
                KeyAlgorithm::Ecdsa => matches!(
                    s,
                    SignatureScheme::ecdsa_sha1
                        | SignatureScheme::ecdsa_secp256r1_sha256
                        | SignatureScheme::ecdsa_secp384r1_sha384
                ),
            })
            .copied()
            .ok_or_else(|| {
                Error::fatal(
                    AlertDescription::handshake_failure,
                    "No signature algorithm acceptable to the client",
                )
            })
    }

    /// Abbreviated handshake: our CCS and Finished go first.
    fn start_abbreviated(
        &mut self,
        session: Arc<Session>,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        let parts = *self.parts.as_ref().unwrap();
        let version = self.params.negotiated_version;
        let crypto = self.options.crypto.clone();

        self.resumed = true;
        self.params.master_secret = session.master_secret().to_vec();
        self.params.extended_master_secret = session.extended_master_secret;
        self.params.peer_certificate = session.peer_certificate.clone();
        self.params.local_certificate = session.local_certificate.clone();

        KeyScheduleHelper::stage_ciphers(
            &crypto,
            Entity::Server,
            version,
            self.params.cipher_suite,
            &parts,
            &self.params.master_secret,
            &self.params.client_random,
            &self.params.server_random,
            inbound,
            outbound,
        )?;

        self.session = Some(session.clone());
        self.bridge.notify_handshake_session(&session);

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
            Entity::Server.finished_label(),
            &transcript_hash,
        );
        outbound.send_handshake(
            &Handshake::Finished(Finished {
                verify_data: Bytes::from(local_verify_data.clone()),
            }),
            Some(&mut self.transcript),
        )?;

        self.params.local_verify_data = local_verify_data.clone();
        // First Finished of this handshake.
        self.params.tls_unique = local_verify_data;

        self.state = ServerState::WaitChangeCipherSpec;
        Ok(())
    }

    fn on_client_certificate(&mut self, cert: Certificate) -> Result<()> {
        if cert.certificate_list.is_empty() {
            if self.options.client_auth == ClientAuth::Need {
                return Err(Error::fatal(
                    AlertDescription::bad_certificate,
                    "Client authentication is required",
                ));
            }
            // wantClientAuth: proceed anonymously.
            self.state = ServerState::WaitClientKeyExchange;
            return Ok(());
        }

        let chain: CertificateChain = cert
            .certificate_list
            .iter()
            .map(|der| Arc::new(crate::auth::Certificate::new(der.clone())))
            .collect();

        let parts = self.parts.as_ref().unwrap();
        self.bridge
            .check_client_trusted(&chain, parts.key_exchange.auth_type())?;

        self.params.peer_certificate = Some(chain);
        self.expect_certificate_verify = true;
        self.state = ServerState::WaitClientKeyExchange;
        Ok(())
    }

    fn on_client_key_exchange(
        &mut self,
        cke: ClientKeyExchange,
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        let parts = *self.parts.as_ref().unwrap();
        let version = self.params.negotiated_version;
        let crypto = self.options.crypto.clone();

        let pre_master_secret = if parts.key_exchange.is_ephemeral() {
            let public = cke.ecdhe_public()?;
            self.key_exchange
                .as_ref()
                .ok_or_else(|| Error::Misuse("Missing ephemeral exchange state".into()))?
                .agree(&public)?
        } else {
            let encrypted = cke.rsa_encrypted_pre_master()?;
            let key = self.local_private_key.as_ref().unwrap();

            // A decryption failure must be indistinguishable from a bad
            // version byte (Bleichenbacher), so substitute random bytes
            // and let the Finished exchange fail instead.
            match crypto.decrypt_pre_master_secret(key, &encrypted) {
                Ok(pms) if pms.len() == PRE_MASTER_SECRET_LENGTH => pms,
                _ => {
                    warn!("RSA pre-master secret decryption failed");
                    let mut pms = vec![0u8; PRE_MASTER_SECRET_LENGTH];
                    crypto.random_bytes(&mut pms)?;
                    pms
                }
            }
        };

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

        KeyScheduleHelper::stage_ciphers(
            &crypto,
            Entity::Server,
            version,
            self.params.cipher_suite,
            &parts,
            &self.params.master_secret,
            &self.params.client_random,
            &self.params.server_random,
            inbound,
            outbound,
        )?;

        let session = Arc::new(Session::new(
            self.session_id.clone(),
            version,
            self.params.cipher_suite,
            self.params.master_secret.clone(),
            self.params.extended_master_secret,
            self.params.peer_certificate.clone(),
            self.params.local_certificate.clone(),
            String::new(),
            0,
        ));
        self.session = Some(session.clone());
        self.bridge.notify_handshake_session(&session);

        self.state = if self.expect_certificate_verify {
            ServerState::WaitCertificateVerify
        } else {
            ServerState::WaitChangeCipherSpec
        };
        Ok(())
    }

    fn on_certificate_verify(&mut self, verify: CertificateVerify, raw: Bytes) -> Result<()> {
        let version = self.params.negotiated_version;

        let scheme = match verify.algorithm {
            Some(scheme) => {
                if !self
                    .options
                    .supported_signature_algorithms
                    .contains(&scheme)
                {
                    return Err(Error::fatal(
                        AlertDescription::illegal_parameter,
                        "CertificateVerify with an algorithm we didn't offer",
                    ));
                }
                scheme
            }
            None => {
                if version >= TLS_1_2_VERSION {
                    return Err(Error::fatal(
                        AlertDescription::decode_error,
                        "Missing signature algorithm in CertificateVerify",
                    ));
                }
                SignatureScheme::rsa_pkcs1_sha1
            }
        };

        // The signature covers every handshake message before this one.
        let signed = self.transcript.concat();

        let end_entity = &self.params.peer_certificate.as_ref().unwrap()[0];
        let valid = self.options.crypto.verify_signature(
            scheme,
            end_entity,
            &signed,
            &verify.signature,
        )?;
        if !valid {
            return Err(Error::fatal(
                AlertDescription::decrypt_error,
                "Invalid CertificateVerify signature",
            ));
        }

        self.transcript.push(raw);
        self.state = ServerState::WaitChangeCipherSpec;
        Ok(())
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
            Entity::Client.finished_label(),
            &transcript_hash,
        );

        if !constant_eq(&expected, &finished.verify_data) {
            warn!("Client Finished verify_data mismatch");
            return Err(Error::fatal(
                AlertDescription::decrypt_error,
                "Finished verify_data mismatch",
            ));
        }

        self.transcript.push(raw);
        self.params.peer_verify_data = expected.clone();

        if !self.resumed {
            // Full handshake: the client's Finished was the first one.
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
                Entity::Server.finished_label(),
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

        // tls-server-end-point binds to our own end-entity certificate.
        if let Some(chain) = &self.params.local_certificate {
            self.params.tls_server_end_point = self
                .options
                .crypto
                .hash(self.params.prf_hash, &chain[0].der);
        }

        if !self.resumed && !session.id.is_empty() {
            self.options.session_context.put(session.clone());
        }

        self.bridge.notify_handshake_complete(&session);

        self.state = ServerState::Complete;

        Ok(HandshakeSummary {
            selected_alpn_protocol: self.selected_alpn_protocol.clone(),
            session,
            security: Arc::new(self.params.clone()),
        })
    }
}
