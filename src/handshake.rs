// Handshake messages for TLS 1.0 - 1.2 (RFC 2246 / 4346 / 5246 section 7.4).
//
// Big-endian network order. A message is framed as
// 'msg_type(1) | length(3) | body' and may span multiple records; the
// record layer reassembles before calling parse().

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::cipher_suite::CipherSuite;
use crate::errors::{Error, Result};
use crate::extensions::{Extension, NamedGroup, SignatureScheme, SignatureSchemeList};
use crate::parsing::*;

pub const SSL_3_0_VERSION: u16 = 0x0300;
pub const TLS_1_0_VERSION: u16 = 0x0301;
pub const TLS_1_1_VERSION: u16 = 0x0302;
pub const TLS_1_2_VERSION: u16 = 0x0303;

pub type ProtocolVersion = u16;

pub const RANDOM_LENGTH: usize = 32;

/// ClientCertificateType registry values used in CertificateRequest.
pub const CERT_TYPE_RSA_SIGN: u8 = 1;
pub const CERT_TYPE_ECDSA_SIGN: u8 = 64;

tls_enum_u8!(HandshakeType => {
    HelloRequest(0),
    ClientHello(1),
    ServerHello(2),
    Certificate(11),
    ServerKeyExchange(12),
    CertificateRequest(13),
    ServerHelloDone(14),
    CertificateVerify(15),
    ClientKeyExchange(16),
    Finished(20),
    (255)
});

#[derive(Debug, Clone)]
pub enum Handshake {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl Handshake {
    pub fn typ(&self) -> HandshakeType {
        match self {
            Handshake::HelloRequest => HandshakeType::HelloRequest,
            Handshake::ClientHello(_) => HandshakeType::ClientHello,
            Handshake::ServerHello(_) => HandshakeType::ServerHello,
            Handshake::Certificate(_) => HandshakeType::Certificate,
            Handshake::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            Handshake::CertificateRequest(_) => HandshakeType::CertificateRequest,
            Handshake::ServerHelloDone => HandshakeType::ServerHelloDone,
            Handshake::CertificateVerify(_) => HandshakeType::CertificateVerify,
            Handshake::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            Handshake::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Parses one message off the front of the input, returning it together
    /// with the unconsumed remainder. Error::Incomplete means the input only
    /// holds a partial message and more records are needed.
    pub fn parse(input: Bytes, protocol_version: ProtocolVersion) -> Result<(Self, Bytes)> {
        let mut input = input;
        let msg_type = HandshakeType::parse(&mut input)?;
        let mut payload = varlen_vector(0, U24_LIMIT, &mut input)?;
        let rest = input;

        let msg = match msg_type {
            HandshakeType::HelloRequest => {
                if !payload.is_empty() {
                    return Err(Error::fatal(
                        AlertDescription::decode_error,
                        "Expected empty HelloRequest",
                    ));
                }
                Handshake::HelloRequest
            }
            HandshakeType::ClientHello => Handshake::ClientHello(ClientHello::parse(&mut payload)?),
            HandshakeType::ServerHello => Handshake::ServerHello(ServerHello::parse(&mut payload)?),
            HandshakeType::Certificate => Handshake::Certificate(Certificate::parse(&mut payload)?),
            HandshakeType::ServerKeyExchange => {
                let data = payload.split_to(payload.len());
                Handshake::ServerKeyExchange(ServerKeyExchange { data })
            }
            HandshakeType::CertificateRequest => Handshake::CertificateRequest(
                CertificateRequest::parse(&mut payload, protocol_version)?,
            ),
            HandshakeType::ServerHelloDone => {
                if !payload.is_empty() {
                    return Err(Error::fatal(
                        AlertDescription::decode_error,
                        "Expected empty ServerHelloDone",
                    ));
                }
                Handshake::ServerHelloDone
            }
            HandshakeType::CertificateVerify => Handshake::CertificateVerify(
                CertificateVerify::parse(&mut payload, protocol_version)?,
            ),
            HandshakeType::ClientKeyExchange => {
                let data = payload.split_to(payload.len());
                Handshake::ClientKeyExchange(ClientKeyExchange { data })
            }
            HandshakeType::Finished => {
                let verify_data = payload.split_to(payload.len());
                Handshake::Finished(Finished { verify_data })
            }
            HandshakeType::unknown(_) => {
                return Err(Error::fatal(
                    AlertDescription::unexpected_message,
                    "Unknown handshake message type",
                ));
            }
        };

        expect_empty(&payload)?;
        Ok((msg, rest))
    }

    pub fn serialize(&self, protocol_version: ProtocolVersion, out: &mut Vec<u8>) {
        self.typ().serialize(out);

        serialize_varlen_vector(0, U24_LIMIT, out, |out| match self {
            Handshake::HelloRequest => {}
            Handshake::ClientHello(v) => v.serialize(out),
            Handshake::ServerHello(v) => v.serialize(out),
            Handshake::Certificate(v) => v.serialize(out),
            Handshake::ServerKeyExchange(v) => out.extend_from_slice(&v.data),
            Handshake::CertificateRequest(v) => v.serialize(protocol_version, out),
            Handshake::ServerHelloDone => {}
            Handshake::CertificateVerify(v) => v.serialize(protocol_version, out),
            Handshake::ClientKeyExchange(v) => out.extend_from_slice(&v.data),
            Handshake::Finished(v) => out.extend_from_slice(&v.verify_data),
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.1.2. Client Hello
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    /// 32 random bytes.
    pub random: Bytes,
    /// 0-32 bytes. Non-empty when offering to resume a cached session.
    pub session_id: Bytes,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Bytes,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let client_version = be_u16(input)?;
        let random = take_exact(input, RANDOM_LENGTH)?;
        let session_id = varlen_vector(0, 32, input)?;
        let cipher_suites = {
            let mut data = varlen_vector(2, exp2(16) - 2, input)?;
            let mut arr = vec![];
            while !data.is_empty() {
                arr.push(CipherSuite::parse(&mut data)?);
            }
            arr
        };
        let compression_methods = varlen_vector(1, U8_LIMIT, input)?;

        // A TLS 1.0 client may omit the extensions block entirely.
        let extensions = if input.is_empty() {
            vec![]
        } else {
            let mut data = varlen_vector(0, U16_LIMIT, input)?;
            let mut arr = vec![];
            while !data.is_empty() {
                arr.push(Extension::parse(&mut data, HandshakeType::ClientHello)?);
            }
            arr
        };

        Ok(ClientHello {
            client_version,
            random,
            session_id,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.client_version.to_be_bytes());
        assert_eq!(self.random.len(), RANDOM_LENGTH);
        out.extend_from_slice(&self.random);

        serialize_varlen_vector(0, 32, out, |out| {
            out.extend_from_slice(&self.session_id);
        });
        serialize_varlen_vector(2, exp2(16) - 2, out, |out| {
            for c in self.cipher_suites.iter() {
                c.serialize(out);
            }
        });
        serialize_varlen_vector(1, U8_LIMIT, out, |out| {
            out.extend_from_slice(&self.compression_methods);
        });

        if !self.extensions.is_empty() {
            serialize_varlen_vector(0, U16_LIMIT, out, |out| {
                for e in self.extensions.iter() {
                    e.serialize(HandshakeType::ClientHello, out).unwrap();
                }
            });
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.1.3. Server Hello
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Bytes,
    /// Echoes the client's offer when resuming, otherwise the id of the new
    /// session (or empty if the server won't cache it).
    pub session_id: Bytes,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let server_version = be_u16(input)?;
        let random = take_exact(input, RANDOM_LENGTH)?;
        let session_id = varlen_vector(0, 32, input)?;
        let cipher_suite = CipherSuite::parse(input)?;
        let compression_method = be_u8(input)?;

        let extensions = if input.is_empty() {
            vec![]
        } else {
            let mut data = varlen_vector(0, U16_LIMIT, input)?;
            let mut arr = vec![];
            while !data.is_empty() {
                arr.push(Extension::parse(&mut data, HandshakeType::ServerHello)?);
            }
            arr
        };

        Ok(ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.server_version.to_be_bytes());
        assert_eq!(self.random.len(), RANDOM_LENGTH);
        out.extend_from_slice(&self.random);
        serialize_varlen_vector(0, 32, out, |out| {
            out.extend_from_slice(&self.session_id);
        });
        self.cipher_suite.serialize(out);
        out.push(self.compression_method);

        if !self.extensions.is_empty() {
            serialize_varlen_vector(0, U16_LIMIT, out, |out| {
                for e in self.extensions.iter() {
                    e.serialize(HandshakeType::ServerHello, out).unwrap();
                }
            });
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.2. Server Certificate
////////////////////////////////////////////////////////////////////////////////

/// Chain of DER encoded certificates, sender's certificate first. The
/// engine never parses the DER; validation is the trust capability's job.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub certificate_list: Vec<Bytes>,
}

impl Certificate {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(0, U24_LIMIT - 1, input)?;
        let mut certificate_list = vec![];
        while !data.is_empty() {
            certificate_list.push(varlen_vector(1, U24_LIMIT - 1, &mut data)?);
        }
        Ok(Certificate { certificate_list })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(0, U24_LIMIT - 1, out, |out| {
            for cert in self.certificate_list.iter() {
                serialize_varlen_vector(1, U24_LIMIT - 1, out, |out| {
                    out.extend_from_slice(cert);
                });
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 4492 5.4. Server Key Exchange (ECDHE parameters)
////////////////////////////////////////////////////////////////////////////////

const CURVE_TYPE_NAMED_CURVE: u8 = 3;

/// Raw ServerKeyExchange payload. The layout depends on the negotiated key
/// exchange, so it is kept opaque at the framing layer and decoded by the
/// handshake machine once the suite is known.
#[derive(Debug, Clone)]
pub struct ServerKeyExchange {
    pub data: Bytes,
}

#[derive(Debug)]
pub struct DecodedServerKeyExchange {
    pub group: NamedGroup,
    pub public: Bytes,
    /// The serialized ECParameters + public point, exactly as signed.
    pub params_raw: Bytes,
    /// Present for TLS 1.2 and up.
    pub signature_algorithm: Option<SignatureScheme>,
    pub signature: Bytes,
}

impl ServerKeyExchange {
    pub fn for_ecdhe(
        group: NamedGroup,
        public: &[u8],
        signature_algorithm: Option<SignatureScheme>,
        signature: &[u8],
    ) -> Self {
        let mut data = vec![];
        Self::serialize_params(group, public, &mut data);
        if let Some(alg) = signature_algorithm {
            alg.serialize(&mut data);
        }
        serialize_varlen_vector(0, U16_LIMIT, &mut data, |out| {
            out.extend_from_slice(signature);
        });
        ServerKeyExchange { data: data.into() }
    }

    /// Serializes the ECDHE parameters alone: the value covered by the
    /// server's signature (together with both hello randoms).
    pub fn serialize_params(group: NamedGroup, public: &[u8], out: &mut Vec<u8>) {
        out.push(CURVE_TYPE_NAMED_CURVE);
        group.serialize(out);
        serialize_varlen_vector(1, U8_LIMIT, out, |out| {
            out.extend_from_slice(public);
        });
    }

    pub fn decode_ecdhe(
        &self,
        protocol_version: ProtocolVersion,
    ) -> Result<DecodedServerKeyExchange> {
        let mut input = self.data.clone();
        let params_start = input.clone();

        let curve_type = be_u8(&mut input)?;
        if curve_type != CURVE_TYPE_NAMED_CURVE {
            return Err(Error::fatal(
                AlertDescription::handshake_failure,
                "Only named curves are supported",
            ));
        }
        let group = NamedGroup::parse(&mut input)?;
        let public = varlen_vector(1, U8_LIMIT, &mut input)?;

        let params_raw = params_start.slice(0..(params_start.len() - input.len()));

        let signature_algorithm = if protocol_version >= TLS_1_2_VERSION {
            Some(SignatureScheme::parse(&mut input)?)
        } else {
            None
        };
        let signature = varlen_vector(0, U16_LIMIT, &mut input)?;
        expect_empty(&input)?;

        Ok(DecodedServerKeyExchange {
            group,
            public,
            params_raw,
            signature_algorithm,
            signature,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.4. Certificate Request
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    /// ClientCertificateType values.
    pub certificate_types: Bytes,
    /// Only present for TLS 1.2 and up.
    pub supported_signature_algorithms: Vec<SignatureScheme>,
    /// DER encoded distinguished names. Empty means any CA is acceptable.
    pub certificate_authorities: Vec<Bytes>,
}

impl CertificateRequest {
    pub fn parse(input: &mut Bytes, protocol_version: ProtocolVersion) -> Result<Self> {
        let certificate_types = varlen_vector(1, U8_LIMIT, input)?;

        let supported_signature_algorithms = if protocol_version >= TLS_1_2_VERSION {
            SignatureSchemeList::parse(input)?.algorithms
        } else {
            vec![]
        };

        let mut data = varlen_vector(0, U16_LIMIT, input)?;
        let mut certificate_authorities = vec![];
        while !data.is_empty() {
            certificate_authorities.push(varlen_vector(1, U16_LIMIT, &mut data)?);
        }

        Ok(CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        })
    }

    pub fn serialize(&self, protocol_version: ProtocolVersion, out: &mut Vec<u8>) {
        serialize_varlen_vector(1, U8_LIMIT, out, |out| {
            out.extend_from_slice(&self.certificate_types);
        });

        if protocol_version >= TLS_1_2_VERSION {
            SignatureSchemeList {
                algorithms: self.supported_signature_algorithms.clone(),
            }
            .serialize(out);
        }

        serialize_varlen_vector(0, U16_LIMIT, out, |out| {
            for dn in self.certificate_authorities.iter() {
                serialize_varlen_vector(1, U16_LIMIT, out, |out| {
                    out.extend_from_slice(dn);
                });
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.8. Certificate Verify
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct CertificateVerify {
    /// Only present for TLS 1.2 and up.
    pub algorithm: Option<SignatureScheme>,
    pub signature: Bytes,
}

impl CertificateVerify {
    pub fn parse(input: &mut Bytes, protocol_version: ProtocolVersion) -> Result<Self> {
        let algorithm = if protocol_version >= TLS_1_2_VERSION {
            Some(SignatureScheme::parse(input)?)
        } else {
            None
        };
        let signature = varlen_vector(0, U16_LIMIT, input)?;
        Ok(CertificateVerify { algorithm, signature })
    }

    pub fn serialize(&self, protocol_version: ProtocolVersion, out: &mut Vec<u8>) {
        if protocol_version >= TLS_1_2_VERSION {
            if let Some(alg) = self.algorithm {
                alg.serialize(out);
            }
        }
        serialize_varlen_vector(0, U16_LIMIT, out, |out| {
            out.extend_from_slice(&self.signature);
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.7. Client Key Exchange
////////////////////////////////////////////////////////////////////////////////

/// Raw ClientKeyExchange payload; interpreted according to the negotiated
/// key exchange by the server machine.
#[derive(Debug, Clone)]
pub struct ClientKeyExchange {
    pub data: Bytes,
}

impl ClientKeyExchange {
    pub fn new_rsa(encrypted_pre_master_secret: &[u8]) -> Self {
        let mut data = vec![];
        serialize_varlen_vector(0, U16_LIMIT, &mut data, |out| {
            out.extend_from_slice(encrypted_pre_master_secret);
        });
        ClientKeyExchange { data: data.into() }
    }

    pub fn new_ecdhe(public: &[u8]) -> Self {
        let mut data = vec![];
        serialize_varlen_vector(1, U8_LIMIT, &mut data, |out| {
            out.extend_from_slice(public);
        });
        ClientKeyExchange { data: data.into() }
    }

    pub fn rsa_encrypted_pre_master(&self) -> Result<Bytes> {
        let mut input = self.data.clone();
        let value = varlen_vector(0, U16_LIMIT, &mut input)?;
        expect_empty(&input)?;
        Ok(value)
    }

    pub fn ecdhe_public(&self) -> Result<Bytes> {
        let mut input = self.data.clone();
        let value = varlen_vector(1, U8_LIMIT, &mut input)?;
        expect_empty(&input)?;
        Ok(value)
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 7.4.9. Finished
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct Finished {
    /// PRF output truncated to 12 bytes for every suite the engine carries.
    pub verify_data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ProtocolNameList;

    fn sample_client_hello() -> ClientHello {
        ClientHello {
            client_version: TLS_1_2_VERSION,
            random: Bytes::from(vec![7u8; 32]),
            session_id: Bytes::from_static(&[1, 2, 3, 4]),
            cipher_suites: vec![
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: Bytes::from_static(&[0]),
            extensions: vec![Extension::ALPN(ProtocolNameList {
                names: vec![Bytes::from_static(b"h2")],
            })],
        }
    }

    #[test]
    fn client_hello_roundtrip() {
        let hello = sample_client_hello();

        let mut out = vec![];
        Handshake::ClientHello(hello.clone()).serialize(TLS_1_2_VERSION, &mut out);

        let (parsed, rest) = Handshake::parse(Bytes::from(out), TLS_1_2_VERSION).unwrap();
        assert!(rest.is_empty());

        match parsed {
            Handshake::ClientHello(v) => {
                assert_eq!(v.client_version, hello.client_version);
                assert_eq!(v.session_id, hello.session_id);
                assert_eq!(v.cipher_suites, hello.cipher_suites);
                assert_eq!(v.extensions.len(), 1);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn partial_message_is_incomplete() {
        let mut out = vec![];
        Handshake::ClientHello(sample_client_hello()).serialize(TLS_1_2_VERSION, &mut out);
        out.truncate(out.len() - 1);

        let err = Handshake::parse(Bytes::from(out), TLS_1_2_VERSION).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn two_messages_in_one_buffer() {
        let mut out = vec![];
        Handshake::ServerHelloDone.serialize(TLS_1_2_VERSION, &mut out);
        Handshake::Finished(Finished {
            verify_data: Bytes::from_static(&[0u8; 12]),
        })
        .serialize(TLS_1_2_VERSION, &mut out);

        let (first, rest) = Handshake::parse(Bytes::from(out), TLS_1_2_VERSION).unwrap();
        assert!(matches!(first, Handshake::ServerHelloDone));

        let (second, rest) = Handshake::parse(rest, TLS_1_2_VERSION).unwrap();
        match second {
            Handshake::Finished(f) => assert_eq!(f.verify_data.len(), 12),
            _ => panic!("Wrong message type"),
        }
        assert!(rest.is_empty());
    }

    #[test]
    fn server_key_exchange_decode() {
        let ske = ServerKeyExchange::for_ecdhe(
            NamedGroup::secp256r1,
            &[4, 1, 2, 3],
            Some(SignatureScheme::rsa_pkcs1_sha256),
            &[9u8; 64],
        );

        let decoded = ske.decode_ecdhe(TLS_1_2_VERSION).unwrap();
        assert_eq!(decoded.group, NamedGroup::secp256r1);
        assert_eq!(&decoded.public[..], &[4, 1, 2, 3]);
        assert_eq!(
            decoded.signature_algorithm,
            Some(SignatureScheme::rsa_pkcs1_sha256)
        );
        assert_eq!(decoded.signature.len(), 64);
        // params_raw covers curve_type + group + length-prefixed point.
        assert_eq!(decoded.params_raw.len(), 1 + 2 + 1 + 4);
    }

    #[test]
    fn client_key_exchange_forms() {
        let rsa = ClientKeyExchange::new_rsa(&[1u8; 48]);
        assert_eq!(rsa.rsa_encrypted_pre_master().unwrap().len(), 48);

        let ec = ClientKeyExchange::new_ecdhe(&[4, 5, 6]);
        assert_eq!(&ec.ecdhe_public().unwrap()[..], &[4, 5, 6]);
    }
}
