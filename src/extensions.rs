// Hello extensions for TLS 1.0 - 1.2.
//
// Full registry: https://www.iana.org/assignments/tls-extensiontype-values
//
// Only the extensions the engine actually processes get a structured
// representation; everything else is carried opaquely and never reflected
// back by a server.

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};
use crate::handshake::HandshakeType;
use crate::parsing::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// An empty server name is only allowed when a server is acknowledging
    /// the client's SNI (RFC 6066 section 3).
    ServerName(Option<ServerNameList>),
    SupportedGroups(NamedGroupList),
    SupportedPointFormats(ECPointFormatList),
    SignatureAlgorithms(SignatureSchemeList),
    ALPN(ProtocolNameList),
    /// RFC 7627. Empty payload in both directions.
    ExtendedMasterSecret,
    /// RFC 5746 secure renegotiation indication.
    RenegotiationInfo(RenegotiationInfo),
    Unknown {
        typ: u16,
        data: Bytes,
    },
}

impl Extension {
    pub fn parse(input: &mut Bytes, msg_type: HandshakeType) -> Result<Self> {
        let extension_type = ExtensionType::from_u16(be_u16(input)?);
        if !extension_type.allowed(msg_type) {
            return Err(Error::fatal(
                AlertDescription::illegal_parameter,
                "Extension not allowed in this message",
            ));
        }

        let mut data = varlen_vector(0, U16_LIMIT, input)?;

        let value = match extension_type {
            ExtensionType::ServerName => {
                // A server acknowledges SNI with an empty extension.
                if data.is_empty() {
                    Extension::ServerName(None)
                } else {
                    Extension::ServerName(Some(ServerNameList::parse(&mut data)?))
                }
            }
            ExtensionType::SupportedGroups => {
                Extension::SupportedGroups(NamedGroupList::parse(&mut data)?)
            }
            ExtensionType::SupportedPointFormats => {
                Extension::SupportedPointFormats(ECPointFormatList::parse(&mut data)?)
            }
            ExtensionType::SignatureAlgorithms => {
                Extension::SignatureAlgorithms(SignatureSchemeList::parse(&mut data)?)
            }
            ExtensionType::ApplicationLayerProtocolNegotiation => {
                Extension::ALPN(ProtocolNameList::parse(&mut data)?)
            }
            ExtensionType::ExtendedMasterSecret => {
                if !data.is_empty() {
                    return Err(Error::fatal(
                        AlertDescription::decode_error,
                        "Expected empty extended_master_secret extension",
                    ));
                }
                Extension::ExtendedMasterSecret
            }
            ExtensionType::RenegotiationInfo => {
                Extension::RenegotiationInfo(RenegotiationInfo::parse(&mut data)?)
            }
            ExtensionType::Unknown(typ) => {
                return Ok(Extension::Unknown { typ, data });
            }
        };

        expect_empty(&data)?;
        Ok(value)
    }

    pub fn serialize(&self, msg_type: HandshakeType, out: &mut Vec<u8>) -> Result<()> {
        use Extension::*;

        let typ = match self {
            ServerName(_) => ExtensionType::ServerName,
            SupportedGroups(_) => ExtensionType::SupportedGroups,
            SupportedPointFormats(_) => ExtensionType::SupportedPointFormats,
            SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            ALPN(_) => ExtensionType::ApplicationLayerProtocolNegotiation,
            ExtendedMasterSecret => ExtensionType::ExtendedMasterSecret,
            RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Unknown { typ, data: _ } => ExtensionType::Unknown(*typ),
        };

        if !typ.allowed(msg_type) {
            return Err(Error::Config(format!(
                "Extension {:?} not allowed in {:?}",
                typ, msg_type
            )));
        }

        out.extend_from_slice(&typ.to_u16().to_be_bytes());

        serialize_varlen_vector(0, U16_LIMIT, out, |out| match self {
            ServerName(e) => {
                if let Some(e) = e {
                    e.serialize(out);
                }
            }
            SupportedGroups(e) => e.serialize(out),
            SupportedPointFormats(e) => e.serialize(out),
            SignatureAlgorithms(e) => e.serialize(out),
            ALPN(e) => e.serialize(out),
            ExtendedMasterSecret => {}
            RenegotiationInfo(e) => e.serialize(out),
            Unknown { typ: _, data } => out.extend_from_slice(data),
        });

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    ServerName,
    SupportedGroups,
    SupportedPointFormats,
    SignatureAlgorithms,
    ApplicationLayerProtocolNegotiation,
    ExtendedMasterSecret,
    RenegotiationInfo,
    Unknown(u16),
}

impl ExtensionType {
    fn to_u16(&self) -> u16 {
        use ExtensionType::*;
        match self {
            ServerName => 0,
            SupportedGroups => 10,
            SupportedPointFormats => 11,
            SignatureAlgorithms => 13,
            ApplicationLayerProtocolNegotiation => 16,
            ExtendedMasterSecret => 23,
            RenegotiationInfo => 0xff01,
            Unknown(v) => *v,
        }
    }

    fn from_u16(v: u16) -> Self {
        match v {
            0 => Self::ServerName,
            10 => Self::SupportedGroups,
            11 => Self::SupportedPointFormats,
            13 => Self::SignatureAlgorithms,
            16 => Self::ApplicationLayerProtocolNegotiation,
            23 => Self::ExtendedMasterSecret,
            0xff01 => Self::RenegotiationInfo,
            _ => Self::Unknown(v),
        }
    }

    /// Which hello message an extension may appear in. A server only ever
    /// reflects extensions it processed.
    fn allowed(&self, msg_type: HandshakeType) -> bool {
        use ExtensionType::*;
        use HandshakeType::*;
        match self {
            ServerName => msg_type == ClientHello || msg_type == ServerHello,
            SupportedGroups => msg_type == ClientHello,
            SupportedPointFormats => msg_type == ClientHello || msg_type == ServerHello,
            SignatureAlgorithms => msg_type == ClientHello,
            ApplicationLayerProtocolNegotiation => {
                msg_type == ClientHello || msg_type == ServerHello
            }
            ExtendedMasterSecret => msg_type == ClientHello || msg_type == ServerHello,
            RenegotiationInfo => msg_type == ClientHello || msg_type == ServerHello,
            ExtensionType::Unknown(_) => true,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 6066 Section 3: Server Name Indication
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNameList {
    pub names: Vec<ServerName>,
}

impl ServerNameList {
    pub fn single_host(hostname: &str) -> Self {
        ServerNameList {
            names: vec![ServerName {
                typ: NameType::host_name,
                data: Bytes::from(hostname.as_bytes().to_vec()),
            }],
        }
    }

    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(1, U16_LIMIT, input)?;
        let mut names = vec![];
        while !data.is_empty() {
            names.push(ServerName::parse(&mut data)?);
        }
        Ok(ServerNameList { names })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(1, U16_LIMIT, out, |out| {
            for n in self.names.iter() {
                n.serialize(out);
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerName {
    pub typ: NameType,
    /// Strictly ASCII when typ is host_name.
    pub data: Bytes,
}

impl ServerName {
    fn parse(input: &mut Bytes) -> Result<Self> {
        let typ = NameType::from_u8(be_u8(input)?);
        let data = varlen_vector(1, U16_LIMIT, input)?;
        Ok(ServerName { typ, data })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.typ.to_u8());
        serialize_varlen_vector(1, U16_LIMIT, out, |out| {
            out.extend_from_slice(&self.data);
        });
    }
}

tls_enum_u8!(NameType => {
    host_name(0), (255)
});

////////////////////////////////////////////////////////////////////////////////
// RFC 8422 / RFC 7919: supported groups and point formats
////////////////////////////////////////////////////////////////////////////////

tls_enum_u16!(
    #[allow(non_camel_case_types)] NamedGroup => {
    secp256r1 = 0x0017,
    secp384r1 = 0x0018,
    secp521r1 = 0x0019,
    x25519 = 0x001d
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedGroupList {
    pub groups: Vec<NamedGroup>,
}

impl NamedGroupList {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(2, U16_LIMIT, input)?;
        let mut groups = vec![];
        while !data.is_empty() {
            groups.push(NamedGroup::parse(&mut data)?);
        }
        Ok(NamedGroupList { groups })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(2, U16_LIMIT, out, |out| {
            for g in self.groups.iter() {
                g.serialize(out);
            }
        });
    }
}

tls_enum_u8!(ECPointFormat => {
    uncompressed(0), (255)
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ECPointFormatList {
    pub formats: Vec<ECPointFormat>,
}

impl ECPointFormatList {
    pub fn uncompressed_only() -> Self {
        ECPointFormatList {
            formats: vec![ECPointFormat::uncompressed],
        }
    }

    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(1, U8_LIMIT, input)?;
        let mut formats = vec![];
        while !data.is_empty() {
            formats.push(ECPointFormat::parse(&mut data)?);
        }
        Ok(ECPointFormatList { formats })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(1, U8_LIMIT, out, |out| {
            for f in self.formats.iter() {
                f.serialize(out);
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5246 Section 7.4.1.4.1: signature_algorithms
////////////////////////////////////////////////////////////////////////////////

// SignatureAndHashAlgorithm pairs in their u16 wire form.
tls_enum_u16!(
    #[allow(non_camel_case_types)] SignatureScheme => {
    rsa_pkcs1_sha1 = 0x0201,
    ecdsa_sha1 = 0x0203,
    rsa_pkcs1_sha256 = 0x0401,
    ecdsa_secp256r1_sha256 = 0x0403,
    rsa_pkcs1_sha384 = 0x0501,
    ecdsa_secp384r1_sha384 = 0x0503,
    rsa_pkcs1_sha512 = 0x0601
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSchemeList {
    pub algorithms: Vec<SignatureScheme>,
}

impl SignatureSchemeList {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(2, U16_LIMIT, input)?;
        let mut algorithms = vec![];
        while !data.is_empty() {
            algorithms.push(SignatureScheme::parse(&mut data)?);
        }
        Ok(SignatureSchemeList { algorithms })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(2, U16_LIMIT, out, |out| {
            for a in self.algorithms.iter() {
                a.serialize(out);
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 7301: ALPN
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolNameList {
    pub names: Vec<Bytes>,
}

impl ProtocolNameList {
    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let mut data = varlen_vector(2, U16_LIMIT, input)?;
        let mut names = vec![];
        while !data.is_empty() {
            names.push(varlen_vector(1, U8_LIMIT, &mut data)?);
        }
        Ok(ProtocolNameList { names })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(2, U16_LIMIT, out, |out| {
            for n in self.names.iter() {
                serialize_varlen_vector(1, U8_LIMIT, out, |out| {
                    out.extend_from_slice(n);
                });
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// RFC 5746: renegotiation_info
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenegotiationInfo {
    /// Empty on an initial handshake. This engine never renegotiates, so a
    /// non-empty value is only ever validated, not produced.
    pub renegotiated_connection: Bytes,
}

impl RenegotiationInfo {
    pub fn initial() -> Self {
        RenegotiationInfo {
            renegotiated_connection: Bytes::new(),
        }
    }

    pub fn parse(input: &mut Bytes) -> Result<Self> {
        let renegotiated_connection = varlen_vector(0, U8_LIMIT, input)?;
        Ok(RenegotiationInfo {
            renegotiated_connection,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        serialize_varlen_vector(0, U8_LIMIT, out, |out| {
            out.extend_from_slice(&self.renegotiated_connection);
        });
    }
}

////////////////////////////////////////////////////////////////////////////////

pub fn find_server_name(extensions: &[Extension]) -> Option<&ServerNameList> {
    for e in extensions {
        if let Extension::ServerName(Some(v)) = e {
            return Some(v);
        }
    }
    None
}

pub fn find_supported_groups(extensions: &[Extension]) -> Option<&NamedGroupList> {
    for e in extensions {
        if let Extension::SupportedGroups(v) = e {
            return Some(v);
        }
    }
    None
}

pub fn find_signature_algorithms(extensions: &[Extension]) -> Option<&SignatureSchemeList> {
    for e in extensions {
        if let Extension::SignatureAlgorithms(v) = e {
            return Some(v);
        }
    }
    None
}

pub fn find_alpn(extensions: &[Extension]) -> Option<&ProtocolNameList> {
    for e in extensions {
        if let Extension::ALPN(v) = e {
            return Some(v);
        }
    }
    None
}

pub fn find_renegotiation_info(extensions: &[Extension]) -> Option<&RenegotiationInfo> {
    for e in extensions {
        if let Extension::RenegotiationInfo(v) = e {
            return Some(v);
        }
    }
    None
}

pub fn has_extended_master_secret(extensions: &[Extension]) -> bool {
    extensions
        .iter()
        .any(|e| matches!(e, Extension::ExtendedMasterSecret))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ext: Extension, msg_type: HandshakeType) -> Extension {
        let mut out = vec![];
        ext.serialize(msg_type, &mut out).unwrap();
        let mut input = Bytes::from(out);
        let parsed = Extension::parse(&mut input, msg_type).unwrap();
        assert!(input.is_empty());
        parsed
    }

    #[test]
    fn server_name_roundtrip() {
        let ext = Extension::ServerName(Some(ServerNameList::single_host("example.com")));
        assert_eq!(roundtrip(ext.clone(), HandshakeType::ClientHello), ext);

        // Empty acknowledgement from the server side.
        let ack = Extension::ServerName(None);
        assert_eq!(roundtrip(ack.clone(), HandshakeType::ServerHello), ack);
    }

    #[test]
    fn alpn_roundtrip() {
        let ext = Extension::ALPN(ProtocolNameList {
            names: vec![
                Bytes::from_static(b"h2"),
                Bytes::from_static(b"http/1.1"),
            ],
        });
        assert_eq!(roundtrip(ext.clone(), HandshakeType::ClientHello), ext);
    }

    #[test]
    fn renegotiation_info_initial_is_empty() {
        let ext = Extension::RenegotiationInfo(RenegotiationInfo::initial());
        let mut out = vec![];
        ext.serialize(HandshakeType::ClientHello, &mut out).unwrap();
        // type(2) + length(2) + inner length(1)
        assert_eq!(&out[..], &[0xff, 0x01, 0, 1, 0]);
    }

    #[test]
    fn unknown_extension_is_opaque() {
        let ext = Extension::Unknown {
            typ: 0x1234,
            data: Bytes::from_static(&[9, 9, 9]),
        };
        assert_eq!(roundtrip(ext.clone(), HandshakeType::ClientHello), ext);
    }

    #[test]
    fn supported_groups_not_allowed_in_server_hello() {
        let ext = Extension::SupportedGroups(NamedGroupList {
            groups: vec![NamedGroup::secp256r1],
        });
        assert!(ext.serialize(HandshakeType::ServerHello, &mut vec![]).is_err());
    }
}
