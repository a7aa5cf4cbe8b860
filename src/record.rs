// TLS record framing (RFC 5246 section 6.2).
//
// Big-endian network order. The engine never blocks, so instead of reading
// records off a stream the header is peeked out of whatever bytes the host
// has offered and the caller is told how many bytes a full record needs.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};
use crate::parsing::exp2;

pub const RECORD_HEADER_SIZE: usize = 5;

/// Largest plaintext fragment which may be carried by one record.
/// Compression is never negotiated, so TLSCompressed never exceeds this
/// either.
pub const MAX_PLAINTEXT_LENGTH: usize = 1 << 14;

/// Largest ciphertext fragment: 2^14 + 2048.
pub const MAX_CIPHERTEXT_LENGTH: usize = (1 << 14) + 2048;

tls_enum_u8!(ContentType => {
    change_cipher_spec(20),
    alert(21),
    handshake(22),
    application_data(23),
    heartbeat(24),
    (255)
});

/// Outer most data type transmitted on the wire.
#[derive(Debug, Clone)]
pub struct Record {
    pub typ: ContentType,
    pub version: u16, // ProtocolVersion
    /// Encrypted once a cipher is active in this direction.
    pub data: Bytes,
}

impl Record {
    /// Peeks at the record header and returns the total number of input
    /// bytes (header included) needed before parse() can succeed. Returns
    /// None when not even the header is available yet.
    pub fn peek_length(input: &[u8]) -> Option<usize> {
        if input.len() < RECORD_HEADER_SIZE {
            return None;
        }
        let length = BigEndian::read_u16(&input[3..5]) as usize;
        Some(RECORD_HEADER_SIZE + length)
    }

    pub fn parse(input: &mut Bytes) -> Result<Record> {
        if input.len() < RECORD_HEADER_SIZE {
            return Err(Error::Incomplete);
        }

        let header = input.split_to(RECORD_HEADER_SIZE);
        let typ = ContentType::from_u8(header[0]);
        let version = u16::from_be_bytes(*array_ref![header, 1, 2]);
        let length = u16::from_be_bytes(*array_ref![header, 3, 2]) as usize;

        // Only SSL/TLS major version 3 framing is recognized at all.
        if (version >> 8) != 3 {
            return Err(Error::fatal(
                AlertDescription::decode_error,
                "Malformed record header",
            ));
        }

        if length > MAX_CIPHERTEXT_LENGTH {
            return Err(Error::fatal(
                AlertDescription::record_overflow,
                "Record length exceeds 2^14 + 2048",
            ));
        }

        if input.len() < length {
            return Err(Error::Incomplete);
        }

        let data = input.split_to(length);
        Ok(Record { typ, version, data })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.typ.to_u8());
        out.extend_from_slice(&self.version.to_be_bytes());
        assert!(self.data.len() <= MAX_CIPHERTEXT_LENGTH);
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
    }
}

/// The plaintext form of a record: content type plus an unencrypted
/// fragment of at most MAX_PLAINTEXT_LENGTH bytes.
#[derive(Debug)]
pub struct RecordInner {
    pub typ: ContentType,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn known_record_bytes() {
        // handshake record, TLS 1.2, carrying a ServerHelloDone
        let raw = hex!("16 0303 0004 0e 000000");

        let mut input = Bytes::from(raw.to_vec());
        let record = Record::parse(&mut input).unwrap();
        assert_eq!(record.typ, ContentType::handshake);
        assert_eq!(record.version, 0x0303);
        assert_eq!(&record.data[..], &hex!("0e000000")[..]);

        let mut out = vec![];
        record.serialize(&mut out);
        assert_eq!(&out[..], &raw[..]);
    }

    #[test]
    fn peek_then_parse() {
        let record = Record {
            typ: ContentType::handshake,
            version: 0x0303,
            data: Bytes::from_static(b"abcdef"),
        };

        let mut out = vec![];
        record.serialize(&mut out);
        assert_eq!(out.len(), RECORD_HEADER_SIZE + 6);

        assert_eq!(Record::peek_length(&out[..3]), None);
        assert_eq!(Record::peek_length(&out), Some(out.len()));

        let mut input = Bytes::from(out);
        let parsed = Record::parse(&mut input).unwrap();
        assert_eq!(parsed.typ, ContentType::handshake);
        assert_eq!(parsed.version, 0x0303);
        assert_eq!(&parsed.data[..], b"abcdef");
        assert!(input.is_empty());
    }

    #[test]
    fn partial_record_is_incomplete() {
        let mut input = Bytes::from_static(&[22, 3, 3, 0, 10, 1, 2, 3]);
        assert!(Record::parse(&mut input).unwrap_err().is_incomplete());
    }

    #[test]
    fn oversized_record_is_overflow() {
        let length = (MAX_CIPHERTEXT_LENGTH + 1) as u16;
        let mut header = vec![23u8, 3, 3];
        header.extend_from_slice(&length.to_be_bytes());
        header.resize(RECORD_HEADER_SIZE + length as usize, 0);

        let mut input = Bytes::from(header);
        let err = Record::parse(&mut input).unwrap_err();
        match err {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::record_overflow)
            }
            _ => panic!("Expected an alert"),
        }
    }

    #[test]
    fn non_tls_header_is_rejected() {
        let mut input = Bytes::from_static(&[22, 9, 9, 0, 0]);
        assert!(!Record::parse(&mut input).unwrap_err().is_incomplete());
    }

    #[test]
    fn exp2_limits() {
        assert_eq!(MAX_PLAINTEXT_LENGTH, exp2(14));
        assert_eq!(MAX_CIPHERTEXT_LENGTH, exp2(14) + 2048);
    }
}
