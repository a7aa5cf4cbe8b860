// TLS specific helpers for parsing binary packets.
//
// All readers advance the input on success. Running out of bytes is
// reported as Error::Incomplete so that the record layer can distinguish
// "wait for more records" from malformed data.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes};

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};

pub const U8_LIMIT: usize = u8::max_value() as usize;
pub const U16_LIMIT: usize = u16::max_value() as usize;
pub const U24_LIMIT: usize = 1 << 24;
pub const U32_LIMIT: usize = u32::max_value() as usize;

pub fn exp2(v: usize) -> usize {
    1 << v
}

pub fn take_exact(input: &mut Bytes, n: usize) -> Result<Bytes> {
    if input.len() < n {
        return Err(Error::Incomplete);
    }
    Ok(input.split_to(n))
}

pub fn be_u8(input: &mut Bytes) -> Result<u8> {
    if input.is_empty() {
        return Err(Error::Incomplete);
    }
    let v = input[0];
    input.advance(1);
    Ok(v)
}

pub fn be_u16(input: &mut Bytes) -> Result<u16> {
    if input.len() < 2 {
        return Err(Error::Incomplete);
    }
    let v = BigEndian::read_u16(&input[..]);
    input.advance(2);
    Ok(v)
}

pub fn be_u24(input: &mut Bytes) -> Result<u32> {
    if input.len() < 3 {
        return Err(Error::Incomplete);
    }
    let v = BigEndian::read_u24(&input[..]);
    input.advance(3);
    Ok(v)
}

pub fn be_u32(input: &mut Bytes) -> Result<u32> {
    if input.len() < 4 {
        return Err(Error::Incomplete);
    }
    let v = BigEndian::read_u32(&input[..]);
    input.advance(4);
    Ok(v)
}

pub fn u24_to_be_bytes(v: u32) -> [u8; 3] {
    let b = v.to_be_bytes();
    [b[1], b[2], b[3]]
}

/// Reads a variable length vector of bytes.
///
/// The max_bytes is used to determine how large the length field is: TLS
/// encodes the length in the minimum number of bytes required to store the
/// maximum length.
pub fn varlen_vector(min_bytes: usize, max_bytes: usize, input: &mut Bytes) -> Result<Bytes> {
    let len = if max_bytes <= U8_LIMIT {
        be_u8(input)? as usize
    } else if max_bytes <= U16_LIMIT {
        be_u16(input)? as usize
    } else if max_bytes <= U24_LIMIT {
        be_u24(input)? as usize
    } else if max_bytes <= U32_LIMIT {
        be_u32(input)? as usize
    } else {
        panic!("Maximum length not supported");
    };

    if len < min_bytes || len > max_bytes {
        return Err(Error::fatal(
            AlertDescription::decode_error,
            "Length out of allowed range",
        ));
    }

    take_exact(input, len)
}

/// Encodes a byte vector using the length prefixed wire format defined by TLS.
pub fn serialize_varlen_vector<F: FnMut(&mut Vec<u8>)>(
    min_bytes: usize,
    max_bytes: usize,
    out: &mut Vec<u8>,
    mut f: F,
) {
    let i = out.len();
    let n = if max_bytes <= U8_LIMIT {
        1
    } else if max_bytes <= U16_LIMIT {
        2
    } else if max_bytes <= U24_LIMIT {
        3
    } else if max_bytes <= U32_LIMIT {
        4
    } else {
        panic!("Maximum length not supported");
    };

    out.resize(i + n, 0);
    let ii = out.len();

    f(out);

    let size = out.len() - ii;
    assert!(size >= min_bytes && size <= max_bytes);

    match n {
        1 => {
            out[i] = size as u8;
        }
        2 => {
            *array_mut_ref![out, i, 2] = (size as u16).to_be_bytes();
        }
        3 => {
            *array_mut_ref![out, i, 3] = u24_to_be_bytes(size as u32);
        }
        4 => {
            *array_mut_ref![out, i, 4] = (size as u32).to_be_bytes();
        }
        _ => panic!("Should not happen"),
    };
}

/// Verifies a message was consumed entirely.
pub fn expect_empty(input: &Bytes) -> Result<()> {
    if !input.is_empty() {
        return Err(Error::fatal(
            AlertDescription::decode_error,
            "Unexpected data after message",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varlen_vector_roundtrip() {
        let mut out = vec![];
        serialize_varlen_vector(0, U16_LIMIT, &mut out, |out| {
            out.extend_from_slice(b"hello");
        });
        assert_eq!(&out[..], &[0, 5, b'h', b'e', b'l', b'l', b'o']);

        let mut input = Bytes::from(out);
        let data = varlen_vector(0, U16_LIMIT, &mut input).unwrap();
        assert_eq!(&data[..], b"hello");
        assert!(input.is_empty());
    }

    #[test]
    fn varlen_vector_length_bounds() {
        // Length below the minimum is malformed, not incomplete.
        let mut input = Bytes::from_static(&[0, 1, 42]);
        let err = varlen_vector(2, U16_LIMIT, &mut input).unwrap_err();
        assert!(!err.is_incomplete());
    }

    #[test]
    fn truncated_input_is_incomplete() {
        let mut input = Bytes::from_static(&[0, 9, 1, 2]);
        let err = varlen_vector(0, U16_LIMIT, &mut input).unwrap_err();
        assert!(err.is_incomplete());

        let mut input = Bytes::from_static(&[5]);
        assert!(be_u16(&mut input).unwrap_err().is_incomplete());
    }

    #[test]
    fn u24_encoding() {
        assert_eq!(u24_to_be_bytes(0x010203), [1, 2, 3]);

        let mut input = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(be_u24(&mut input).unwrap(), 0x010203);
    }
}
