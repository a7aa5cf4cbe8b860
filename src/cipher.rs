// Record protection state for one direction of a connection.

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::crypto::Aead;
use crate::errors::{Error, Result};
use crate::record::{ContentType, Record, RecordInner};

/// Encryption/decryption state for one half-duplex pipeline. A single
/// instance is only ever used for encrypting or decrypting, not both.
pub struct CipherEndpointSpec {
    /// Sequence number of the next record protected with this cipher.
    /// Starts at 0 when the ChangeCipherSpec promotes the keys. Never
    /// wraps.
    sequence_num: u64,

    implicit_iv: Bytes,

    aead: Box<dyn Aead>,

    nonce_gen: Box<dyn NonceGenerator>,
}

impl CipherEndpointSpec {
    pub fn new(aead: Box<dyn Aead>, implicit_iv: Bytes, nonce_gen: Box<dyn NonceGenerator>) -> Self {
        Self {
            sequence_num: 0,
            implicit_iv,
            aead,
            nonce_gen,
        }
    }

    /// Worst case growth from plaintext fragment to ciphertext fragment.
    pub fn expansion(&self) -> usize {
        self.nonce_gen.explicit_size() + self.aead.expansion()
    }

    /// Encrypts a TLSPlaintext record into a TLSCiphertext record.
    pub fn encrypt(&mut self, inner: RecordInner, version: u16) -> Record {
        let additional_data = self.additional_data(inner.typ, version);

        let explicit_nonce = self.nonce_gen.generate_explicit(self.sequence_num);
        let nonce = self
            .nonce_gen
            .generate_full(&self.implicit_iv, self.sequence_num, &explicit_nonce);

        let mut data = explicit_nonce;
        self.aead
            .encrypt(&nonce, &inner.data, &additional_data, &mut data);

        self.sequence_num += 1;

        Record {
            typ: inner.typ,
            version,
            data: data.into(),
        }
    }

    pub fn decrypt(&mut self, record: Record) -> Result<RecordInner> {
        let explicit_nonce_size = self.nonce_gen.explicit_size();
        if record.data.len() < explicit_nonce_size + self.aead.expansion() {
            return Err(Error::fatal(
                AlertDescription::bad_record_mac,
                "Ciphertext shorter than cipher overhead",
            ));
        }

        let (explicit_nonce, ciphertext) = record.data.split_at(explicit_nonce_size);

        let additional_data = self.additional_data(record.typ, record.version);
        let nonce = self
            .nonce_gen
            .generate_full(&self.implicit_iv, self.sequence_num, explicit_nonce);

        let mut plaintext = vec![];
        self.aead
            .decrypt(&nonce, ciphertext, &additional_data, &mut plaintext)
            .map_err(|_| {
                Error::fatal(AlertDescription::bad_record_mac, "Record failed to decrypt")
            })?;

        self.sequence_num += 1;

        Ok(RecordInner {
            typ: record.typ,
            data: plaintext.into(),
        })
    }

    // seq_num || type || version. The plaintext length field is appended
    // by the Aead implementation itself.
    fn additional_data(&self, typ: ContentType, version: u16) -> Vec<u8> {
        let mut additional_data = vec![];
        additional_data.extend_from_slice(&self.sequence_num.to_be_bytes());
        additional_data.push(typ.to_u8());
        additional_data.extend_from_slice(&version.to_be_bytes());
        additional_data
    }
}

pub trait NonceGenerator: Send + Sync {
    /// Nonce bytes carried in each record ('record_iv_length').
    fn explicit_size(&self) -> usize;

    /// Generates the explicit nonce sent with the record.
    fn generate_explicit(&self, sequence_num: u64) -> Vec<u8>;

    /// Combines the implicit IV from the key block with the explicit part
    /// into the nonce handed to the AEAD.
    fn generate_full(&self, implicit_iv: &[u8], sequence_num: u64, explicit: &[u8]) -> Vec<u8>;

    fn box_clone(&self) -> Box<dyn NonceGenerator>;
}

/// Nonce generator for AES-GCM suites (RFC 5288) and the explicit CBC
/// record IV. The explicit part is a per-connection seeded counter so
/// that no two connections share a nonce sequence.
#[derive(Clone)]
pub struct GcmNonceGenerator {
    seed: u64,
    explicit_size: usize,
}

impl GcmNonceGenerator {
    pub fn new(seed: u64, explicit_size: usize) -> Self {
        Self {
            seed,
            explicit_size,
        }
    }
}

impl NonceGenerator for GcmNonceGenerator {
    fn explicit_size(&self) -> usize {
        self.explicit_size
    }

    fn generate_explicit(&self, sequence_num: u64) -> Vec<u8> {
        let value = self.seed.wrapping_add(sequence_num);
        let mut out = vec![0u8; self.explicit_size];
        let counter = value.to_be_bytes();
        let n = core::cmp::min(self.explicit_size, counter.len());
        let start = out.len() - n;
        out[start..].copy_from_slice(&counter[counter.len() - n..]);
        out
    }

    fn generate_full(&self, implicit_iv: &[u8], _sequence_num: u64, explicit: &[u8]) -> Vec<u8> {
        // Concatenate the implicit 'salt' with the explicit nonce.
        let mut out = implicit_iv.to_vec();
        out.extend_from_slice(explicit);
        out
    }

    fn box_clone(&self) -> Box<dyn NonceGenerator> {
        Box::new(self.clone())
    }
}

/// Based on RFC 7905: no explicit nonce; the sequence number is XORed into
/// the implicit IV.
#[derive(Clone)]
pub struct ChaChaPoly1305NonceGenerator {}

impl ChaChaPoly1305NonceGenerator {
    pub fn new() -> Self {
        Self {}
    }
}

impl NonceGenerator for ChaChaPoly1305NonceGenerator {
    fn explicit_size(&self) -> usize {
        0
    }

    fn generate_explicit(&self, _sequence_num: u64) -> Vec<u8> {
        vec![]
    }

    fn generate_full(&self, implicit_iv: &[u8], sequence_num: u64, _explicit: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        out[4..].copy_from_slice(&sequence_num.to_be_bytes());
        xor_inplace(implicit_iv, &mut out);
        out
    }

    fn box_clone(&self) -> Box<dyn NonceGenerator> {
        Box::new(self.clone())
    }
}

fn xor_inplace(a: &[u8], out: &mut [u8]) {
    for (i, byte) in a.iter().enumerate() {
        out[i] ^= byte;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::CipherSuite;
    use crate::crypto::Crypto;
    use crate::testing::TestCrypto;

    fn pair() -> (CipherEndpointSpec, CipherEndpointSpec) {
        let crypto = TestCrypto::new();
        let suite = CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256;
        let key = [7u8; 16];
        let iv = [9u8; 4];

        let make = || {
            CipherEndpointSpec::new(
                crypto.create_aead(suite, &key, &iv, &[]).unwrap(),
                Bytes::from(iv.to_vec()),
                Box::new(GcmNonceGenerator::new(42, 8)),
            )
        };
        (make(), make())
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (mut writer, mut reader) = pair();

        for i in 0..3u8 {
            let record = writer.encrypt(
                RecordInner {
                    typ: ContentType::application_data,
                    data: Bytes::from(vec![i; 100]),
                },
                0x0303,
            );
            assert_eq!(record.data.len(), 100 + writer.expansion());

            let inner = reader.decrypt(record).unwrap();
            assert_eq!(&inner.data[..], &[i; 100][..]);
        }
    }

    #[test]
    fn tampered_record_fails() {
        let (mut writer, mut reader) = pair();

        let mut record = writer.encrypt(
            RecordInner {
                typ: ContentType::application_data,
                data: Bytes::from_static(b"attack at dawn"),
            },
            0x0303,
        );

        let mut data = record.data.to_vec();
        data[10] ^= 1;
        record.data = data.into();

        let err = reader.decrypt(record).unwrap_err();
        match err {
            Error::Alert { description, .. } => {
                assert_eq!(description, AlertDescription::bad_record_mac)
            }
            _ => panic!("Expected bad_record_mac"),
        }
    }

    #[test]
    fn sequence_number_mismatch_fails() {
        let (mut writer, mut reader) = pair();

        // Drop the first record; the second must not decrypt under seq 0.
        let _ = writer.encrypt(
            RecordInner {
                typ: ContentType::application_data,
                data: Bytes::from_static(b"one"),
            },
            0x0303,
        );
        let second = writer.encrypt(
            RecordInner {
                typ: ContentType::application_data,
                data: Bytes::from_static(b"two"),
            },
            0x0303,
        );

        assert!(reader.decrypt(second).is_err());
    }
}
