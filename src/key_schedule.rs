// Key derivation for TLS 1.0 - 1.2.
//
// TLS 1.2 uses P_<hash> with the suite's PRF hash. TLS 1.0/1.1 split the
// secret across P_MD5 and P_SHA1 and XOR the streams (RFC 2246 section 5).

use bytes::Bytes;

use crate::crypto::{Crypto, HashAlgorithm};
use crate::errors::Result;
use crate::handshake::{ProtocolVersion, TLS_1_2_VERSION};

pub const MASTER_SECRET_LENGTH: usize = 48;
pub const PRE_MASTER_SECRET_LENGTH: usize = 48;

// Valid for every suite this engine carries.
pub const VERIFY_DATA_LENGTH: usize = 12;

pub const MASTER_SECRET_LABEL: &[u8] = b"master secret";
pub const EXTENDED_MASTER_SECRET_LABEL: &[u8] = b"extended master secret";
pub const KEY_EXPANSION_LABEL: &[u8] = b"key expansion";
pub const CLIENT_FINISHED_LABEL: &[u8] = b"client finished";
pub const SERVER_FINISHED_LABEL: &[u8] = b"server finished";

/// The hash used over the handshake transcript: the suite's PRF hash for
/// TLS 1.2, the MD5+SHA-1 pair for everything older.
pub fn transcript_hash_alg(
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
) -> HashAlgorithm {
    if version >= TLS_1_2_VERSION {
        prf_hash
    } else {
        HashAlgorithm::Md5Sha1
    }
}

/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
pub fn prf(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    output_size: usize,
) -> Vec<u8> {
    let mut data = label.to_vec();
    data.extend_from_slice(seed);

    if version >= TLS_1_2_VERSION {
        return p_hash(crypto, prf_hash, secret, &data, output_size);
    }

    // TLS 1.0/1.1: PRF = P_MD5(S1, ...) XOR P_SHA1(S2, ...), where S1 and
    // S2 are the two (overlapping if odd) halves of the secret.
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let md5_stream = p_hash(crypto, HashAlgorithm::Md5, s1, &data, output_size);
    let sha1_stream = p_hash(crypto, HashAlgorithm::Sha1, s2, &data, output_size);

    md5_stream
        .iter()
        .zip(sha1_stream.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// P_hash(secret, seed) =
///     HMAC_hash(secret, A(1) + seed) +
///     HMAC_hash(secret, A(2) + seed) + ...
fn p_hash(
    crypto: &dyn Crypto,
    alg: HashAlgorithm,
    secret: &[u8],
    seed: &[u8],
    output_size: usize,
) -> Vec<u8> {
    // A(0) = seed, A(i) = HMAC_hash(secret, A(i-1))
    let mut a = seed.to_vec();

    let mut out = vec![];
    while out.len() < output_size {
        a = crypto.hmac(alg, secret, &a);

        let mut data = a.clone();
        data.extend_from_slice(seed);

        out.extend_from_slice(&crypto.hmac(alg, secret, &data));
    }

    out.truncate(output_size);
    out
}

/// master_secret = PRF(pre_master_secret, "master secret",
///     ClientHello.random + ServerHello.random)[0..47]
pub fn master_secret(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Vec<u8> {
    let mut seed = client_random.to_vec();
    seed.extend_from_slice(server_random);
    prf(
        crypto,
        version,
        prf_hash,
        pre_master_secret,
        MASTER_SECRET_LABEL,
        &seed,
        MASTER_SECRET_LENGTH,
    )
}

/// RFC 7627: the seed is the transcript hash through ClientKeyExchange
/// instead of the two randoms.
pub fn extended_master_secret(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Vec<u8> {
    prf(
        crypto,
        version,
        prf_hash,
        pre_master_secret,
        EXTENDED_MASTER_SECRET_LABEL,
        session_hash,
        MASTER_SECRET_LENGTH,
    )
}

#[derive(Debug)]
pub struct KeyBlock {
    pub client_write_mac_key: Bytes,
    pub server_write_mac_key: Bytes,
    pub client_write_key: Bytes,
    pub server_write_key: Bytes,
    pub client_write_iv: Bytes,
    pub server_write_iv: Bytes,
}

/// key_block = PRF(master_secret, "key expansion",
///     server_random + client_random)
pub fn key_block(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    mac_key_length: usize,
    enc_key_length: usize,
    fixed_iv_length: usize,
) -> KeyBlock {
    let block_size = 2 * (mac_key_length + enc_key_length + fixed_iv_length);

    let mut seed = server_random.to_vec();
    seed.extend_from_slice(client_random);

    let mut block = Bytes::from(prf(
        crypto,
        version,
        prf_hash,
        master_secret,
        KEY_EXPANSION_LABEL,
        &seed,
        block_size,
    ));

    let client_write_mac_key = block.split_to(mac_key_length);
    let server_write_mac_key = block.split_to(mac_key_length);

    let client_write_key = block.split_to(enc_key_length);
    let server_write_key = block.split_to(enc_key_length);

    let client_write_iv = block.split_to(fixed_iv_length);
    let server_write_iv = block.split_to(fixed_iv_length);

    assert_eq!(block.len(), 0);

    KeyBlock {
        client_write_mac_key,
        server_write_mac_key,
        client_write_key,
        server_write_key,
        client_write_iv,
        server_write_iv,
    }
}

/// verify_data = PRF(master_secret, finished_label, transcript_hash)[0..11]
pub fn verify_data(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    master_secret: &[u8],
    finished_label: &[u8],
    transcript_hash: &[u8],
) -> Vec<u8> {
    prf(
        crypto,
        version,
        prf_hash,
        master_secret,
        finished_label,
        transcript_hash,
        VERIFY_DATA_LENGTH,
    )
}

/// RFC 5705 exporter. The context, when present, is length-prefixed into
/// the seed; absent and empty contexts produce different outputs.
pub fn export_keying_material(
    crypto: &dyn Crypto,
    version: ProtocolVersion,
    prf_hash: HashAlgorithm,
    master_secret: &[u8],
    label: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    context: Option<&[u8]>,
    length: usize,
) -> Result<Vec<u8>> {
    let mut seed = client_random.to_vec();
    seed.extend_from_slice(server_random);

    if let Some(context) = context {
        seed.extend_from_slice(&(context.len() as u16).to_be_bytes());
        seed.extend_from_slice(context);
    }

    Ok(prf(
        crypto,
        version,
        prf_hash,
        master_secret,
        label,
        &seed,
        length,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{TLS_1_0_VERSION, TLS_1_2_VERSION};
    use crate::testing::TestCrypto;

    #[test]
    fn prf_is_deterministic() {
        let crypto = TestCrypto::new();

        let a = prf(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            b"secret",
            b"label",
            b"seed",
            80,
        );
        let b = prf(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            b"secret",
            b"label",
            b"seed",
            80,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 80);

        let c = prf(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            b"secret",
            b"label",
            b"other",
            80,
        );
        assert_ne!(a, c);
    }

    #[test]
    fn legacy_prf_differs_from_tls12() {
        let crypto = TestCrypto::new();

        let new = prf(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            b"secret",
            b"label",
            b"seed",
            48,
        );
        let old = prf(
            &crypto,
            TLS_1_0_VERSION,
            HashAlgorithm::Sha256,
            b"secret",
            b"label",
            b"seed",
            48,
        );
        assert_ne!(new, old);
    }

    #[test]
    fn master_secret_is_48_bytes() {
        let crypto = TestCrypto::new();
        let ms = master_secret(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            &[1u8; 48],
            &[2u8; 32],
            &[3u8; 32],
        );
        assert_eq!(ms.len(), MASTER_SECRET_LENGTH);
    }

    #[test]
    fn key_block_split() {
        let crypto = TestCrypto::new();
        let block = key_block(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            &[1u8; 48],
            &[2u8; 32],
            &[3u8; 32],
            0,
            16,
            4,
        );
        assert_eq!(block.client_write_mac_key.len(), 0);
        assert_eq!(block.client_write_key.len(), 16);
        assert_eq!(block.server_write_key.len(), 16);
        assert_eq!(block.client_write_iv.len(), 4);
        assert_ne!(block.client_write_key, block.server_write_key);
    }

    #[test]
    fn exporter_context_is_length_bound() {
        let crypto = TestCrypto::new();

        let none = export_keying_material(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            &[1u8; 48],
            b"EXPORTER-test",
            &[2u8; 32],
            &[3u8; 32],
            None,
            32,
        )
        .unwrap();

        let empty = export_keying_material(
            &crypto,
            TLS_1_2_VERSION,
            HashAlgorithm::Sha256,
            &[1u8; 48],
            b"EXPORTER-test",
            &[2u8; 32],
            &[3u8; 32],
            Some(b""),
            32,
        )
        .unwrap();

        assert_ne!(none, empty);
    }
}
