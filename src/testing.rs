// Deterministic capability implementations for tests.
//
// None of this is cryptography. The point is an internally consistent
// provider: both ends of an engine pair derive identical keystreams and
// tags from identical inputs, tampering breaks the tag check, and every
// operation is reproducible. That is exactly enough to exercise the
// protocol engine end to end.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::auth::{
    Certificate, CertificateChain, KeyAlgorithm, KeyManager, PrivateKey, TrustError, TrustManager,
};
use crate::callbacks::HandshakeListener;
use crate::cipher_suite::CipherSuite;
use crate::constant_eq;
use crate::crypto::{Aead, Crypto, HashAlgorithm, KeyExchange};
use crate::engine::{Engine, HandshakeStatus, MAX_WRAP_OUTPUT};
use crate::errors::{Error, Result};
use crate::extensions::{NamedGroup, SignatureScheme};
use crate::options::{ClientOptions, ServerOptions};
use crate::session::Session;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

// Largest 64-bit prime; generator 5.
const DH_P: u64 = 0xffffffffffffffc5;
const DH_G: u64 = 5;

fn fnv_absorb(mut h: u64, data: &[u8]) -> u64 {
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn digest_parts(tag: &[u8], parts: &[&[u8]]) -> u64 {
    let mut h = fnv_absorb(FNV_OFFSET, tag);
    for part in parts {
        h = fnv_absorb(h, &(part.len() as u64).to_be_bytes());
        h = fnv_absorb(h, part);
    }
    h
}

/// Deterministic counter-mode expansion of the absorbed inputs.
fn expand(tag: &[u8], parts: &[&[u8]], n: usize) -> Vec<u8> {
    let seed = digest_parts(tag, parts);

    let mut out = Vec::with_capacity(n + 8);
    let mut i = 0u64;
    while out.len() < n {
        let mut h = fnv_absorb(FNV_OFFSET, &seed.to_be_bytes());
        h = fnv_absorb(h, &i.to_be_bytes());
        out.extend_from_slice(&h.to_be_bytes());
        i += 1;
    }
    out.truncate(n);
    out
}

fn mod_pow(base: u64, exp: u64, modulus: u64) -> u64 {
    let mut result: u128 = 1;
    let mut base: u128 = (base % modulus) as u128;
    let mut exp = exp;
    let modulus = modulus as u128;

    while exp > 0 {
        if exp & 1 == 1 {
            result = (result * base) % modulus;
        }
        base = (base * base) % modulus;
        exp >>= 1;
    }
    result as u64
}

fn hash_tag(alg: HashAlgorithm) -> [u8; 1] {
    [match alg {
        HashAlgorithm::Md5 => 1,
        HashAlgorithm::Sha1 => 2,
        HashAlgorithm::Md5Sha1 => 3,
        HashAlgorithm::Sha256 => 4,
        HashAlgorithm::Sha384 => 5,
    }]
}

fn private_key_bytes(key: &PrivateKey) -> &[u8] {
    match key {
        PrivateKey::Rsa(data) => data,
        PrivateKey::Ecdsa { data, .. } => data,
    }
}

pub struct TestCrypto {
    counter: AtomicU64,
}

impl TestCrypto {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0x1000),
        }
    }
}

impl Crypto for TestCrypto {
    fn hash(&self, alg: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        expand(b"hash", &[&hash_tag(alg), data], alg.output_size())
    }

    fn hmac(&self, alg: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        expand(b"hmac", &[&hash_tag(alg), key, data], alg.output_size())
    }

    fn random_bytes(&self, out: &mut [u8]) -> Result<()> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let bytes = expand(b"random", &[&n.to_be_bytes()], out.len());
        out.copy_from_slice(&bytes);
        Ok(())
    }

    fn create_aead(
        &self,
        suite: CipherSuite,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
    ) -> Result<Box<dyn Aead>> {
        let parts = suite.decode()?;
        Ok(Box::new(TestAead {
            material: expand(
                b"aead",
                &[&suite.to_value().to_be_bytes(), key, iv, mac_key],
                32,
            ),
            tag_length: parts.bulk.tag_length,
        }))
    }

    fn create_key_exchange(&self, _group: NamedGroup) -> Result<Box<dyn KeyExchange>> {
        let secret = self.counter.fetch_add(1, Ordering::SeqCst) | 1;
        Ok(Box::new(TestKeyExchange { secret }))
    }

    fn encrypt_pre_master_secret(
        &self,
        server_certificate: &Certificate,
        pre_master_secret: &[u8],
    ) -> Result<Vec<u8>> {
        let keystream = expand(
            b"rsa-kem",
            &[&server_certificate.der],
            pre_master_secret.len(),
        );
        Ok(pre_master_secret
            .iter()
            .zip(keystream.iter())
            .map(|(a, b)| a ^ b)
            .collect())
    }

    fn decrypt_pre_master_secret(
        &self,
        private_key: &PrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>> {
        let keystream = expand(b"rsa-kem", &[private_key_bytes(private_key)], encrypted.len());
        Ok(encrypted
            .iter()
            .zip(keystream.iter())
            .map(|(a, b)| a ^ b)
            .collect())
    }

    fn sign(
        &self,
        scheme: SignatureScheme,
        private_key: &PrivateKey,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(expand(
            b"signature",
            &[
                &scheme.to_value().to_be_bytes(),
                private_key_bytes(private_key),
                data,
            ],
            64,
        ))
    }

    fn verify_signature(
        &self,
        scheme: SignatureScheme,
        certificate: &Certificate,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let expected = expand(
            b"signature",
            &[&scheme.to_value().to_be_bytes(), &certificate.der, data],
            64,
        );
        Ok(constant_eq(&expected, signature))
    }
}

struct TestAead {
    material: Vec<u8>,
    tag_length: usize,
}

impl Aead for TestAead {
    fn encrypt(&self, nonce: &[u8], plaintext: &[u8], additional_data: &[u8], out: &mut Vec<u8>) {
        let keystream = expand(b"keystream", &[&self.material, nonce], plaintext.len());
        let start = out.len();
        out.extend(
            plaintext
                .iter()
                .zip(keystream.iter())
                .map(|(a, b)| a ^ b),
        );
        let tag = expand(
            b"tag",
            &[&self.material, nonce, additional_data, &out[start..]],
            self.tag_length,
        );
        out.extend_from_slice(&tag);
    }

    fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if ciphertext.len() < self.tag_length {
            return Err(Error::fatal(
                AlertDescription::bad_record_mac,
                "Ciphertext too short",
            ));
        }

        let (body, tag) = ciphertext.split_at(ciphertext.len() - self.tag_length);
        let expected = expand(
            b"tag",
            &[&self.material, nonce, additional_data, body],
            self.tag_length,
        );
        if !constant_eq(&expected, tag) {
            return Err(Error::fatal(
                AlertDescription::bad_record_mac,
                "Tag mismatch",
            ));
        }

        let keystream = expand(b"keystream", &[&self.material, nonce], body.len());
        out.extend(body.iter().zip(keystream.iter()).map(|(a, b)| a ^ b));
        Ok(())
    }

    fn expansion(&self) -> usize {
        self.tag_length
    }
}

struct TestKeyExchange {
    secret: u64,
}

impl KeyExchange for TestKeyExchange {
    fn public_value(&self) -> Result<Vec<u8>> {
        Ok(mod_pow(DH_G, self.secret, DH_P).to_be_bytes().to_vec())
    }

    fn agree(&self, remote_public: &[u8]) -> Result<Vec<u8>> {
        if remote_public.len() != 8 {
            return Err(Error::Capability("Bad public value length".into()));
        }
        let remote = u64::from_be_bytes(*array_ref![remote_public, 0, 8]);
        let shared = mod_pow(remote, self.secret, DH_P);
        Ok(expand(b"kx-shared", &[&shared.to_be_bytes()], 48))
    }
}

/// A chain of one self-signed certificate plus its matching key. The DER
/// doubles as the key identity, which is what makes the fake RSA and
/// signature operations line up across the two ends.
pub fn test_identity(algorithm: KeyAlgorithm, name: &str) -> (CertificateChain, Arc<PrivateKey>) {
    let der = Bytes::from(format!("test-cert:{:?}:{}", algorithm, name).into_bytes());

    let key = match algorithm {
        KeyAlgorithm::Rsa => PrivateKey::Rsa(der.clone()),
        KeyAlgorithm::Ecdsa => PrivateKey::Ecdsa {
            group: NamedGroup::secp256r1,
            data: der.clone(),
        },
    };

    (vec![Arc::new(Certificate::new(der))], Arc::new(key))
}

pub struct TestKeyManager {
    identities: Vec<(String, CertificateChain, Arc<PrivateKey>)>,
}

impl TestKeyManager {
    pub fn new() -> Self {
        Self { identities: vec![] }
    }

    pub fn with_identity(algorithm: KeyAlgorithm, alias: &str) -> Self {
        let mut km = Self::new();
        km.add(algorithm, alias);
        km
    }

    pub fn add(&mut self, algorithm: KeyAlgorithm, alias: &str) {
        let (chain, key) = test_identity(algorithm, alias);
        self.identities.push((alias.to_string(), chain, key));
    }
}

impl KeyManager for TestKeyManager {
    fn choose_client_alias(
        &self,
        key_types: &[KeyAlgorithm],
        _issuers: Option<&[Bytes]>,
    ) -> Option<String> {
        self.identities
            .iter()
            .find(|(_, _, key)| key_types.contains(&key.algorithm()))
            .map(|(alias, _, _)| alias.clone())
    }

    fn choose_server_alias(
        &self,
        key_type: KeyAlgorithm,
        _issuers: Option<&[Bytes]>,
    ) -> Option<String> {
        self.identities
            .iter()
            .find(|(_, _, key)| key.algorithm() == key_type)
            .map(|(alias, _, _)| alias.clone())
    }

    fn private_key(&self, alias: &str) -> Option<Arc<PrivateKey>> {
        self.identities
            .iter()
            .find(|(a, _, _)| a == alias)
            .map(|(_, _, key)| key.clone())
    }

    fn certificate_chain(&self, alias: &str) -> Option<CertificateChain> {
        self.identities
            .iter()
            .find(|(a, _, _)| a == alias)
            .map(|(_, chain, _)| chain.clone())
    }
}

pub struct TestTrustManager {
    pub server_checks: AtomicUsize,
    pub client_checks: AtomicUsize,
    fail_with: Option<fn() -> TrustError>,
}

impl TestTrustManager {
    pub fn allow_all() -> Self {
        Self {
            server_checks: AtomicUsize::new(0),
            client_checks: AtomicUsize::new(0),
            fail_with: None,
        }
    }

    pub fn rejecting(fail_with: fn() -> TrustError) -> Self {
        Self {
            server_checks: AtomicUsize::new(0),
            client_checks: AtomicUsize::new(0),
            fail_with: Some(fail_with),
        }
    }
}

impl TrustManager for TestTrustManager {
    fn check_client_trusted(
        &self,
        _chain: &CertificateChain,
        _auth_type: &str,
    ) -> core::result::Result<(), TrustError> {
        self.client_checks.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }

    fn check_server_trusted(
        &self,
        _chain: &CertificateChain,
        _auth_type: &str,
    ) -> core::result::Result<(), TrustError> {
        self.server_checks.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }
}

pub struct RecordingListener {
    pub sessions_seen: AtomicUsize,
    pub completions: AtomicUsize,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self {
            sessions_seen: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
        }
    }
}

impl HandshakeListener for RecordingListener {
    fn handshake_session(&self, _session: &Arc<Session>) {
        self.sessions_seen.fetch_add(1, Ordering::SeqCst);
    }

    fn handshake_complete(&self, _session: &Arc<Session>) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_client_options() -> ClientOptions {
    let mut options = ClientOptions::recommended(
        Arc::new(TestCrypto::new()),
        Arc::new(TestTrustManager::allow_all()),
    );
    options.hostname = "server.test".to_string();
    options.peer_port = 443;
    options
}

pub fn test_server_options() -> ServerOptions {
    let mut key_manager = TestKeyManager::new();
    key_manager.add(KeyAlgorithm::Rsa, "rsa-identity");
    key_manager.add(KeyAlgorithm::Ecdsa, "ecdsa-identity");

    ServerOptions::recommended(Arc::new(TestCrypto::new()), Arc::new(key_manager))
}

/// Pumps handshake traffic both ways until both engines settle. Returns
/// how many times each engine reported FINISHED.
pub fn run_handshake(client: &Engine, server: &Engine) -> (usize, usize) {
    let mut c2s: Vec<u8> = vec![];
    let mut s2c: Vec<u8> = vec![];
    let mut client_finished = 0;
    let mut server_finished = 0;

    for _ in 0..100 {
        let mut progress = false;

        loop {
            let mut out = vec![0u8; MAX_WRAP_OUTPUT];
            let res = client.wrap(&[], &mut out).unwrap();
            if res.handshake_status == HandshakeStatus::Finished {
                client_finished += 1;
            }
            if res.bytes_produced == 0 {
                break;
            }
            c2s.extend_from_slice(&out[..res.bytes_produced]);
            progress = true;
        }

        loop {
            let mut dst = vec![0u8; 1 << 15];
            let res = server.unwrap(&c2s, &mut dst).unwrap();
            if res.handshake_status == HandshakeStatus::Finished {
                server_finished += 1;
            }
            if res.bytes_consumed == 0 {
                break;
            }
            c2s.drain(..res.bytes_consumed);
            progress = true;
        }

        loop {
            let mut out = vec![0u8; MAX_WRAP_OUTPUT];
            let res = server.wrap(&[], &mut out).unwrap();
            if res.handshake_status == HandshakeStatus::Finished {
                server_finished += 1;
            }
            if res.bytes_produced == 0 {
                break;
            }
            s2c.extend_from_slice(&out[..res.bytes_produced]);
            progress = true;
        }

        loop {
            let mut dst = vec![0u8; 1 << 15];
            let res = client.unwrap(&s2c, &mut dst).unwrap();
            if res.handshake_status == HandshakeStatus::Finished {
                client_finished += 1;
            }
            if res.bytes_consumed == 0 {
                break;
            }
            s2c.drain(..res.bytes_consumed);
            progress = true;
        }

        if client_finished > 0 && server_finished > 0 && c2s.is_empty() && s2c.is_empty() {
            break;
        }
        if !progress {
            break;
        }
    }

    (client_finished, server_finished)
}

/// Encrypts data on one engine and decrypts it on the other, returning
/// the received plaintext.
pub fn transfer(from: &Engine, to: &Engine, data: &[u8]) -> Vec<u8> {
    let mut wire: Vec<u8> = vec![];

    let mut consumed_total = 0;
    while consumed_total < data.len() {
        let mut out = vec![0u8; MAX_WRAP_OUTPUT];
        let res = from.wrap(&data[consumed_total..], &mut out).unwrap();
        assert!(
            res.bytes_consumed > 0 || res.bytes_produced > 0,
            "wrap made no progress"
        );
        consumed_total += res.bytes_consumed;
        wire.extend_from_slice(&out[..res.bytes_produced]);
    }

    let mut received = vec![];
    while !wire.is_empty() {
        let mut dst = vec![0u8; 1 << 15];
        let res = to.unwrap(&wire, &mut dst).unwrap();
        received.extend_from_slice(&dst[..res.bytes_produced]);
        if res.bytes_consumed == 0 {
            break;
        }
        wire.drain(..res.bytes_consumed);
    }
    received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_is_deterministic() {
        let a = expand(b"t", &[b"one", b"two"], 40);
        let b = expand(b"t", &[b"one", b"two"], 40);
        assert_eq!(a, b);

        // Length prefixing keeps part boundaries significant.
        let c = expand(b"t", &[b"onet", b"wo"], 40);
        assert_ne!(a, c);
    }

    #[test]
    fn key_exchange_agrees() {
        let crypto = TestCrypto::new();
        let a = crypto.create_key_exchange(NamedGroup::x25519).unwrap();
        let b = crypto.create_key_exchange(NamedGroup::x25519).unwrap();

        let shared_a = a.agree(&b.public_value().unwrap()).unwrap();
        let shared_b = b.agree(&a.public_value().unwrap()).unwrap();
        assert_eq!(shared_a, shared_b);
        assert_eq!(shared_a.len(), 48);
    }

    #[test]
    fn rsa_kem_roundtrip() {
        let crypto = TestCrypto::new();
        let (chain, key) = test_identity(KeyAlgorithm::Rsa, "kem");

        let pms = vec![7u8; 48];
        let encrypted = crypto.encrypt_pre_master_secret(&chain[0], &pms).unwrap();
        assert_ne!(encrypted, pms);

        let decrypted = crypto.decrypt_pre_master_secret(&key, &encrypted).unwrap();
        assert_eq!(decrypted, pms);
    }

    #[test]
    fn signature_roundtrip() {
        let crypto = TestCrypto::new();
        let (chain, key) = test_identity(KeyAlgorithm::Ecdsa, "sig");
        let scheme = SignatureScheme::ecdsa_secp256r1_sha256;

        let sig = crypto.sign(scheme, &key, b"payload").unwrap();
        assert!(crypto
            .verify_signature(scheme, &chain[0], b"payload", &sig)
            .unwrap());
        assert!(!crypto
            .verify_signature(scheme, &chain[0], b"other", &sig)
            .unwrap());
    }
}
