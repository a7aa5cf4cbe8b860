use bytes::Bytes;

use crate::crypto::{Crypto, HashAlgorithm};

/// Stores the raw bytes of all handshake messages seen so far.
///
/// Kept as a message list rather than a rolling hash because the hash
/// algorithm is only known once the ServerHello has been processed, and
/// versions below TLS 1.2 need the MD5+SHA-1 pair.
pub struct Transcript {
    messages: Vec<Bytes>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { messages: vec![] }
    }

    pub fn push(&mut self, message: Bytes) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Computes the hash of all messages seen.
    pub fn hash(&self, crypto: &dyn Crypto, alg: HashAlgorithm) -> Vec<u8> {
        crypto.hash(alg, &self.concat())
    }

    /// The concatenated message bytes, used as input for CertificateVerify
    /// signatures.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = vec![];
        for m in self.messages.iter() {
            out.extend_from_slice(m);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.push(Bytes::from_static(b"ab"));
        transcript.push(Bytes::from_static(b"cd"));
        assert_eq!(&transcript.concat()[..], b"abcd");

        transcript.clear();
        assert!(transcript.concat().is_empty());
    }
}
