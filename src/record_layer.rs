// Half-duplex record pipelines.
//
// The inbound side accepts whole records (the engine guarantees this via
// the header peek) and yields plaintext messages; the outbound side
// accepts plaintext fragments and accumulates encoded records in a byte
// buffer which the host drains through wrap(). Cipher changes follow the
// ChangeCipherSpec discipline: keys are staged as 'pending' when derived
// and promoted when the CCS is received or emitted, at which point the
// sequence numbers restart from zero.

use bytes::{Bytes, BytesMut};

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::cipher::CipherEndpointSpec;
use crate::errors::{Error, Result};
use crate::handshake::{Handshake, ProtocolVersion, TLS_1_0_VERSION, TLS_1_1_VERSION};
use crate::record::{
    ContentType, Record, RecordInner, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH,
};
use crate::transcript::Transcript;

/// One plaintext message recovered from the record layer.
#[derive(Debug)]
pub enum Message {
    ChangeCipherSpec,
    Alert(Alert),
    /// The parsed message along with its raw bytes for the transcript.
    Handshake(Handshake, Bytes),
    ApplicationData(Bytes),
}

pub struct InboundRecords {
    /// Version used to parse version dependent handshake bodies. Starts at
    /// TLS 1.0 and is raised once the hellos negotiate.
    pub protocol_version: ProtocolVersion,

    cipher: Option<CipherEndpointSpec>,
    pending_cipher: Option<CipherEndpointSpec>,

    /// Partial handshake message spanning records.
    handshake_buffer: BytesMut,

    closed: bool,
}

impl InboundRecords {
    pub fn new() -> Self {
        Self {
            protocol_version: TLS_1_0_VERSION,
            cipher: None,
            pending_cipher: None,
            handshake_buffer: BytesMut::new(),
            closed: false,
        }
    }

    pub fn set_pending_cipher(&mut self, spec: CipherEndpointSpec) {
        self.pending_cipher = Some(spec);
    }

    /// Promotes the staged keys. Called when a ChangeCipherSpec arrives;
    /// every later record in this direction uses the new cipher.
    pub fn promote_cipher(&mut self) -> Result<()> {
        if !self.handshake_buffer.is_empty() {
            return Err(Error::fatal(
                AlertDescription::unexpected_message,
                "Key change across a partial handshake message",
            ));
        }

        match self.pending_cipher.take() {
            Some(spec) => {
                self.cipher = Some(spec);
                Ok(())
            }
            None => Err(Error::fatal(
                AlertDescription::unexpected_message,
                "ChangeCipherSpec without negotiated keys",
            )),
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Decrypts one record and yields every complete message inside it.
    /// Handshake messages may span records; partial ones are buffered
    /// until the next record arrives.
    pub fn process_record(&mut self, record: Record) -> Result<Vec<Message>> {
        if self.closed {
            return Ok(vec![]);
        }

        if record.typ == ContentType::change_cipher_spec {
            // Never encrypted in the flows this engine supports.
            if &record.data[..] != &[1] {
                return Err(Error::fatal(
                    AlertDescription::decode_error,
                    "Malformed ChangeCipherSpec",
                ));
            }
            if !self.handshake_buffer.is_empty() {
                return Err(Error::fatal(
                    AlertDescription::unexpected_message,
                    "ChangeCipherSpec interleaved in handshake message",
                ));
            }
            return Ok(vec![Message::ChangeCipherSpec]);
        }

        let inner = match self.cipher.as_mut() {
            Some(cipher) => cipher.decrypt(record)?,
            None => {
                if record.typ == ContentType::application_data {
                    return Err(Error::fatal(
                        AlertDescription::unexpected_message,
                        "Received application_data without a cipher",
                    ));
                }
                RecordInner {
                    typ: record.typ,
                    data: record.data,
                }
            }
        };

        if inner.data.len() > MAX_PLAINTEXT_LENGTH {
            return Err(Error::fatal(
                AlertDescription::record_overflow,
                "Plaintext fragment exceeds 2^14",
            ));
        }

        if !self.handshake_buffer.is_empty() && inner.typ != ContentType::handshake {
            return Err(Error::fatal(
                AlertDescription::unexpected_message,
                "Data interleaved in handshake",
            ));
        }

        match inner.typ {
            ContentType::handshake => {
                self.handshake_buffer.extend_from_slice(&inner.data);
                self.drain_handshake_messages()
            }
            ContentType::alert => {
                let alert = Alert::parse_complete(inner.data)?;
                Ok(vec![Message::Alert(alert)])
            }
            ContentType::application_data => Ok(vec![Message::ApplicationData(inner.data)]),
            ContentType::heartbeat => Ok(vec![]),
            _ => Err(Error::fatal(
                AlertDescription::unexpected_message,
                "Unknown record type",
            )),
        }
    }

    fn drain_handshake_messages(&mut self) -> Result<Vec<Message>> {
        let mut messages = vec![];
        let mut buffered = self.handshake_buffer.split().freeze();

        while !buffered.is_empty() {
            match Handshake::parse(buffered.clone(), self.protocol_version) {
                Ok((msg, rest)) => {
                    let raw = buffered.slice(0..(buffered.len() - rest.len()));
                    messages.push(Message::Handshake(msg, raw));
                    buffered = rest;
                }
                Err(e) if e.is_incomplete() => {
                    self.handshake_buffer.extend_from_slice(&buffered);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(messages)
    }
}

pub struct OutboundRecords {
    /// Version used to serialize version dependent handshake bodies.
    pub protocol_version: ProtocolVersion,

    /// Version stamped onto record headers. The first flight of a client
    /// uses TLS 1.0 for backwards compatibility; everything afterwards
    /// uses the negotiated version.
    record_version: u16,

    cipher: Option<CipherEndpointSpec>,
    pending_cipher: Option<CipherEndpointSpec>,

    /// Encoded records awaiting pickup by the host.
    buffer: BytesMut,

    closed: bool,

    /// Apply the 1/n-1 record split to application data (CBC suites below
    /// TLS 1.1).
    cbc_split: bool,
}

impl OutboundRecords {
    pub fn new() -> Self {
        Self {
            protocol_version: TLS_1_0_VERSION,
            record_version: TLS_1_0_VERSION,
            cipher: None,
            pending_cipher: None,
            buffer: BytesMut::new(),
            closed: false,
            cbc_split: false,
        }
    }

    pub fn set_negotiated_version(&mut self, version: ProtocolVersion) {
        self.protocol_version = version;
        self.record_version = version;
    }

    pub fn set_pending_cipher(&mut self, spec: CipherEndpointSpec, aead: bool) {
        self.cbc_split = !aead && self.protocol_version < TLS_1_1_VERSION;
        self.pending_cipher = Some(spec);
    }

    /// Worst case record-layer growth for one application data fragment.
    pub fn expansion(&self) -> usize {
        self.cipher.as_ref().map(|c| c.expansion()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn send_handshake(
        &mut self,
        msg: &Handshake,
        transcript: Option<&mut Transcript>,
    ) -> Result<()> {
        let mut data = vec![];
        msg.serialize(self.protocol_version, &mut data);
        let buf = Bytes::from(data);

        if let Some(transcript) = transcript {
            transcript.push(buf.clone());
        }

        // Long messages (certificate chains) are fragmented across records.
        let mut rest = buf;
        loop {
            let n = core::cmp::min(rest.len(), MAX_PLAINTEXT_LENGTH);
            let chunk = rest.split_to(n);
            self.send_record(RecordInner {
                typ: ContentType::handshake,
                data: chunk,
            })?;
            if rest.is_empty() {
                break;
            }
        }

        Ok(())
    }

    /// Emits the ChangeCipherSpec and promotes the staged keys: the next
    /// record in this direction uses them, with sequence numbers reset.
    pub fn send_change_cipher_spec(&mut self) -> Result<()> {
        self.send_record(RecordInner {
            typ: ContentType::change_cipher_spec,
            data: Bytes::from_static(&[1]),
        })?;

        match self.pending_cipher.take() {
            Some(spec) => {
                self.cipher = Some(spec);
                Ok(())
            }
            None => Err(Error::Misuse(
                "ChangeCipherSpec emitted without negotiated keys".into(),
            )),
        }
    }

    /// Queues an alert. close_notify and every fatal alert close the
    /// pipeline; the already-encoded bytes stay drainable.
    pub fn send_alert(&mut self, alert: Alert) -> Result<()> {
        if self.closed {
            // The peer can no longer be told anything.
            return Ok(());
        }

        let mut data = vec![];
        alert.serialize(&mut data);
        self.send_record(RecordInner {
            typ: ContentType::alert,
            data: data.into(),
        })?;

        if alert.level == AlertLevel::fatal
            || alert.description == AlertDescription::close_notify
        {
            self.closed = true;
        }
        Ok(())
    }

    pub fn send_close_notify(&mut self) -> Result<()> {
        self.send_alert(Alert::CLOSE_NOTIFY)
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;

        // 1/n-1 split against IV chaining attacks on older CBC suites.
        if self.cbc_split && rest.len() > 1 {
            self.send_record(RecordInner {
                typ: ContentType::application_data,
                data: Bytes::from(rest[..1].to_vec()),
            })?;
            rest = &rest[1..];
        }

        while !rest.is_empty() {
            let n = core::cmp::min(rest.len(), MAX_PLAINTEXT_LENGTH);
            self.send_record(RecordInner {
                typ: ContentType::application_data,
                data: Bytes::from(rest[..n].to_vec()),
            })?;
            rest = &rest[n..];
        }

        Ok(())
    }

    fn send_record(&mut self, inner: RecordInner) -> Result<()> {
        if self.closed {
            return Err(Error::Misuse("Record pipeline is closed".into()));
        }

        debug_assert!(inner.data.len() <= MAX_PLAINTEXT_LENGTH);

        let record = match self.cipher.as_mut() {
            Some(cipher) => cipher.encrypt(inner, self.record_version),
            None => {
                if inner.typ == ContentType::application_data {
                    return Err(Error::Misuse(
                        "Should not be sending unencrypted application data".into(),
                    ));
                }
                Record {
                    typ: inner.typ,
                    version: self.record_version,
                    data: inner.data,
                }
            }
        };

        debug_assert!(record.data.len() <= MAX_CIPHERTEXT_LENGTH);

        let mut encoded = vec![];
        record.serialize(&mut encoded);
        self.buffer.extend_from_slice(&encoded);
        Ok(())
    }

    /// Worst case encoded size for one application data write, including
    /// the extra record of a 1/n-1 split.
    pub fn max_encoded_size(&self, plaintext_len: usize) -> usize {
        let records = if self.cbc_split && plaintext_len > 1 {
            2
        } else {
            1
        };
        plaintext_len + records * (crate::record::RECORD_HEADER_SIZE + self.expansion())
    }

    /// Encoded bytes waiting for the host.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Copies as much pending output as fits. Partial drains are fine;
    /// records are already encoded so the split point does not matter.
    pub fn drain(&mut self, dst: &mut [u8]) -> usize {
        let n = core::cmp::min(self.buffer.len(), dst.len());
        let chunk = self.buffer.split_to(n);
        dst[..n].copy_from_slice(&chunk);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{Finished, TLS_1_2_VERSION};

    fn parse_all(outbound: &mut OutboundRecords, inbound: &mut InboundRecords) -> Vec<Message> {
        let mut wire = vec![0u8; outbound.pending()];
        outbound.drain(&mut wire);

        let mut input = Bytes::from(wire);
        let mut messages = vec![];
        while !input.is_empty() {
            let record = Record::parse(&mut input).unwrap();
            messages.extend(inbound.process_record(record).unwrap());
        }
        messages
    }

    #[test]
    fn handshake_spanning_records_is_reassembled() {
        let mut outbound = OutboundRecords::new();
        let mut inbound = InboundRecords::new();
        outbound.set_negotiated_version(TLS_1_2_VERSION);
        inbound.protocol_version = TLS_1_2_VERSION;

        // A Finished body bigger than one record forces fragmentation.
        let msg = Handshake::Finished(Finished {
            verify_data: Bytes::from(vec![5u8; MAX_PLAINTEXT_LENGTH + 100]),
        });
        outbound.send_handshake(&msg, None).unwrap();
        assert!(outbound.pending() > MAX_PLAINTEXT_LENGTH);

        let messages = parse_all(&mut outbound, &mut inbound);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::Handshake(Handshake::Finished(f), raw) => {
                assert_eq!(f.verify_data.len(), MAX_PLAINTEXT_LENGTH + 100);
                assert_eq!(raw.len(), 4 + MAX_PLAINTEXT_LENGTH + 100);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn multiple_messages_in_one_record() {
        let mut outbound = OutboundRecords::new();
        let mut inbound = InboundRecords::new();
        outbound.set_negotiated_version(TLS_1_2_VERSION);
        inbound.protocol_version = TLS_1_2_VERSION;

        // Both messages are tiny, so they end up back to back in the
        // buffer and the parser must pull them apart.
        outbound
            .send_handshake(&Handshake::ServerHelloDone, None)
            .unwrap();
        outbound
            .send_handshake(
                &Handshake::Finished(Finished {
                    verify_data: Bytes::from(vec![1u8; 12]),
                }),
                None,
            )
            .unwrap();

        let mut wire = vec![0u8; outbound.pending()];
        outbound.drain(&mut wire);

        // Concatenate the two record payloads into one handshake record.
        let mut input = Bytes::from(wire);
        let first = Record::parse(&mut input).unwrap();
        let second = Record::parse(&mut input).unwrap();
        let mut combined = first.data.to_vec();
        combined.extend_from_slice(&second.data);

        let messages = inbound
            .process_record(Record {
                typ: ContentType::handshake,
                version: TLS_1_2_VERSION,
                data: combined.into(),
            })
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn close_notify_closes_the_pipeline() {
        let mut outbound = OutboundRecords::new();
        outbound.send_close_notify().unwrap();
        assert!(outbound.is_closed());
        assert!(outbound.pending() > 0);

        // Nothing further may be produced...
        assert!(outbound
            .send_handshake(&Handshake::ServerHelloDone, None)
            .is_err());

        // ...but buffered output stays drainable, in chunks.
        let mut dst = [0u8; 3];
        let n = outbound.drain(&mut dst);
        assert_eq!(n, 3);
        let mut rest = [0u8; 16];
        let n2 = outbound.drain(&mut rest);
        assert_eq!(n + n2, 7);
    }

    #[test]
    fn interleaved_content_type_is_fatal() {
        let mut inbound = InboundRecords::new();

        // First half of a handshake message.
        let partial = Record {
            typ: ContentType::handshake,
            version: TLS_1_2_VERSION,
            data: Bytes::from_static(&[20, 0, 0, 12, 1, 2, 3]),
        };
        assert!(inbound.process_record(partial).unwrap().is_empty());

        let alert = Record {
            typ: ContentType::alert,
            version: TLS_1_2_VERSION,
            data: Bytes::from_static(&[1, 0]),
        };
        assert!(inbound.process_record(alert).is_err());
    }

    #[test]
    fn heartbeat_is_ignored() {
        let mut inbound = InboundRecords::new();
        let record = Record {
            typ: ContentType::heartbeat,
            version: TLS_1_2_VERSION,
            data: Bytes::from_static(&[1, 0, 0]),
        };
        assert!(inbound.process_record(record).unwrap().is_empty());
    }
}
