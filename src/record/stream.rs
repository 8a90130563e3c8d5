use crate::buffer::ByteQueue;
use crate::crypto::record_cipher::{NullCipher, RecordCipher, MAX_PLAINTEXT};
use crate::record::{Record, SequenceNumber, TLS_HEADER_LEN};
use crate::types::{ContentType, ProtocolVersion};
use crate::Error;

/// Record framing over a byte stream.
///
/// Holds the active read and write ciphers with their sequence numbers and
/// the pending pair negotiated by the handshake. Pending ciphers only take
/// effect through the `enable_pending_*` calls.
pub(crate) struct RecordStream {
    read_cipher: Box<dyn RecordCipher>,
    write_cipher: Box<dyn RecordCipher>,
    read_seq: SequenceNumber,
    write_seq: SequenceNumber,

    pending_read: Option<Box<dyn RecordCipher>>,
    pending_write: Option<Box<dyn RecordCipher>>,

    /// Read cipher that becomes active with the first non CCS record.
    deferred_read: Option<Box<dyn RecordCipher>>,

    read_version: Option<ProtocolVersion>,
    write_version: Option<ProtocolVersion>,
    plaintext_limit: usize,
    ignore_change_cipher_spec: bool,
}

impl RecordStream {
    pub fn new() -> Self {
        RecordStream {
            read_cipher: Box::new(NullCipher),
            write_cipher: Box::new(NullCipher),
            read_seq: SequenceNumber::tls(),
            write_seq: SequenceNumber::tls(),
            pending_read: None,
            pending_write: None,
            deferred_read: None,
            read_version: None,
            write_version: None,
            plaintext_limit: MAX_PLAINTEXT,
            ignore_change_cipher_spec: false,
        }
    }

    pub fn set_read_version(&mut self, version: ProtocolVersion) {
        self.read_version = Some(version);
    }

    pub fn set_write_version(&mut self, version: ProtocolVersion) {
        self.write_version = Some(version);
    }

    pub fn set_plaintext_limit(&mut self, limit: usize) {
        self.plaintext_limit = limit.min(MAX_PLAINTEXT);
    }

    /// Drop single byte `0x01` CCS records (TLS 1.3 middlebox compatibility).
    pub fn set_ignore_change_cipher_spec(&mut self, ignore: bool) {
        self.ignore_change_cipher_spec = ignore;
    }

    /// Read one record if a complete one is buffered.
    pub fn try_decode(&mut self, input: &mut ByteQueue) -> Result<Option<Record>, Error> {
        loop {
            if input.available() < TLS_HEADER_LEN {
                return Ok(None);
            }

            let content_type = ContentType::from_u8(input.read_u8(0));
            let version = ProtocolVersion::from_u16(input.read_u16(1));
            let length = input.read_u16(3) as usize;

            self.check_header(content_type, version, length)?;

            if input.available() < TLS_HEADER_LEN + length {
                return Ok(None);
            }
            let payload = input.remove_data(length, TLS_HEADER_LEN);

            if content_type == ContentType::ChangeCipherSpec
                && self.ignore_change_cipher_spec
                && payload == [1]
            {
                trace!("Dropping compatibility change_cipher_spec");
                continue;
            }

            if content_type != ContentType::ChangeCipherSpec {
                if let Some(cipher) = self.deferred_read.take() {
                    trace!("Activating deferred read cipher");
                    self.read_cipher = cipher;
                    self.read_seq.reset();
                }
            }

            return self.decode_payload(content_type, version, &payload).map(Some);
        }
    }

    fn check_header(
        &self,
        content_type: ContentType,
        version: ProtocolVersion,
        length: usize,
    ) -> Result<(), Error> {
        if !content_type.is_known() {
            return Err(Error::UnexpectedMessage(format!(
                "unknown record type {}",
                content_type.as_u8()
            )));
        }
        if version.major() != 3 {
            return Err(Error::DecodeError(format!(
                "record version {:?}",
                version
            )));
        }
        if let Some(expected) = self.read_version {
            // TLS 1.3 records carry the legacy version.
            let legacy_ok = expected.is_tls13() && version.is_tls();
            if version != expected && !legacy_ok {
                return Err(Error::ProtocolVersion(format!(
                    "record version {:?}, expected {:?}",
                    version, expected
                )));
            }
        }
        let limit = self.read_cipher_for_limit().ciphertext_limit(self.plaintext_limit);
        if length > limit {
            return Err(Error::RecordOverflow(format!(
                "record of {} bytes above {}",
                length, limit
            )));
        }
        Ok(())
    }

    fn read_cipher_for_limit(&self) -> &dyn RecordCipher {
        match &self.deferred_read {
            Some(c) => c.as_ref(),
            None => self.read_cipher.as_ref(),
        }
    }

    fn decode_payload(
        &mut self,
        content_type: ContentType,
        version: ProtocolVersion,
        payload: &[u8],
    ) -> Result<Record, Error> {
        let seq = self.read_seq.next_value()?;
        let (content_type, fragment) =
            self.read_cipher
                .decode_ciphertext(seq, content_type, version, payload)?;

        if fragment.len() > self.plaintext_limit {
            return Err(Error::RecordOverflow(format!(
                "plaintext of {} bytes above {}",
                fragment.len(),
                self.plaintext_limit
            )));
        }
        if fragment.is_empty() && content_type != ContentType::ApplicationData {
            return Err(Error::UnexpectedMessage(format!(
                "empty {:?} record",
                content_type
            )));
        }
        trace!(
            "Read record {:?} seq={} len={}",
            content_type,
            seq,
            fragment.len()
        );
        Ok(Record {
            content_type,
            version,
            fragment,
        })
    }

    /// Frame `payload` into records. Nothing is written before a write
    /// version is set.
    pub fn encode(&mut self, content_type: ContentType, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let Some(version) = self.write_version else {
            return Ok(out);
        };
        for chunk in payload.chunks(self.plaintext_limit) {
            let seq = self.write_seq.next_value()?;
            let (outer, body) = self
                .write_cipher
                .encode_plaintext(seq, content_type, version, chunk)?;
            out.push(outer.as_u8());
            version.serialize(&mut out);
            out.extend_from_slice(&(body.len() as u16).to_be_bytes());
            out.extend_from_slice(&body);
            trace!(
                "Wrote record {:?} seq={} len={}",
                content_type,
                seq,
                chunk.len()
            );
        }
        Ok(out)
    }

    pub fn set_pending_cipher(
        &mut self,
        read: Box<dyn RecordCipher>,
        write: Box<dyn RecordCipher>,
    ) {
        self.pending_read = Some(read);
        self.pending_write = Some(write);
    }

    pub fn enable_pending_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_write
            .take()
            .ok_or_else(|| Error::InternalError("no pending write cipher".into()))?;
        self.install_write(cipher);
        Ok(())
    }

    pub fn enable_pending_read(&mut self, deferred: bool) -> Result<(), Error> {
        let cipher = self
            .pending_read
            .take()
            .ok_or_else(|| Error::InternalError("no pending read cipher".into()))?;
        self.install_read(cipher, deferred);
        Ok(())
    }

    /// A ChangeCipherSpec arrived: switch to the pending read cipher.
    pub fn notify_change_cipher_spec_received(&mut self) -> Result<(), Error> {
        if self.pending_read.is_none() {
            return Err(Error::UnexpectedMessage(
                "change_cipher_spec without pending cipher".into(),
            ));
        }
        self.enable_pending_read(false)
    }

    pub fn install_read(&mut self, cipher: Box<dyn RecordCipher>, deferred: bool) {
        if deferred {
            self.deferred_read = Some(cipher);
        } else {
            self.deferred_read = None;
            self.read_cipher = cipher;
            self.read_seq.reset();
        }
    }

    pub fn install_write(&mut self, cipher: Box<dyn RecordCipher>) {
        self.write_cipher = cipher;
        self.write_seq.reset();
    }

    /// Move the read side to the next TLS 1.3 traffic secret.
    pub fn key_update_read(&mut self) -> Result<(), Error> {
        self.read_cipher.rekey()?;
        self.read_seq.reset();
        Ok(())
    }

    /// Move the write side to the next TLS 1.3 traffic secret.
    pub fn key_update_write(&mut self) -> Result<(), Error> {
        self.write_cipher.rekey()?;
        self.write_seq.reset();
        Ok(())
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("read_version", &self.read_version)
            .field("write_version", &self.write_version)
            .field("read_seq", &self.read_seq.current_value())
            .field("write_seq", &self.write_seq.current_value())
            .field("read_protected", &!self.read_cipher.is_null())
            .field("write_protected", &!self.write_cipher.is_null())
            .field("plaintext_limit", &self.plaintext_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(version: ProtocolVersion) -> RecordStream {
        let mut s = RecordStream::new();
        s.set_read_version(version);
        s.set_write_version(version);
        s
    }

    fn queue(bytes: &[u8]) -> ByteQueue {
        let mut q = ByteQueue::new();
        q.add_data(bytes);
        q
    }

    #[test]
    fn nothing_written_before_version_is_set() {
        let mut s = RecordStream::new();
        assert!(s.encode(ContentType::Handshake, &[1, 2, 3]).unwrap().is_empty());
    }

    #[test]
    fn encode_then_decode_across_partial_input() {
        let mut writer = stream(ProtocolVersion::TLSV1_2);
        let wire = writer.encode(ContentType::Handshake, &[9; 10]).unwrap();
        assert_eq!(&wire[..5], &[22, 3, 3, 0, 10]);

        let mut reader = stream(ProtocolVersion::TLSV1_2);
        let mut q = queue(&wire[..7]);
        assert!(reader.try_decode(&mut q).unwrap().is_none());
        q.add_data(&wire[7..]);
        let record = reader.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::Handshake);
        assert_eq!(record.fragment, vec![9; 10]);
        assert_eq!(q.available(), 0);
    }

    #[test]
    fn back_to_back_records() {
        let mut writer = stream(ProtocolVersion::TLSV1_2);
        let mut wire = writer.encode(ContentType::Handshake, &[1; 4]).unwrap();
        wire.extend(writer.encode(ContentType::Alert, &[2, 0]).unwrap());

        let mut reader = stream(ProtocolVersion::TLSV1_2);
        let mut q = queue(&wire);
        let first = reader.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(first.fragment, [1; 4]);
        assert_eq!(q.available(), TLS_HEADER_LEN + 2);

        let second = reader.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(second.content_type, ContentType::Alert);
        assert_eq!(second.fragment, [2, 0]);
        assert!(q.is_empty());
        assert!(reader.try_decode(&mut q).unwrap().is_none());
    }

    #[test]
    fn payload_is_split_by_plaintext_limit() {
        let mut s = stream(ProtocolVersion::TLSV1_2);
        s.set_plaintext_limit(512);
        let wire = s.encode(ContentType::ApplicationData, &[0; 1200]).unwrap();
        assert_eq!(wire.len(), 1200 + 3 * TLS_HEADER_LEN);
    }

    #[test]
    fn header_checks() {
        let mut s = stream(ProtocolVersion::TLSV1_2);
        let r = s.try_decode(&mut queue(&[99, 3, 3, 0, 1, 0]));
        assert!(matches!(r, Err(Error::UnexpectedMessage(_))));

        let r = s.try_decode(&mut queue(&[22, 2, 0, 0, 1, 0]));
        assert!(matches!(r, Err(Error::DecodeError(_))));

        let r = s.try_decode(&mut queue(&[22, 3, 1, 0, 1, 0]));
        assert!(matches!(r, Err(Error::ProtocolVersion(_))));

        let r = s.try_decode(&mut queue(&[23, 3, 3, 0x40, 0x01]));
        assert!(matches!(r, Err(Error::RecordOverflow(_))));
    }

    #[test]
    fn empty_fragments() {
        let mut s = stream(ProtocolVersion::TLSV1_2);
        let r = s.try_decode(&mut queue(&[22, 3, 3, 0, 0]));
        assert!(matches!(r, Err(Error::UnexpectedMessage(_))));

        let mut s = stream(ProtocolVersion::TLSV1_2);
        let record = s.try_decode(&mut queue(&[23, 3, 3, 0, 0])).unwrap().unwrap();
        assert!(record.fragment.is_empty());
    }

    #[test]
    fn compatibility_ccs_is_dropped() {
        let mut s = stream(ProtocolVersion::TLSV1_2);
        s.set_ignore_change_cipher_spec(true);
        let mut q = queue(&[20, 3, 3, 0, 1, 1, 21, 3, 3, 0, 2, 1, 0]);
        let record = s.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(record.content_type, ContentType::Alert);
    }

    #[test]
    fn ccs_without_pending_cipher() {
        let mut s = stream(ProtocolVersion::TLSV1_2);
        assert!(matches!(
            s.notify_change_cipher_spec_received(),
            Err(Error::UnexpectedMessage(_))
        ));
        assert!(s.enable_pending_write().is_err());
    }

    #[cfg(feature = "rust-crypto")]
    #[test]
    fn pending_ciphers_and_deferred_read() {
        use crate::crypto::prf::create_cipher_pair;
        use crate::crypto::rust_crypto;
        use crate::types::{CipherSuite, PrfAlgorithm};

        let provider = rust_crypto::default_provider();
        let suite = CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256;
        let prf = PrfAlgorithm::Hash(suite.hash_algorithm());
        let pair = |is_client| {
            create_cipher_pair(
                &provider,
                suite,
                ProtocolVersion::TLSV1_2,
                prf,
                &[7; 48],
                &[1; 32],
                &[2; 32],
                is_client,
            )
            .unwrap()
        };

        let client_pair = pair(true);
        let server_pair = pair(false);

        let mut client = stream(ProtocolVersion::TLSV1_2);
        client.set_pending_cipher(client_pair.read, client_pair.write);
        client.enable_pending_write().unwrap();
        let mut wire = vec![20, 3, 3, 0, 1, 1];
        wire.extend(client.encode(ContentType::Handshake, b"finished").unwrap());

        let mut server = stream(ProtocolVersion::TLSV1_2);
        server.set_pending_cipher(server_pair.read, server_pair.write);
        server.enable_pending_read(true).unwrap();

        let mut q = queue(&wire);
        let ccs = server.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(ccs.content_type, ContentType::ChangeCipherSpec);
        let fin = server.try_decode(&mut q).unwrap().unwrap();
        assert_eq!(fin.fragment, b"finished");
    }
}
