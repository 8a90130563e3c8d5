use std::collections::VecDeque;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::codec::{be_u48, write_u48};
use crate::crypto::record_cipher::{NullCipher, RecordCipher, MAX_PLAINTEXT};
use crate::record::{SequenceNumber, DTLS_HEADER_LEN};
use crate::types::{ContentType, ProtocolVersion};
use crate::window::ReplayWindow;
use crate::Error;

/// A decrypted DTLS record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DtlsRecord {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    pub sequence_number: u64,
    pub fragment: Vec<u8>,
}

struct Header {
    content_type: ContentType,
    version: ProtocolVersion,
    epoch: u16,
    sequence_number: u64,
    length: u16,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, content_type) = be_u8(input)?;
    let (input, version) = ProtocolVersion::parse(input)?;
    let (input, epoch) = be_u16(input)?;
    let (input, sequence_number) = be_u48(input)?;
    let (input, length) = be_u16(input)?;
    Ok((
        input,
        Header {
            content_type: ContentType::from_u8(content_type),
            version,
            epoch,
            sequence_number,
            length,
        },
    ))
}

struct ReadEpoch {
    epoch: u16,
    cipher: Box<dyn RecordCipher>,
    window: ReplayWindow,
}

struct WriteEpoch {
    epoch: u16,
    cipher: Box<dyn RecordCipher>,
    sequence: SequenceNumber,
}

impl ReadEpoch {
    fn new(epoch: u16, cipher: Box<dyn RecordCipher>) -> Self {
        ReadEpoch {
            epoch,
            cipher,
            window: ReplayWindow::new(),
        }
    }
}

impl WriteEpoch {
    fn new(epoch: u16, cipher: Box<dyn RecordCipher>) -> Self {
        WriteEpoch {
            epoch,
            cipher,
            sequence: SequenceNumber::dtls(),
        }
    }
}

/// DTLS record layer (RFC 6347 4.1).
///
/// Invalid records are dropped without an error: unknown epochs, replays,
/// oversized records and records failing authentication. The previous read
/// epoch stays readable for handshake records so a retransmitted peer
/// flight is still recognized after a cipher change. The previous write
/// epoch stays writable so a retransmitted flight goes out under the epoch
/// it was first sent in.
pub(crate) struct DtlsRecordLayer {
    read: ReadEpoch,
    previous_read: Option<ReadEpoch>,
    pending_read: Option<Box<dyn RecordCipher>>,

    write: WriteEpoch,
    previous_write: Option<WriteEpoch>,
    pending_write: Option<Box<dyn RecordCipher>>,

    read_version: Option<ProtocolVersion>,
    write_version: Option<ProtocolVersion>,
    plaintext_limit: usize,
    mtu: usize,

    datagrams: VecDeque<Vec<u8>>,
    /// Datagram being filled with records.
    current: Vec<u8>,
}

impl DtlsRecordLayer {
    pub fn new(mtu: usize) -> Self {
        DtlsRecordLayer {
            read: ReadEpoch::new(0, Box::new(NullCipher)),
            previous_read: None,
            pending_read: None,
            write: WriteEpoch::new(0, Box::new(NullCipher)),
            previous_write: None,
            pending_write: None,
            read_version: None,
            write_version: None,
            plaintext_limit: MAX_PLAINTEXT,
            mtu,
            datagrams: VecDeque::new(),
            current: Vec::new(),
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

    pub fn read_epoch(&self) -> u16 {
        self.read.epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write.epoch
    }

    /// Largest fragment that fits one datagram under `epoch`.
    pub fn max_fragment(&self, epoch: u16) -> usize {
        let overhead = self
            .write_state(epoch)
            .map(|w| w.cipher.write_overhead())
            .unwrap_or(0);
        self.mtu
            .saturating_sub(DTLS_HEADER_LEN + overhead)
            .min(self.plaintext_limit)
            .max(1)
    }

    /// Decode the first record in `input`. Returns the record, or `None` if
    /// it was dropped, and the remaining input.
    pub fn decode_next<'a>(&mut self, input: &'a [u8]) -> (Option<DtlsRecord>, &'a [u8]) {
        let Ok((rest, header)) = parse_header(input) else {
            trace!("Dropping {} trailing bytes", input.len());
            return (None, &[]);
        };
        let length = header.length as usize;
        if rest.len() < length {
            trace!("Dropping truncated record");
            return (None, &[]);
        }
        let (payload, rest) = rest.split_at(length);
        (self.decode_record(header, payload), rest)
    }

    fn decode_record(&mut self, header: Header, payload: &[u8]) -> Option<DtlsRecord> {
        if !header.content_type.is_known() {
            warn!("Dropping record of unknown type {}", header.content_type.as_u8());
            return None;
        }
        if !header.version.is_dtls() {
            warn!("Dropping record with version {:?}", header.version);
            return None;
        }
        // Epoch 0 may repeat a ClientHello sent before the version was known.
        if let Some(expected) = self.read_version.filter(|_| header.epoch > 0) {
            if header.version != expected {
                warn!(
                    "Dropping record with version {:?}, expected {:?}",
                    header.version, expected
                );
                return None;
            }
        }

        let limit = self.plaintext_limit;
        let state = if header.epoch == self.read.epoch {
            &mut self.read
        } else {
            match &mut self.previous_read {
                Some(prev)
                    if prev.epoch == header.epoch
                        && header.content_type == ContentType::Handshake =>
                {
                    prev
                }
                _ => {
                    trace!(
                        "Dropping record from epoch {} (reading {})",
                        header.epoch,
                        self.read.epoch
                    );
                    return None;
                }
            }
        };

        if !state.window.is_fresh(header.sequence_number) {
            trace!(
                "Dropping replayed record epoch={} seq={}",
                header.epoch,
                header.sequence_number
            );
            return None;
        }
        if payload.len() > state.cipher.ciphertext_limit(limit) {
            warn!("Dropping oversized record of {} bytes", payload.len());
            return None;
        }

        let seq_input = (u64::from(header.epoch) << 48) | header.sequence_number;
        let (content_type, fragment) = match state.cipher.decode_ciphertext(
            seq_input,
            header.content_type,
            header.version,
            payload,
        ) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "Dropping record epoch={} seq={}: {}",
                    header.epoch, header.sequence_number, e
                );
                return None;
            }
        };
        if fragment.len() > limit {
            warn!("Dropping record with {} bytes of plaintext", fragment.len());
            return None;
        }
        if fragment.is_empty() && content_type != ContentType::ApplicationData {
            warn!("Dropping empty {:?} record", content_type);
            return None;
        }
        state.window.mark(header.sequence_number);

        trace!(
            "Read record {:?} epoch={} seq={} len={}",
            content_type,
            header.epoch,
            header.sequence_number,
            fragment.len()
        );
        Some(DtlsRecord {
            content_type,
            version: header.version,
            epoch: header.epoch,
            sequence_number: header.sequence_number,
            fragment,
        })
    }

    fn write_state(&self, epoch: u16) -> Option<&WriteEpoch> {
        if epoch == self.write.epoch {
            return Some(&self.write);
        }
        self.previous_write.as_ref().filter(|w| w.epoch == epoch)
    }

    /// Protect one fragment under `epoch` and queue it for sending.
    pub fn send_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        fragment: &[u8],
    ) -> Result<(), Error> {
        let record = self.encode_record(content_type, epoch, fragment)?;
        self.pack(record);
        Ok(())
    }

    /// Protect one fragment under `epoch`. Nothing is produced before a
    /// write version is set.
    pub fn encode_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        fragment: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let Some(version) = self.write_version else {
            return Ok(Vec::new());
        };
        let state = if epoch == self.write.epoch {
            &mut self.write
        } else {
            match &mut self.previous_write {
                Some(prev) if prev.epoch == epoch => prev,
                _ => {
                    return Err(Error::InternalError(format!(
                        "no write state for epoch {}",
                        epoch
                    )))
                }
            }
        };

        let seq = state.sequence.next_value()?;
        let seq_input = (u64::from(epoch) << 48) | seq;
        let (outer, body) = state
            .cipher
            .encode_plaintext(seq_input, content_type, version, fragment)?;

        let mut out = Vec::with_capacity(DTLS_HEADER_LEN + body.len());
        out.push(outer.as_u8());
        version.serialize(&mut out);
        out.extend_from_slice(&epoch.to_be_bytes());
        write_u48(&mut out, seq);
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(&body);
        trace!(
            "Wrote record {:?} epoch={} seq={} len={}",
            content_type,
            epoch,
            seq,
            fragment.len()
        );
        Ok(out)
    }

    /// Append a record to the datagram being built, starting a new one when
    /// it would exceed the MTU.
    fn pack(&mut self, record: Vec<u8>) {
        if record.is_empty() {
            return;
        }
        if !self.current.is_empty() && self.current.len() + record.len() > self.mtu {
            let full = std::mem::take(&mut self.current);
            self.datagrams.push_back(full);
        }
        self.current.extend_from_slice(&record);
    }

    /// Close the datagram being built.
    pub fn flush(&mut self) {
        if !self.current.is_empty() {
            let full = std::mem::take(&mut self.current);
            self.datagrams.push_back(full);
        }
    }

    pub fn poll_datagram(&mut self) -> Option<Vec<u8>> {
        self.datagrams.pop_front()
    }

    pub fn set_pending_cipher(
        &mut self,
        read: Box<dyn RecordCipher>,
        write: Box<dyn RecordCipher>,
    ) {
        self.pending_read = Some(read);
        self.pending_write = Some(write);
    }

    /// Move writing to the next epoch. The current one stays available for
    /// retransmissions.
    pub fn enable_pending_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_write
            .take()
            .ok_or_else(|| Error::InternalError("no pending write cipher".into()))?;
        let epoch = self.next_epoch(self.write.epoch)?;
        let previous = std::mem::replace(&mut self.write, WriteEpoch::new(epoch, cipher));
        self.previous_write = Some(previous);
        debug!("Write epoch {}", epoch);
        Ok(())
    }

    /// Move reading to the next epoch. The current one stays readable for
    /// handshake retransmissions.
    pub fn enable_pending_read(&mut self) -> Result<(), Error> {
        let cipher = self.pending_read.take().ok_or_else(|| {
            Error::UnexpectedMessage("change_cipher_spec without pending cipher".into())
        })?;
        let epoch = self.next_epoch(self.read.epoch)?;
        let previous = std::mem::replace(&mut self.read, ReadEpoch::new(epoch, cipher));
        self.previous_read = Some(previous);
        debug!("Read epoch {}", epoch);
        Ok(())
    }

    fn next_epoch(&self, epoch: u16) -> Result<u16, Error> {
        epoch
            .checked_add(1)
            .ok_or_else(|| Error::InternalError("epoch exhausted".into()))
    }
}

impl std::fmt::Debug for DtlsRecordLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtlsRecordLayer")
            .field("read_epoch", &self.read.epoch)
            .field("write_epoch", &self.write.epoch)
            .field("write_seq", &self.write.sequence.current_value())
            .field("read_version", &self.read_version)
            .field("write_version", &self.write_version)
            .field("mtu", &self.mtu)
            .field("queued", &self.datagrams.len())
            .finish()
    }
}
