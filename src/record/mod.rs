//! Record layer.
//!
//! [`RecordStream`] frames records over a byte stream, [`DtlsRecordLayer`]
//! over datagrams. Both protect fragments through a
//! [`RecordCipher`](crate::crypto::record_cipher::RecordCipher) and number
//! them with a [`SequenceNumber`].

mod datagram;
mod sequence;
mod stream;

pub(crate) use datagram::{DtlsRecord, DtlsRecordLayer};
pub(crate) use sequence::SequenceNumber;
pub(crate) use stream::RecordStream;

use crate::types::{ContentType, ProtocolVersion};

/// TLS record header: type, version, length.
pub(crate) const TLS_HEADER_LEN: usize = 5;

/// DTLS record header: type, version, epoch, 48 bit sequence, length.
pub(crate) const DTLS_HEADER_LEN: usize = 13;

/// A decrypted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub fragment: Vec<u8>,
}
