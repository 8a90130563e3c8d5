use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::codec::write_u24;
use crate::types::MessageType;
use crate::Error;

/// TLS handshake header: type and 24 bit length.
pub const TLS_HANDSHAKE_HEADER_LEN: usize = 4;

/// DTLS handshake header, adding message_seq, fragment_offset and
/// fragment_length.
pub const DTLS_HANDSHAKE_HEADER_LEN: usize = 12;

/// Largest handshake body accepted from a peer.
pub const MAX_HANDSHAKE_LEN: usize = 1 << 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub fn parse_tls(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        Ok((
            input,
            HandshakeHeader {
                msg_type: MessageType::from_u8(msg_type),
                length,
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: length,
            },
        ))
    }

    pub fn parse_dtls(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;
        Ok((
            input,
            HandshakeHeader {
                msg_type: MessageType::from_u8(msg_type),
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize_tls(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type.as_u8());
        write_u24(output, self.length as usize);
    }

    pub fn serialize_dtls(&self, output: &mut Vec<u8>) {
        self.serialize_tls(output);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        write_u24(output, self.fragment_offset as usize);
        write_u24(output, self.fragment_length as usize);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length < self.length
    }
}

/// A complete handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub msg_type: MessageType,
    /// Only meaningful for DTLS.
    pub message_seq: u16,
    pub body: Vec<u8>,
}

impl HandshakeMessage {
    pub fn new(msg_type: MessageType, body: Vec<u8>) -> Result<Self, Error> {
        if body.len() > 0xFF_FFFF {
            return Err(Error::InternalError(format!(
                "{:?} body of {} bytes",
                msg_type,
                body.len()
            )));
        }
        Ok(HandshakeMessage {
            msg_type,
            message_seq: 0,
            body,
        })
    }

    fn header(&self, fragment_offset: usize, fragment_length: usize) -> HandshakeHeader {
        HandshakeHeader {
            msg_type: self.msg_type,
            length: self.body.len() as u32,
            message_seq: self.message_seq,
            fragment_offset: fragment_offset as u32,
            fragment_length: fragment_length as u32,
        }
    }

    /// TLS wire form, which is also what the transcript hashes.
    pub fn tls_encoding(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TLS_HANDSHAKE_HEADER_LEN + self.body.len());
        self.header(0, self.body.len()).serialize_tls(&mut out);
        out.extend_from_slice(&self.body);
        out
    }

    /// DTLS unfragmented form, as entered into the transcript.
    pub fn dtls_encoding(&self) -> Vec<u8> {
        self.dtls_fragment(0, self.body.len())
    }

    /// A DTLS fragment covering `offset..offset + len` of the body.
    pub fn dtls_fragment(&self, offset: usize, len: usize) -> Vec<u8> {
        let end = (offset + len).min(self.body.len());
        let offset = offset.min(end);
        let mut out = Vec::with_capacity(DTLS_HANDSHAKE_HEADER_LEN + end - offset);
        self.header(offset, end - offset).serialize_dtls(&mut out);
        out.extend_from_slice(&self.body[offset..end]);
        out
    }

    pub fn encoding(&self, datagram: bool) -> Vec<u8> {
        if datagram {
            self.dtls_encoding()
        } else {
            self.tls_encoding()
        }
    }
}
