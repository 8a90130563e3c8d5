use nom::number::complete::be_u32;
use nom::IResult;

use super::Extensions;
use crate::codec::{decode_all, parse_opaque16, parse_opaque8, verify_failure, write_opaque};
use crate::Error;

/// TLS 1.3 NewSessionTicket (RFC 8446 Section 4.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    /// Seconds, at most seven days.
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Extensions,
}

impl NewSessionTicket {
    pub const MAX_LIFETIME: u32 = 604_800;

    pub fn parse(input: &[u8]) -> IResult<&[u8], NewSessionTicket> {
        let (rest, lifetime) = be_u32(input)?;
        let (rest, age_add) = be_u32(rest)?;
        let (rest, nonce) = parse_opaque8(rest)?;
        let (rest, ticket) = parse_opaque16(rest)?;
        if ticket.is_empty() {
            return Err(verify_failure(input));
        }
        let (rest, extensions) = Extensions::parse(rest)?;
        Ok((
            rest,
            NewSessionTicket {
                lifetime,
                age_add,
                nonce: nonce.to_vec(),
                ticket: ticket.to_vec(),
                extensions,
            },
        ))
    }

    pub fn decode(body: &[u8]) -> Result<NewSessionTicket, Error> {
        let ticket = decode_all(body, NewSessionTicket::parse, "NewSessionTicket")?;
        if ticket.lifetime > Self::MAX_LIFETIME {
            return Err(Error::IllegalParameter(format!(
                "ticket lifetime {}",
                ticket.lifetime
            )));
        }
        ticket.extensions.check_duplicates()?;
        Ok(ticket)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        output.extend_from_slice(&self.lifetime.to_be_bytes());
        output.extend_from_slice(&self.age_add.to_be_bytes());
        write_opaque(output, 1, &self.nonce, 0, 0xFF, "ticket nonce")?;
        write_opaque(output, 2, &self.ticket, 1, 0xFFFF, "ticket")?;
        self.extensions.serialize(output)
    }
}
