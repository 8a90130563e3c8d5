use nom::number::complete::be_u32;
use nom::IResult;

use crate::codec::{parse_opaque16, verify_failure, write_opaque};
use crate::Error;

/// An identity of the TLS 1.3 `pre_shared_key` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskIdentity {
    pub identity: Vec<u8>,
    pub obfuscated_ticket_age: u32,
}

impl PskIdentity {
    pub fn new(identity: Vec<u8>, obfuscated_ticket_age: u32) -> Self {
        PskIdentity {
            identity,
            obfuscated_ticket_age,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], PskIdentity> {
        let (rest, identity) = parse_opaque16(input)?;
        if identity.is_empty() {
            return Err(verify_failure(input));
        }
        let (rest, obfuscated_ticket_age) = be_u32(rest)?;
        Ok((
            rest,
            PskIdentity {
                identity: identity.to_vec(),
                obfuscated_ticket_age,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        write_opaque(output, 2, &self.identity, 1, 0xFFFF, "psk identity")?;
        output.extend_from_slice(&self.obfuscated_ticket_age.to_be_bytes());
        Ok(())
    }
}
