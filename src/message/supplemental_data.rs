use nom::number::complete::be_u16;
use nom::IResult;

use crate::codec::{decode_all, parse_list24, parse_opaque16, with_length, write_opaque16};
use crate::Error;

/// One entry of a SupplementalData message (RFC 4680).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementalDataEntry {
    pub data_type: u16,
    pub data: Vec<u8>,
}

impl SupplementalDataEntry {
    pub fn new(data_type: u16, data: Vec<u8>) -> Self {
        SupplementalDataEntry { data_type, data }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SupplementalDataEntry> {
        let (rest, data_type) = be_u16(input)?;
        let (rest, data) = parse_opaque16(rest)?;
        Ok((
            rest,
            SupplementalDataEntry {
                data_type,
                data: data.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        output.extend_from_slice(&self.data_type.to_be_bytes());
        write_opaque16(output, &self.data, "supplemental data")
    }

    /// Encode a SupplementalData message body. The list is never empty.
    pub fn serialize_list(
        entries: &[SupplementalDataEntry],
        output: &mut Vec<u8>,
    ) -> Result<(), Error> {
        with_length(output, 3, 1, 0xFF_FFFF, "supplemental data", |out| {
            for entry in entries {
                entry.serialize(out)?;
            }
            Ok(())
        })
    }

    /// Decode a SupplementalData message body. Repeated data types are
    /// `illegal_parameter`.
    pub fn decode_list(body: &[u8]) -> Result<Vec<SupplementalDataEntry>, Error> {
        let entries = decode_all(
            body,
            |i| parse_list24(i, SupplementalDataEntry::parse),
            "SupplementalData",
        )?;
        if entries.is_empty() {
            return Err(Error::DecodeError("empty SupplementalData".into()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.data_type == entry.data_type) {
                return Err(Error::IllegalParameter(format!(
                    "supplemental data type {} repeated",
                    entry.data_type
                )));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0x00, 0x00, 0x09, // List length
        0x40, 0x02, 0x00, 0x01, 0x07, // Entry 1
        0x40, 0x03, 0x00, 0x00, // Entry 2, empty data
        0x99, // Padding outside the list
    ];

    #[test]
    fn roundtrip() {
        let entries = vec![
            SupplementalDataEntry::new(0x4002, vec![7]),
            SupplementalDataEntry::new(0x4003, Vec::new()),
        ];
        let mut serialized = Vec::new();
        SupplementalDataEntry::serialize_list(&entries, &mut serialized).unwrap();
        assert_eq!(serialized, &MESSAGE[..MESSAGE.len() - 1]);
        assert_eq!(SupplementalDataEntry::decode_list(&serialized).unwrap(), entries);
        assert!(SupplementalDataEntry::decode_list(MESSAGE).is_err());
    }

    #[test]
    fn empty_and_repeated_are_rejected() {
        assert!(SupplementalDataEntry::serialize_list(&[], &mut Vec::new()).is_err());
        let body = [0x00, 0x00, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert!(matches!(
            SupplementalDataEntry::decode_list(&body),
            Err(Error::IllegalParameter(_))
        ));
    }
}
