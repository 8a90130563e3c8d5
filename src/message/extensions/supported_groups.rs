//! SupportedGroups and EcPointFormats extensions (RFC 8422 Section 5.1)

use nom::number::complete::be_u8;
use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list16, parse_list8, verify_failure, with_length, write_opaque8};
use crate::types::{ExtensionType, NamedGroup};
use crate::Error;

/// The `uncompressed` point format, the only one RFC 8422 keeps.
pub const EC_POINT_FORMAT_UNCOMPRESSED: u8 = 0;

fn parse_group_list(input: &[u8]) -> IResult<&[u8], Vec<NamedGroup>> {
    let (rest, groups) = parse_list16(input, NamedGroup::parse)?;
    if groups.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, groups))
}

fn parse_point_formats(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, formats) = parse_list8(input, be_u8)?;
    if formats.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, formats))
}

impl Extensions {
    pub fn add_supported_groups(&mut self, groups: &[NamedGroup]) -> Result<(), Error> {
        let mut data = Vec::new();
        with_length(&mut data, 2, 2, 0xFFFE, "supported groups", |out| {
            for group in groups {
                group.serialize(out);
            }
            Ok(())
        })?;
        self.insert(ExtensionType::SupportedGroups, data);
        Ok(())
    }

    pub fn supported_groups(&self) -> Result<Option<Vec<NamedGroup>>, Error> {
        self.get(ExtensionType::SupportedGroups)
            .map(|data| decode_payload(data, parse_group_list, ExtensionType::SupportedGroups))
            .transpose()
    }

    pub fn add_ec_point_formats(&mut self) {
        let mut data = Vec::new();
        // One byte list, cannot exceed bounds.
        let _ = write_opaque8(&mut data, &[EC_POINT_FORMAT_UNCOMPRESSED], "ec point formats");
        self.insert(ExtensionType::EcPointFormats, data);
    }

    /// Advertised point formats. A list without `uncompressed` is
    /// `illegal_parameter`.
    pub fn ec_point_formats(&self) -> Result<Option<Vec<u8>>, Error> {
        let Some(data) = self.get(ExtensionType::EcPointFormats) else {
            return Ok(None);
        };
        let formats = decode_payload(data, parse_point_formats, ExtensionType::EcPointFormats)?;
        if !formats.contains(&EC_POINT_FORMAT_UNCOMPRESSED) {
            return Err(Error::IllegalParameter(
                "ec_point_formats lacks uncompressed".into(),
            ));
        }
        Ok(Some(formats))
    }
}
