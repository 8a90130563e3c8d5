//! SupportedVersions (RFC 8446 Section 4.2.1) and Cookie (Section 4.2.2)

use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list8, parse_opaque16, verify_failure, with_length, write_opaque};
use crate::types::{ExtensionType, ProtocolVersion};
use crate::Error;

fn parse_version_list(input: &[u8]) -> IResult<&[u8], Vec<ProtocolVersion>> {
    let (rest, versions) = parse_list8(input, ProtocolVersion::parse)?;
    if versions.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, versions))
}

fn parse_cookie(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, cookie) = parse_opaque16(input)?;
    if cookie.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, cookie.to_vec()))
}

impl Extensions {
    /// ClientHello form, in preference order.
    pub fn add_supported_versions_client(
        &mut self,
        versions: &[ProtocolVersion],
    ) -> Result<(), Error> {
        let mut data = Vec::new();
        with_length(&mut data, 1, 2, 254, "supported versions", |out| {
            for version in versions {
                version.serialize(out);
            }
            Ok(())
        })?;
        self.insert(ExtensionType::SupportedVersions, data);
        Ok(())
    }

    pub fn supported_versions_client(&self) -> Result<Option<Vec<ProtocolVersion>>, Error> {
        self.get(ExtensionType::SupportedVersions)
            .map(|data| {
                decode_payload(data, parse_version_list, ExtensionType::SupportedVersions)
            })
            .transpose()
    }

    /// ServerHello and HelloRetryRequest form: the selected version.
    pub fn add_supported_versions_server(&mut self, version: ProtocolVersion) {
        let mut data = Vec::new();
        version.serialize(&mut data);
        self.insert(ExtensionType::SupportedVersions, data);
    }

    pub fn supported_versions_server(&self) -> Result<Option<ProtocolVersion>, Error> {
        self.get(ExtensionType::SupportedVersions)
            .map(|data| {
                decode_payload(data, ProtocolVersion::parse, ExtensionType::SupportedVersions)
            })
            .transpose()
    }

    pub fn add_cookie(&mut self, cookie: &[u8]) -> Result<(), Error> {
        let mut data = Vec::new();
        write_opaque(&mut data, 2, cookie, 1, 0xFFFF, "cookie")?;
        self.insert(ExtensionType::Cookie, data);
        Ok(())
    }

    pub fn cookie(&self) -> Result<Option<Vec<u8>>, Error> {
        self.get(ExtensionType::Cookie)
            .map(|data| decode_payload(data, parse_cookie, ExtensionType::Cookie))
            .transpose()
    }
}
