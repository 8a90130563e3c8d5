//! Certificate status requests and the CertificateStatus message
//! (RFC 6066 Section 8, RFC 6961).

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::codec::{
    decode_all, parse_list16, parse_list24, parse_opaque16, parse_opaque24,
    verify_failure, with_length, write_opaque,
};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateStatusType {
    Ocsp,
    OcspMulti,
}

impl CertificateStatusType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CertificateStatusType::Ocsp),
            2 => Some(CertificateStatusType::OcspMulti),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CertificateStatusType::Ocsp => 1,
            CertificateStatusType::OcspMulti => 2,
        }
    }
}

/// OCSP request parameters. Responder IDs are DER `ResponderID`s and are
/// never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcspStatusRequest {
    pub responder_ids: Vec<Vec<u8>>,
    /// DER encoded OCSP request extensions.
    pub request_extensions: Vec<u8>,
}

impl OcspStatusRequest {
    pub fn parse(input: &[u8]) -> IResult<&[u8], OcspStatusRequest> {
        let (rest, responder_ids) = parse_list16(input, |i| {
            let (rest, id) = parse_opaque16(i)?;
            if id.is_empty() {
                return Err(verify_failure(i));
            }
            Ok((rest, id.to_vec()))
        })?;
        let (rest, request_extensions) = parse_opaque16(rest)?;
        Ok((
            rest,
            OcspStatusRequest {
                responder_ids,
                request_extensions: request_extensions.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        with_length(output, 2, 0, 0xFFFF, "responder id list", |out| {
            for id in &self.responder_ids {
                write_opaque(out, 2, id, 1, 0xFFFF, "responder id")?;
            }
            Ok(())
        })?;
        write_opaque(
            output,
            2,
            &self.request_extensions,
            0,
            0xFFFF,
            "request extensions",
        )
    }
}

/// Payload of the `status_request` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatusRequest {
    Ocsp(OcspStatusRequest),
    /// A status type this crate does not know. Servers ignore it.
    Unknown(u8, Vec<u8>),
}

impl CertificateStatusRequest {
    pub fn ocsp() -> Self {
        CertificateStatusRequest::Ocsp(OcspStatusRequest::default())
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateStatusRequest> {
        let (rest, status_type) = be_u8(input)?;
        match CertificateStatusType::from_u8(status_type) {
            Some(CertificateStatusType::Ocsp) => {
                let (rest, request) = OcspStatusRequest::parse(rest)?;
                Ok((rest, CertificateStatusRequest::Ocsp(request)))
            }
            // The request extends to the end of the extension.
            _ => Ok((
                &rest[rest.len()..],
                CertificateStatusRequest::Unknown(status_type, rest.to_vec()),
            )),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            CertificateStatusRequest::Ocsp(request) => {
                output.push(CertificateStatusType::Ocsp.as_u8());
                request.serialize(output)
            }
            CertificateStatusRequest::Unknown(status_type, data) => {
                output.push(*status_type);
                output.extend_from_slice(data);
                Ok(())
            }
        }
    }
}

/// One entry of the `status_request_v2` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatusRequestItemV2 {
    Ocsp(OcspStatusRequest),
    OcspMulti(OcspStatusRequest),
    Unknown(u8, Vec<u8>),
}

impl CertificateStatusRequestItemV2 {
    pub fn status_type(&self) -> Option<CertificateStatusType> {
        match self {
            CertificateStatusRequestItemV2::Ocsp(_) => Some(CertificateStatusType::Ocsp),
            CertificateStatusRequestItemV2::OcspMulti(_) => {
                Some(CertificateStatusType::OcspMulti)
            }
            CertificateStatusRequestItemV2::Unknown(..) => None,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateStatusRequestItemV2> {
        let (rest, status_type) = be_u8(input)?;
        let (rest, len) = be_u16(rest)?;
        let (rest, request) = take(len)(rest)?;
        let item = match CertificateStatusType::from_u8(status_type) {
            Some(kind) => {
                let (trailing, parsed) = OcspStatusRequest::parse(request)?;
                if !trailing.is_empty() {
                    return Err(verify_failure(input));
                }
                match kind {
                    CertificateStatusType::Ocsp => CertificateStatusRequestItemV2::Ocsp(parsed),
                    CertificateStatusType::OcspMulti => {
                        CertificateStatusRequestItemV2::OcspMulti(parsed)
                    }
                }
            }
            None => CertificateStatusRequestItemV2::Unknown(status_type, request.to_vec()),
        };
        Ok((rest, item))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        let (kind, request) = match self {
            CertificateStatusRequestItemV2::Ocsp(request) => (CertificateStatusType::Ocsp, request),
            CertificateStatusRequestItemV2::OcspMulti(request) => {
                (CertificateStatusType::OcspMulti, request)
            }
            CertificateStatusRequestItemV2::Unknown(status_type, data) => {
                output.push(*status_type);
                return write_opaque(output, 2, data, 0, 0xFFFF, "status request");
            }
        };
        output.push(kind.as_u8());
        with_length(output, 2, 0, 0xFFFF, "status request", |out| {
            request.serialize(out)
        })
    }
}

/// `CertificateStatusRequestListV2`, which must not be empty.
pub(crate) fn parse_request_list_v2(
    input: &[u8],
) -> IResult<&[u8], Vec<CertificateStatusRequestItemV2>> {
    let (rest, items) = parse_list16(input, CertificateStatusRequestItemV2::parse)?;
    if items.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, items))
}

pub(crate) fn write_request_list_v2(
    output: &mut Vec<u8>,
    items: &[CertificateStatusRequestItemV2],
) -> Result<(), Error> {
    with_length(output, 2, 1, 0xFFFF, "status request list", |out| {
        for item in items {
            item.serialize(out)?;
        }
        Ok(())
    })
}

/// The CertificateStatus handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    /// A single DER OCSP response for the end entity.
    Ocsp(Vec<u8>),
    /// One response per chain position. `None` is a hole, sent as a zero
    /// length response.
    OcspMulti(Vec<Option<Vec<u8>>>),
}

impl CertificateStatus {
    pub fn status_type(&self) -> CertificateStatusType {
        match self {
            CertificateStatus::Ocsp(_) => CertificateStatusType::Ocsp,
            CertificateStatus::OcspMulti(_) => CertificateStatusType::OcspMulti,
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        output.push(self.status_type().as_u8());
        match self {
            CertificateStatus::Ocsp(response) => {
                write_opaque(output, 3, response, 1, 0xFF_FFFF, "ocsp response")
            }
            CertificateStatus::OcspMulti(responses) => {
                with_length(output, 3, 1, 0xFF_FFFF, "ocsp response list", |out| {
                    for response in responses {
                        let data = response.as_deref().unwrap_or_default();
                        write_opaque(out, 3, data, 0, 0xFF_FFFF, "ocsp response")?;
                    }
                    Ok(())
                })
            }
        }
    }

    /// Decode a CertificateStatus body.
    ///
    /// `allowed` holds the status types the client requested and the server
    /// acknowledged; `chain_length` is the length of the certificate chain
    /// the status belongs to.
    pub fn decode(
        body: &[u8],
        allowed: &[CertificateStatusType],
        chain_length: usize,
    ) -> Result<CertificateStatus, Error> {
        let (rest, status_type) = be_u8::<_, nom::error::Error<&[u8]>>(body)
            .map_err(|_| Error::DecodeError("empty CertificateStatus".into()))?;
        let kind = CertificateStatusType::from_u8(status_type).ok_or_else(|| {
            Error::DecodeError(format!("unknown certificate status type {}", status_type))
        })?;
        if !allowed.contains(&kind) {
            return Err(Error::IllegalParameter(format!(
                "certificate status {:?} was not requested",
                kind
            )));
        }

        match kind {
            CertificateStatusType::Ocsp => {
                let response = decode_all(rest, parse_opaque24, "CertificateStatus")?;
                if response.is_empty() {
                    return Err(Error::DecodeError("empty OCSP response".into()));
                }
                Ok(CertificateStatus::Ocsp(response.to_vec()))
            }
            CertificateStatusType::OcspMulti => {
                let responses = decode_all(rest, parse_response_list, "CertificateStatus")?;
                if responses.is_empty() {
                    return Err(Error::DecodeError("empty OCSP response list".into()));
                }
                if responses.len() > chain_length {
                    return Err(Error::IllegalParameter(format!(
                        "{} OCSP responses for {} certificates",
                        responses.len(),
                        chain_length
                    )));
                }
                Ok(CertificateStatus::OcspMulti(responses))
            }
        }
    }

    /// The response for the end entity certificate, if any.
    pub fn end_entity_response(&self) -> Option<&[u8]> {
        match self {
            CertificateStatus::Ocsp(response) => Some(response),
            CertificateStatus::OcspMulti(responses) => {
                responses.first().and_then(|r| r.as_deref())
            }
        }
    }
}

fn parse_response_list(input: &[u8]) -> IResult<&[u8], Vec<Option<Vec<u8>>>> {
    parse_list24(input, |i| {
        let (rest, response) = parse_opaque24(i)?;
        let response = (!response.is_empty()).then(|| response.to_vec());
        Ok((rest, response))
    })
}
