//! StatusRequest (RFC 6066 Section 8) and StatusRequestV2 (RFC 6961)
//! extensions. A server acknowledges either with an empty payload.

use super::{decode_payload, Extensions};
use crate::message::status::{parse_request_list_v2, write_request_list_v2};
use crate::message::{CertificateStatusRequest, CertificateStatusRequestItemV2};
use crate::types::ExtensionType;
use crate::Error;

impl Extensions {
    pub fn add_status_request(&mut self, request: &CertificateStatusRequest) -> Result<(), Error> {
        let mut data = Vec::new();
        request.serialize(&mut data)?;
        self.insert(ExtensionType::StatusRequest, data);
        Ok(())
    }

    /// Client form. An empty payload is the server acknowledgement and
    /// decodes as an error here.
    pub fn status_request(&self) -> Result<Option<CertificateStatusRequest>, Error> {
        self.get(ExtensionType::StatusRequest)
            .map(|data| {
                decode_payload(data, CertificateStatusRequest::parse, ExtensionType::StatusRequest)
            })
            .transpose()
    }

    pub fn add_status_request_v2(
        &mut self,
        items: &[CertificateStatusRequestItemV2],
    ) -> Result<(), Error> {
        let mut data = Vec::new();
        write_request_list_v2(&mut data, items)?;
        self.insert(ExtensionType::StatusRequestV2, data);
        Ok(())
    }

    pub fn status_request_v2(&self) -> Result<Option<Vec<CertificateStatusRequestItemV2>>, Error> {
        self.get(ExtensionType::StatusRequestV2)
            .map(|data| {
                decode_payload(data, parse_request_list_v2, ExtensionType::StatusRequestV2)
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OcspStatusRequest;

    #[test]
    fn ocsp_request() {
        let mut ext = Extensions::new();
        ext.add_status_request(&CertificateStatusRequest::ocsp())
            .unwrap();
        assert_eq!(
            ext.get(ExtensionType::StatusRequest),
            Some(&[0x01, 0x00, 0x00, 0x00, 0x00][..])
        );
        assert_eq!(
            ext.status_request().unwrap(),
            Some(CertificateStatusRequest::ocsp())
        );
    }

    #[test]
    fn unknown_status_type_is_kept() {
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::StatusRequest, vec![0x05, 0xAA]);
        assert_eq!(
            ext.status_request().unwrap(),
            Some(CertificateStatusRequest::Unknown(5, vec![0xAA]))
        );
    }

    #[test]
    fn v2_list_must_not_be_empty() {
        let mut ext = Extensions::new();
        assert!(ext.add_status_request_v2(&[]).is_err());
        ext.add_status_request_v2(&[CertificateStatusRequestItemV2::OcspMulti(
            OcspStatusRequest::default(),
        )])
        .unwrap();
        assert_eq!(ext.status_request_v2().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn empty_acknowledgement_is_not_a_request() {
        let mut ext = Extensions::new();
        ext.add_empty(ExtensionType::StatusRequest);
        assert!(ext.has_empty(ExtensionType::StatusRequest).unwrap());
        assert!(ext.status_request().is_err());
    }
}
