use nom::IResult;

use super::Extensions;
use crate::codec::{decode_all, parse_opaque24, parse_opaque8, with_length, write_opaque};
use crate::Error;

/// One certificate of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER encoded X.509 certificate. Never empty.
    pub certificate: Vec<u8>,
    /// Per entry extensions, present in the TLS 1.3 form only.
    pub extensions: Option<Extensions>,
}

impl CertificateEntry {
    pub fn new(certificate: Vec<u8>) -> Self {
        CertificateEntry {
            certificate,
            extensions: None,
        }
    }
}

/// The Certificate handshake message.
///
/// `request_context` is `Some` exactly for the TLS 1.3 form; the two empty
/// chains ([`empty_chain`](Self::empty_chain) and
/// [`empty_chain_tls13`](Self::empty_chain_tls13)) are different values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub request_context: Option<Vec<u8>>,
    pub entries: Vec<CertificateEntry>,
}

impl Certificate {
    /// Pre TLS 1.3 chain, end entity first.
    pub fn new(chain: Vec<Vec<u8>>) -> Self {
        Certificate {
            request_context: None,
            entries: chain.into_iter().map(CertificateEntry::new).collect(),
        }
    }

    /// TLS 1.3 chain with empty entry extensions.
    pub fn new_tls13(request_context: Vec<u8>, chain: Vec<Vec<u8>>) -> Self {
        Certificate {
            request_context: Some(request_context),
            entries: chain
                .into_iter()
                .map(|certificate| CertificateEntry {
                    certificate,
                    extensions: Some(Extensions::new()),
                })
                .collect(),
        }
    }

    pub fn empty_chain() -> Self {
        Certificate {
            request_context: None,
            entries: Vec::new(),
        }
    }

    pub fn empty_chain_tls13(request_context: Vec<u8>) -> Self {
        Certificate {
            request_context: Some(request_context),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_tls13(&self) -> bool {
        self.request_context.is_some()
    }

    pub fn end_entity(&self) -> Option<&[u8]> {
        self.entries.first().map(|e| e.certificate.as_slice())
    }

    /// DER certificates in chain order.
    pub fn chain(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|e| e.certificate.clone()).collect()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(context) = &self.request_context {
            write_opaque(output, 1, context, 0, 0xFF, "certificate request context")?;
        }
        let tls13 = self.is_tls13();
        with_length(output, 3, 0, 0xFF_FFFF, "certificate list", |out| {
            for entry in &self.entries {
                write_opaque(out, 3, &entry.certificate, 1, 0xFF_FFFF, "certificate")?;
                if tls13 {
                    entry
                        .extensions
                        .clone()
                        .unwrap_or_default()
                        .serialize(out)?;
                }
            }
            Ok(())
        })
    }

    /// Decode a Certificate body. More than `max_chain_length` entries, or an
    /// empty entry, is a `decode_error`.
    pub fn decode(body: &[u8], tls13: bool, max_chain_length: usize) -> Result<Certificate, Error> {
        let parsed = decode_all(
            body,
            |input| parse_certificate(input, tls13),
            "Certificate",
        )?;
        if parsed.entries.len() > max_chain_length {
            return Err(Error::DecodeError(format!(
                "certificate chain of {} exceeds {}",
                parsed.entries.len(),
                max_chain_length
            )));
        }
        if parsed.entries.iter().any(|e| e.certificate.is_empty()) {
            return Err(Error::DecodeError("empty certificate entry".into()));
        }
        for extensions in parsed.entries.iter().filter_map(|e| e.extensions.as_ref()) {
            extensions.check_duplicates()?;
        }
        Ok(parsed)
    }
}

fn parse_certificate(input: &[u8], tls13: bool) -> IResult<&[u8], Certificate> {
    let (input, request_context) = if tls13 {
        let (input, context) = parse_opaque8(input)?;
        (input, Some(context.to_vec()))
    } else {
        (input, None)
    };
    let (input, mut list) = parse_opaque24(input)?;
    let mut entries = Vec::new();
    while !list.is_empty() {
        let (rest, certificate) = parse_opaque24(list)?;
        let (rest, extensions) = if tls13 {
            let (rest, extensions) = Extensions::parse(rest)?;
            (rest, Some(extensions))
        } else {
            (rest, None)
        };
        entries.push(CertificateEntry {
            certificate: certificate.to_vec(),
            extensions,
        });
        list = rest;
    }
    Ok((
        input,
        Certificate {
            request_context,
            entries,
        },
    ))
}
