//! ClientHello, ServerHello and HelloVerifyRequest.

use nom::number::complete::be_u8;
use nom::IResult;

use super::Extensions;
use crate::codec::{decode_all, parse_list16, parse_list8, with_length, write_opaque8};
use crate::types::{CipherSuite, Cookie, ProtocolVersion, Random, SessionId};
use crate::Error;

/// The null compression method, the only one ever negotiated.
pub const COMPRESSION_NULL: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    /// DTLS only. `None` on stream transports.
    pub cookie: Option<Cookie>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<u8>,
    pub extensions: Extensions,
}

impl ClientHello {
    pub fn new(
        client_version: ProtocolVersion,
        random: Random,
        session_id: SessionId,
        cookie: Option<Cookie>,
        cipher_suites: Vec<CipherSuite>,
        extensions: Extensions,
    ) -> Self {
        ClientHello {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods: vec![COMPRESSION_NULL],
            extensions,
        }
    }

    pub fn offers(&self, suite: CipherSuite) -> bool {
        self.cipher_suites.contains(&suite)
    }

    pub fn parse(input: &[u8], datagram: bool) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cookie) = if datagram {
            let (input, cookie) = Cookie::parse(input)?;
            (input, Some(cookie))
        } else {
            (input, None)
        };
        let (input, cipher_suites) = parse_list16(input, CipherSuite::parse)?;
        let (input, compression_methods) = parse_list8(input, be_u8)?;
        let (input, extensions) = Extensions::parse_optional(input)?;
        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    /// Decode a ClientHello body and check the structural rules: a
    /// non-empty suite list, null compression on offer and no repeated
    /// extension.
    pub fn decode(body: &[u8], datagram: bool) -> Result<ClientHello, Error> {
        let hello = decode_all(body, |i| ClientHello::parse(i, datagram), "ClientHello")?;
        if hello.cipher_suites.is_empty() {
            return Err(Error::DecodeError("ClientHello without cipher suites".into()));
        }
        if !hello.compression_methods.contains(&COMPRESSION_NULL) {
            return Err(Error::IllegalParameter(
                "ClientHello without null compression".into(),
            ));
        }
        hello.extensions.check_duplicates()?;
        Ok(hello)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        if let Some(cookie) = &self.cookie {
            cookie.serialize(output);
        }
        with_length(output, 2, 2, 0xFFFE, "cipher suites", |out| {
            for suite in &self.cipher_suites {
                suite.serialize(out);
            }
            Ok(())
        })?;
        write_opaque8(output, &self.compression_methods, "compression methods")?;
        if !self.extensions.is_empty() {
            self.extensions.serialize(output)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: Extensions,
}

impl ServerHello {
    pub fn new(
        server_version: ProtocolVersion,
        random: Random,
        session_id: SessionId,
        cipher_suite: CipherSuite,
        extensions: Extensions,
    ) -> Self {
        ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method: COMPRESSION_NULL,
            extensions,
        }
    }

    /// TLS 1.3 HelloRetryRequest, a ServerHello with a fixed random.
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == Random::HELLO_RETRY_REQUEST
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = be_u8(input)?;
        let (input, extensions) = Extensions::parse_optional(input)?;
        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn decode(body: &[u8]) -> Result<ServerHello, Error> {
        let hello = decode_all(body, ServerHello::parse, "ServerHello")?;
        if hello.compression_method != COMPRESSION_NULL {
            return Err(Error::IllegalParameter(format!(
                "compression method {}",
                hello.compression_method
            )));
        }
        hello.extensions.check_duplicates()?;
        Ok(hello)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        self.server_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cipher_suite.serialize(output);
        output.push(self.compression_method);
        if !self.extensions.is_empty() {
            self.extensions.serialize(output)?;
        }
        Ok(())
    }
}

/// DTLS HelloVerifyRequest. The version field is always DTLS 1.0
/// (RFC 6347 Section 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(cookie: Cookie) -> Self {
        HelloVerifyRequest {
            server_version: ProtocolVersion::DTLSV1_0,
            cookie,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;
        Ok((
            input,
            HelloVerifyRequest {
                server_version,
                cookie,
            },
        ))
    }

    pub fn decode(body: &[u8]) -> Result<HelloVerifyRequest, Error> {
        let request = decode_all(body, HelloVerifyRequest::parse, "HelloVerifyRequest")?;
        if !request.server_version.is_dtls() {
            return Err(Error::IllegalParameter(format!(
                "HelloVerifyRequest version {}",
                request.server_version
            )));
        }
        if request.cookie.is_empty() {
            return Err(Error::IllegalParameter("empty cookie".into()));
        }
        Ok(request)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.cookie.serialize(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_HELLO_DTLS: &[u8] = &[
        0xFE, 0xFD, // ProtocolVersion::DTLSV1_2
        // Random
        0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
        0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
        0x01, 0x01, //
        0x01, 0xAA, // SessionId
        0x02, 0xBB, 0xCC, // Cookie
        0x00, 0x04, 0xC0, 0x2B, 0x00, 0xFF, // CipherSuites
        0x01, 0x00, // CompressionMethods
        0x00, 0x04, 0x00, 0x17, 0x00, 0x00, // Extensions: extended_master_secret
    ];

    fn client_hello() -> ClientHello {
        let mut extensions = Extensions::new();
        extensions.add_extended_master_secret();
        ClientHello::new(
            ProtocolVersion::DTLSV1_2,
            Random::from_bytes([1; 32]),
            SessionId::try_new(&[0xAA]).unwrap(),
            Some(Cookie::try_new(&[0xBB, 0xCC]).unwrap()),
            vec![
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
                CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            extensions,
        )
    }

    #[test]
    fn client_hello_roundtrip() {
        let hello = client_hello();
        let mut serialized = Vec::new();
        hello.serialize(&mut serialized).unwrap();
        assert_eq!(serialized, CLIENT_HELLO_DTLS);

        let parsed = ClientHello::decode(&serialized, true).unwrap();
        assert_eq!(parsed, hello);
        assert!(parsed.offers(CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV));
    }

    #[test]
    fn client_hello_without_extensions() {
        let mut hello = client_hello();
        hello.cookie = None;
        hello.extensions = Extensions::new();
        let mut serialized = Vec::new();
        hello.serialize(&mut serialized).unwrap();
        let parsed = ClientHello::decode(&serialized, false).unwrap();
        assert!(parsed.extensions.is_empty());
    }

    #[test]
    fn client_hello_needs_null_compression() {
        let mut hello = client_hello();
        hello.compression_methods = vec![1];
        let mut serialized = Vec::new();
        hello.serialize(&mut serialized).unwrap();
        assert!(matches!(
            ClientHello::decode(&serialized, true),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn server_hello_roundtrip() {
        let mut extensions = Extensions::new();
        extensions.add_renegotiation_info();
        let hello = ServerHello::new(
            ProtocolVersion::TLSV1_2,
            Random::from_bytes([2; 32]),
            SessionId::empty(),
            CipherSuite::RSA_AES128_GCM_SHA256,
            extensions,
        );
        let mut serialized = Vec::new();
        hello.serialize(&mut serialized).unwrap();
        assert_eq!(
            &serialized[34..],
            &[0x00, 0x00, 0x9C, 0x00, 0x00, 0x05, 0xFF, 0x01, 0x00, 0x01, 0x00]
        );
        let parsed = ServerHello::decode(&serialized).unwrap();
        assert_eq!(parsed, hello);
        assert!(!parsed.is_hello_retry_request());
    }

    #[test]
    fn hello_verify_request() {
        let request = HelloVerifyRequest::new(Cookie::try_new(&[9, 9, 9]).unwrap());
        let mut serialized = Vec::new();
        request.serialize(&mut serialized);
        assert_eq!(serialized, [0xFE, 0xFF, 0x03, 9, 9, 9]);
        assert_eq!(HelloVerifyRequest::decode(&serialized).unwrap(), request);
        assert!(HelloVerifyRequest::decode(&[0xFE, 0xFF, 0x00]).is_err());
    }
}
