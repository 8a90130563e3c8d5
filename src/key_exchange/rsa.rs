use std::sync::Arc;

use subtle::ConstantTimeEq;

use super::KeyExchangeContext;
use crate::codec::{decode_all, parse_opaque16, write_opaque16};
use crate::crypto::{Secret, TlsCertificate};
use crate::types::KeyKind;
use crate::{AlertDescription, Error};

const PRE_MASTER_SECRET_LEN: usize = 48;

/// RSA key transport (RFC 5246 7.4.7.1).
#[derive(Default)]
pub(crate) struct RsaKeyExchange {
    server_certificate: Option<Arc<dyn TlsCertificate>>,
    pub(super) pre_master_secret: Option<Secret>,
}

impl RsaKeyExchange {
    pub fn process_server_certificate(
        &mut self,
        certificate: Arc<dyn TlsCertificate>,
    ) -> Result<(), Error> {
        if certificate.key_kind() != KeyKind::Rsa {
            return Err(Error::Fatal(
                AlertDescription::UnsupportedCertificate,
                format!("{:?} certificate for RSA key transport", certificate.key_kind()),
            ));
        }
        self.server_certificate = Some(certificate);
        Ok(())
    }

    pub fn skip_server_key_exchange(&mut self) -> Result<(), Error> {
        if self.server_certificate.is_none() {
            return Err(Error::UnexpectedMessage(
                "ServerHelloDone without server certificate".into(),
            ));
        }
        Ok(())
    }

    /// `client_version` followed by 46 random bytes.
    fn fresh_pre_master_secret(ctx: &KeyExchangeContext<'_>) -> Result<Secret, Error> {
        let mut pms = Secret::new(Vec::with_capacity(PRE_MASTER_SECRET_LEN));
        pms.extend_from_slice(&ctx.client_version.as_u16().to_be_bytes());
        pms.extend_from_slice(&ctx.random_bytes(PRE_MASTER_SECRET_LEN - 2)?);
        Ok(pms)
    }

    pub fn generate_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        let certificate = self
            .server_certificate
            .as_ref()
            .ok_or_else(|| Error::InternalError("no server certificate".into()))?;
        let pms = Self::fresh_pre_master_secret(ctx)?;
        let encrypted = certificate
            .encrypt_pre_master_secret(&pms)
            .map_err(Error::CryptoError)?;
        let mut body = Vec::new();
        write_opaque16(&mut body, &encrypted, "encrypted premaster secret")?;
        self.pre_master_secret = Some(pms);
        Ok(body)
    }

    /// A decryption failure or a wrong version continues with a random
    /// premaster secret, so the failure shows only at Finished
    /// (RFC 5246 7.4.7.1).
    pub fn process_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let encrypted = decode_all(body, parse_opaque16, "ClientKeyExchange")?;
        let signer = ctx.signer()?;
        let fallback = Self::fresh_pre_master_secret(ctx)?;
        let expected_version = ctx.client_version.as_u16().to_be_bytes();

        let pms = match signer.decrypt(encrypted) {
            Ok(pms)
                if pms.len() == PRE_MASTER_SECRET_LEN
                    && bool::from(pms[..2].ct_eq(&expected_version[..])) =>
            {
                pms
            }
            Ok(_) => {
                debug!("Premaster secret with wrong length or version");
                fallback
            }
            Err(e) => {
                debug!("Premaster secret decryption failed: {}", e);
                fallback
            }
        };
        self.pre_master_secret = Some(pms);
        Ok(())
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::super::tests::{config, context};
    use super::super::KeyExchange;
    use super::*;
    use crate::crypto::{CryptoProvider, Signer};
    use crate::credentials::Credentials;
    use crate::types::{KeyExchangeAlgorithm, ProtocolVersion, SignatureScheme};

    /// "Encrypts" by prefixing a marker byte.
    #[derive(Debug)]
    struct EchoCertificate;

    impl TlsCertificate for EchoCertificate {
        fn der(&self) -> &[u8] {
            &[0x30]
        }
        fn key_kind(&self) -> KeyKind {
            KeyKind::Rsa
        }
        fn verify_signature(
            &self,
            _: Option<SignatureScheme>,
            _: &[u8],
            _: &[u8],
        ) -> Result<(), String> {
            Ok(())
        }
        fn encrypt_pre_master_secret(&self, pms: &[u8]) -> Result<Vec<u8>, String> {
            let mut out = vec![0xEE];
            out.extend_from_slice(pms);
            Ok(out)
        }
    }

    #[derive(Debug)]
    struct EchoSigner;

    impl Signer for EchoSigner {
        fn key_kind(&self) -> KeyKind {
            KeyKind::Rsa
        }
        fn schemes(&self) -> &[SignatureScheme] {
            &[SignatureScheme::RSA_PKCS1_SHA256]
        }
        fn sign(&self, _: Option<SignatureScheme>, _: &[u8]) -> Result<Vec<u8>, String> {
            Ok(vec![1])
        }
        fn decrypt(&self, ciphertext: &[u8]) -> Result<Secret, String> {
            match ciphertext.split_first() {
                Some((0xEE, rest)) => Ok(Secret::new(rest.to_vec())),
                _ => Err("bad padding".into()),
            }
        }
    }

    #[derive(Debug)]
    struct EchoParser;

    impl crate::crypto::CertificateParser for EchoParser {
        fn parse(&self, _: &[u8]) -> Result<Arc<dyn TlsCertificate>, String> {
            Ok(Arc::new(EchoCertificate))
        }
    }

    static ECHO_PARSER: EchoParser = EchoParser;

    fn echo_credentials(provider: &CryptoProvider) -> Credentials {
        let provider = CryptoProvider {
            certificate_parser: &ECHO_PARSER,
            ..provider.clone()
        };
        Credentials::new(&provider, vec![vec![0x30]], Arc::new(EchoSigner)).unwrap()
    }

    #[test]
    fn premaster_secret_carries_client_version() {
        let config = config();
        let credentials = echo_credentials(config.crypto_provider());
        let client_ctx = context(&config, None);
        let server_ctx = context(&config, Some(&credentials));

        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        client.process_server_certificate(Arc::new(EchoCertificate)).unwrap();
        client.skip_server_key_exchange().unwrap();
        let cke = client.generate_client_key_exchange(&client_ctx).unwrap();
        // length prefix, marker, client_version
        assert_eq!(&cke[..5], &[0x00, 0x31, 0xEE, 0x03, 0x03]);

        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        server.process_client_key_exchange(&server_ctx, &cke).unwrap();
        assert_eq!(
            client.generate_pre_master_secret().unwrap().as_slice(),
            server.generate_pre_master_secret().unwrap().as_slice()
        );
    }

    #[test]
    fn version_rollback_yields_random_secret() {
        let config = config();
        let credentials = echo_credentials(config.crypto_provider());
        let mut client_ctx = context(&config, None);
        client_ctx.client_version = ProtocolVersion::TLSV1_0;
        let server_ctx = context(&config, Some(&credentials));

        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        client.process_server_certificate(Arc::new(EchoCertificate)).unwrap();
        let cke = client.generate_client_key_exchange(&client_ctx).unwrap();

        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        server.process_client_key_exchange(&server_ctx, &cke).unwrap();
        let server_pms = server.generate_pre_master_secret().unwrap();
        assert_eq!(server_pms.len(), PRE_MASTER_SECRET_LEN);
        assert_ne!(
            client.generate_pre_master_secret().unwrap().as_slice(),
            server_pms.as_slice()
        );
    }

    #[test]
    fn undecryptable_secret_is_not_an_error() {
        let config = config();
        let credentials = echo_credentials(config.crypto_provider());
        let server_ctx = context(&config, Some(&credentials));
        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        server
            .process_client_key_exchange(&server_ctx, &[0x00, 0x02, 0x01, 0x02])
            .unwrap();
        assert!(server.generate_pre_master_secret().is_ok());
    }

    #[test]
    fn skip_without_certificate_is_unexpected() {
        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        assert!(matches!(
            client.skip_server_key_exchange(),
            Err(Error::UnexpectedMessage(_))
        ));
    }
}
