//! Key exchange for TLS 1.0 to 1.2.
//!
//! [`KeyExchange`] is a tagged union over the supported algorithms. The
//! handshake engines call the same operations whatever suite was
//! negotiated; an operation that has no meaning for the algorithm fails
//! with `unexpected_message`.

use std::sync::Arc;

mod dh_anon;
mod ecdhe;
mod psk;
mod rsa;
mod srp;

use dh_anon::DhAnonKeyExchange;
use ecdhe::EcdheKeyExchange;
use psk::PskKeyExchange;
use rsa::RsaKeyExchange;
use srp::SrpKeyExchange;

use crate::config::Config;
use crate::credentials::Credentials;
use crate::crypto::{CryptoProvider, Secret, Signer, TlsCertificate};
use crate::message::DigitallySigned;
use crate::types::{KeyExchangeAlgorithm, KeyKind, NamedGroup, ProtocolVersion, SignatureScheme};
use crate::Error;

/// What a key exchange may look at while producing or consuming a
/// message.
pub(crate) struct KeyExchangeContext<'a> {
    pub config: &'a Config,
    pub version: ProtocolVersion,
    /// `client_version` of the ClientHello, bound into the RSA premaster
    /// secret.
    pub client_version: ProtocolVersion,
    pub client_random: &'a [u8; 32],
    pub server_random: &'a [u8; 32],
    /// Local certificate and key, server side.
    pub credentials: Option<&'a Credentials>,
    /// The client's `signature_algorithms`, if sent.
    pub peer_schemes: Option<&'a [SignatureScheme]>,
    /// The client's `supported_groups`, if sent.
    pub client_groups: Option<&'a [NamedGroup]>,
    /// SRP user name from the ClientHello.
    pub srp_identity: Option<&'a [u8]>,
}

impl KeyExchangeContext<'_> {
    pub fn provider(&self) -> &CryptoProvider {
        self.config.crypto_provider()
    }

    fn signer(&self) -> Result<&Arc<dyn Signer>, Error> {
        self.credentials
            .map(|c| c.signer())
            .ok_or_else(|| Error::InternalError("no local credentials".into()))
    }

    /// `client_random + server_random + params`, the input of a
    /// ServerKeyExchange signature.
    fn signed_params(&self, params: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(64 + params.len());
        data.extend_from_slice(self.client_random);
        data.extend_from_slice(self.server_random);
        data.extend_from_slice(params);
        data
    }

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, Error> {
        self.provider().random_bytes(len).map_err(Error::CryptoError)
    }
}

pub(crate) enum KeyExchange {
    Rsa(RsaKeyExchange),
    DhAnon(DhAnonKeyExchange),
    Ecdhe(EcdheKeyExchange),
    Srp(SrpKeyExchange),
    Psk(PskKeyExchange),
}

impl KeyExchange {
    pub fn for_algorithm(algorithm: KeyExchangeAlgorithm) -> Result<Self, Error> {
        let kx = match algorithm {
            KeyExchangeAlgorithm::Rsa => KeyExchange::Rsa(RsaKeyExchange::default()),
            KeyExchangeAlgorithm::DhAnon => KeyExchange::DhAnon(DhAnonKeyExchange::default()),
            KeyExchangeAlgorithm::EcdheEcdsa => {
                KeyExchange::Ecdhe(EcdheKeyExchange::new(KeyKind::Ecdsa))
            }
            KeyExchangeAlgorithm::EcdheRsa => {
                KeyExchange::Ecdhe(EcdheKeyExchange::new(KeyKind::Rsa))
            }
            KeyExchangeAlgorithm::Psk => KeyExchange::Psk(PskKeyExchange::default()),
            KeyExchangeAlgorithm::SrpSha => KeyExchange::Srp(SrpKeyExchange::default()),
            KeyExchangeAlgorithm::Tls13 => {
                return Err(Error::InternalError(
                    "TLS 1.3 suites have no key exchange object".into(),
                ))
            }
        };
        Ok(kx)
    }

    fn name(&self) -> &'static str {
        match self {
            KeyExchange::Rsa(_) => "RSA",
            KeyExchange::DhAnon(_) => "DH_anon",
            KeyExchange::Ecdhe(_) => "ECDHE",
            KeyExchange::Srp(_) => "SRP",
            KeyExchange::Psk(_) => "PSK",
        }
    }

    /// Server: the ServerKeyExchange body, or `None` when the algorithm
    /// sends none.
    pub fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        match self {
            KeyExchange::Rsa(_) => Ok(None),
            KeyExchange::DhAnon(kx) => kx.generate_server_key_exchange(ctx).map(Some),
            KeyExchange::Ecdhe(kx) => kx.generate_server_key_exchange(ctx).map(Some),
            KeyExchange::Srp(kx) => kx.generate_server_key_exchange(ctx).map(Some),
            KeyExchange::Psk(kx) => kx.generate_server_key_exchange(ctx),
        }
    }

    /// Client: the server's end entity certificate.
    pub fn process_server_certificate(
        &mut self,
        certificate: Arc<dyn TlsCertificate>,
    ) -> Result<(), Error> {
        match self {
            KeyExchange::Rsa(kx) => kx.process_server_certificate(certificate),
            KeyExchange::Ecdhe(kx) => kx.process_server_certificate(certificate),
            _ => Err(self.unexpected("Certificate")),
        }
    }

    /// Client: the server sent ServerHelloDone without a ServerKeyExchange.
    pub fn skip_server_key_exchange(&mut self) -> Result<(), Error> {
        match self {
            KeyExchange::Rsa(kx) => kx.skip_server_key_exchange(),
            KeyExchange::Psk(_) => Ok(()),
            _ => Err(self.unexpected("ServerHelloDone before ServerKeyExchange")),
        }
    }

    pub fn process_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        match self {
            KeyExchange::Rsa(_) => Err(self.unexpected("ServerKeyExchange")),
            KeyExchange::DhAnon(kx) => kx.process_server_key_exchange(ctx, body),
            KeyExchange::Ecdhe(kx) => kx.process_server_key_exchange(ctx, body),
            KeyExchange::Srp(kx) => kx.process_server_key_exchange(ctx, body),
            KeyExchange::Psk(kx) => kx.process_server_key_exchange(body),
        }
    }

    /// Client: the ClientKeyExchange body. Computes the premaster secret.
    pub fn generate_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        match self {
            KeyExchange::Rsa(kx) => kx.generate_client_key_exchange(ctx),
            KeyExchange::DhAnon(kx) => kx.generate_client_key_exchange(),
            KeyExchange::Ecdhe(kx) => kx.generate_client_key_exchange(),
            KeyExchange::Srp(kx) => kx.generate_client_key_exchange(),
            KeyExchange::Psk(kx) => kx.generate_client_key_exchange(ctx),
        }
    }

    /// Server: consume the ClientKeyExchange body.
    pub fn process_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        match self {
            KeyExchange::Rsa(kx) => kx.process_client_key_exchange(ctx, body),
            KeyExchange::DhAnon(kx) => kx.process_client_key_exchange(body),
            KeyExchange::Ecdhe(kx) => kx.process_client_key_exchange(body),
            KeyExchange::Srp(kx) => kx.process_client_key_exchange(body),
            KeyExchange::Psk(kx) => kx.process_client_key_exchange(ctx, body),
        }
    }

    /// Hand out the premaster secret. Can be taken once.
    pub fn generate_pre_master_secret(&mut self) -> Result<Secret, Error> {
        let secret = match self {
            KeyExchange::Rsa(kx) => kx.pre_master_secret.take(),
            KeyExchange::DhAnon(kx) => kx.pre_master_secret.take(),
            KeyExchange::Ecdhe(kx) => kx.pre_master_secret.take(),
            KeyExchange::Srp(kx) => kx.pre_master_secret.take(),
            KeyExchange::Psk(kx) => kx.pre_master_secret.take(),
        };
        secret.ok_or_else(|| {
            Error::InternalError(format!("{} premaster secret not available", self.name()))
        })
    }

    pub fn psk_identity(&self) -> Option<&[u8]> {
        match self {
            KeyExchange::Psk(kx) => kx.identity.as_deref(),
            _ => None,
        }
    }

    pub fn srp_identity(&self) -> Option<&[u8]> {
        match self {
            KeyExchange::Srp(kx) => kx.identity.as_deref(),
            _ => None,
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::UnexpectedMessage(format!("{} with {} key exchange", what, self.name()))
    }
}

/// Peer schemes assumed when `signature_algorithms` is absent
/// (RFC 5246 7.4.1.4.1).
const DEFAULT_PEER_SCHEMES: &[SignatureScheme] =
    &[SignatureScheme::RSA_PKCS1_SHA1, SignatureScheme::ECDSA_SHA1];

/// Pick the scheme to sign with: the first of the signer's schemes the
/// peer accepts and the config allows. `None` before TLS 1.2.
pub(crate) fn select_signature_scheme(
    config: &Config,
    version: ProtocolVersion,
    signer: &dyn Signer,
    peer_schemes: Option<&[SignatureScheme]>,
) -> Result<Option<SignatureScheme>, Error> {
    if !version.has_signature_algorithms() {
        return Ok(None);
    }
    let peer = peer_schemes.unwrap_or(DEFAULT_PEER_SCHEMES);
    signer
        .schemes()
        .iter()
        .copied()
        .find(|s| {
            peer.contains(s)
                && config.signature_schemes().contains(s)
                && (!version.is_tls13() || s.allowed_in_tls13())
        })
        .map(Some)
        .ok_or_else(|| {
            Error::HandshakeFailure(format!(
                "no common signature scheme for a {:?} key",
                signer.key_kind()
            ))
        })
}

/// Check a peer signature. A scheme we never offered is
/// `illegal_parameter`, a bad signature `decrypt_error`.
pub(crate) fn verify_signature(
    config: &Config,
    version: ProtocolVersion,
    certificate: &dyn TlsCertificate,
    signed: &DigitallySigned,
    data: &[u8],
) -> Result<(), Error> {
    let scheme = if version.has_signature_algorithms() {
        let scheme = signed
            .scheme
            .ok_or_else(|| Error::DecodeError("signature without scheme".into()))?;
        if !config.signature_schemes().contains(&scheme)
            || (version.is_tls13() && !scheme.allowed_in_tls13())
        {
            return Err(Error::IllegalParameter(format!(
                "signature scheme {:?} was not offered",
                scheme
            )));
        }
        if scheme.key_kind() != Some(certificate.key_kind()) {
            return Err(Error::IllegalParameter(format!(
                "signature scheme {:?} for a {:?} key",
                scheme,
                certificate.key_kind()
            )));
        }
        Some(scheme)
    } else {
        None
    };
    certificate
        .verify_signature(scheme, data, &signed.signature)
        .map_err(Error::DecryptError)
}

#[cfg(all(test, feature = "rust-crypto"))]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::rust_crypto::default_provider;

    pub const CLIENT_RANDOM: [u8; 32] = [1; 32];
    pub const SERVER_RANDOM: [u8; 32] = [2; 32];

    pub fn context<'a>(
        config: &'a Config,
        credentials: Option<&'a Credentials>,
    ) -> KeyExchangeContext<'a> {
        KeyExchangeContext {
            config,
            version: ProtocolVersion::TLSV1_2,
            client_version: ProtocolVersion::TLSV1_2,
            client_random: &CLIENT_RANDOM,
            server_random: &SERVER_RANDOM,
            credentials,
            peer_schemes: None,
            client_groups: None,
            srp_identity: None,
        }
    }

    pub fn config() -> Config {
        Config::builder()
            .with_crypto_provider(default_provider())
            .build()
            .unwrap()
    }

    #[test]
    fn tls13_has_no_key_exchange() {
        assert!(KeyExchange::for_algorithm(KeyExchangeAlgorithm::Tls13).is_err());
    }

    #[test]
    fn operations_outside_the_algorithm_are_unexpected() {
        let config = config();
        let ctx = context(&config, None);
        let mut kx = KeyExchange::for_algorithm(KeyExchangeAlgorithm::DhAnon).unwrap();
        assert!(matches!(
            kx.skip_server_key_exchange(),
            Err(Error::UnexpectedMessage(_))
        ));
        let mut kx = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Rsa).unwrap();
        assert!(matches!(
            kx.process_server_key_exchange(&ctx, &[]),
            Err(Error::UnexpectedMessage(_))
        ));
        assert!(kx.generate_server_key_exchange(&ctx).unwrap().is_none());
        assert!(matches!(
            kx.generate_pre_master_secret(),
            Err(Error::InternalError(_))
        ));
    }

    #[test]
    fn legacy_versions_sign_without_scheme() {
        let config = config();
        #[derive(Debug)]
        struct NoSigner;
        impl Signer for NoSigner {
            fn key_kind(&self) -> KeyKind {
                KeyKind::Ecdsa
            }
            fn schemes(&self) -> &[SignatureScheme] {
                &[SignatureScheme::ECDSA_SECP256R1_SHA256]
            }
            fn sign(&self, _: Option<SignatureScheme>, _: &[u8]) -> Result<Vec<u8>, String> {
                Err("unused".into())
            }
        }
        let scheme =
            select_signature_scheme(&config, ProtocolVersion::TLSV1_1, &NoSigner, None).unwrap();
        assert_eq!(scheme, None);

        // Without signature_algorithms the peer only takes SHA-1.
        assert!(matches!(
            select_signature_scheme(&config, ProtocolVersion::TLSV1_2, &NoSigner, None),
            Err(Error::HandshakeFailure(_))
        ));
        let scheme = select_signature_scheme(
            &config,
            ProtocolVersion::TLSV1_2,
            &NoSigner,
            Some(&[SignatureScheme::ECDSA_SECP256R1_SHA256]),
        )
        .unwrap();
        assert_eq!(scheme, Some(SignatureScheme::ECDSA_SECP256R1_SHA256));
    }
}
