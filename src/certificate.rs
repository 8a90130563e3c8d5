//! Certificate helpers exposed via the public `certificate` module.
//!
//! Self-signed certificate generation for tests and peer-to-peer setups,
//! plus SHA-256 fingerprints for pinning a peer certificate with
//! [`FingerprintVerifier`](crate::FingerprintVerifier).

use std::fmt;

use sha2::{Digest, Sha256};

#[cfg(feature = "rcgen")]
use crate::Error;

/// Certificate and private key pair, both DER.
#[derive(Clone)]
pub struct GeneratedCertificate {
    /// End entity certificate.
    pub certificate: Vec<u8>,
    /// PKCS#8 private key.
    pub private_key: Vec<u8>,
}

/// Generate a self-signed ECDSA P-256 certificate for `tlscore.local`.
#[cfg(feature = "rcgen")]
pub fn generate_self_signed_certificate() -> Result<GeneratedCertificate, Error> {
    generate_self_signed_certificate_for("tlscore.local")
}

/// Generate a self-signed ECDSA P-256 certificate for `host`.
#[cfg(feature = "rcgen")]
pub fn generate_self_signed_certificate_for(host: &str) -> Result<GeneratedCertificate, Error> {
    use rcgen::{
        Certificate as RcgenCertificate, CertificateParams, DistinguishedName, DnType, IsCa,
        KeyPair, PKCS_ECDSA_P256_SHA256,
    };

    let failed =
        |e: rcgen::RcgenError| Error::CryptoError(format!("certificate generation: {}", e));

    let key_pair = KeyPair::generate(&PKCS_ECDSA_P256_SHA256).map_err(failed)?;

    let mut params = CertificateParams::new(vec![host.to_string()]);
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::OrganizationName, "tlscore".to_string());
    distinguished_name.push(DnType::CommonName, host.to_string());
    params.distinguished_name = distinguished_name;
    params.is_ca = IsCa::NoCa;
    params.key_pair = Some(key_pair);

    let not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let cert = RcgenCertificate::from_params(params).map_err(failed)?;
    let certificate = cert.serialize_der().map_err(failed)?;
    let private_key = cert.serialize_private_key_der();

    Ok(GeneratedCertificate {
        certificate,
        private_key,
    })
}

/// SHA-256 over the DER certificate.
pub fn calculate_fingerprint(cert_der: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// Colon separated upper case hex, e.g. `"AF:12:F6"`.
pub fn format_fingerprint(fingerprint: &[u8]) -> String {
    fingerprint
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<String>>()
        .join(":")
}

impl GeneratedCertificate {
    pub fn fingerprint(&self) -> Vec<u8> {
        calculate_fingerprint(&self.certificate)
    }

    pub fn fingerprint_str(&self) -> String {
        format_fingerprint(&self.fingerprint())
    }
}

impl fmt::Debug for GeneratedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCertificate")
            .field("certificate", &self.certificate.len())
            .field("private_key", &self.private_key.len())
            .finish()
    }
}
