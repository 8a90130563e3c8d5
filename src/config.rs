use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{
    CertificateVerifier, ClientAuth, Credentials, PskCredentials, PskStore, SrpCredentials,
    SrpStore,
};
use crate::crypto::CryptoProvider;
use crate::message::{HeartbeatMode, MaxFragmentLength, SupplementalDataEntry, TrustedAuthority};
use crate::session::SessionCache;
use crate::types::{CipherSuite, KeyExchangeAlgorithm, NamedGroup, ProtocolVersion};
use crate::types::SignatureScheme;
use crate::Error;

#[cfg(feature = "rust-crypto")]
use crate::crypto::rust_crypto;

/// Groups offered when none are configured, most preferred first.
const DEFAULT_GROUPS: &[NamedGroup] = &[
    NamedGroup::X25519,
    NamedGroup::Secp256r1,
    NamedGroup::Secp384r1,
    NamedGroup::Ffdhe2048,
];

const DEFAULT_SIGNATURE_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_SECP256R1_SHA256,
    SignatureScheme::ECDSA_SECP384R1_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA256,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA1,
    SignatureScheme::ECDSA_SHA1,
];

/// (D)TLS configuration, shared by all connections created from it.
#[derive(Clone)]
pub struct Config {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    min_dtls_version: ProtocolVersion,
    max_dtls_version: ProtocolVersion,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    credentials: Option<Credentials>,
    certificate_verifier: Option<Arc<dyn CertificateVerifier>>,
    client_auth: ClientAuth,
    psk: Option<PskCredentials>,
    psk_store: Option<Arc<dyn PskStore>>,
    srp: Option<SrpCredentials>,
    srp_store: Option<Arc<dyn SrpStore>>,
    server_name: Option<String>,
    max_fragment_length: Option<MaxFragmentLength>,
    status_request: bool,
    status_request_v2: bool,
    ocsp_response: Option<Vec<u8>>,
    heartbeat: Option<HeartbeatMode>,
    trusted_ca_keys: Vec<TrustedAuthority>,
    supplemental_data: Vec<SupplementalDataEntry>,
    session_cache: Option<Arc<dyn SessionCache>>,
    use_extended_master_secret: bool,
    require_extended_master_secret: bool,
    fallback: bool,
    max_certificate_chain_length: usize,
    mtu: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    dtls_cookie_exchange: bool,
    rng_seed: Option<u64>,
    crypto_provider: CryptoProvider,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            min_version: ProtocolVersion::TLSV1_2,
            max_version: ProtocolVersion::TLSV1_3,
            min_dtls_version: ProtocolVersion::DTLSV1_0,
            max_dtls_version: ProtocolVersion::DTLSV1_2,
            cipher_suites: None,
            groups: None,
            signature_schemes: DEFAULT_SIGNATURE_SCHEMES.to_vec(),
            credentials: None,
            certificate_verifier: None,
            client_auth: ClientAuth::None,
            psk: None,
            psk_store: None,
            srp: None,
            srp_store: None,
            server_name: None,
            max_fragment_length: None,
            status_request: false,
            status_request_v2: false,
            ocsp_response: None,
            heartbeat: None,
            trusted_ca_keys: Vec::new(),
            supplemental_data: Vec::new(),
            session_cache: None,
            use_extended_master_secret: true,
            require_extended_master_secret: false,
            fallback: false,
            max_certificate_chain_length: 10,
            mtu: 1150,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            dtls_cookie_exchange: true,
            rng_seed: None,
            crypto_provider: None,
        }
    }

    /// Lowest TLS version for stream connections.
    #[inline(always)]
    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version
    }

    /// Highest TLS version for stream connections.
    #[inline(always)]
    pub fn max_version(&self) -> ProtocolVersion {
        self.max_version
    }

    /// Lowest DTLS version for datagram connections.
    #[inline(always)]
    pub fn min_dtls_version(&self) -> ProtocolVersion {
        self.min_dtls_version
    }

    /// Highest DTLS version for datagram connections.
    #[inline(always)]
    pub fn max_dtls_version(&self) -> ProtocolVersion {
        self.max_dtls_version
    }

    /// Cipher suites in preference order.
    ///
    /// Only suites the crypto provider implements are listed.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Key exchange groups in preference order.
    #[inline(always)]
    pub fn groups(&self) -> &[NamedGroup] {
        &self.groups
    }

    /// Signature schemes accepted from the peer and offered in
    /// `signature_algorithms`.
    #[inline(always)]
    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        &self.signature_schemes
    }

    /// Local certificate chain and key.
    ///
    /// Required by servers negotiating a certificate based suite, and by
    /// clients that answer a CertificateRequest.
    #[inline(always)]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Policy applied to the peer certificate chain.
    ///
    /// Without a verifier any chain is accepted.
    #[inline(always)]
    pub fn certificate_verifier(&self) -> Option<&Arc<dyn CertificateVerifier>> {
        self.certificate_verifier.as_ref()
    }

    /// For a server, whether to request a client certificate.
    #[inline(always)]
    pub fn client_auth(&self) -> ClientAuth {
        self.client_auth
    }

    /// Client pre-shared key. Enables the PSK suites on the client.
    #[inline(always)]
    pub fn psk(&self) -> Option<&PskCredentials> {
        self.psk.as_ref()
    }

    /// Server pre-shared keys. Enables the PSK suites on the server.
    #[inline(always)]
    pub fn psk_store(&self) -> Option<&Arc<dyn PskStore>> {
        self.psk_store.as_ref()
    }

    /// Client SRP login. Enables the SRP suites on the client.
    #[inline(always)]
    pub fn srp(&self) -> Option<&SrpCredentials> {
        self.srp.as_ref()
    }

    /// Server SRP verifiers. Enables the SRP suites on the server.
    #[inline(always)]
    pub fn srp_store(&self) -> Option<&Arc<dyn SrpStore>> {
        self.srp_store.as_ref()
    }

    /// Host name sent in `server_name` and passed to the verifier.
    #[inline(always)]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Fragment limit requested by a client (RFC 6066).
    #[inline(always)]
    pub fn max_fragment_length(&self) -> Option<MaxFragmentLength> {
        self.max_fragment_length
    }

    /// For a client, request a stapled OCSP response with `status_request`.
    #[inline(always)]
    pub fn status_request(&self) -> bool {
        self.status_request
    }

    /// For a client, additionally offer `status_request_v2` (RFC 6961).
    #[inline(always)]
    pub fn status_request_v2(&self) -> bool {
        self.status_request_v2
    }

    /// For a server, the DER OCSP response stapled for its end entity.
    #[inline(always)]
    pub fn ocsp_response(&self) -> Option<&[u8]> {
        self.ocsp_response.as_deref()
    }

    /// Heartbeat mode announced to the peer (RFC 6520). Only the
    /// extension is negotiated.
    #[inline(always)]
    pub fn heartbeat(&self) -> Option<HeartbeatMode> {
        self.heartbeat
    }

    /// Trust anchors announced by a client (RFC 6066 Section 6).
    #[inline(always)]
    pub fn trusted_ca_keys(&self) -> &[TrustedAuthority] {
        &self.trusted_ca_keys
    }

    /// Entries sent in a SupplementalData message (RFC 4680).
    #[inline(always)]
    pub fn supplemental_data(&self) -> &[SupplementalDataEntry] {
        &self.supplemental_data
    }

    /// Session cache for TLS 1.2 and earlier resumption on the server.
    #[inline(always)]
    pub fn session_cache(&self) -> Option<&Arc<dyn SessionCache>> {
        self.session_cache.as_ref()
    }

    /// Whether to offer the Extended Master Secret extension (RFC 7627).
    #[inline(always)]
    pub fn use_extended_master_secret(&self) -> bool {
        self.use_extended_master_secret
    }

    /// Fail handshakes where the peer does not do Extended Master Secret.
    #[inline(always)]
    pub fn require_extended_master_secret(&self) -> bool {
        self.require_extended_master_secret
    }

    /// For a client, mark the ClientHello as a fallback retry with
    /// `TLS_FALLBACK_SCSV` (RFC 7507).
    #[inline(always)]
    pub fn fallback(&self) -> bool {
        self.fallback
    }

    /// Longest certificate chain accepted from a peer.
    #[inline(always)]
    pub fn max_certificate_chain_length(&self) -> usize {
        self.max_certificate_chain_length
    }

    /// Max transmission unit.
    ///
    /// The largest size UDP packets we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// For a DTLS server, answer a ClientHello without cookie with a
    /// HelloVerifyRequest.
    #[inline(always)]
    pub fn dtls_cookie_exchange(&self) -> bool {
        self.dtls_cookie_exchange
    }

    /// Seed for retransmission jitter. `None` uses the thread rng.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Cryptographic provider.
    ///
    /// Provides all cryptographic operations (ciphers, key exchange, signing, etc.).
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }

    /// Version range for the transport kind, highest first.
    pub(crate) fn versions(&self, datagram: bool) -> Vec<ProtocolVersion> {
        if datagram {
            ProtocolVersion::range_descending(self.min_dtls_version, self.max_dtls_version)
        } else {
            ProtocolVersion::range_descending(self.min_version, self.max_version)
        }
    }

    pub(crate) fn version_bounds(&self, datagram: bool) -> (ProtocolVersion, ProtocolVersion) {
        if datagram {
            (self.min_dtls_version, self.max_dtls_version)
        } else {
            (self.min_version, self.max_version)
        }
    }

    /// Whether the local credentials allow negotiating `suite`, for the
    /// given role.
    pub(crate) fn has_credentials_for(&self, suite: CipherSuite, is_client: bool) -> bool {
        let Some(kx) = suite.key_exchange() else {
            return false;
        };
        match kx {
            KeyExchangeAlgorithm::Psk => {
                if is_client {
                    self.psk.is_some()
                } else {
                    self.psk_store.is_some()
                }
            }
            KeyExchangeAlgorithm::SrpSha => {
                if is_client {
                    self.srp.is_some()
                } else {
                    self.srp_store.is_some()
                }
            }
            _ if is_client => true,
            KeyExchangeAlgorithm::Tls13 => self.credentials.is_some(),
            KeyExchangeAlgorithm::DhAnon => true,
            other => match (other.server_key_kind(), &self.credentials) {
                (Some(kind), Some(credentials)) => credentials.key_kind() == kind,
                (None, Some(_)) => true,
                (_, None) => false,
            },
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("versions", &(self.min_version, self.max_version))
            .field("dtls_versions", &(self.min_dtls_version, self.max_dtls_version))
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("credentials", &self.credentials)
            .field("client_auth", &self.client_auth)
            .field("server_name", &self.server_name)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}

/// Builder for (D)TLS configuration.
pub struct ConfigBuilder {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    min_dtls_version: ProtocolVersion,
    max_dtls_version: ProtocolVersion,
    cipher_suites: Option<Vec<CipherSuite>>,
    groups: Option<Vec<NamedGroup>>,
    signature_schemes: Vec<SignatureScheme>,
    credentials: Option<Credentials>,
    certificate_verifier: Option<Arc<dyn CertificateVerifier>>,
    client_auth: ClientAuth,
    psk: Option<PskCredentials>,
    psk_store: Option<Arc<dyn PskStore>>,
    srp: Option<SrpCredentials>,
    srp_store: Option<Arc<dyn SrpStore>>,
    server_name: Option<String>,
    max_fragment_length: Option<MaxFragmentLength>,
    status_request: bool,
    status_request_v2: bool,
    ocsp_response: Option<Vec<u8>>,
    heartbeat: Option<HeartbeatMode>,
    trusted_ca_keys: Vec<TrustedAuthority>,
    supplemental_data: Vec<SupplementalDataEntry>,
    session_cache: Option<Arc<dyn SessionCache>>,
    use_extended_master_secret: bool,
    require_extended_master_secret: bool,
    fallback: bool,
    max_certificate_chain_length: usize,
    mtu: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    dtls_cookie_exchange: bool,
    rng_seed: Option<u64>,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Set the TLS version range for stream connections.
    ///
    /// Defaults to TLS 1.2 up to TLS 1.3.
    pub fn versions(mut self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.min_version = min;
        self.max_version = max;
        self
    }

    /// Set the DTLS version range for datagram connections.
    ///
    /// Defaults to DTLS 1.0 up to DTLS 1.2.
    pub fn dtls_versions(mut self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.min_dtls_version = min;
        self.max_dtls_version = max;
        self
    }

    /// Set the cipher suites in preference order.
    ///
    /// Defaults to every suite of the crypto provider except the anonymous
    /// DH suites, which must be listed explicitly.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = Some(suites.to_vec());
        self
    }

    /// Set the key exchange groups in preference order.
    ///
    /// Defaults to X25519, P-256, P-384 and ffdhe2048, limited to what the
    /// crypto provider supports.
    pub fn groups(mut self, groups: &[NamedGroup]) -> Self {
        self.groups = Some(groups.to_vec());
        self
    }

    /// Set the signature schemes accepted from the peer.
    ///
    /// Defaults to ECDSA, RSA-PSS and RSA PKCS#1 with SHA-256 and SHA-384,
    /// plus the SHA-1 forms for older peers.
    pub fn signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.signature_schemes = schemes.to_vec();
        self
    }

    /// Set the local certificate chain and key.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the policy for the peer certificate chain.
    ///
    /// Defaults to none, which accepts any chain.
    pub fn with_certificate_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.certificate_verifier = Some(verifier);
        self
    }

    /// Set whether a server requests a client certificate.
    ///
    /// Defaults to [`ClientAuth::None`].
    pub fn client_auth(mut self, client_auth: ClientAuth) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// Set the client pre-shared key.
    pub fn with_psk(mut self, psk: PskCredentials) -> Self {
        self.psk = Some(psk);
        self
    }

    /// Set the server pre-shared key store.
    pub fn with_psk_store(mut self, store: Arc<dyn PskStore>) -> Self {
        self.psk_store = Some(store);
        self
    }

    /// Set the client SRP login.
    pub fn with_srp(mut self, srp: SrpCredentials) -> Self {
        self.srp = Some(srp);
        self
    }

    /// Set the server SRP verifier store.
    pub fn with_srp_store(mut self, store: Arc<dyn SrpStore>) -> Self {
        self.srp_store = Some(store);
        self
    }

    /// Set the host name sent in `server_name`.
    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    /// Set the fragment limit a client requests.
    ///
    /// Defaults to none (2^14 byte records).
    pub fn max_fragment_length(mut self, value: MaxFragmentLength) -> Self {
        self.max_fragment_length = Some(value);
        self
    }

    /// Set whether a client requests OCSP stapling.
    ///
    /// Defaults to false.
    pub fn status_request(mut self, enabled: bool) -> Self {
        self.status_request = enabled;
        self
    }

    /// Set whether a client also offers `status_request_v2`.
    ///
    /// Defaults to false.
    pub fn status_request_v2(mut self, enabled: bool) -> Self {
        self.status_request_v2 = enabled;
        self
    }

    /// Set the OCSP response a server staples.
    pub fn ocsp_response(mut self, response: Vec<u8>) -> Self {
        self.ocsp_response = Some(response);
        self
    }

    /// Set the heartbeat mode to announce.
    pub fn heartbeat(mut self, mode: HeartbeatMode) -> Self {
        self.heartbeat = Some(mode);
        self
    }

    /// Set the trust anchors a client announces.
    pub fn trusted_ca_keys(mut self, authorities: Vec<TrustedAuthority>) -> Self {
        self.trusted_ca_keys = authorities;
        self
    }

    /// Set the SupplementalData entries to send.
    pub fn supplemental_data(mut self, entries: Vec<SupplementalDataEntry>) -> Self {
        self.supplemental_data = entries;
        self
    }

    /// Set the session cache a server resumes from.
    pub fn with_session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Set whether to enable Extended Master Secret extension (rfc7627).
    ///
    /// Defaults to true.
    pub fn use_extended_master_secret(mut self, enabled: bool) -> Self {
        self.use_extended_master_secret = enabled;
        self
    }

    /// Set whether a peer without Extended Master Secret is refused.
    ///
    /// Defaults to false.
    pub fn require_extended_master_secret(mut self, required: bool) -> Self {
        self.require_extended_master_secret = required;
        self
    }

    /// Set whether the ClientHello carries `TLS_FALLBACK_SCSV`.
    ///
    /// Defaults to false.
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the longest accepted peer certificate chain.
    ///
    /// Defaults to 10.
    pub fn max_certificate_chain_length(mut self, max: usize) -> Self {
        self.max_certificate_chain_length = max;
        self
    }

    /// Set the max transmission unit (MTU).
    ///
    /// The largest size UDP packets we will produce.
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set whether a DTLS server demands a cookie round trip.
    ///
    /// Defaults to true.
    pub fn dtls_cookie_exchange(mut self, enabled: bool) -> Self {
        self.dtls_cookie_exchange = enabled;
        self
    }

    /// Seed the non-cryptographic rng used for retransmission jitter.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Set a custom crypto provider.
    ///
    /// If not set, the installed default is used, then the RustCrypto
    /// provider if the `rust-crypto` feature is enabled.
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// Validates the crypto provider and the version ranges. Returns
    /// `Error::ConfigError` when either is unusable.
    ///
    /// The crypto provider is selected in the following priority order:
    /// 1. Explicit provider set via `with_crypto_provider()`
    /// 2. Default provider installed via `CryptoProvider::install_default()`
    /// 3. RustCrypto provider (if `rust-crypto` feature is enabled)
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self
            .crypto_provider
            .or_else(|| CryptoProvider::get_default().cloned())
            .or_else(|| {
                #[cfg(feature = "rust-crypto")]
                {
                    Some(rust_crypto::default_provider())
                }
                #[cfg(not(feature = "rust-crypto"))]
                {
                    None
                }
            })
            .ok_or_else(|| {
                Error::ConfigError(
                    "no crypto provider: set one, install a default or enable 'rust-crypto'"
                        .into(),
                )
            })?;

        crypto_provider.validate()?;

        check_range(self.min_version, self.max_version, false)?;
        check_range(self.min_dtls_version, self.max_dtls_version, true)?;

        let cipher_suites: Vec<CipherSuite> = match self.cipher_suites {
            Some(suites) => suites
                .into_iter()
                .filter(|s| !s.is_scsv() && crypto_provider.find_cipher_suite(*s).is_some())
                .collect(),
            None => crypto_provider
                .cipher_suites
                .iter()
                .map(|s| s.suite())
                .filter(|s| s.key_exchange() != Some(KeyExchangeAlgorithm::DhAnon))
                .collect(),
        };
        if cipher_suites.is_empty() {
            return Err(Error::ConfigError(
                "no cipher suite supported by the crypto provider".into(),
            ));
        }

        let groups: Vec<NamedGroup> = self
            .groups
            .unwrap_or_else(|| DEFAULT_GROUPS.to_vec())
            .into_iter()
            .filter(|g| crypto_provider.supports_group(*g))
            .collect();
        if groups.is_empty() {
            return Err(Error::ConfigError(
                "no key exchange group supported by the crypto provider".into(),
            ));
        }

        if self.max_certificate_chain_length == 0 {
            return Err(Error::ConfigError(
                "max_certificate_chain_length must be at least 1".into(),
            ));
        }

        Ok(Config {
            min_version: self.min_version,
            max_version: self.max_version,
            min_dtls_version: self.min_dtls_version,
            max_dtls_version: self.max_dtls_version,
            cipher_suites,
            groups,
            signature_schemes: self.signature_schemes,
            credentials: self.credentials,
            certificate_verifier: self.certificate_verifier,
            client_auth: self.client_auth,
            psk: self.psk,
            psk_store: self.psk_store,
            srp: self.srp,
            srp_store: self.srp_store,
            server_name: self.server_name,
            max_fragment_length: self.max_fragment_length,
            status_request: self.status_request,
            status_request_v2: self.status_request_v2,
            ocsp_response: self.ocsp_response,
            heartbeat: self.heartbeat,
            trusted_ca_keys: self.trusted_ca_keys,
            supplemental_data: self.supplemental_data,
            session_cache: self.session_cache,
            use_extended_master_secret: self.use_extended_master_secret,
            require_extended_master_secret: self.require_extended_master_secret,
            fallback: self.fallback,
            max_certificate_chain_length: self.max_certificate_chain_length,
            mtu: self.mtu,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            dtls_cookie_exchange: self.dtls_cookie_exchange,
            rng_seed: self.rng_seed,
            crypto_provider,
        })
    }
}

fn check_range(min: ProtocolVersion, max: ProtocolVersion, datagram: bool) -> Result<(), Error> {
    let known = if datagram {
        ProtocolVersion::DTLS_ALL
    } else {
        ProtocolVersion::TLS_ALL
    };
    if !known.contains(&min) || !known.contains(&max) {
        return Err(Error::ConfigError(format!(
            "unsupported version range {} to {}",
            min, max
        )));
    }
    if max.is_earlier_than(min) {
        return Err(Error::ConfigError(format!(
            "minimum version {} above maximum {}",
            min, max
        )));
    }
    Ok(())
}
