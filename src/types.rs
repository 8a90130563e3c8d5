//! Protocol enums and small value types shared by TLS and DTLS.

use std::fmt;

use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::codec::verify_failure;
use crate::crypto::SecureRandom;
use crate::Error;

// ============================================================================
// Protocol Version
// ============================================================================

/// A (D)TLS protocol version as it appears on the wire.
///
/// DTLS versions count downwards (DTLS 1.2 is `0xFEFD`, DTLS 1.0 is
/// `0xFEFF`), so comparisons go through the TLS equivalent.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    pub const SSLV3: ProtocolVersion = ProtocolVersion(0x0300);
    pub const TLSV1_0: ProtocolVersion = ProtocolVersion(0x0301);
    pub const TLSV1_1: ProtocolVersion = ProtocolVersion(0x0302);
    pub const TLSV1_2: ProtocolVersion = ProtocolVersion(0x0303);
    pub const TLSV1_3: ProtocolVersion = ProtocolVersion(0x0304);
    pub const DTLSV1_0: ProtocolVersion = ProtocolVersion(0xFEFF);
    pub const DTLSV1_2: ProtocolVersion = ProtocolVersion(0xFEFD);

    /// All TLS versions this crate speaks, highest first.
    pub const TLS_ALL: &'static [ProtocolVersion] = &[
        ProtocolVersion::TLSV1_3,
        ProtocolVersion::TLSV1_2,
        ProtocolVersion::TLSV1_1,
        ProtocolVersion::TLSV1_0,
    ];

    /// All DTLS versions this crate speaks, highest first.
    pub const DTLS_ALL: &'static [ProtocolVersion] =
        &[ProtocolVersion::DTLSV1_2, ProtocolVersion::DTLSV1_0];

    pub const fn from_u16(value: u16) -> Self {
        ProtocolVersion(value)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn major(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        self.0 as u8
    }

    pub fn is_dtls(&self) -> bool {
        self.major() == 0xFE
    }

    pub fn is_tls(&self) -> bool {
        self.major() == 0x03
    }

    /// The TLS version with the same feature set.
    pub fn equivalent_tls(&self) -> ProtocolVersion {
        match self.0 {
            0xFEFF => ProtocolVersion::TLSV1_1,
            0xFEFD => ProtocolVersion::TLSV1_2,
            0xFEFC => ProtocolVersion::TLSV1_3,
            _ => *self,
        }
    }

    pub fn is_tls13(&self) -> bool {
        self.equivalent_tls() == ProtocolVersion::TLSV1_3
    }

    /// Whether this version has TLS 1.2 features: signature algorithms in
    /// DigitallySigned and a cipher-suite-specific PRF.
    pub fn has_signature_algorithms(&self) -> bool {
        self.is_at_least(ProtocolVersion::TLSV1_2)
    }

    pub fn is_at_least(&self, other: ProtocolVersion) -> bool {
        self.equivalent_tls().0 >= other.equivalent_tls().0
    }

    pub fn is_earlier_than(&self, other: ProtocolVersion) -> bool {
        self.equivalent_tls().0 < other.equivalent_tls().0
    }

    /// Versions from `max` down to `min` drawn from the known set of the
    /// same transport kind.
    pub fn range_descending(min: ProtocolVersion, max: ProtocolVersion) -> Vec<ProtocolVersion> {
        let all = if max.is_dtls() {
            Self::DTLS_ALL
        } else {
            Self::TLS_ALL
        };
        all.iter()
            .copied()
            .filter(|v| v.is_at_least(min) && !v.is_earlier_than(min) && max.is_at_least(*v))
            .collect()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, ProtocolVersion(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.0.to_be_bytes());
    }
}

impl fmt::Debug for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x0300 => write!(f, "SSLv3"),
            0x0301 => write!(f, "TLSv1.0"),
            0x0302 => write!(f, "TLSv1.1"),
            0x0303 => write!(f, "TLSv1.2"),
            0x0304 => write!(f, "TLSv1.3"),
            0xFEFF => write!(f, "DTLSv1.0"),
            0xFEFD => write!(f, "DTLSv1.2"),
            0xFEFC => write!(f, "DTLSv1.3"),
            v => write!(f, "Version({:#06x})", v),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Content Type
// ============================================================================

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Heartbeat,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            24 => ContentType::Heartbeat,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Heartbeat => 24,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ContentType::Unknown(_))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, value) = be_u8(input)?;
        Ok((input, ContentType::from_u8(value)))
    }
}

// ============================================================================
// Handshake Message Type
// ============================================================================

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    EndOfEarlyData,
    EncryptedExtensions,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    CertificateUrl,
    CertificateStatus,
    SupplementalData,
    KeyUpdate,
    MessageHash,
    Unknown(u8),
}

impl MessageType {
    /// Every known message type, for table driven checks.
    pub const ALL: &'static [MessageType] = &[
        MessageType::HelloRequest,
        MessageType::ClientHello,
        MessageType::ServerHello,
        MessageType::HelloVerifyRequest,
        MessageType::NewSessionTicket,
        MessageType::EndOfEarlyData,
        MessageType::EncryptedExtensions,
        MessageType::Certificate,
        MessageType::ServerKeyExchange,
        MessageType::CertificateRequest,
        MessageType::ServerHelloDone,
        MessageType::CertificateVerify,
        MessageType::ClientKeyExchange,
        MessageType::Finished,
        MessageType::CertificateUrl,
        MessageType::CertificateStatus,
        MessageType::SupplementalData,
        MessageType::KeyUpdate,
        MessageType::MessageHash,
    ];

    pub fn from_u8(value: u8) -> Self {
        use MessageType::*;
        match value {
            0 => HelloRequest,
            1 => ClientHello,
            2 => ServerHello,
            3 => HelloVerifyRequest,
            4 => NewSessionTicket,
            5 => EndOfEarlyData,
            8 => EncryptedExtensions,
            11 => Certificate,
            12 => ServerKeyExchange,
            13 => CertificateRequest,
            14 => ServerHelloDone,
            15 => CertificateVerify,
            16 => ClientKeyExchange,
            20 => Finished,
            21 => CertificateUrl,
            22 => CertificateStatus,
            23 => SupplementalData,
            24 => KeyUpdate,
            254 => MessageHash,
            _ => Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        use MessageType::*;
        match self {
            HelloRequest => 0,
            ClientHello => 1,
            ServerHello => 2,
            HelloVerifyRequest => 3,
            NewSessionTicket => 4,
            EndOfEarlyData => 5,
            EncryptedExtensions => 8,
            Certificate => 11,
            ServerKeyExchange => 12,
            CertificateRequest => 13,
            ServerHelloDone => 14,
            CertificateVerify => 15,
            ClientKeyExchange => 16,
            Finished => 20,
            CertificateUrl => 21,
            CertificateStatus => 22,
            SupplementalData => 23,
            KeyUpdate => 24,
            MessageHash => 254,
            Unknown(value) => *value,
        }
    }
}

// ============================================================================
// Hash / PRF
// ============================================================================

/// Hash algorithms (RFC 5246 7.4.1.4.1 code points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    SHA224,
    SHA256,
    SHA384,
    SHA512,
    Unknown(u8),
}

impl HashAlgorithm {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => HashAlgorithm::MD5,
            2 => HashAlgorithm::SHA1,
            3 => HashAlgorithm::SHA224,
            4 => HashAlgorithm::SHA256,
            5 => HashAlgorithm::SHA384,
            6 => HashAlgorithm::SHA512,
            _ => HashAlgorithm::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HashAlgorithm::MD5 => 1,
            HashAlgorithm::SHA1 => 2,
            HashAlgorithm::SHA224 => 3,
            HashAlgorithm::SHA256 => 4,
            HashAlgorithm::SHA384 => 5,
            HashAlgorithm::SHA512 => 6,
            HashAlgorithm::Unknown(value) => *value,
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::MD5 => 16,
            HashAlgorithm::SHA1 => 20,
            HashAlgorithm::SHA224 => 28,
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
            HashAlgorithm::SHA512 => 64,
            HashAlgorithm::Unknown(_) => 0,
        }
    }
}

/// The PRF negotiated for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrfAlgorithm {
    /// TLS 1.0/1.1: P_MD5 xor P_SHA1 over split secret halves.
    Legacy,
    /// TLS 1.2 P_hash, or the TLS 1.3 HKDF hash.
    Hash(HashAlgorithm),
}

impl PrfAlgorithm {
    /// Hashes the transcript must carry for this PRF.
    pub fn transcript_hashes(&self) -> &'static [HashAlgorithm] {
        match self {
            PrfAlgorithm::Legacy => &[HashAlgorithm::MD5, HashAlgorithm::SHA1],
            PrfAlgorithm::Hash(HashAlgorithm::SHA384) => &[HashAlgorithm::SHA384],
            PrfAlgorithm::Hash(HashAlgorithm::SHA512) => &[HashAlgorithm::SHA512],
            PrfAlgorithm::Hash(_) => &[HashAlgorithm::SHA256],
        }
    }

    /// The hash used for HKDF and session hashes. Legacy maps to the
    /// MD5||SHA1 concatenation handled by the transcript.
    pub fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            PrfAlgorithm::Legacy => None,
            PrfAlgorithm::Hash(h) => Some(*h),
        }
    }
}

// ============================================================================
// Signature Scheme
// ============================================================================

/// Signature schemes (RFC 8446 4.2.3), also covering the TLS 1.2
/// `SignatureAndHashAlgorithm` pairs they alias.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    RSA_PKCS1_SHA1,
    ECDSA_SHA1,
    RSA_PKCS1_SHA256,
    RSA_PKCS1_SHA384,
    RSA_PKCS1_SHA512,
    ECDSA_SECP256R1_SHA256,
    ECDSA_SECP384R1_SHA384,
    ECDSA_SECP521R1_SHA512,
    RSA_PSS_RSAE_SHA256,
    RSA_PSS_RSAE_SHA384,
    RSA_PSS_RSAE_SHA512,
    ED25519,
    Unknown(u16),
}

impl SignatureScheme {
    pub fn from_u16(value: u16) -> Self {
        use SignatureScheme::*;
        match value {
            0x0201 => RSA_PKCS1_SHA1,
            0x0203 => ECDSA_SHA1,
            0x0401 => RSA_PKCS1_SHA256,
            0x0501 => RSA_PKCS1_SHA384,
            0x0601 => RSA_PKCS1_SHA512,
            0x0403 => ECDSA_SECP256R1_SHA256,
            0x0503 => ECDSA_SECP384R1_SHA384,
            0x0603 => ECDSA_SECP521R1_SHA512,
            0x0804 => RSA_PSS_RSAE_SHA256,
            0x0805 => RSA_PSS_RSAE_SHA384,
            0x0806 => RSA_PSS_RSAE_SHA512,
            0x0807 => ED25519,
            _ => Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        use SignatureScheme::*;
        match self {
            RSA_PKCS1_SHA1 => 0x0201,
            ECDSA_SHA1 => 0x0203,
            RSA_PKCS1_SHA256 => 0x0401,
            RSA_PKCS1_SHA384 => 0x0501,
            RSA_PKCS1_SHA512 => 0x0601,
            ECDSA_SECP256R1_SHA256 => 0x0403,
            ECDSA_SECP384R1_SHA384 => 0x0503,
            ECDSA_SECP521R1_SHA512 => 0x0603,
            RSA_PSS_RSAE_SHA256 => 0x0804,
            RSA_PSS_RSAE_SHA384 => 0x0805,
            RSA_PSS_RSAE_SHA512 => 0x0806,
            ED25519 => 0x0807,
            Unknown(value) => *value,
        }
    }

    /// Hash used by the scheme. `None` for schemes hashing internally.
    pub fn hash(&self) -> Option<HashAlgorithm> {
        use SignatureScheme::*;
        match self {
            RSA_PKCS1_SHA1 | ECDSA_SHA1 => Some(HashAlgorithm::SHA1),
            RSA_PKCS1_SHA256 | ECDSA_SECP256R1_SHA256 | RSA_PSS_RSAE_SHA256 => {
                Some(HashAlgorithm::SHA256)
            }
            RSA_PKCS1_SHA384 | ECDSA_SECP384R1_SHA384 | RSA_PSS_RSAE_SHA384 => {
                Some(HashAlgorithm::SHA384)
            }
            RSA_PKCS1_SHA512 | ECDSA_SECP521R1_SHA512 | RSA_PSS_RSAE_SHA512 => {
                Some(HashAlgorithm::SHA512)
            }
            ED25519 | Unknown(_) => None,
        }
    }

    pub fn key_kind(&self) -> Option<KeyKind> {
        use SignatureScheme::*;
        match self {
            ECDSA_SHA1 | ECDSA_SECP256R1_SHA256 | ECDSA_SECP384R1_SHA384
            | ECDSA_SECP521R1_SHA512 => Some(KeyKind::Ecdsa),
            RSA_PKCS1_SHA1 | RSA_PKCS1_SHA256 | RSA_PKCS1_SHA384 | RSA_PKCS1_SHA512
            | RSA_PSS_RSAE_SHA256 | RSA_PSS_RSAE_SHA384 | RSA_PSS_RSAE_SHA512 => {
                Some(KeyKind::Rsa)
            }
            ED25519 => Some(KeyKind::Ed25519),
            Unknown(_) => None,
        }
    }

    /// TLS 1.3 forbids PKCS#1 v1.5 and SHA-1 in handshake signatures.
    pub fn allowed_in_tls13(&self) -> bool {
        use SignatureScheme::*;
        !matches!(
            self,
            RSA_PKCS1_SHA1
                | ECDSA_SHA1
                | RSA_PKCS1_SHA256
                | RSA_PKCS1_SHA384
                | RSA_PKCS1_SHA512
                | Unknown(_)
        )
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureScheme> {
        let (input, value) = be_u16(input)?;
        Ok((input, SignatureScheme::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

/// Public key family of a certificate or signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Ecdsa,
    Rsa,
    Ed25519,
}

// ============================================================================
// Named Groups
// ============================================================================

/// Key exchange groups (RFC 8422, RFC 7919, RFC 8446).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGroup {
    Secp256r1,
    Secp384r1,
    Secp521r1,
    X25519,
    X448,
    Ffdhe2048,
    Ffdhe3072,
    Ffdhe4096,
    Unknown(u16),
}

impl NamedGroup {
    pub fn from_u16(value: u16) -> Self {
        match value {
            23 => NamedGroup::Secp256r1,
            24 => NamedGroup::Secp384r1,
            25 => NamedGroup::Secp521r1,
            29 => NamedGroup::X25519,
            30 => NamedGroup::X448,
            256 => NamedGroup::Ffdhe2048,
            257 => NamedGroup::Ffdhe3072,
            258 => NamedGroup::Ffdhe4096,
            _ => NamedGroup::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NamedGroup::Secp256r1 => 23,
            NamedGroup::Secp384r1 => 24,
            NamedGroup::Secp521r1 => 25,
            NamedGroup::X25519 => 29,
            NamedGroup::X448 => 30,
            NamedGroup::Ffdhe2048 => 256,
            NamedGroup::Ffdhe3072 => 257,
            NamedGroup::Ffdhe4096 => 258,
            NamedGroup::Unknown(value) => *value,
        }
    }

    pub fn is_ffdhe(&self) -> bool {
        matches!(
            self,
            NamedGroup::Ffdhe2048 | NamedGroup::Ffdhe3072 | NamedGroup::Ffdhe4096
        )
    }

    pub fn is_ecdhe(&self) -> bool {
        matches!(
            self,
            NamedGroup::Secp256r1
                | NamedGroup::Secp384r1
                | NamedGroup::Secp521r1
                | NamedGroup::X25519
                | NamedGroup::X448
        )
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], NamedGroup> {
        let (input, value) = be_u16(input)?;
        Ok((input, NamedGroup::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

// ============================================================================
// Cipher Suites
// ============================================================================

/// Key exchange family of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeAlgorithm {
    Rsa,
    DhAnon,
    EcdheEcdsa,
    EcdheRsa,
    Psk,
    SrpSha,
    /// TLS 1.3 suites negotiate key exchange separately.
    Tls13,
}

impl KeyExchangeAlgorithm {
    /// Whether the server must present a certificate.
    pub fn requires_server_certificate(&self) -> bool {
        matches!(
            self,
            KeyExchangeAlgorithm::Rsa
                | KeyExchangeAlgorithm::EcdheEcdsa
                | KeyExchangeAlgorithm::EcdheRsa
                | KeyExchangeAlgorithm::Tls13
        )
    }

    /// Key kind the server certificate must carry, if fixed by the suite.
    pub fn server_key_kind(&self) -> Option<KeyKind> {
        match self {
            KeyExchangeAlgorithm::Rsa | KeyExchangeAlgorithm::EcdheRsa => Some(KeyKind::Rsa),
            KeyExchangeAlgorithm::EcdheEcdsa => Some(KeyKind::Ecdsa),
            _ => None,
        }
    }

    /// Anonymous and password based suites cannot authenticate a client
    /// certificate.
    pub fn allows_client_certificate(&self) -> bool {
        self.requires_server_certificate()
    }
}

/// Bulk cipher of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkCipher {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
    Aes128CbcSha,
    Aes256CbcSha,
}

impl BulkCipher {
    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm | BulkCipher::ChaCha20Poly1305
        )
    }
}

/// Cipher suites known to this crate.
///
/// Whether a suite can be negotiated additionally depends on the crypto
/// provider listing it in [`CryptoProvider::cipher_suites`](crate::crypto::CryptoProvider).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    TLS13_AES_128_GCM_SHA256,
    TLS13_AES_256_GCM_SHA384,
    TLS13_CHACHA20_POLY1305_SHA256,
    ECDHE_ECDSA_AES128_GCM_SHA256,
    ECDHE_ECDSA_AES256_GCM_SHA384,
    ECDHE_RSA_AES128_GCM_SHA256,
    ECDHE_RSA_AES256_GCM_SHA384,
    RSA_AES128_GCM_SHA256,
    RSA_AES256_GCM_SHA384,
    DH_ANON_AES128_GCM_SHA256,
    DH_ANON_AES256_GCM_SHA384,
    PSK_AES128_GCM_SHA256,
    PSK_AES256_GCM_SHA384,
    ECDHE_ECDSA_AES128_CBC_SHA,
    ECDHE_ECDSA_AES256_CBC_SHA,
    ECDHE_RSA_AES128_CBC_SHA,
    ECDHE_RSA_AES256_CBC_SHA,
    RSA_AES128_CBC_SHA,
    RSA_AES256_CBC_SHA,
    SRP_SHA_AES128_CBC_SHA,
    SRP_SHA_AES256_CBC_SHA,
    EMPTY_RENEGOTIATION_INFO_SCSV,
    FALLBACK_SCSV,
    Unknown(u16),
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        use CipherSuite::*;
        match value {
            0x1301 => TLS13_AES_128_GCM_SHA256,
            0x1302 => TLS13_AES_256_GCM_SHA384,
            0x1303 => TLS13_CHACHA20_POLY1305_SHA256,
            0xC02B => ECDHE_ECDSA_AES128_GCM_SHA256,
            0xC02C => ECDHE_ECDSA_AES256_GCM_SHA384,
            0xC02F => ECDHE_RSA_AES128_GCM_SHA256,
            0xC030 => ECDHE_RSA_AES256_GCM_SHA384,
            0x009C => RSA_AES128_GCM_SHA256,
            0x009D => RSA_AES256_GCM_SHA384,
            0x00A6 => DH_ANON_AES128_GCM_SHA256,
            0x00A7 => DH_ANON_AES256_GCM_SHA384,
            0x00A8 => PSK_AES128_GCM_SHA256,
            0x00A9 => PSK_AES256_GCM_SHA384,
            0xC009 => ECDHE_ECDSA_AES128_CBC_SHA,
            0xC00A => ECDHE_ECDSA_AES256_CBC_SHA,
            0xC013 => ECDHE_RSA_AES128_CBC_SHA,
            0xC014 => ECDHE_RSA_AES256_CBC_SHA,
            0x002F => RSA_AES128_CBC_SHA,
            0x0035 => RSA_AES256_CBC_SHA,
            0xC01D => SRP_SHA_AES128_CBC_SHA,
            0xC020 => SRP_SHA_AES256_CBC_SHA,
            0x00FF => EMPTY_RENEGOTIATION_INFO_SCSV,
            0x5600 => FALLBACK_SCSV,
            _ => Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        use CipherSuite::*;
        match self {
            TLS13_AES_128_GCM_SHA256 => 0x1301,
            TLS13_AES_256_GCM_SHA384 => 0x1302,
            TLS13_CHACHA20_POLY1305_SHA256 => 0x1303,
            ECDHE_ECDSA_AES128_GCM_SHA256 => 0xC02B,
            ECDHE_ECDSA_AES256_GCM_SHA384 => 0xC02C,
            ECDHE_RSA_AES128_GCM_SHA256 => 0xC02F,
            ECDHE_RSA_AES256_GCM_SHA384 => 0xC030,
            RSA_AES128_GCM_SHA256 => 0x009C,
            RSA_AES256_GCM_SHA384 => 0x009D,
            DH_ANON_AES128_GCM_SHA256 => 0x00A6,
            DH_ANON_AES256_GCM_SHA384 => 0x00A7,
            PSK_AES128_GCM_SHA256 => 0x00A8,
            PSK_AES256_GCM_SHA384 => 0x00A9,
            ECDHE_ECDSA_AES128_CBC_SHA => 0xC009,
            ECDHE_ECDSA_AES256_CBC_SHA => 0xC00A,
            ECDHE_RSA_AES128_CBC_SHA => 0xC013,
            ECDHE_RSA_AES256_CBC_SHA => 0xC014,
            RSA_AES128_CBC_SHA => 0x002F,
            RSA_AES256_CBC_SHA => 0x0035,
            SRP_SHA_AES128_CBC_SHA => 0xC01D,
            SRP_SHA_AES256_CBC_SHA => 0xC020,
            EMPTY_RENEGOTIATION_INFO_SCSV => 0x00FF,
            FALLBACK_SCSV => 0x5600,
            Unknown(value) => *value,
        }
    }

    /// Signaling values that are not real suites.
    pub fn is_scsv(&self) -> bool {
        matches!(
            self,
            CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV | CipherSuite::FALLBACK_SCSV
        )
    }

    pub fn is_tls13(&self) -> bool {
        matches!(self.key_exchange(), Some(KeyExchangeAlgorithm::Tls13))
    }

    pub fn key_exchange(&self) -> Option<KeyExchangeAlgorithm> {
        use CipherSuite::*;
        use KeyExchangeAlgorithm as K;
        let kx = match self {
            TLS13_AES_128_GCM_SHA256 | TLS13_AES_256_GCM_SHA384
            | TLS13_CHACHA20_POLY1305_SHA256 => K::Tls13,
            ECDHE_ECDSA_AES128_GCM_SHA256 | ECDHE_ECDSA_AES256_GCM_SHA384
            | ECDHE_ECDSA_AES128_CBC_SHA | ECDHE_ECDSA_AES256_CBC_SHA => K::EcdheEcdsa,
            ECDHE_RSA_AES128_GCM_SHA256 | ECDHE_RSA_AES256_GCM_SHA384 | ECDHE_RSA_AES128_CBC_SHA
            | ECDHE_RSA_AES256_CBC_SHA => K::EcdheRsa,
            RSA_AES128_GCM_SHA256 | RSA_AES256_GCM_SHA384 | RSA_AES128_CBC_SHA
            | RSA_AES256_CBC_SHA => K::Rsa,
            DH_ANON_AES128_GCM_SHA256 | DH_ANON_AES256_GCM_SHA384 => K::DhAnon,
            PSK_AES128_GCM_SHA256 | PSK_AES256_GCM_SHA384 => K::Psk,
            SRP_SHA_AES128_CBC_SHA | SRP_SHA_AES256_CBC_SHA => K::SrpSha,
            EMPTY_RENEGOTIATION_INFO_SCSV | FALLBACK_SCSV | Unknown(_) => return None,
        };
        Some(kx)
    }

    pub fn bulk_cipher(&self) -> Option<BulkCipher> {
        use CipherSuite::*;
        let bulk = match self {
            TLS13_AES_128_GCM_SHA256 | ECDHE_ECDSA_AES128_GCM_SHA256
            | ECDHE_RSA_AES128_GCM_SHA256 | RSA_AES128_GCM_SHA256 | DH_ANON_AES128_GCM_SHA256
            | PSK_AES128_GCM_SHA256 => BulkCipher::Aes128Gcm,
            TLS13_AES_256_GCM_SHA384 | ECDHE_ECDSA_AES256_GCM_SHA384
            | ECDHE_RSA_AES256_GCM_SHA384 | RSA_AES256_GCM_SHA384 | DH_ANON_AES256_GCM_SHA384
            | PSK_AES256_GCM_SHA384 => BulkCipher::Aes256Gcm,
            TLS13_CHACHA20_POLY1305_SHA256 => BulkCipher::ChaCha20Poly1305,
            ECDHE_ECDSA_AES128_CBC_SHA | ECDHE_RSA_AES128_CBC_SHA | RSA_AES128_CBC_SHA
            | SRP_SHA_AES128_CBC_SHA => BulkCipher::Aes128CbcSha,
            ECDHE_ECDSA_AES256_CBC_SHA | ECDHE_RSA_AES256_CBC_SHA | RSA_AES256_CBC_SHA
            | SRP_SHA_AES256_CBC_SHA => BulkCipher::Aes256CbcSha,
            EMPTY_RENEGOTIATION_INFO_SCSV | FALLBACK_SCSV | Unknown(_) => return None,
        };
        Some(bulk)
    }

    /// Hash of the TLS 1.2 PRF (and the TLS 1.3 HKDF).
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        use CipherSuite::*;
        match self {
            TLS13_AES_256_GCM_SHA384 | ECDHE_ECDSA_AES256_GCM_SHA384
            | ECDHE_RSA_AES256_GCM_SHA384 | RSA_AES256_GCM_SHA384 | DH_ANON_AES256_GCM_SHA384
            | PSK_AES256_GCM_SHA384 => HashAlgorithm::SHA384,
            _ => HashAlgorithm::SHA256,
        }
    }

    /// The PRF this suite uses under `version`.
    pub fn prf_algorithm(&self, version: ProtocolVersion) -> PrfAlgorithm {
        if version.has_signature_algorithms() {
            PrfAlgorithm::Hash(self.hash_algorithm())
        } else {
            PrfAlgorithm::Legacy
        }
    }

    pub fn minimum_version(&self) -> ProtocolVersion {
        if self.is_tls13() {
            return ProtocolVersion::TLSV1_3;
        }
        match self.bulk_cipher() {
            Some(b) if b.is_aead() => ProtocolVersion::TLSV1_2,
            _ => ProtocolVersion::TLSV1_0,
        }
    }

    /// Whether the suite may be negotiated under `version`.
    pub fn is_valid_for_version(&self, version: ProtocolVersion) -> bool {
        if self.is_scsv() || self.key_exchange().is_none() {
            return false;
        }
        if version.is_tls13() {
            return self.is_tls13();
        }
        !self.is_tls13() && version.is_at_least(self.minimum_version())
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

// ============================================================================
// Extension Types
// ============================================================================

/// Extension code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionType {
    ServerName,
    MaxFragmentLength,
    TrustedCaKeys,
    StatusRequest,
    SupportedGroups,
    EcPointFormats,
    Srp,
    SignatureAlgorithms,
    Heartbeat,
    ApplicationLayerProtocolNegotiation,
    StatusRequestV2,
    EncryptThenMac,
    ExtendedMasterSecret,
    SessionTicket,
    PreSharedKey,
    EarlyData,
    SupportedVersions,
    Cookie,
    PskKeyExchangeModes,
    CertificateAuthorities,
    PostHandshakeAuth,
    SignatureAlgorithmsCert,
    KeyShare,
    RenegotiationInfo,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        use ExtensionType::*;
        match value {
            0 => ServerName,
            1 => MaxFragmentLength,
            3 => TrustedCaKeys,
            5 => StatusRequest,
            10 => SupportedGroups,
            11 => EcPointFormats,
            12 => Srp,
            13 => SignatureAlgorithms,
            15 => Heartbeat,
            16 => ApplicationLayerProtocolNegotiation,
            17 => StatusRequestV2,
            22 => EncryptThenMac,
            23 => ExtendedMasterSecret,
            35 => SessionTicket,
            41 => PreSharedKey,
            42 => EarlyData,
            43 => SupportedVersions,
            44 => Cookie,
            45 => PskKeyExchangeModes,
            47 => CertificateAuthorities,
            49 => PostHandshakeAuth,
            50 => SignatureAlgorithmsCert,
            51 => KeyShare,
            0xFF01 => RenegotiationInfo,
            _ => Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        use ExtensionType::*;
        match self {
            ServerName => 0,
            MaxFragmentLength => 1,
            TrustedCaKeys => 3,
            StatusRequest => 5,
            SupportedGroups => 10,
            EcPointFormats => 11,
            Srp => 12,
            SignatureAlgorithms => 13,
            Heartbeat => 15,
            ApplicationLayerProtocolNegotiation => 16,
            StatusRequestV2 => 17,
            EncryptThenMac => 22,
            ExtendedMasterSecret => 23,
            SessionTicket => 35,
            PreSharedKey => 41,
            EarlyData => 42,
            SupportedVersions => 43,
            Cookie => 44,
            PskKeyExchangeModes => 45,
            CertificateAuthorities => 47,
            PostHandshakeAuth => 49,
            SignatureAlgorithmsCert => 50,
            KeyShare => 51,
            RenegotiationInfo => 0xFF01,
            Unknown(value) => *value,
        }
    }
}

// ============================================================================
// Random / Session ID / Cookie
// ============================================================================

/// Last eight bytes of a TLS 1.2 ServerHello random from a 1.3 capable server.
pub const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x01";

/// Last eight bytes of a TLS 1.1 or lower ServerHello random.
pub const DOWNGRADE_TLS11: [u8; 8] = *b"DOWNGRD\x00";

/// Hello random.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Random([u8; 32]);

impl Random {
    /// The special ServerHello random marking a HelloRetryRequest.
    pub const HELLO_RETRY_REQUEST: Random = Random([
        0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8,
        0x91, 0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8,
        0x33, 0x9C,
    ]);

    pub fn new(random: &dyn SecureRandom) -> Result<Self, Error> {
        let mut bytes = [0; 32];
        random.fill(&mut bytes).map_err(Error::CryptoError)?;
        Ok(Random(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Random(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Overwrite the trailing bytes with a downgrade sentinel.
    pub fn set_downgrade_sentinel(&mut self, sentinel: &[u8; 8]) {
        self.0[24..].copy_from_slice(sentinel);
    }

    pub fn downgrade_sentinel(&self) -> Option<&'static [u8; 8]> {
        if self.0[24..] == DOWNGRADE_TLS12 {
            Some(&DOWNGRADE_TLS12)
        } else if self.0[24..] == DOWNGRADE_TLS11 {
            Some(&DOWNGRADE_TLS11)
        } else {
            None
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, bytes) = take(32_usize)(input)?;
        let mut random = [0; 32];
        random.copy_from_slice(bytes);
        Ok((input, Random(random)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.0);
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Random({:02x?}..)", &self.0[..4])
    }
}

macro_rules! var_bytes {
    ($name:ident, $max:expr) => {
        #[derive(Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name(ArrayVec<u8, $max>);

        impl $name {
            pub fn empty() -> Self {
                Self(ArrayVec::new())
            }

            pub fn try_new(data: &[u8]) -> Result<Self, Error> {
                let mut v = ArrayVec::new();
                v.try_extend_from_slice(data).map_err(|_| {
                    Error::InternalError(format!(
                        "{} length {} above {}",
                        stringify!($name),
                        data.len(),
                        $max
                    ))
                })?;
                Ok(Self(v))
            }

            pub fn random(len: usize, random: &dyn SecureRandom) -> Result<Self, Error> {
                let mut bytes = [0; $max];
                let len = len.min($max);
                random
                    .fill(&mut bytes[..len])
                    .map_err(Error::CryptoError)?;
                Self::try_new(&bytes[..len])
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (rest, len) = be_u8(input)?;
                if len as usize > $max {
                    return Err(verify_failure(input));
                }
                let (rest, data) = take(len as usize)(rest)?;
                let mut v = ArrayVec::new();
                // Length checked above.
                v.try_extend_from_slice(data)
                    .map_err(|_| verify_failure(input))?;
                Ok((rest, Self(v)))
            }

            pub fn serialize(&self, output: &mut Vec<u8>) {
                output.push(self.0.len() as u8);
                output.extend_from_slice(&self.0);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:02x?})", stringify!($name), self.0.as_slice())
            }
        }
    };
}

var_bytes!(SessionId, 32);
var_bytes!(Cookie, 255);
