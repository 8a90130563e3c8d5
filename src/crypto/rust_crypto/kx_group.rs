//! Key exchange group implementations using RustCrypto.

use p256::{ecdh::EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand_core::OsRng;

use super::dh::DhKeyExchange;
use crate::crypto::groups::DhGroup;
use crate::crypto::provider::{ActiveKeyExchange, Secret, SupportedKxGroup};
use crate::types::NamedGroup;

/// ECDHE key exchange implementation.
enum EcdhKeyExchange {
    P256 {
        secret: EphemeralSecret,
        public_key: Vec<u8>,
    },
    P384 {
        secret: P384EphemeralSecret,
        public_key: Vec<u8>,
    },
    X25519 {
        secret: x25519_dalek::EphemeralSecret,
        public_key: Vec<u8>,
    },
}

impl std::fmt::Debug for EcdhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyExchange")
            .field("group", &self.group())
            .field("public_key_len", &self.pub_key().len())
            .finish_non_exhaustive()
    }
}

impl EcdhKeyExchange {
    fn new(group: NamedGroup) -> Result<Self, String> {
        match group {
            NamedGroup::Secp256r1 => {
                let secret = EphemeralSecret::random(&mut OsRng);
                let public_key = P256PublicKey::from(&secret).to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P256 { secret, public_key })
            }
            NamedGroup::Secp384r1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                let public_key = P384PublicKey::from(&secret).to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P384 { secret, public_key })
            }
            NamedGroup::X25519 => {
                let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let public_key = x25519_dalek::PublicKey::from(&secret).as_bytes().to_vec();
                Ok(EcdhKeyExchange::X25519 { secret, public_key })
            }
            _ => Err(format!("Unsupported group {:?}", group)),
        }
    }
}

impl ActiveKeyExchange for EcdhKeyExchange {
    fn pub_key(&self) -> &[u8] {
        match self {
            EcdhKeyExchange::P256 { public_key, .. } => public_key,
            EcdhKeyExchange::P384 { public_key, .. } => public_key,
            EcdhKeyExchange::X25519 { public_key, .. } => public_key,
        }
    }

    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Secret, String> {
        match *self {
            EcdhKeyExchange::P256 { secret, .. } => {
                let peer_key = P256PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-256 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Secret::new(shared.raw_secret_bytes().to_vec()))
            }
            EcdhKeyExchange::P384 { secret, .. } => {
                let peer_key = P384PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-384 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Secret::new(shared.raw_secret_bytes().to_vec()))
            }
            EcdhKeyExchange::X25519 { secret, .. } => {
                let peer: [u8; 32] = peer_pub
                    .try_into()
                    .map_err(|_| "Invalid X25519 public key".to_string())?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err("X25519 produced an all-zero secret".to_string());
                }
                Ok(Secret::new(shared.as_bytes().to_vec()))
            }
        }
    }

    fn group(&self) -> NamedGroup {
        match self {
            EcdhKeyExchange::P256 { .. } => NamedGroup::Secp256r1,
            EcdhKeyExchange::P384 { .. } => NamedGroup::Secp384r1,
            EcdhKeyExchange::X25519 { .. } => NamedGroup::X25519,
        }
    }
}

/// An elliptic curve group.
#[derive(Debug)]
struct EcGroup(NamedGroup);

impl SupportedKxGroup for EcGroup {
    fn name(&self) -> NamedGroup {
        self.0
    }

    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(EcdhKeyExchange::new(self.0)?))
    }
}

/// An RFC 7919 finite field group.
#[derive(Debug)]
struct FfdheGroup(NamedGroup);

impl SupportedKxGroup for FfdheGroup {
    fn name(&self) -> NamedGroup {
        self.0
    }

    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String> {
        let group = DhGroup::from_named(self.0)
            .ok_or_else(|| format!("No parameters for {:?}", self.0))?;
        Ok(Box::new(DhKeyExchange::new(&group)?))
    }
}

static KX_GROUP_X25519: EcGroup = EcGroup(NamedGroup::X25519);
static KX_GROUP_P256: EcGroup = EcGroup(NamedGroup::Secp256r1);
static KX_GROUP_P384: EcGroup = EcGroup(NamedGroup::Secp384r1);
static KX_GROUP_FFDHE2048: FfdheGroup = FfdheGroup(NamedGroup::Ffdhe2048);

/// All supported key exchange groups.
pub(super) static ALL_KX_GROUPS: &[&dyn SupportedKxGroup] = &[
    &KX_GROUP_X25519,
    &KX_GROUP_P256,
    &KX_GROUP_P384,
    &KX_GROUP_FFDHE2048,
];
