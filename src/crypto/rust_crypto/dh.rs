//! Finite field Diffie-Hellman using num-bigint.

use num_bigint::BigUint;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::crypto::groups::DhGroup;
use crate::crypto::provider::{ActiveKeyExchange, DhProvider, Secret};
use crate::types::NamedGroup;

/// Left pad `value` to `len` bytes.
pub(super) fn to_padded_bytes(value: &BigUint, len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = vec![0; len.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

/// A random exponent in `[2, p - 2]`.
pub(super) fn random_exponent(prime: &BigUint, len: usize) -> BigUint {
    let mut bytes = Zeroizing::new(vec![0; len]);
    OsRng.fill_bytes(&mut bytes);
    let two = BigUint::from(2_u8);
    let range = prime - &two - 1_u8;
    BigUint::from_bytes_be(&bytes) % range + two
}

pub(super) struct DhKeyExchange {
    prime: BigUint,
    prime_len: usize,
    private_key: BigUint,
    public_key: Vec<u8>,
    named: Option<NamedGroup>,
}

impl std::fmt::Debug for DhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyExchange")
            .field("prime_len", &self.prime_len)
            .field("named", &self.named)
            .finish_non_exhaustive()
    }
}

impl DhKeyExchange {
    pub fn new(group: &DhGroup) -> Result<Self, String> {
        let prime = BigUint::from_bytes_be(&group.prime);
        let generator = BigUint::from_bytes_be(&group.generator);
        if prime.bits() < 512 || generator < BigUint::from(2_u8) || generator >= prime {
            return Err("Invalid DH parameters".to_string());
        }
        let prime_len = group.prime.len();

        let private_key = random_exponent(&prime, prime_len);
        let public_key = to_padded_bytes(&generator.modpow(&private_key, &prime), prime_len);

        Ok(DhKeyExchange {
            prime,
            prime_len,
            private_key,
            public_key,
            named: group.named(),
        })
    }
}

impl ActiveKeyExchange for DhKeyExchange {
    fn pub_key(&self) -> &[u8] {
        &self.public_key
    }

    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Secret, String> {
        let peer = BigUint::from_bytes_be(peer_pub);
        let one = BigUint::from(1_u8);
        if peer <= one || peer >= &self.prime - &one {
            return Err("Invalid DH public value".to_string());
        }
        let shared = peer.modpow(&self.private_key, &self.prime);
        Ok(Secret::new(to_padded_bytes(&shared, self.prime_len)))
    }

    fn group(&self) -> NamedGroup {
        self.named.unwrap_or(NamedGroup::Unknown(0))
    }
}

#[derive(Debug)]
pub(super) struct RustCryptoDhProvider;

impl DhProvider for RustCryptoDhProvider {
    fn start_exchange(&self, group: &DhGroup) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(DhKeyExchange::new(group)?))
    }
}

pub(super) static DH_PROVIDER: RustCryptoDhProvider = RustCryptoDhProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffdhe2048_agreement() {
        let group = DhGroup::from_named(NamedGroup::Ffdhe2048).unwrap();
        let a = DH_PROVIDER.start_exchange(&group).unwrap();
        let b = DH_PROVIDER.start_exchange(&group).unwrap();
        assert_eq!(a.pub_key().len(), 256);
        assert_eq!(a.group(), NamedGroup::Ffdhe2048);

        let a_pub = a.pub_key().to_vec();
        let b_pub = b.pub_key().to_vec();
        let s1 = a.complete(&b_pub).unwrap();
        let s2 = b.complete(&a_pub).unwrap();
        assert_eq!(s1.as_slice(), s2.as_slice());
        assert_eq!(s1.len(), 256);
    }

    #[test]
    fn rejects_degenerate_public_values() {
        let group = DhGroup::from_named(NamedGroup::Ffdhe2048).unwrap();
        let a = DH_PROVIDER.start_exchange(&group).unwrap();
        assert!(a.complete(&[1]).is_err());
        let b = DH_PROVIDER.start_exchange(&group).unwrap();
        assert!(b.complete(&group.prime).is_err());
    }
}
