//! SRP-6a (RFC 5054) using num-bigint and SHA-1.

use num_bigint::BigUint;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use super::dh::{random_exponent, to_padded_bytes};
use crate::crypto::groups::SrpGroup;
use crate::crypto::provider::{Secret, SrpProvider, SrpServerExchange};

struct Params {
    n: BigUint,
    g: BigUint,
    n_len: usize,
}

impl Params {
    fn new(group: &SrpGroup) -> Result<Self, String> {
        let n = BigUint::from_bytes_be(&group.prime);
        let g = BigUint::from_bytes_be(&group.generator);
        if n.bits() < 512 || g < BigUint::from(2_u8) || g >= n {
            return Err("Invalid SRP group".to_string());
        }
        Ok(Params {
            n,
            g,
            n_len: group.prime.len(),
        })
    }

    fn pad(&self, value: &BigUint) -> Vec<u8> {
        to_padded_bytes(value, self.n_len)
    }

    /// k = SHA1(N | PAD(g))
    fn k(&self) -> BigUint {
        let mut h = Sha1::new();
        h.update(self.n.to_bytes_be());
        h.update(self.pad(&self.g));
        BigUint::from_bytes_be(&h.finalize())
    }

    /// u = SHA1(PAD(A) | PAD(B))
    fn u(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let mut h = Sha1::new();
        h.update(self.pad(a));
        h.update(self.pad(b));
        BigUint::from_bytes_be(&h.finalize())
    }

    /// Reject public values that are zero modulo N.
    fn check_public(&self, value: &[u8]) -> Result<BigUint, String> {
        let v = BigUint::from_bytes_be(value);
        if (&v % &self.n) == BigUint::from(0_u8) {
            return Err("Invalid SRP public value".to_string());
        }
        Ok(v)
    }
}

/// x = SHA1(s | SHA1(I | ":" | P))
fn private_x(salt: &[u8], identity: &[u8], password: &[u8]) -> BigUint {
    let mut inner = Sha1::new();
    inner.update(identity);
    inner.update(b":");
    inner.update(password);
    let inner = inner.finalize();

    let mut outer = Sha1::new();
    outer.update(salt);
    outer.update(inner);
    BigUint::from_bytes_be(&outer.finalize())
}

struct ServerExchange {
    params: Params,
    verifier: BigUint,
    b: BigUint,
    public_b: Vec<u8>,
}

impl std::fmt::Debug for ServerExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpServerExchange")
            .field("n_len", &self.params.n_len)
            .finish_non_exhaustive()
    }
}

impl SrpServerExchange for ServerExchange {
    fn public_b(&self) -> &[u8] {
        &self.public_b
    }

    fn complete(self: Box<Self>, client_a: &[u8]) -> Result<Secret, String> {
        let p = &self.params;
        let a = p.check_public(client_a)?;
        let b_pub = BigUint::from_bytes_be(&self.public_b);
        let u = p.u(&a, &b_pub);

        // S = (A * v^u) ^ b mod N
        let base = (a * self.verifier.modpow(&u, &p.n)) % &p.n;
        let s = base.modpow(&self.b, &p.n);
        Ok(Secret::new(s.to_bytes_be()))
    }
}

#[derive(Debug)]
pub(super) struct RustCryptoSrpProvider;

impl SrpProvider for RustCryptoSrpProvider {
    fn client_exchange(
        &self,
        group: &SrpGroup,
        salt: &[u8],
        identity: &[u8],
        password: &[u8],
        server_b: &[u8],
    ) -> Result<(Vec<u8>, Secret), String> {
        let p = Params::new(group)?;
        let b_pub = p.check_public(server_b)?;

        let a = random_exponent(&p.n, 32);
        let a_pub = p.g.modpow(&a, &p.n);
        let u = p.u(&a_pub, &b_pub);
        if u == BigUint::from(0_u8) {
            return Err("SRP scrambling parameter is zero".to_string());
        }
        let x = private_x(salt, identity, password);
        let k = p.k();

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let kgx = (k * p.g.modpow(&x, &p.n)) % &p.n;
        let base = ((&b_pub % &p.n) + &p.n - kgx) % &p.n;
        let exp = a + u * x;
        let s = Zeroizing::new(base.modpow(&exp, &p.n).to_bytes_be());

        Ok((a_pub.to_bytes_be(), Secret::new(s.to_vec())))
    }

    fn server_start(
        &self,
        group: &SrpGroup,
        verifier: &[u8],
    ) -> Result<Box<dyn SrpServerExchange>, String> {
        let p = Params::new(group)?;
        let v = BigUint::from_bytes_be(verifier);
        let b = random_exponent(&p.n, 32);

        // B = (k * v + g^b) mod N
        let public_b = ((p.k() * &v) + p.g.modpow(&b, &p.n)) % &p.n;
        Ok(Box::new(ServerExchange {
            public_b: public_b.to_bytes_be(),
            params: p,
            verifier: v,
            b,
        }))
    }

    fn create_verifier(
        &self,
        group: &SrpGroup,
        salt: &[u8],
        identity: &[u8],
        password: &[u8],
    ) -> Result<Vec<u8>, String> {
        let p = Params::new(group)?;
        let x = private_x(salt, identity, password);
        Ok(p.g.modpow(&x, &p.n).to_bytes_be())
    }
}

pub(super) static SRP_PROVIDER: RustCryptoSrpProvider = RustCryptoSrpProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_agree() {
        let group = SrpGroup::rfc5054_1024();
        let salt = [0x5A; 16];
        let v = SRP_PROVIDER
            .create_verifier(&group, &salt, b"alice", b"password123")
            .unwrap();

        let server = SRP_PROVIDER.server_start(&group, &v).unwrap();
        let b = server.public_b().to_vec();

        let (a, client_secret) = SRP_PROVIDER
            .client_exchange(&group, &salt, b"alice", b"password123", &b)
            .unwrap();
        let server_secret = server.complete(&a).unwrap();
        assert_eq!(client_secret.as_slice(), server_secret.as_slice());
    }

    #[test]
    fn wrong_password_disagrees() {
        let group = SrpGroup::rfc5054_1024();
        let v = SRP_PROVIDER
            .create_verifier(&group, b"salt", b"alice", b"right")
            .unwrap();
        let server = SRP_PROVIDER.server_start(&group, &v).unwrap();
        let b = server.public_b().to_vec();
        let (a, client_secret) = SRP_PROVIDER
            .client_exchange(&group, b"salt", b"alice", b"wrong", &b)
            .unwrap();
        let server_secret = server.complete(&a).unwrap();
        assert_ne!(client_secret.as_slice(), server_secret.as_slice());
    }

    #[test]
    fn rejects_zero_public_value() {
        let group = SrpGroup::rfc5054_1024();
        let r = SRP_PROVIDER.client_exchange(&group, b"s", b"i", b"p", &group.prime);
        assert!(r.is_err());
    }
}
