//! Non-cryptographic randomness.
//!
//! Retransmission jitter and similar timing decisions draw from a
//! [`SeededRng`]. Setting [`Config::rng_seed`](crate::Config::rng_seed)
//! makes those decisions reproducible, which the integration tests rely on.
//! Key material never comes from here; it comes from the provider's
//! [`SecureRandom`](crate::crypto::SecureRandom).

use rand::distr::{Distribution, StandardUniform};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

pub(crate) struct SeededRng {
    seeded: Option<StdRng>,
}

impl SeededRng {
    /// A deterministic generator for `Some(seed)`, the thread rng otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        SeededRng {
            seeded: seed.map(StdRng::seed_from_u64),
        }
    }

    pub fn random<T>(&mut self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        match &mut self.seeded {
            Some(rng) => rng.random(),
            None => rand::random(),
        }
    }

    pub fn fill(&mut self, dst: &mut [u8]) {
        match &mut self.seeded {
            Some(rng) => rng.fill_bytes(dst),
            None => rand::rng().fill_bytes(dst),
        }
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.seeded.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SeededRng::new(Some(99));
        let mut b = SeededRng::new(Some(99));
        let xs: Vec<u32> = (0..8).map(|_| a.random()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.random()).collect();
        assert_eq!(xs, ys);

        let mut fa = [0; 16];
        let mut fb = [0; 16];
        a.fill(&mut fa);
        b.fill(&mut fb);
        assert_eq!(fa, fb);
    }

    #[test]
    fn seeds_diverge() {
        let mut a = SeededRng::new(Some(1));
        let mut b = SeededRng::new(Some(2));
        assert_ne!(a.random::<u64>(), b.random::<u64>());
    }
}
