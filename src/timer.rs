use std::time::{Duration, Instant};

use crate::rng::SeededRng;

/// Total jitter span in seconds, centered on zero.
const JITTER_SPAN: f32 = 0.5;

/// Lower bound for any computed retransmission timeout.
const MIN_RTO: Duration = Duration::from_millis(50);

/// Retransmission timeout for DTLS flights.
///
/// Starts at `start_rto`, doubles on every attempt and carries a random
/// offset of up to ±0.25s so that two peers do not retransmit in lockstep.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    start_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    remaining: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: usize, rng: &mut SeededRng) -> Self {
        ExponentialBackoff {
            start_rto,
            retries,
            rto: start_rto,
            jitter: random_jitter(rng),
            remaining: retries,
        }
    }

    /// Start over for a new flight.
    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.remaining = self.retries;
        self.jitter = random_jitter(rng);
    }

    /// Current timeout including jitter.
    pub fn rto(&self) -> Duration {
        let offset = Duration::from_secs_f32(self.jitter.abs());
        let rto = if self.jitter < 0.0 {
            self.rto.saturating_sub(offset)
        } else {
            self.rto + offset
        };
        rto.max(MIN_RTO)
    }

    /// Record a retransmission. Once retries are spent the timeout stays put.
    pub fn attempt(&mut self, rng: &mut SeededRng) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        self.rto *= 2;
        self.jitter = random_jitter(rng);
    }

    pub fn can_retry(&self) -> bool {
        self.remaining > 0
    }
}

fn random_jitter(rng: &mut SeededRng) -> f32 {
    rng.random::<f32>() * JITTER_SPAN - JITTER_SPAN / 2.0
}

/// A deadline. `Unarmed` is armed by the next `handle_timeout`, `Disabled`
/// never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timeout {
    Disabled,
    Unarmed,
    Armed(Instant),
}

impl Timeout {
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Timeout::Armed(at) if now >= *at)
    }

    pub fn instant(&self) -> Option<Instant> {
        match self {
            Timeout::Disabled | Timeout::Unarmed => None,
            Timeout::Armed(at) => Some(*at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_retries_spent() {
        let mut rng = SeededRng::new(Some(7));
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), 4, &mut rng);

        let mut previous = backoff.rto();
        assert!(previous >= Duration::from_millis(750));
        assert!(previous <= Duration::from_millis(1250));

        for _ in 0..4 {
            assert!(backoff.can_retry());
            backoff.attempt(&mut rng);
            let rto = backoff.rto();
            assert!(rto > previous);
            previous = rto;
        }
        assert!(!backoff.can_retry());

        backoff.attempt(&mut rng);
        assert_eq!(backoff.rto(), previous);

        backoff.reset(&mut rng);
        assert!(backoff.can_retry());
        assert!(backoff.rto() <= Duration::from_millis(1250));
    }

    #[test]
    fn never_below_floor() {
        let mut rng = SeededRng::new(Some(1));
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), 1, &mut rng);
        assert!(backoff.rto() >= MIN_RTO);
    }

    #[test]
    fn timeout_expiry() {
        let now = Instant::now();
        assert!(!Timeout::Unarmed.is_expired(now));
        assert!(!Timeout::Disabled.is_expired(now));
        let t = Timeout::Armed(now + Duration::from_secs(1));
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + Duration::from_secs(1)));
        assert_eq!(t.instant(), Some(now + Duration::from_secs(1)));
    }
}
