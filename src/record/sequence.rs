use crate::Error;

/// Record sequence counter for one direction and cipher state.
///
/// Never wraps: handing out the last value marks the counter exhausted and
/// every further request fails. TLS counts over the full 64 bit space,
/// DTLS over 48 bits per epoch.
#[derive(Debug)]
pub(crate) struct SequenceNumber {
    next: u64,
    max: u64,
    exhausted: bool,
}

impl SequenceNumber {
    pub const TLS_MAX: u64 = u64::MAX;
    pub const DTLS_MAX: u64 = (1 << 48) - 1;

    pub fn tls() -> Self {
        Self::with_max(Self::TLS_MAX)
    }

    pub fn dtls() -> Self {
        Self::with_max(Self::DTLS_MAX)
    }

    fn with_max(max: u64) -> Self {
        SequenceNumber {
            next: 0,
            max,
            exhausted: false,
        }
    }

    /// Take the next value.
    pub fn next_value(&mut self) -> Result<u64, Error> {
        if self.exhausted {
            return Err(Error::InternalError("sequence number exhausted".into()));
        }
        let value = self.next;
        if value == self.max {
            self.exhausted = true;
        } else {
            self.next += 1;
        }
        Ok(value)
    }

    /// The value the next call to [`next_value`](Self::next_value) returns.
    pub fn current_value(&self) -> u64 {
        self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn reset(&mut self) {
        self.next = 0;
        self.exhausted = false;
    }

    #[cfg(test)]
    pub fn starting_at(max: u64, next: u64) -> Self {
        SequenceNumber {
            next,
            max,
            exhausted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_zero() {
        let mut seq = SequenceNumber::dtls();
        assert_eq!(seq.next_value().unwrap(), 0);
        assert_eq!(seq.next_value().unwrap(), 1);
        assert_eq!(seq.current_value(), 2);
    }

    #[test]
    fn fails_after_last_value_instead_of_wrapping() {
        let mut seq =
            SequenceNumber::starting_at(SequenceNumber::DTLS_MAX, SequenceNumber::DTLS_MAX - 1);
        assert_eq!(seq.next_value().unwrap(), SequenceNumber::DTLS_MAX - 1);
        assert_eq!(seq.next_value().unwrap(), SequenceNumber::DTLS_MAX);
        assert!(seq.is_exhausted());
        assert!(matches!(seq.next_value(), Err(Error::InternalError(_))));
        assert!(matches!(seq.next_value(), Err(Error::InternalError(_))));

        let mut seq = SequenceNumber::starting_at(SequenceNumber::TLS_MAX, u64::MAX);
        assert_eq!(seq.next_value().unwrap(), u64::MAX);
        assert!(seq.next_value().is_err());
    }

    #[test]
    fn reset_restarts() {
        let mut seq = SequenceNumber::starting_at(3, 3);
        seq.next_value().unwrap();
        assert!(seq.next_value().is_err());
        seq.reset();
        assert_eq!(seq.next_value().unwrap(), 0);
    }
}
