/// Anti-replay window for one DTLS read epoch (RFC 6347 4.1.2.6).
///
/// Tracks the highest sequence number accepted so far and a bitmap of the
/// 64 numbers below it. Checking and marking are separate steps: a record
/// is only marked after it authenticated, so a forged record cannot burn a
/// sequence number.
#[derive(Debug, Default)]
pub(crate) struct ReplayWindow {
    highest: Option<u64>,
    bitmap: u64,
}

const WINDOW_SIZE: u64 = 64;

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `seq` has not been seen and is not too old.
    pub fn is_fresh(&self, seq: u64) -> bool {
        let Some(highest) = self.highest else {
            return true;
        };
        if seq > highest {
            return true;
        }
        let offset = highest - seq;
        offset < WINDOW_SIZE && self.bitmap & (1 << offset) == 0
    }

    /// Record `seq` as received.
    pub fn mark(&mut self, seq: u64) {
        match self.highest {
            None => {
                self.highest = Some(seq);
                self.bitmap = 1;
            }
            Some(highest) if seq > highest => {
                let shift = seq - highest;
                self.bitmap = if shift >= WINDOW_SIZE {
                    0
                } else {
                    self.bitmap << shift
                };
                self.bitmap |= 1;
                self.highest = Some(seq);
            }
            Some(highest) => {
                let offset = highest - seq;
                if offset < WINDOW_SIZE {
                    self.bitmap |= 1 << offset;
                }
            }
        }
    }
}
