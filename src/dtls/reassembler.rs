use std::ops::Range;

use crate::types::MessageType;

/// Collects the fragments of one DTLS handshake message.
///
/// Tracks the body ranges still missing as an ordered list of disjoint
/// ranges. Fragments may arrive in any order, overlap or repeat.
#[derive(Debug, Clone)]
pub(crate) struct DtlsReassembler {
    msg_type: MessageType,
    body: Vec<u8>,
    missing: Vec<Range<usize>>,
}

impl DtlsReassembler {
    pub fn new(msg_type: MessageType, length: usize) -> Self {
        DtlsReassembler {
            msg_type,
            body: vec![0; length],
            // A zero-length message still needs its one empty fragment.
            missing: vec![0..length],
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// Add the fragment at `offset`. Fragments that disagree with the
    /// message type or length, or reach past the end, are ignored.
    pub fn contribute_fragment(
        &mut self,
        msg_type: MessageType,
        length: usize,
        fragment: &[u8],
        offset: usize,
    ) {
        let end = offset + fragment.len();
        if msg_type != self.msg_type || length != self.body.len() || end > length {
            return;
        }

        if fragment.is_empty() {
            if offset == 0 && self.missing.first().map(|r| r.is_empty()).unwrap_or(false) {
                self.missing.clear();
            }
            return;
        }

        let mut i = 0;
        while i < self.missing.len() {
            let range = self.missing[i].clone();
            if range.start >= end {
                break;
            }
            if range.end <= offset {
                i += 1;
                continue;
            }

            let copy_start = range.start.max(offset);
            let copy_end = range.end.min(end);
            self.body[copy_start..copy_end]
                .copy_from_slice(&fragment[copy_start - offset..copy_end - offset]);

            match (range.start < offset, range.end > end) {
                (true, true) => {
                    self.missing[i] = range.start..offset;
                    self.missing.insert(i + 1, end..range.end);
                    break;
                }
                (true, false) => {
                    self.missing[i] = range.start..offset;
                    i += 1;
                }
                (false, true) => {
                    self.missing[i] = end..range.end;
                    break;
                }
                (false, false) => {
                    self.missing.remove(i);
                }
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn body_if_complete(&self) -> Option<&[u8]> {
        self.is_complete().then_some(self.body.as_slice())
    }

    /// Forget every fragment received.
    pub fn reset(&mut self) {
        self.missing.clear();
        self.missing.push(0..self.body.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<u8> {
        (0..100).collect()
    }

    fn reassemble(pieces: &[(usize, usize)]) -> DtlsReassembler {
        let body = body();
        let mut r = DtlsReassembler::new(MessageType::Certificate, body.len());
        for &(offset, len) in pieces {
            r.contribute_fragment(
                MessageType::Certificate,
                body.len(),
                &body[offset..offset + len],
                offset,
            );
        }
        r
    }

    #[test]
    fn any_order_yields_same_body() {
        let orders: &[&[(usize, usize)]] = &[
            &[(0, 40), (40, 40), (80, 20)],
            &[(80, 20), (0, 40), (40, 40)],
            &[(40, 40), (80, 20), (0, 40)],
            // Overlapping and duplicated.
            &[(10, 50), (0, 30), (10, 50), (50, 50)],
            &[(30, 10), (0, 100)],
            &[(99, 1), (0, 99), (0, 1)],
        ];
        for pieces in orders {
            let r = reassemble(pieces);
            assert_eq!(r.body_if_complete(), Some(&body()[..]), "{:?}", pieces);
        }
    }

    #[test]
    fn incomplete_until_gap_filled() {
        let mut r = reassemble(&[(0, 30), (60, 40)]);
        assert!(r.body_if_complete().is_none());

        // Splits the remaining gap.
        r.contribute_fragment(MessageType::Certificate, 100, &body()[40..50], 40);
        assert!(r.body_if_complete().is_none());
        r.contribute_fragment(MessageType::Certificate, 100, &body()[30..40], 30);
        assert!(r.body_if_complete().is_none());
        r.contribute_fragment(MessageType::Certificate, 100, &body()[50..60], 50);
        assert_eq!(r.body_if_complete(), Some(&body()[..]));
    }

    #[test]
    fn mismatched_fragments_ignored() {
        let mut r = DtlsReassembler::new(MessageType::Certificate, 100);
        r.contribute_fragment(MessageType::Finished, 100, &body(), 0);
        r.contribute_fragment(MessageType::Certificate, 99, &body()[..99], 0);
        r.contribute_fragment(MessageType::Certificate, 100, &body()[..10], 95);
        assert!(!r.is_complete());
        assert_eq!(r.msg_type(), MessageType::Certificate);
    }

    #[test]
    fn zero_length_message() {
        let mut r = DtlsReassembler::new(MessageType::ServerHelloDone, 0);
        assert!(r.body_if_complete().is_none());
        r.contribute_fragment(MessageType::ServerHelloDone, 0, &[], 0);
        assert_eq!(r.body_if_complete(), Some(&[][..]));
    }

    #[test]
    fn reset_forgets_fragments() {
        let mut r = reassemble(&[(0, 100)]);
        assert!(r.is_complete());
        r.reset();
        assert!(r.body_if_complete().is_none());

        let mut r = DtlsReassembler::new(MessageType::ServerHelloDone, 0);
        r.contribute_fragment(MessageType::ServerHelloDone, 0, &[], 0);
        r.reset();
        assert!(!r.is_complete());
    }
}
