//! Byte accumulation for the stream record layer.
//!
//! [`ByteQueue`] collects bytes as they arrive from a transport and lets the
//! record and handshake layers peek at headers before consuming whole units.

use std::fmt;

const MIN_CAPACITY: usize = 1024;

/// Growable FIFO of bytes.
///
/// The backing storage always has a power of two capacity. Consuming bytes
/// only advances a cursor; the live region is compacted to the front on the
/// next append that would otherwise not fit.
///
/// Reading or removing beyond [`available()`](ByteQueue::available) is a
/// programming error and panics.
#[derive(Default)]
pub struct ByteQueue {
    data: Vec<u8>,
    skipped: usize,
    available: usize,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteQueue {
            data: vec![0; capacity.max(1).next_power_of_two()],
            skipped: 0,
            available: 0,
        }
    }

    /// Number of bytes that can be read.
    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Append bytes at the end of the queue.
    pub fn add_data(&mut self, buf: &[u8]) {
        if buf.is_empty() {
            return;
        }

        if self.skipped + self.available + buf.len() > self.data.len() {
            let needed = self.available + buf.len();
            if needed <= self.data.len() {
                // Compact the live bytes to the front.
                self.data
                    .copy_within(self.skipped..self.skipped + self.available, 0);
            } else {
                let capacity = needed.max(MIN_CAPACITY).next_power_of_two();
                let mut grown = vec![0; capacity];
                grown[..self.available]
                    .copy_from_slice(&self.data[self.skipped..self.skipped + self.available]);
                self.data = grown;
            }
            self.skipped = 0;
        }

        let start = self.skipped + self.available;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        self.available += buf.len();
    }

    /// The readable bytes as one slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.skipped..self.skipped + self.available]
    }

    /// Copy `dst.len()` bytes starting `skip` bytes in, without consuming.
    pub fn read(&self, dst: &mut [u8], skip: usize) {
        self.check(dst.len(), skip);
        let start = self.skipped + skip;
        dst.copy_from_slice(&self.data[start..start + dst.len()]);
    }

    pub fn read_u8(&self, skip: usize) -> u8 {
        self.check(1, skip);
        self.data[self.skipped + skip]
    }

    pub fn read_u16(&self, skip: usize) -> u16 {
        self.check(2, skip);
        let i = self.skipped + skip;
        u16::from_be_bytes([self.data[i], self.data[i + 1]])
    }

    pub fn read_u24(&self, skip: usize) -> u32 {
        self.check(3, skip);
        let i = self.skipped + skip;
        u32::from_be_bytes([0, self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Discard `len` bytes from the front.
    pub fn remove(&mut self, len: usize) {
        self.check(len, 0);
        self.available -= len;
        if self.available == 0 {
            self.skipped = 0;
        } else {
            self.skipped += len;
        }
    }

    /// Copy `dst.len()` bytes starting `skip` bytes in, then discard
    /// `skip + dst.len()` bytes.
    pub fn remove_into(&mut self, dst: &mut [u8], skip: usize) {
        self.read(dst, skip);
        self.remove(skip + dst.len());
    }

    /// Take `len` bytes starting `skip` bytes in, discarding the skipped
    /// prefix as well.
    pub fn remove_data(&mut self, len: usize, skip: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.remove_into(&mut out, skip);
        out
    }

    /// Release unused capacity.
    pub fn shrink(&mut self) {
        if self.available == 0 {
            self.data = Vec::new();
            self.skipped = 0;
            return;
        }
        let capacity = self.available.next_power_of_two();
        if capacity < self.data.len() {
            let mut shrunk = vec![0; capacity];
            shrunk[..self.available].copy_from_slice(self.as_slice());
            self.data = shrunk;
            self.skipped = 0;
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn check(&self, len: usize, skip: usize) {
        assert!(
            skip + len <= self.available,
            "ByteQueue: cannot access {} bytes at offset {}, only {} available",
            len,
            skip,
            self.available
        );
    }
}

impl fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteQueue")
            .field("available", &self.available)
            .field("capacity", &self.data.len())
            .finish()
    }
}
