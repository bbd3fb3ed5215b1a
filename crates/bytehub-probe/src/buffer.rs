use std::fmt;

use tracing::trace;

use crate::error::{ProbeError, Result};

/// Smallest capacity a probe buffer may be created with.
pub const MIN_CAPACITY: usize = 16;

/// Capacity used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 32;

/// Fixed-capacity lookahead buffer.
///
/// Layout: `[consumed prefix | unread | free]` with
/// `consumed <= filled <= capacity`. The consumed prefix is reclaimed by
/// compaction on the next [`push`](Self::push).
pub struct ProbeBuffer {
    buf: Box<[u8]>,
    consumed: usize,
    filled: usize,
    compactions: u64,
}

impl ProbeBuffer {
    /// Allocate a buffer of exactly `capacity` bytes.
    ///
    /// Fails instead of aborting when the allocation cannot be satisfied.
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        if capacity < MIN_CAPACITY {
            return Err(ProbeError::CapacityTooSmall {
                requested: capacity,
                min: MIN_CAPACITY,
            });
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| ProbeError::Allocation { capacity })?;
        storage.resize(capacity, 0);

        Ok(Self {
            buf: storage.into_boxed_slice(),
            consumed: 0,
            filled: 0,
            compactions: 0,
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.filled - self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.filled == self.consumed
    }

    /// True when the unread region occupies the whole buffer.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Bytes a [`push`](Self::push) could accept after compaction.
    pub fn room(&self) -> usize {
        self.capacity() - self.len()
    }

    /// How many times unread data has been moved back to offset 0.
    pub fn compactions(&self) -> u64 {
        self.compactions
    }

    /// The unread region.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.consumed..self.filled]
    }

    /// Append as much of `bytes` as fits and return the number copied.
    ///
    /// Any consumed prefix is reclaimed first. Bytes that do not fit are
    /// left with the caller.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        if self.consumed > 0 {
            self.compact();
        }

        let n = bytes.len().min(self.capacity() - self.filled);
        self.buf[self.filled..self.filled + n].copy_from_slice(&bytes[..n]);
        self.filled += n;
        trace!(
            copied = n,
            offered = bytes.len(),
            unread = self.len(),
            "probe buffer push"
        );
        n
    }

    /// Mark `n` unread bytes as consumed.
    ///
    /// Consuming the last unread byte resets both cursors to 0.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len(), "consumed past unread region");
        self.consumed += n.min(self.len());
        if self.consumed == self.filled {
            self.consumed = 0;
            self.filled = 0;
        }
    }

    /// Drop every unread byte and return how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.consumed = 0;
        self.filled = 0;
        dropped
    }

    fn compact(&mut self) {
        let unread = self.len();
        self.buf.copy_within(self.consumed..self.filled, 0);
        trace!(shifted = unread, reclaimed = self.consumed, "probe buffer compaction");
        self.consumed = 0;
        self.filled = unread;
        self.compactions += 1;
    }
}

impl fmt::Debug for ProbeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeBuffer")
            .field("capacity", &self.capacity())
            .field("consumed", &self.consumed)
            .field("filled", &self.filled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn rejects_capacity_below_floor() {
        let err = ProbeBuffer::try_with_capacity(8).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::CapacityTooSmall {
                requested: 8,
                min: MIN_CAPACITY
            }
        ));
    }

    #[test]
    fn push_copies_only_what_fits() {
        let mut buf = ProbeBuffer::try_with_capacity(16).unwrap();
        assert_eq!(buf.push(&[7u8; 10]), 10);
        assert_eq!(buf.push(&[8u8; 10]), 6);
        assert!(buf.is_full());
        assert_eq!(buf.room(), 0);
        assert_eq!(buf.push(b"x"), 0);
    }

    #[test]
    fn push_compacts_partially_consumed_buffer() {
        let mut buf = ProbeBuffer::try_with_capacity(16).unwrap();
        buf.push(b"0123456789abcdef");
        buf.consume(10);
        assert_eq!(buf.unread(), b"abcdef");

        assert_eq!(buf.push(b"ghij"), 4);
        assert_eq!(buf.unread(), b"abcdefghij");
        assert_eq!(buf.compactions(), 1);
        assert_eq!(buf.room(), 6);
    }

    #[test]
    fn consuming_everything_resets_cursors() {
        let mut buf = ProbeBuffer::try_with_capacity(16).unwrap();
        buf.push(b"abcd");
        buf.consume(4);
        assert!(buf.is_empty());

        buf.push(b"efgh");
        assert_eq!(buf.unread(), b"efgh");
        assert_eq!(buf.compactions(), 0, "empty buffer needs no compaction");
    }

    #[test]
    fn clear_reports_dropped_bytes() {
        let mut buf = ProbeBuffer::try_with_capacity(16).unwrap();
        buf.push(b"abcdef");
        buf.consume(2);
        assert_eq!(buf.clear(), 4);
        assert!(buf.is_empty());
        assert_eq!(buf.room(), 16);
    }

    #[test]
    fn debug_shows_cursors() {
        let mut buf = ProbeBuffer::try_with_capacity(16).unwrap();
        buf.push(b"abc");
        buf.consume(1);
        assert_eq!(
            format!("{buf:?}"),
            "ProbeBuffer { capacity: 16, consumed: 1, filled: 3 }"
        );
    }

    proptest! {
        #[test]
        fn pushed_bytes_read_back_in_order(
            prefix in proptest::collection::vec(any::<u8>(), 0..32),
            consumed in 0usize..32,
            pushed in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            let mut buf = ProbeBuffer::try_with_capacity(32).unwrap();
            buf.push(&prefix);
            let consumed = consumed.min(buf.len());
            buf.consume(consumed);

            let before = buf.unread().to_vec();
            let copied = buf.push(&pushed);

            let mut expected = before;
            expected.extend_from_slice(&pushed[..copied]);
            prop_assert_eq!(buf.unread(), expected.as_slice());
            prop_assert!(buf.len() <= buf.capacity());
            prop_assert_eq!(copied, pushed.len().min(32 - (prefix.len().min(32) - consumed)));
        }
    }
}
