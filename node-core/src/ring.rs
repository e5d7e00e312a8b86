//! Fixed-capacity byte ring shared by the period handler and the transmitter.
//!
//! The period handler produces a payload burst and the transmitter-ready
//! interrupt drains it one byte at a time. The ring itself carries no lock:
//! both sides run in non-nesting interrupt context, so the caller guarantees
//! that a producer call and a consumer call never interleave.

use core::fmt;

/// Failures reported by [`ByteRing`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingError {
    /// The ring already holds `capacity` bytes.
    Full,
    /// There is no byte to dequeue.
    Empty,
    /// A runtime capacity larger than the backing storage was requested.
    CapacityExceeded { requested: usize, max: usize },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::Full => f.write_str("ring buffer full"),
            RingError::Empty => f.write_str("ring buffer empty"),
            RingError::CapacityExceeded { requested, max } => {
                write!(f, "capacity {requested} exceeds storage of {max} bytes")
            }
        }
    }
}

/// Circular FIFO of bytes backed by `N` bytes of inline storage.
///
/// The usable capacity is chosen at runtime with [`allocate`](Self::allocate)
/// and may be smaller than `N`.
#[derive(Clone, Debug)]
pub struct ByteRing<const N: usize> {
    storage: [u8; N],
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl<const N: usize> ByteRing<N> {
    /// Creates an empty ring using the whole backing storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            capacity: N,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Sets the usable capacity and empties the ring.
    ///
    /// Any unread bytes are discarded, so this must only run while the
    /// consumer is idle.
    ///
    /// # Errors
    ///
    /// [`RingError::CapacityExceeded`] when `capacity` is larger than the
    /// backing storage.
    pub fn allocate(&mut self, capacity: usize) -> Result<(), RingError> {
        if capacity > N {
            return Err(RingError::CapacityExceeded {
                requested: capacity,
                max: N,
            });
        }
        self.capacity = capacity;
        self.clear();
        Ok(())
    }

    /// Drops every stored byte while keeping the current capacity.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Appends one byte.
    ///
    /// # Errors
    ///
    /// [`RingError::Full`] when no slot is free.
    pub fn enqueue(&mut self, byte: u8) -> Result<(), RingError> {
        if self.is_full() {
            return Err(RingError::Full);
        }
        self.storage[self.tail] = byte;
        self.tail = self.advance(self.tail);
        self.count += 1;
        Ok(())
    }

    /// Appends every byte of `bytes`, or none of them when they do not fit.
    ///
    /// # Errors
    ///
    /// [`RingError::Full`] when fewer than `bytes.len()` slots are free.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), RingError> {
        if bytes.len() > self.free() {
            return Err(RingError::Full);
        }
        for byte in bytes {
            self.enqueue(*byte)?;
        }
        Ok(())
    }

    /// Removes and returns the oldest byte.
    ///
    /// # Errors
    ///
    /// [`RingError::Empty`] when nothing is stored.
    pub fn dequeue(&mut self) -> Result<u8, RingError> {
        if self.is_empty() {
            return Err(RingError::Empty);
        }
        let byte = self.storage[self.head];
        self.head = self.advance(self.head);
        self.count -= 1;
        Ok(byte)
    }

    /// Number of stored bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Usable capacity selected by the last [`allocate`](Self::allocate).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining free slots.
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity - self.count
    }

    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next >= self.capacity { 0 } else { next }
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order_across_wraparound() {
        let mut ring: ByteRing<4> = ByteRing::new();
        ring.extend_from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(ring.dequeue(), Ok(1));
        assert_eq!(ring.dequeue(), Ok(2));

        ring.extend_from_slice(&[4, 5, 6]).unwrap();
        assert!(ring.is_full());

        let mut drained = [0u8; 4];
        for slot in &mut drained {
            *slot = ring.dequeue().unwrap();
        }
        assert_eq!(drained, [3, 4, 5, 6]);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_and_empty_failures_leave_state_untouched() {
        let mut ring: ByteRing<2> = ByteRing::new();
        assert_eq!(ring.dequeue(), Err(RingError::Empty));
        assert_eq!(ring.len(), 0);

        ring.enqueue(7).unwrap();
        ring.enqueue(8).unwrap();
        assert_eq!(ring.enqueue(9), Err(RingError::Full));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.dequeue(), Ok(7));
        assert_eq!(ring.dequeue(), Ok(8));
    }

    #[test]
    fn allocate_discards_residual_bytes_and_limits_capacity() {
        let mut ring: ByteRing<8> = ByteRing::new();
        ring.extend_from_slice(&[1, 2, 3]).unwrap();

        ring.allocate(2).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 2);
        assert_eq!(ring.extend_from_slice(&[1, 2, 3]), Err(RingError::Full));
        assert!(ring.is_empty(), "partial slices must not be written");

        assert_eq!(
            ring.allocate(9),
            Err(RingError::CapacityExceeded {
                requested: 9,
                max: 8
            })
        );
        assert_eq!(ring.capacity(), 2);
    }

    #[test]
    fn zero_capacity_ring_rejects_everything() {
        let mut ring: ByteRing<4> = ByteRing::new();
        ring.allocate(0).unwrap();
        assert!(ring.is_full());
        assert!(ring.is_empty());
        assert_eq!(ring.enqueue(1), Err(RingError::Full));
        assert_eq!(ring.dequeue(), Err(RingError::Empty));
    }
}
