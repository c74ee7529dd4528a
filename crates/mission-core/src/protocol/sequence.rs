//! Packet sequence counter for the pixel sender.
//!
//! # Why number pixel packets? (for beginners)
//!
//! PixelPusher controllers track the sequence number at the start of every
//! pixel packet.  A gap tells the controller (and anyone watching its
//! statistics) that packets were lost on the network; a repeated number
//! marks a duplicate.  The field is 32 bits wide, so the counter wraps at
//! `u32::MAX` exactly like the controller expects.
//!
//! # Thread safety
//!
//! The counter is an `AtomicU32`.  One device's render loop is the only
//! writer in practice, but the counter lives behind an `Arc` shared with the
//! device handle, so a lock-free atomic is the natural fit.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, wrapping counter of pixel packet sequence numbers.
///
/// # Examples
///
/// ```rust
/// use mission_core::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next sequence number.  Wraps from `u32::MAX` to 0.
    ///
    /// `Relaxed` ordering is enough: the number orders packets on the wire,
    /// it does not publish any other memory.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will yield.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        assert_eq!(SequenceCounter::new().next(), 0);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u32_max() {
        // Arrange
        let counter = SequenceCounter {
            inner: AtomicU32::new(u32::MAX),
        };

        // Act
        let before = counter.next();
        let after = counter.next();

        // Assert
        assert_eq!(before, u32::MAX);
        assert_eq!(after, 0, "counter must wrap to 0 after u32::MAX");
    }

    #[test]
    fn test_current_does_not_increment() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_sequence_numbers_are_unique_across_threads() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }
}
