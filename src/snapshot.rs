//! # Double-buffered snapshot channel.
//!
//! One producer fills the back slot off-line and swaps it into view; any
//! number of readers copy the front slot out.
//!
//! ```text
//!  producer ──► back (exclusive) ──swap──► front ──clone──► reader 1..N
//!                                    │
//!                              publish_count += 1
//! ```
//!
//! ## Rules
//! - Readers never see a half-written value: only whole swaps are visible.
//! - The swap moves `T` by value, so keep large payloads behind a `Box`/`Arc`.
//! - Publishes may coalesce; a slow reader only sees the latest one.
//! - Readers observe a non-decreasing publish history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

pub struct DoubleBufferChannel<T> {
    back: Mutex<T>,
    front: Mutex<T>,
    published: AtomicU64,
}

impl<T: Default> Default for DoubleBufferChannel<T> {
    fn default() -> Self {
        Self::new(T::default(), T::default())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl<T> DoubleBufferChannel<T> {
    pub fn new(front: T, back: T) -> Self {
        Self {
            back: Mutex::new(back),
            front: Mutex::new(front),
            published: AtomicU64::new(0),
        }
    }

    /// Lets the producer fill the back slot in place, then publishes it.
    ///
    /// The back slot holds whatever was swapped out last time, so `fill`
    /// must overwrite every field it cares about.
    pub fn publish_with(&self, fill: impl FnOnce(&mut T)) {
        let mut back = lock(&self.back);
        fill(&mut back);
        let mut front = lock(&self.front);
        std::mem::swap(&mut *back, &mut *front);
        self.published.fetch_add(1, Ordering::Release);
    }

    pub fn publish(&self, value: T) {
        self.publish_with(|slot| *slot = value);
    }

    /// Number of completed publishes.
    pub fn publish_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}

impl<T: Clone> DoubleBufferChannel<T> {
    /// Copy of the most recently published value.
    pub fn read(&self) -> T {
        lock(&self.front).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Sample {
        seq: u64,
        check: u64,
    }

    #[test]
    fn initial_front_is_visible_before_publish() {
        let ch = DoubleBufferChannel::new(5u32, 0);
        assert_eq!(ch.read(), 5);
        assert_eq!(ch.publish_count(), 0);
    }

    #[test]
    fn latest_publish_wins() {
        let ch = DoubleBufferChannel::<u64>::default();
        for v in 1..=10 {
            ch.publish(v);
        }
        assert_eq!(ch.read(), 10);
        assert_eq!(ch.publish_count(), 10);
    }

    #[test]
    fn publish_with_reuses_swapped_out_slot() {
        let ch = DoubleBufferChannel::new(Vec::<u8>::new(), Vec::new());
        ch.publish_with(|v| v.push(1));
        ch.publish_with(|v| {
            assert!(v.is_empty(), "back slot is the old front");
            v.push(2);
        });
        assert_eq!(ch.read(), vec![2]);
    }

    #[test]
    fn concurrent_readers_never_see_torn_or_older_values() {
        let ch = Arc::new(DoubleBufferChannel::<Sample>::default());
        let producer = {
            let ch = Arc::clone(&ch);
            std::thread::spawn(move || {
                for seq in 1..=20_000u64 {
                    ch.publish_with(|s| {
                        s.seq = seq;
                        s.check = seq.wrapping_mul(31);
                    });
                }
            })
        };

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let ch = Arc::clone(&ch);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..20_000 {
                        let s = ch.read();
                        assert_eq!(s.check, s.seq.wrapping_mul(31));
                        assert!(s.seq >= last);
                        last = s.seq;
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(ch.read().seq, 20_000);
    }
}
