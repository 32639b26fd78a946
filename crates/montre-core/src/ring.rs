//! Lock-free single-producer single-consumer rings.
//!
//! These carry note records, audio-thread commands and raw MIDI bytes between
//! threads. The API is a staged write: the producer stores any number of
//! values relative to its write position with [`Producer::write`], then
//! publishes them in one [`Producer::write_commit`]; the consumer mirrors this
//! with [`Consumer::read`] / [`Consumer::read_commit`]. Multi-word records
//! (a command plus a float argument) therefore never tear.
//!
//! Publication uses a release store on commit and an acquire load in
//! `read_avail`, so a reader that observes `n` committed slots also observes
//! the values written into them. Capacity is a power of two; indices are
//! free-running and masked.

use crate::{Error, Result};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared<T> {
    data: Box<[UnsafeCell<T>]>,
    mask: usize,
    nwr: AtomicUsize,
    nrd: AtomicUsize,
}

// The producer touches only slots in [nwr, nrd + size); the consumer only
// slots in [nrd, nwr). The atomics keep those windows disjoint.
unsafe impl<T: Copy + Send> Send for Shared<T> {}
unsafe impl<T: Copy + Send> Sync for Shared<T> {}

/// Write half of an SPSC ring.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// Read half of an SPSC ring.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a ring with `capacity` slots (must be a power of two).
pub fn ring<T: Copy + Default>(capacity: usize) -> Result<(Producer<T>, Consumer<T>)> {
    if !capacity.is_power_of_two() || capacity == 0 {
        return Err(Error::QueueCapacity(capacity));
    }
    let data = (0..capacity)
        .map(|_| UnsafeCell::new(T::default()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(Shared {
        data,
        mask: capacity - 1,
        nwr: AtomicUsize::new(0),
        nrd: AtomicUsize::new(0),
    });
    Ok((
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    ))
}

impl<T: Copy> Producer<T> {
    /// Free slots: capacity minus what is committed but unread.
    #[inline]
    pub fn write_avail(&self) -> usize {
        let s = &self.shared;
        s.data.len() - (s.nwr.load(Ordering::Relaxed) - s.nrd.load(Ordering::Acquire))
    }

    /// Stage `v` at `i` slots past the write position. Not visible to the
    /// consumer until committed. `i` must be below `write_avail()`.
    #[inline]
    pub fn write(&mut self, i: usize, v: T) {
        let s = &self.shared;
        let pos = (s.nwr.load(Ordering::Relaxed) + i) & s.mask;
        unsafe { *s.data[pos].get() = v };
    }

    /// Publish the first `n` staged slots.
    #[inline]
    pub fn write_commit(&mut self, n: usize) {
        self.shared.nwr.fetch_add(n, Ordering::Release);
    }
}

impl<T: Copy> Consumer<T> {
    /// Committed slots not yet consumed.
    #[inline]
    pub fn read_avail(&self) -> usize {
        let s = &self.shared;
        s.nwr.load(Ordering::Acquire) - s.nrd.load(Ordering::Relaxed)
    }

    /// Read the value `i` slots past the read position. `i` must be below
    /// `read_avail()`.
    #[inline]
    pub fn read(&self, i: usize) -> T {
        let s = &self.shared;
        let pos = (s.nrd.load(Ordering::Relaxed) + i) & s.mask;
        unsafe { *s.data[pos].get() }
    }

    /// Release the first `n` slots back to the producer.
    #[inline]
    pub fn read_commit(&mut self, n: usize) {
        self.shared.nrd.fetch_add(n, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pow2() {
        assert!(ring::<u32>(100).is_err());
        assert!(ring::<u32>(0).is_err());
    }

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = ring::<u32>(8).unwrap();
        for v in 0..5u32 {
            tx.write(v as usize, v * 10);
        }
        tx.write_commit(5);
        assert_eq!(rx.read_avail(), 5);
        for v in 0..5u32 {
            assert_eq!(rx.read(v as usize), v * 10);
        }
        rx.read_commit(5);
        assert_eq!(rx.read_avail(), 0);
    }

    #[test]
    fn test_staged_writes_invisible_until_commit() {
        let (mut tx, rx) = ring::<u16>(4).unwrap();
        tx.write(0, 7);
        assert_eq!(rx.read_avail(), 0);
        tx.write_commit(1);
        assert_eq!(rx.read_avail(), 1);
        assert_eq!(rx.read(0), 7);
    }

    #[test]
    fn test_wraparound() {
        let (mut tx, mut rx) = ring::<u8>(4).unwrap();
        for round in 0..10u8 {
            tx.write(0, round);
            tx.write_commit(1);
            assert_eq!(rx.read(0), round);
            rx.read_commit(1);
        }
        assert_eq!(tx.write_avail(), 4);
    }

    #[test]
    fn test_write_avail_accounts_for_unread() {
        let (mut tx, mut rx) = ring::<u32>(8).unwrap();
        tx.write(0, 1);
        tx.write(1, 2);
        tx.write_commit(2);
        assert_eq!(tx.write_avail(), 6);
        rx.read_commit(2);
        assert_eq!(tx.write_avail(), 8);
    }

    #[test]
    fn test_cross_thread_visibility() {
        let (mut tx, mut rx) = ring::<u32>(1024).unwrap();
        let writer = std::thread::spawn(move || {
            for v in 0..10_000u32 {
                while tx.write_avail() == 0 {
                    std::thread::yield_now();
                }
                tx.write(0, v);
                tx.write_commit(1);
            }
        });
        let mut expect = 0u32;
        while expect < 10_000 {
            let n = rx.read_avail();
            for i in 0..n {
                assert_eq!(rx.read(i), expect);
                expect += 1;
            }
            rx.read_commit(n);
        }
        writer.join().unwrap();
    }
}
