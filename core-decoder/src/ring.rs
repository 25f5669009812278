//! # Output Ring Buffer
//!
//! Fixed-capacity byte ring between the decode loop (producer) and the
//! output stage (consumer).
//!
//! ## Design
//!
//! - **Never overwrites**: a writer that finds no room waits for the reader
//! - **Level mirror**: `level` is kept in an atomic so status queries and the
//!   PTS tracker never take the lock
//! - **Invariant**: `0 <= level <= length` at every observable point

use crate::exit::ExitFlag;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct RingState {
    buf: Vec<u8>,
    read_pos: usize,
    level: usize,
}

pub struct OutputRing {
    state: Mutex<RingState>,
    length: usize,
    level: AtomicUsize,
    readable: Condvar,
    writable: Condvar,
}

impl OutputRing {
    /// Allocate a ring of `length` bytes.
    ///
    /// Returns `None` if the allocation cannot be satisfied.
    pub fn try_new(length: usize) -> Option<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(length).ok()?;
        buf.resize(length, 0);
        Some(Self {
            state: Mutex::new(RingState {
                buf,
                read_pos: 0,
                level: 0,
            }),
            length,
            level: AtomicUsize::new(0),
            readable: Condvar::new(),
            writable: Condvar::new(),
        })
    }

    /// Bytes currently buffered.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    /// Capacity in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn free_space(&self) -> usize {
        self.length - self.level()
    }

    /// Copy as much of `data` as fits. Returns the number of bytes written.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() || self.length == 0 {
            return 0;
        }

        let mut state = self.state.lock();
        let free = self.length - state.level;
        let n = free.min(data.len());
        if n == 0 {
            return 0;
        }

        let write_pos = (state.read_pos + state.level) % self.length;
        let first = n.min(self.length - write_pos);
        state.buf[write_pos..write_pos + first].copy_from_slice(&data[..first]);
        if first < n {
            state.buf[..n - first].copy_from_slice(&data[first..n]);
        }
        state.level += n;
        self.level.store(state.level, Ordering::Release);
        drop(state);

        self.readable.notify_all();
        n
    }

    /// Copy up to `out.len()` bytes out of the ring.
    pub fn read(&self, out: &mut [u8]) -> usize {
        self.take(out.len(), Some(out), 1)
    }

    /// Like [`OutputRing::read`], but only whole multiples of `align` bytes.
    pub fn read_aligned(&self, out: &mut [u8], align: usize) -> usize {
        self.take(out.len(), Some(out), align.max(1))
    }

    /// Throw away up to `max` buffered bytes.
    pub fn discard(&self, max: usize) -> usize {
        self.take(max, None, 1)
    }

    /// Throw away up to `max` bytes in whole multiples of `align`.
    pub fn discard_aligned(&self, max: usize, align: usize) -> usize {
        self.take(max, None, align.max(1))
    }

    fn take(&self, max: usize, out: Option<&mut [u8]>, align: usize) -> usize {
        let mut state = self.state.lock();
        let available = state.level.min(max);
        let n = available - available % align;
        if n == 0 {
            return 0;
        }

        if let Some(out) = out {
            let first = n.min(self.length - state.read_pos);
            let read_pos = state.read_pos;
            out[..first].copy_from_slice(&state.buf[read_pos..read_pos + first]);
            if first < n {
                out[first..n].copy_from_slice(&state.buf[..n - first]);
            }
        }

        state.read_pos = (state.read_pos + n) % self.length;
        state.level -= n;
        self.level.store(state.level, Ordering::Release);
        drop(state);

        self.writable.notify_all();
        n
    }

    /// Write all of `data`, waiting in steps of `wait` whenever the ring is
    /// full.
    ///
    /// Returns `false` if `exit` was raised before everything was written.
    pub fn write_all(&self, data: &[u8], exit: &ExitFlag, wait: Duration) -> bool {
        let mut offset = 0;
        while offset < data.len() {
            if exit.is_set() {
                return false;
            }
            let written = self.write(&data[offset..]);
            offset += written;
            if written == 0 {
                self.wait_for_space(1, wait);
            }
        }
        true
    }

    /// Wait up to `timeout` for at least `min` bytes of free space.
    pub fn wait_for_space(&self, min: usize, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if self.length - state.level < min {
            self.writable.wait_for(&mut state, timeout);
        }
        self.length - state.level >= min
    }

    /// Wait up to `timeout` for at least `min` buffered bytes.
    pub fn wait_for_data(&self, min: usize, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.level < min {
            self.readable.wait_for(&mut state, timeout);
        }
        state.level >= min
    }

    /// Wait up to `timeout` for the level to fall to `threshold` or below.
    pub fn wait_for_drain(&self, threshold: usize, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.level > threshold {
            self.writable.wait_for(&mut state, timeout);
        }
        state.level <= threshold
    }

    /// Drop everything buffered.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.read_pos = 0;
        state.level = 0;
        self.level.store(0, Ordering::Release);
        drop(state);
        self.writable.notify_all();
    }

    /// Wake every waiter so it can observe an exit request.
    pub fn interrupt(&self) {
        let _state = self.state.lock();
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

impl std::fmt::Debug for OutputRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRing")
            .field("level", &self.level())
            .field("length", &self.length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_read_wraps() {
        let ring = OutputRing::try_new(8).unwrap();
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 6);

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);

        assert_eq!(ring.write(&[7, 8, 9, 10, 11, 12]), 6);
        assert_eq!(ring.level(), 8);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(out, [5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(ring.level(), 0);
    }

    #[test]
    fn test_never_overwrites() {
        let ring = OutputRing::try_new(4).unwrap();
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(ring.write(&[9]), 0);
        assert_eq!(ring.level(), ring.length());
        assert_eq!(ring.free_space(), 0);
    }

    #[test]
    fn test_read_aligned() {
        let ring = OutputRing::try_new(16).unwrap();
        ring.write(&[0u8; 7]);

        let mut out = [0u8; 16];
        assert_eq!(ring.read_aligned(&mut out, 4), 4);
        assert_eq!(ring.level(), 3);
        assert_eq!(ring.read_aligned(&mut out, 4), 0);
    }

    #[test]
    fn test_discard() {
        let ring = OutputRing::try_new(16).unwrap();
        ring.write(&[1u8; 10]);
        assert_eq!(ring.discard(4), 4);
        assert_eq!(ring.discard(100), 6);
        assert_eq!(ring.discard(100), 0);

        ring.write(&[1u8; 10]);
        assert_eq!(ring.discard_aligned(100, 4), 8);
        assert_eq!(ring.level(), 2);
    }

    #[test]
    fn test_write_all_waits_for_reader() {
        let ring = Arc::new(OutputRing::try_new(64).unwrap());
        let exit = ExitFlag::new();

        let reader_ring = Arc::clone(&ring);
        let reader = thread::spawn(move || {
            let mut total = 0;
            let mut out = [0u8; 32];
            while total < 256 {
                if reader_ring.wait_for_data(1, Duration::from_millis(50)) {
                    total += reader_ring.read(&mut out);
                }
            }
            total
        });

        let data = vec![0x5Au8; 256];
        assert!(ring.write_all(&data, &exit, Duration::from_millis(10)));
        assert_eq!(reader.join().unwrap(), 256);
    }

    #[test]
    fn test_write_all_stops_on_exit() {
        let ring = OutputRing::try_new(4).unwrap();
        let exit = ExitFlag::new();
        exit.request();
        assert!(!ring.write_all(&[0u8; 16], &exit, Duration::from_millis(1)));
    }

    #[test]
    fn test_clear() {
        let ring = OutputRing::try_new(8).unwrap();
        ring.write(&[1, 2, 3]);
        ring.clear();
        assert_eq!(ring.level(), 0);
        assert!(ring.wait_for_drain(0, Duration::from_millis(1)));
    }
}
