//! Scripted compressed-byte source.

use bridge_traits::BitstreamSource;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Byte FIFO implementing [`BitstreamSource`].
///
/// An empty FIFO reads as 0 bytes ("try later"), exactly like a starved
/// hardware buffer.
#[derive(Debug)]
pub struct ScriptedBitstream {
    bytes: Mutex<VecDeque<u8>>,
    max_read: AtomicUsize,
    total_read: AtomicU64,
}

impl ScriptedBitstream {
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(VecDeque::new()),
            max_read: AtomicUsize::new(usize::MAX),
            total_read: AtomicU64::new(0),
        }
    }

    /// Source pre-loaded with `data`.
    pub fn with_data(data: &[u8]) -> Self {
        let source = Self::new();
        source.push(data);
        source
    }

    /// Append bytes for later reads.
    pub fn push(&self, data: &[u8]) {
        self.bytes.lock().extend(data.iter().copied());
    }

    /// Cap the bytes returned by any single read.
    pub fn set_max_read(&self, max: usize) {
        self.max_read.store(max.max(1), Ordering::Release);
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Bytes handed out so far.
    pub fn total_read(&self) -> u64 {
        self.total_read.load(Ordering::Acquire)
    }
}

impl Default for ScriptedBitstream {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstreamSource for ScriptedBitstream {
    fn read_bytes(&self, buf: &mut [u8]) -> usize {
        let mut bytes = self.bytes.lock();
        let n = buf
            .len()
            .min(self.max_read.load(Ordering::Acquire))
            .min(bytes.len());
        for (slot, byte) in buf.iter_mut().zip(bytes.drain(..n)) {
            *slot = byte;
        }
        self.total_read.fetch_add(n as u64, Ordering::AcqRel);
        n
    }

    fn buffered_bytes(&self) -> Option<usize> {
        Some(self.remaining())
    }
}
