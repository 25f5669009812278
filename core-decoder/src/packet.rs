//! Compressed audio packets handed from the reader to the decoder.

use bytes::Bytes;
use std::fmt;

/// One chunk of compressed bitstream.
///
/// A packet is moved into the queue and moved out of it exactly once; the
/// payload is released when the decoder drops it.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Position in reader order, starting at 0 for each stream.
    pub seq: u64,
    pub data: Bytes,
}

impl Packet {
    pub fn new(seq: u64, data: impl Into<Bytes>) -> Self {
        Self {
            seq,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("seq", &self.seq)
            .field("len", &self.data.len())
            .finish()
    }
}
