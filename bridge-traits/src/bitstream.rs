//! Compressed bitstream source.

/// Source of compressed audio bytes, typically the hardware demux FIFO.
///
/// Reads are "non-blocking-ish": an implementation may return fewer bytes
/// than requested, and `0` means "nothing available yet, try later". A zero
/// read is never an error for the caller.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::bitstream::BitstreamSource;
///
/// fn fill(source: &dyn BitstreamSource, buf: &mut [u8]) -> usize {
///     let mut filled = 0;
///     while filled < buf.len() {
///         let n = source.read_bytes(&mut buf[filled..]);
///         if n == 0 {
///             break;
///         }
///         filled += n;
///     }
///     filled
/// }
/// ```
pub trait BitstreamSource: Send + Sync {
    /// Copy up to `buf.len()` bytes into `buf`, returning how many were copied.
    fn read_bytes(&self, buf: &mut [u8]) -> usize;

    /// Bytes currently buffered upstream, when the hardware exposes it.
    fn buffered_bytes(&self) -> Option<usize> {
        None
    }
}
