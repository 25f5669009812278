//! # Bitstream Reader
//!
//! The "getpackage" loop: pulls compressed bytes from the bitstream source in
//! frame-sized units and hands them to the packet queue.
//!
//! A packet the queue rejects is held and retried before anything else is
//! read, so backpressure never drops data. Every wait is bounded and wakes on
//! the stream's exit flag.

use crate::config::ReaderConfig;
use crate::exit::ExitFlag;
use crate::format::CodecFormat;
use crate::frame_sizer::{FrameSizer, SizerOutcome};
use crate::packet::Packet;
use crate::packet_queue::PacketQueue;
use bridge_traits::BitstreamSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// What one reader iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStep {
    /// A packet entered the queue.
    Queued,
    /// The queue was full; the packet is held for the next step.
    Held,
    /// Header scanning made progress.
    Scanning,
    /// Nothing to read yet.
    Starved,
    /// Exit was requested.
    Exit,
}

/// Counters reported when the reader exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub packets_queued: u64,
    pub bytes_read: u64,
    pub full_rejections: u64,
    pub starved_reads: u64,
    pub alloc_failures: u64,
    /// Packets freed on exit without being queued.
    pub packets_discarded: u64,
}

pub struct BitstreamReader {
    source: Arc<dyn BitstreamSource>,
    queue: Arc<PacketQueue>,
    sizer: FrameSizer,
    exit: ExitFlag,
    config: ReaderConfig,
    queue_retry: Duration,
    wfd_guard: bool,
    held: Option<Packet>,
    next_seq: u64,
    stats: ReaderStats,
}

impl BitstreamReader {
    pub fn new(
        source: Arc<dyn BitstreamSource>,
        queue: Arc<PacketQueue>,
        sizer: FrameSizer,
        exit: ExitFlag,
        config: ReaderConfig,
        queue_retry: Duration,
    ) -> Self {
        let wfd_guard = config.wfd_mode && sizer.format().is_aac();
        Self {
            source,
            queue,
            sizer,
            exit,
            config,
            queue_retry,
            wfd_guard,
            held: None,
            next_seq: 0,
            stats: ReaderStats::default(),
        }
    }

    pub fn format(&self) -> CodecFormat {
        self.sizer.format()
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Whether a rejected packet is waiting to be queued.
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Run until the exit flag is raised.
    pub fn run(mut self) -> ReaderStats {
        debug!(format = %self.format(), "Bitstream reader started");
        while self.step() != ReaderStep::Exit {}

        if self.held.take().is_some() {
            self.stats.packets_discarded += 1;
        }
        debug!(
            packets = self.stats.packets_queued,
            bytes = self.stats.bytes_read,
            rejections = self.stats.full_rejections,
            "Bitstream reader exited"
        );
        self.stats
    }

    /// One iteration of the loop.
    pub fn step(&mut self) -> ReaderStep {
        if self.exit.is_set() {
            return ReaderStep::Exit;
        }

        if let Some(packet) = self.held.take() {
            return self.enqueue(packet);
        }

        let size = match self.sizer.next_unit_size(self.source.as_ref()) {
            SizerOutcome::UseDefault(n) | SizerOutcome::Exact(n) => n,
            SizerOutcome::NeedMoreSyncBytes => return ReaderStep::Scanning,
            SizerOutcome::Retry => {
                self.stats.starved_reads += 1;
                if self.exit.wait_timeout(Duration::from_millis(self.config.sizer_retry_ms)) {
                    return ReaderStep::Exit;
                }
                return ReaderStep::Starved;
            }
        };

        let mut data = Vec::new();
        if data.try_reserve_exact(size).is_err() {
            self.stats.alloc_failures += 1;
            warn!(size, "Packet allocation failed, retrying");
            if self.exit.wait_timeout(Duration::from_millis(self.config.sizer_retry_ms)) {
                return ReaderStep::Exit;
            }
            return ReaderStep::Starved;
        }
        data.resize(size, 0);

        let Some(filled) = self.fill(&mut data) else {
            return ReaderStep::Exit;
        };
        data.truncate(filled);
        self.stats.bytes_read += filled as u64;

        let packet = Packet::new(self.next_seq, data);
        self.next_seq += 1;
        trace!(seq = packet.seq, len = packet.len(), "Packet assembled");
        self.enqueue(packet)
    }

    /// Read into `buf` in bounded sub-reads. Returns `None` on exit.
    fn fill(&mut self, buf: &mut [u8]) -> Option<usize> {
        let starved_wait = Duration::from_millis(self.config.starved_wait_ms);
        let mut filled = 0;

        while filled < buf.len() {
            if self.exit.is_set() {
                return None;
            }

            let end = (filled + self.config.sub_read_bytes).min(buf.len());
            let n = self.source.read_bytes(&mut buf[filled..end]);
            if n == 0 {
                self.stats.starved_reads += 1;
                if self.exit.wait_timeout(starved_wait) {
                    return None;
                }
                continue;
            }
            filled += n.min(end - filled);

            if self.wfd_guard && filled > self.config.wfd_early_exit_bytes {
                break;
            }
        }

        Some(filled)
    }

    fn enqueue(&mut self, packet: Packet) -> ReaderStep {
        match self.queue.push(packet) {
            Ok(()) => {
                self.stats.packets_queued += 1;
                ReaderStep::Queued
            }
            Err(full) => {
                self.stats.full_rejections += 1;
                trace!(seq = full.packet.seq, "Queue full, holding packet");
                self.held = Some(full.packet);
                self.queue.wait_for_space(self.queue_retry);
                if self.exit.is_set() {
                    ReaderStep::Exit
                } else {
                    ReaderStep::Held
                }
            }
        }
    }
}

impl std::fmt::Debug for BitstreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitstreamReader")
            .field("format", &self.format())
            .field("next_seq", &self.next_seq)
            .field("holding", &self.held.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ByteSource {
        bytes: Mutex<VecDeque<u8>>,
        max_read: usize,
    }

    impl ByteSource {
        fn new(len: usize, max_read: usize) -> Arc<Self> {
            Arc::new(Self {
                bytes: Mutex::new((0..len).map(|i| i as u8).collect()),
                max_read,
            })
        }
    }

    impl BitstreamSource for ByteSource {
        fn read_bytes(&self, buf: &mut [u8]) -> usize {
            let mut bytes = self.bytes.lock();
            let n = buf.len().min(self.max_read).min(bytes.len());
            for slot in buf.iter_mut().take(n) {
                *slot = bytes.pop_front().unwrap_or(0);
            }
            n
        }
    }

    fn reader(
        source: Arc<dyn BitstreamSource>,
        queue: Arc<PacketQueue>,
        format: CodecFormat,
        config: ReaderConfig,
    ) -> BitstreamReader {
        let sizer = FrameSizer::new(format, 2048, config.max_unit_bytes);
        BitstreamReader::new(
            source,
            queue,
            sizer,
            ExitFlag::new(),
            config,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_reads_fixed_units_with_short_reads() {
        let queue = Arc::new(PacketQueue::new(4));
        let source = ByteSource::new(1024, 100);
        let mut reader = reader(source, Arc::clone(&queue), CodecFormat::Ac3, ReaderConfig::default());

        assert_eq!(reader.step(), ReaderStep::Queued);
        assert_eq!(reader.step(), ReaderStep::Queued);

        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        assert_eq!((first.seq, first.len()), (0, 512));
        assert_eq!((second.seq, second.len()), (1, 512));
        assert_eq!(first.data[1], 1);
        assert_eq!(second.data[0], 0);
        assert_eq!(reader.stats().bytes_read, 1024);
    }

    #[test]
    fn test_full_queue_holds_packet() {
        let queue = Arc::new(PacketQueue::new(1));
        let source = ByteSource::new(2048, 512);
        let mut reader = reader(source, Arc::clone(&queue), CodecFormat::Ac3, ReaderConfig::default());

        assert_eq!(reader.step(), ReaderStep::Queued);
        assert_eq!(reader.step(), ReaderStep::Held);
        assert!(reader.is_holding());
        assert_eq!(reader.step(), ReaderStep::Held);

        assert_eq!(queue.pop().map(|p| p.seq), Some(0));
        assert_eq!(reader.step(), ReaderStep::Queued);
        assert_eq!(queue.pop().map(|p| p.seq), Some(1));
        assert_eq!(reader.stats().full_rejections, 2);
    }

    #[test]
    fn test_wfd_guard_caps_aac_reads() {
        let queue = Arc::new(PacketQueue::new(4));
        let source = ByteSource::new(4096, 128);
        let config = ReaderConfig {
            wfd_mode: true,
            ..ReaderConfig::default()
        };
        let mut reader = reader(source, Arc::clone(&queue), CodecFormat::Aac, config);

        assert_eq!(reader.step(), ReaderStep::Queued);
        // 128-byte reads stop at the first total above 300
        assert_eq!(queue.pop().unwrap().len(), 384);
    }

    #[test]
    fn test_exit_while_starved() {
        let queue = Arc::new(PacketQueue::new(4));
        let source = ByteSource::new(100, 512);
        let mut reader = reader(source, Arc::clone(&queue), CodecFormat::Ac3, ReaderConfig::default());
        let exit = reader.exit.clone();

        let handle = std::thread::spawn(move || reader.run());
        std::thread::sleep(Duration::from_millis(30));
        exit.request();

        let stats = handle.join().unwrap();
        assert_eq!(stats.packets_queued, 0);
        assert!(stats.starved_reads > 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_self_delimited_units() {
        let mut stream = b"APTS".to_vec();
        stream.extend_from_slice(&4u32.to_le_bytes());
        stream.extend_from_slice(&[0xEE; 12]);

        struct Scripted(Mutex<VecDeque<u8>>);
        impl BitstreamSource for Scripted {
            fn read_bytes(&self, buf: &mut [u8]) -> usize {
                let mut bytes = self.0.lock();
                let n = buf.len().min(bytes.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = bytes.pop_front().unwrap_or(0);
                }
                n
            }
        }

        let queue = Arc::new(PacketQueue::new(4));
        let source = Arc::new(Scripted(Mutex::new(stream.into())));
        let mut reader = reader(source, Arc::clone(&queue), CodecFormat::Ape, ReaderConfig::default());

        assert_eq!(reader.step(), ReaderStep::Queued);
        let packet = queue.pop().unwrap();
        assert_eq!(packet.len(), 12);
        assert!(packet.data.iter().all(|&b| b == 0xEE));
    }
}
