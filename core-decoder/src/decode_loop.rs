//! # Decode Loop
//!
//! Dequeues packets, drives the codec adapter over each payload and
//! publishes PCM into the output ring.
//!
//! ## Per-packet flow
//!
//! 1. Carry-over from the previous packet is prepended
//! 2. `decode` is called until the payload is used up, the adapter asks for
//!    more input, or a call fails
//! 3. Offsets and the error counter are updated after every call
//! 4. Produced PCM is written to the ring, waiting for space rather than
//!    dropping samples
//!
//! The main stream optionally mixes in PCM from the associated stream's
//! ring; the associated stream's own loop feeds that ring.

use crate::codec::{CodecAdapter, DecodeOutcome};
use crate::config::DecodeConfig;
use crate::context::DecodeContext;
use crate::exit::ExitFlag;
use crate::mixer;
use crate::packet::Packet;
use crate::packet_queue::PacketQueue;
use crate::ring::OutputRing;
use bridge_traits::PcmFormat;
use core_runtime::events::{DecoderEvent, EventBus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{DecoderError, Result};

/// Which pipeline a loop belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    Main,
    /// Audio description stream mixed into the main output.
    Associated,
}

impl StreamRole {
    pub fn reader_thread_name(self) -> &'static str {
        match self {
            StreamRole::Main => "adec-getpackage",
            StreamRole::Associated => "adec-ad-getpackage",
        }
    }

    pub fn decode_thread_name(self) -> &'static str {
        match self {
            StreamRole::Main => "adec-decode",
            StreamRole::Associated => "adec-ad-decode",
        }
    }
}

/// Associated-stream PCM to mix into the main stream.
#[derive(Debug)]
pub struct MixInput {
    pub ring: Arc<OutputRing>,
    pub main_gain: f32,
    pub associated_gain: f32,
    /// Bytes the associated ring must hold before mixing starts.
    pub prefill_bytes: usize,
    pub prefill_timeout: Duration,
    primed: bool,
    scratch: Vec<u8>,
}

impl MixInput {
    pub fn new(
        ring: Arc<OutputRing>,
        main_gain: f32,
        associated_gain: f32,
        prefill_bytes: usize,
        prefill_timeout: Duration,
    ) -> Self {
        Self {
            ring,
            main_gain,
            associated_gain,
            prefill_bytes,
            prefill_timeout,
            primed: false,
            scratch: Vec::new(),
        }
    }

    /// Wait, bounded, for the associated prefill. Returns `false` on exit.
    fn prime(&mut self, exit: &ExitFlag, poll: Duration) -> bool {
        if self.primed {
            return true;
        }
        let deadline = Instant::now() + self.prefill_timeout;
        while self.ring.level() < self.prefill_bytes.min(self.ring.length()) {
            if exit.is_set() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    level = self.ring.level(),
                    wanted = self.prefill_bytes,
                    "Associated audio prefill timed out, mixing anyway"
                );
                break;
            }
            self.ring
                .wait_for_data(self.prefill_bytes, poll.min(deadline - now));
        }
        self.primed = true;
        true
    }

    /// Mix whatever associated PCM is ready into `main` (stereo s16).
    fn mix(&mut self, main: &mut [u8]) {
        self.scratch.resize(main.len(), 0);
        let got = self.ring.read_aligned(&mut self.scratch, 4);
        mixer::mix_into(
            main,
            &self.scratch[..got],
            self.main_gain,
            self.associated_gain,
        );
    }
}

/// Totals for one processed packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketReport {
    pub calls: u32,
    pub consumed: usize,
    pub produced: usize,
    pub failed: bool,
    /// Bytes kept as carry-over for the next packet.
    pub leftover: usize,
}

pub struct DecodeLoop {
    role: StreamRole,
    ctx: DecodeContext,
    adapter: Box<dyn CodecAdapter>,
    queue: Arc<PacketQueue>,
    ring: Arc<OutputRing>,
    raw_ring: Option<Arc<OutputRing>>,
    mix: Option<MixInput>,
    exit: ExitFlag,
    events: EventBus,
    config: DecodeConfig,
    queue_wait: Duration,
    out_buf: Vec<u8>,
}

impl DecodeLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: StreamRole,
        ctx: DecodeContext,
        adapter: Box<dyn CodecAdapter>,
        queue: Arc<PacketQueue>,
        ring: Arc<OutputRing>,
        exit: ExitFlag,
        events: EventBus,
        config: DecodeConfig,
        queue_wait: Duration,
    ) -> Result<Self> {
        let mut out_buf = Vec::new();
        if out_buf
            .try_reserve_exact(config.max_output_frame_bytes)
            .is_err()
        {
            let mut adapter = adapter;
            adapter.release();
            return Err(DecoderError::BufferAllocation(format!(
                "{} byte decode output buffer",
                config.max_output_frame_bytes
            )));
        }
        out_buf.resize(config.max_output_frame_bytes, 0);

        Ok(Self {
            role,
            ctx,
            adapter,
            queue,
            ring,
            raw_ring: None,
            mix: None,
            exit,
            events,
            config,
            queue_wait,
            out_buf,
        })
    }

    /// Also copy compressed input to `ring`.
    pub fn with_raw_ring(mut self, ring: Arc<OutputRing>) -> Self {
        self.raw_ring = Some(ring);
        self
    }

    /// Mix associated PCM into the main output.
    pub fn with_mix(mut self, mix: MixInput) -> Self {
        self.mix = Some(mix);
        self
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    /// Run until exit; hands the adapter back for release.
    pub fn run(mut self) -> Box<dyn CodecAdapter> {
        debug!(role = ?self.role, backend = self.adapter.name(), "Decode loop started");
        while !self.exit.is_set() {
            match self.queue.pop() {
                Some(packet) => {
                    self.process_packet(packet);
                }
                None => {
                    self.queue.wait_for_packet(self.queue_wait);
                }
            }
        }
        self.ctx.clear_leftover();
        debug!(
            role = ?self.role,
            decode_offset = ?self.ctx.status.decode_offset(),
            pcm_offset = self.ctx.status.decode_pcm_offset(),
            "Decode loop exited"
        );
        self.adapter
    }

    /// Decode one packet completely.
    pub fn process_packet(&mut self, packet: Packet) -> PacketReport {
        let mut report = PacketReport::default();
        let seq = packet.seq;
        let format = self.ctx.format;

        let input = match self.ctx.take_input(packet) {
            Ok(input) => input,
            Err(err) => {
                warn!(seq, error = %err, "Dropping packet");
                return report;
            }
        };

        if format.supports_raw_output() {
            if let Some(raw) = &self.raw_ring {
                if !raw.write_all(&input, &self.exit, self.ring_wait()) {
                    return report;
                }
            }
        }

        let mut pos = 0;
        while pos < input.len() {
            if self.exit.is_set() {
                return report;
            }

            let remaining = input.len() - pos;
            let raw = self.adapter.decode(&mut self.out_buf, &input[pos..]);
            let outcome = DecodeOutcome::new(
                raw.consumed.min(remaining),
                raw.produced.min(self.out_buf.len()),
            );
            report.calls += 1;

            if outcome.is_failure() {
                let errors = self.ctx.status.record_error();
                report.failed = true;
                if format.discards_on_error() {
                    self.ctx.clear_leftover();
                } else {
                    self.ctx.keep_leftover(input.slice(pos..));
                    report.leftover = remaining;
                }
                trace!(seq, errors, remaining, "Decode call made no progress");
                self.ctx.status.record_packet();
                return report;
            }

            self.ctx.status.reset_errors();
            if format.decoder_reports_offset() {
                if let Some(offset) = self.adapter.reported_offset() {
                    self.ctx.status.report_decode_offset(offset);
                }
            } else {
                self.ctx
                    .status
                    .advance_decode_offset(outcome.consumed as u64);
            }
            self.ctx.status.add_pcm(outcome.produced as u64);
            pos += outcome.consumed;
            report.consumed += outcome.consumed;
            report.produced += outcome.produced;

            if outcome.produced > 0 {
                self.check_format();
                if !self.publish(outcome.produced) {
                    return report;
                }
            }

            let left = input.len() - pos;
            let wants_more = (format.is_aac() && outcome.produced == 0)
                || outcome.consumed == 0
                || (format.needs_burst_input() && left <= outcome.consumed && left > 0);
            if wants_more && left > 0 {
                if format.needs_burst_input() {
                    let burst = self.ctx.note_burst();
                    trace!(seq, burst, left, "Burst format needs a fresh packet");
                }
                self.ctx.keep_leftover(input.slice(pos..));
                report.leftover = left;
                self.ctx.status.record_packet();
                return report;
            }
        }

        self.ctx.clear_leftover();
        self.ctx.reset_burst();
        self.ctx.status.record_packet();
        report
    }

    fn ring_wait(&self) -> Duration {
        Duration::from_millis(self.config.ring_full_wait_ms)
    }

    /// Adopt a changed output format, draining the ring first if configured.
    fn check_format(&mut self) {
        let Some(reported) = self.adapter.info().pcm_format() else {
            return;
        };
        let status = &self.ctx.status;

        if !status.has_format() {
            status.set_format(reported);
            if reported != PcmFormat::default() {
                status.mark_format_changed();
            }
            info!(
                role = ?self.role,
                sample_rate = reported.sample_rate,
                channels = reported.channels,
                "Decoder output format established"
            );
            return;
        }

        let current = status.format();
        if reported == current {
            return;
        }

        if self.config.drain_on_format_change && self.role == StreamRole::Main {
            let threshold = (current.byte_rate() / 5) as usize;
            let poll = Duration::from_millis(self.config.format_drain_poll_ms);
            while self.ring.level() > threshold && !self.exit.is_set() {
                self.ring.wait_for_drain(threshold, poll);
            }
        }

        status.set_format(reported);
        status.mark_format_changed();
        info!(
            role = ?self.role,
            from_rate = current.sample_rate,
            to_rate = reported.sample_rate,
            from_channels = current.channels,
            to_channels = reported.channels,
            "Decoder output format changed"
        );
        let _ = self.events.emit(DecoderEvent::FormatChanged {
            sample_rate: reported.sample_rate,
            channels: reported.channels,
            bits_per_sample: reported.bits_per_sample,
        });
    }

    /// Write `produced` bytes of `out_buf` to the ring. Returns `false` on exit.
    fn publish(&mut self, produced: usize) -> bool {
        let format = self.ctx.status.format();
        let wait = self.ring_wait();
        let pcm = &mut self.out_buf[..produced];

        match self.role {
            StreamRole::Associated if format.channels == 1 => {
                let stereo = mixer::upmix_mono_to_stereo(pcm);
                self.ring.write_all(&stereo, &self.exit, wait)
            }
            StreamRole::Associated => self.ring.write_all(pcm, &self.exit, wait),
            StreamRole::Main => {
                if let Some(mix) = self.mix.as_mut() {
                    if format.channels == 2 && format.bits_per_sample == 16 {
                        if !mix.prime(&self.exit, wait) {
                            return false;
                        }
                        mix.mix(pcm);
                    }
                }
                self.ring.write_all(pcm, &self.exit, wait)
            }
        }
    }
}

impl std::fmt::Debug for DecodeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeLoop")
            .field("role", &self.role)
            .field("format", &self.ctx.format)
            .field("backend", &self.adapter.name())
            .field("mixing", &self.mix.is_some())
            .finish()
    }
}
