//! # Decoder State Machine
//!
//! Owns one decoder instance: its pipelines, PTS tracker and output port,
//! driven by an ordered stream of [`Command`]s.
//!
//! ## Lifecycle
//!
//! ```text
//! Initializing ──init ok──> Initialized ──Start──> Active <──Pause/Resume──> Paused
//!                               │                    │                         │
//!                               └────────Stop────────┴───────────Stop──────────┘
//!                                                    v
//!                                                 Stopped ──Release──> Terminated
//! ```
//!
//! Reader and decode threads run only in `Initialized`, `Active` and
//! `Paused`. Initialization acquires the codec backend, the rings, the
//! queues, the associated pipeline and finally the threads; a failure at any
//! step releases what was acquired in reverse order.
//!
//! ## Command loop
//!
//! [`DecoderStateMachine::spawn`] moves the machine onto the `adec-msgloop`
//! thread, which executes commands one at a time and runs the PTS refresh
//! between them.

use crate::codec::{CodecAdapter, CodecParams, CodecRegistry};
use crate::config::{DecoderConfig, SyncMode};
use crate::context::{DecodeContext, StreamStatus};
use crate::decode_loop::{DecodeLoop, MixInput, StreamRole};
use crate::error::{DecoderError, Result};
use crate::exit::ExitFlag;
use crate::format::CodecFormat;
use crate::frame_sizer::FrameSizer;
use crate::output_stage::{OutputPort, OutputStage};
use crate::packet_queue::PacketQueue;
use crate::pts::{PtsTracker, RefreshOutcome, TrackerLinks};
use crate::reader::{BitstreamReader, ReaderStats};
use crate::ring::OutputRing;
use bridge_traits::{BitstreamSource, BridgeError, RoutingMode};
use core_runtime::config::CoreConfig;
use core_runtime::events::DecoderEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MSGLOOP_THREAD_NAME: &str = "adec-msgloop";

// ============================================================================
// States and Commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderState {
    Initializing,
    Initialized,
    Active,
    Paused,
    Stopped,
    Terminated,
}

impl DecoderState {
    pub fn name(self) -> &'static str {
        match self {
            DecoderState::Initializing => "Initializing",
            DecoderState::Initialized => "Initialized",
            DecoderState::Active => "Active",
            DecoderState::Paused => "Paused",
            DecoderState::Stopped => "Stopped",
            DecoderState::Terminated => "Terminated",
        }
    }

    /// States in which reader and decode threads may run.
    pub fn runs_threads(self) -> bool {
        matches!(
            self,
            DecoderState::Initialized | DecoderState::Active | DecoderState::Paused
        )
    }

    /// Started and not yet stopped.
    pub fn is_playing(self) -> bool {
        matches!(self, DecoderState::Active | DecoderState::Paused)
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Mute(bool),
    SetVolume(f32),
    SetVolumeLR(f32, f32),
    /// Hardware channel routing.
    Route(RoutingMode),
    Release,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "Start",
            Command::Pause => "Pause",
            Command::Resume => "Resume",
            Command::Stop => "Stop",
            Command::Mute(_) => "Mute",
            Command::SetVolume(_) => "SetVolume",
            Command::SetVolumeLR(..) => "SetVolumeLR",
            Command::Route(_) => "Route",
            Command::Release => "Release",
        }
    }
}

/// Point-in-time decoder status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStatus {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub decode_error_count: u32,
    /// Started and not stopped.
    pub active: bool,
}

// ============================================================================
// Pipelines
// ============================================================================

/// Reader + decoder pair for one stream.
struct Pipeline {
    role: StreamRole,
    format: CodecFormat,
    queue: Arc<PacketQueue>,
    ring: Arc<OutputRing>,
    status: Arc<StreamStatus>,
    /// Backend not yet handed to a decode thread, or handed back by one.
    adapter: Option<Box<dyn CodecAdapter>>,
    reader: Option<JoinHandle<ReaderStats>>,
    decoder: Option<JoinHandle<Box<dyn CodecAdapter>>>,
}

impl Pipeline {
    fn interrupt(&self) {
        self.queue.interrupt();
        self.ring.interrupt();
    }

    fn join_threads(&mut self) {
        if let Some(reader) = self.reader.take() {
            match reader.join() {
                Ok(stats) => debug!(
                    role = ?self.role,
                    packets = stats.packets_queued,
                    discarded = stats.packets_discarded,
                    "Reader thread joined"
                ),
                Err(_) => error!(role = ?self.role, "Reader thread panicked"),
            }
        }
        if let Some(decoder) = self.decoder.take() {
            match decoder.join() {
                Ok(adapter) => self.adapter = Some(adapter),
                Err(_) => error!(role = ?self.role, "Decode thread panicked"),
            }
        }
    }

    fn drain(&self) -> usize {
        self.queue.drain_and_free()
    }

    fn release_adapter(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            debug!(role = ?self.role, backend = adapter.name(), "Releasing codec backend");
            adapter.release();
        }
    }
}

fn spawn_named<T, F>(name: &'static str, body: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| DecoderError::ThreadSpawn { name, source })
}

// ============================================================================
// State Machine
// ============================================================================

pub struct DecoderStateMachine {
    core: CoreConfig,
    config: DecoderConfig,
    params: CodecParams,
    state: Arc<Mutex<DecoderState>>,
    exit: ExitFlag,
    start_abort: ExitFlag,
    status: Arc<StreamStatus>,
    main: Option<Pipeline>,
    associated: Option<Pipeline>,
    raw_ring: Option<Arc<OutputRing>>,
    tracker: Option<PtsTracker>,
    port: Arc<OutputPort>,
    last_refresh: Option<Instant>,
}

impl DecoderStateMachine {
    /// Build and initialize a decoder.
    ///
    /// On failure every partially acquired resource has been released and an
    /// `InitFailed` event has been emitted.
    pub fn new(
        core: CoreConfig,
        config: DecoderConfig,
        params: CodecParams,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        config.validate().map_err(DecoderError::InvalidConfig)?;

        let status = StreamStatus::shared(params.format);
        let mut machine = Self {
            core,
            config,
            params,
            state: Arc::new(Mutex::new(DecoderState::Initializing)),
            exit: ExitFlag::new(),
            start_abort: ExitFlag::new(),
            status,
            main: None,
            associated: None,
            raw_ring: None,
            tracker: None,
            port: Arc::new(OutputPort::new()),
            last_refresh: None,
        };

        match machine.initialize(registry) {
            Ok(()) => {
                machine.transition(DecoderState::Initialized);
                Ok(machine)
            }
            Err(err) => {
                error!(error = %err, format = %machine.params.format, "Decoder initialization failed");
                machine.release_resources();
                let _ = machine.core.event_bus.emit(DecoderEvent::InitFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub fn state(&self) -> DecoderState {
        *self.state.lock()
    }

    pub fn status(&self) -> DecoderStatus {
        let format = self.status.format();
        DecoderStatus {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bit_depth: format.bits_per_sample,
            decode_error_count: self.status.error_count(),
            active: self.state().is_playing(),
        }
    }

    /// Output side for the host audio device.
    pub fn output_port(&self) -> Arc<OutputPort> {
        Arc::clone(&self.port)
    }

    /// Shared counters of the main stream.
    pub fn stream_status(&self) -> Arc<StreamStatus> {
        Arc::clone(&self.status)
    }

    pub fn tracker(&self) -> Option<&PtsTracker> {
        self.tracker.as_ref()
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    fn initialize(&mut self, registry: &CodecRegistry) -> Result<()> {
        let format = self.params.format;
        let init_params = self.params.clamped();

        let mut adapter = Self::create_adapter(registry, &init_params)?;
        let preferred = adapter.preferred_read_size();

        let (ring, raw_ring) = match self.allocate_rings(format) {
            Ok(rings) => rings,
            Err(err) => {
                adapter.release();
                return Err(err);
            }
        };
        // From here the backend belongs to the pipeline and later failures
        // release it through `release_resources`.
        self.main = Some(Pipeline {
            role: StreamRole::Main,
            format,
            queue: Arc::new(PacketQueue::new(self.config.queue.main_capacity)),
            ring,
            status: Arc::clone(&self.status),
            adapter: Some(adapter),
            reader: None,
            decoder: None,
        });
        self.raw_ring = raw_ring;

        if self.core.associated_bitstream.is_some() && self.config.mix.enabled {
            self.associated = Some(self.build_associated(registry, &init_params)?);
        }

        self.build_tracker()?;
        self.spawn_pipelines(preferred)?;
        info!(
            %format,
            channels = init_params.channels,
            sample_rate = init_params.sample_rate,
            associated = self.associated.is_some(),
            raw_output = self.raw_ring.is_some(),
            "Decoder initialized"
        );
        Ok(())
    }

    fn create_adapter(
        registry: &CodecRegistry,
        params: &CodecParams,
    ) -> Result<Box<dyn CodecAdapter>> {
        let mut adapter = registry.create(params.format);
        if let Err(err) = adapter.init(params) {
            adapter.release();
            return Err(err);
        }
        Ok(adapter)
    }

    /// PCM ring, plus the raw ring when passthrough output applies.
    fn allocate_rings(
        &self,
        format: CodecFormat,
    ) -> Result<(Arc<OutputRing>, Option<Arc<OutputRing>>)> {
        let ring = Self::allocate_ring(self.config.output.pcm_ring_bytes, "PCM")?;
        let raw = if self.config.output.raw_output && format.supports_raw_output() {
            let bytes = self.config.output.raw_ring_bytes * format.raw_ring_multiplier();
            Some(Self::allocate_ring(bytes, "raw")?)
        } else {
            None
        };
        Ok((ring, raw))
    }

    fn allocate_ring(bytes: usize, what: &str) -> Result<Arc<OutputRing>> {
        OutputRing::try_new(bytes)
            .map(Arc::new)
            .ok_or_else(|| DecoderError::BufferAllocation(format!("{} byte {} ring", bytes, what)))
    }

    fn build_associated(
        &self,
        registry: &CodecRegistry,
        params: &CodecParams,
    ) -> Result<Pipeline> {
        let mut adapter = Self::create_adapter(registry, params)?;
        let ring = match Self::allocate_ring(self.config.output.pcm_ring_bytes, "associated PCM") {
            Ok(ring) => ring,
            Err(err) => {
                adapter.release();
                return Err(err);
            }
        };
        Ok(Pipeline {
            role: StreamRole::Associated,
            format: params.format,
            queue: Arc::new(PacketQueue::new(self.config.queue.associated_capacity)),
            ring,
            status: StreamStatus::shared(params.format),
            adapter: Some(adapter),
            reader: None,
            decoder: None,
        })
    }

    fn build_tracker(&mut self) -> Result<()> {
        let ring = match &self.main {
            Some(main) => Arc::clone(&main.ring),
            None => return Err(DecoderError::Internal("main pipeline missing".to_string())),
        };
        let links = TrackerLinks {
            clock: Arc::clone(&self.core.clock),
            output: Arc::clone(&self.core.audio_output),
            sync_events: Arc::clone(&self.core.sync_events),
            events: self.core.event_bus.clone(),
            status: Arc::clone(&self.status),
            ring: Arc::clone(&ring),
            exit: self.exit.clone(),
        };
        let tracker = PtsTracker::new(
            self.config.pts.clone(),
            self.config.drop.clone(),
            self.config.resample.clone(),
            self.config.startup.wait_fresh(),
            links,
        );
        let stage = OutputStage::new(
            ring,
            Arc::clone(&self.status),
            self.config.output.clone(),
            self.config.pts.sync_mode,
            self.config.resample.clone(),
            tracker.resample_delta(),
        );
        self.port.attach(stage, self.raw_ring.clone());
        self.tracker = Some(tracker);
        Ok(())
    }

    /// Start the associated pair first: it feeds the main stream's mix.
    fn spawn_pipelines(&mut self, preferred: Option<usize>) -> Result<()> {
        let mix = self.associated.as_ref().map(|assoc| {
            MixInput::new(
                Arc::clone(&assoc.ring),
                self.config.mix.main_gain(),
                self.config.mix.associated_gain(),
                self.config.mix.prefill_bytes(),
                Duration::from_millis(self.config.mix.prefill_timeout_ms),
            )
        });

        if let Some(source) = self.core.associated_bitstream.clone() {
            if let Some(assoc) = self.associated.as_mut() {
                Self::spawn_pair(&self.config, &self.core, &self.exit, assoc, source, preferred, None, None)?;
            }
        }

        let source = Arc::clone(&self.core.bitstream);
        let raw = self.raw_ring.clone();
        match self.main.as_mut() {
            Some(main) => Self::spawn_pair(&self.config, &self.core, &self.exit, main, source, preferred, raw, mix),
            None => Err(DecoderError::Internal("main pipeline missing".to_string())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_pair(
        config: &DecoderConfig,
        core: &CoreConfig,
        exit: &ExitFlag,
        pipeline: &mut Pipeline,
        source: Arc<dyn BitstreamSource>,
        preferred: Option<usize>,
        raw: Option<Arc<OutputRing>>,
        mix: Option<MixInput>,
    ) -> Result<()> {
        let format = pipeline.format;
        let adapter = pipeline
            .adapter
            .take()
            .ok_or_else(|| DecoderError::Internal("codec backend already taken".to_string()))?;

        let ctx = DecodeContext::new(format, Arc::clone(&pipeline.status));
        let mut decode = DecodeLoop::new(
            pipeline.role,
            ctx,
            adapter,
            Arc::clone(&pipeline.queue),
            Arc::clone(&pipeline.ring),
            exit.clone(),
            core.event_bus.clone(),
            config.decode.clone(),
            Duration::from_millis(config.queue.empty_wait_ms),
        )?;
        if let Some(raw) = raw {
            decode = decode.with_raw_ring(raw);
        }
        if let Some(mix) = mix {
            decode = decode.with_mix(mix);
        }

        let sizer = FrameSizer::new(
            format,
            preferred.unwrap_or(config.decode.default_input_bytes),
            config.reader.max_unit_bytes,
        );
        let reader = BitstreamReader::new(
            source,
            Arc::clone(&pipeline.queue),
            sizer,
            exit.clone(),
            config.reader.clone(),
            Duration::from_millis(config.queue.full_retry_ms),
        );

        // Decoder first so a reader spawn failure can hand the backend back
        // through the join.
        pipeline.decoder = Some(spawn_named(pipeline.role.decode_thread_name(), move || decode.run())?);
        pipeline.reader = Some(spawn_named(pipeline.role.reader_thread_name(), move || reader.run())?);
        debug!(role = ?pipeline.role, %format, "Pipeline threads started");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Release everything in reverse acquisition order.
    fn release_resources(&mut self) {
        self.exit.request();
        for pipeline in [self.main.as_ref(), self.associated.as_ref()].into_iter().flatten() {
            pipeline.interrupt();
        }

        for pipeline in [self.main.as_mut(), self.associated.as_mut()].into_iter().flatten() {
            pipeline.join_threads();
        }

        let mut freed = 0;
        for pipeline in [self.associated.as_ref(), self.main.as_ref()].into_iter().flatten() {
            freed += pipeline.drain();
        }

        self.tracker = None;
        self.port.detach();

        for pipeline in [self.associated.as_mut(), self.main.as_mut()].into_iter().flatten() {
            pipeline.release_adapter();
        }

        self.associated = None;
        self.raw_ring = None;
        self.main = None;
        debug!(freed_packets = freed, "Decoder resources released");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Execute one command.
    pub fn handle_command(&mut self, command: Command) -> Result<()> {
        let state = self.state();
        debug!(command = command.name(), %state, "Handling command");
        match (command, state) {
            (_, DecoderState::Terminated) | (_, DecoderState::Initializing) => {
                Err(self.invalid(command, state))
            }
            (Command::Start, DecoderState::Initialized) => self.start(),
            (Command::Pause, DecoderState::Active) => {
                self.core.audio_output.pause()?;
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.pause();
                }
                self.transition(DecoderState::Paused);
                Ok(())
            }
            (Command::Resume, DecoderState::Paused) => {
                self.core.audio_output.resume()?;
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.resume(Instant::now());
                }
                self.transition(DecoderState::Active);
                Ok(())
            }
            (Command::Stop, s) if s.runs_threads() => {
                self.stop(s);
                Ok(())
            }
            (Command::Release, s) => {
                if s.runs_threads() {
                    self.stop(s);
                }
                self.transition(DecoderState::Terminated);
                Ok(())
            }
            (Command::Mute(muted), _) => Ok(self.core.audio_output.mute(muted)?),
            (Command::SetVolume(volume), _) => {
                Ok(self.core.audio_output.set_volume(volume.clamp(0.0, 1.0))?)
            }
            (Command::SetVolumeLR(left, right), _) => Ok(self
                .core
                .audio_output
                .set_lr_volume(left.clamp(0.0, 1.0), right.clamp(0.0, 1.0))?),
            (Command::Route(mode), _) => match &self.core.routing {
                Some(routing) => Ok(routing.apply(mode)?),
                None => Err(BridgeError::NotAvailable("audio routing".to_string()).into()),
            },
            (command, state) => Err(self.invalid(command, state)),
        }
    }

    fn invalid(&self, command: Command, state: DecoderState) -> DecoderError {
        warn!(command = command.name(), %state, "Command rejected");
        DecoderError::InvalidState {
            command: command.name(),
            state: state.name(),
        }
    }

    fn start(&mut self) -> Result<()> {
        let startup = self.config.startup.clone();
        let Some(tracker) = self.tracker.as_mut() else {
            return Err(DecoderError::Internal("PTS tracker missing".to_string()));
        };

        let (seed, fallback) = match tracker.wait_for_first_pts(
            startup.wait_count,
            startup.wait_interval(),
            &self.start_abort,
        ) {
            Some(pts) => (pts, false),
            None if self.start_abort.is_set() => {
                self.start_abort.reset();
                info!("Start aborted while waiting for the first PTS");
                return Ok(());
            }
            None => {
                let seed = tracker.fallback_seed();
                warn!(
                    waits = startup.wait_count,
                    seed, "No audio PTS checked in, seeding from reference clock"
                );
                (seed, true)
            }
        };

        tracker.start(seed, fallback);
        if self.config.drop.resync_on_start {
            let outcome = tracker.resync();
            debug!(?outcome, "Start resync finished");
        }

        if self.config.pts.sync_mode == SyncMode::PcrMaster {
            self.exit.wait_timeout(Duration::from_millis(startup.pcr_start_delay_ms));
        }

        // A format reported before start is picked up by the start itself.
        self.status.take_format_changed();
        self.core.audio_output.start(self.status.format())?;
        self.last_refresh = Some(Instant::now());
        self.transition(DecoderState::Active);
        Ok(())
    }

    fn stop(&mut self, from: DecoderState) {
        if from.is_playing() {
            if let Err(err) = self.core.audio_output.mute(true) {
                warn!(error = %err, "Failed to mute output before stop");
            }
            if let Err(err) = self.core.audio_output.stop() {
                warn!(error = %err, "Failed to stop output");
            }
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.stop();
            }
        }
        self.release_resources();
        self.last_refresh = None;
        self.transition(DecoderState::Stopped);
    }

    fn transition(&self, to: DecoderState) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        if from == to {
            return;
        }
        info!(%from, %to, "Decoder state changed");
        let _ = self.core.event_bus.emit(DecoderEvent::StateChanged {
            from: from.name().to_string(),
            to: to.name().to_string(),
        });
    }

    // ------------------------------------------------------------------------
    // Periodic Work
    // ------------------------------------------------------------------------

    /// Housekeeping between commands: output reconfiguration after a format
    /// change and the periodic PTS refresh.
    pub fn tick(&mut self, now: Instant) -> Option<RefreshOutcome> {
        let state = self.state();
        if !state.is_playing() {
            return None;
        }

        if self.status.take_format_changed() {
            let format = self.status.format();
            info!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                "Reconfiguring output for new format"
            );
            if let Err(err) = self.core.audio_output.reconfigure(format) {
                warn!(error = %err, "Output reconfiguration failed");
            }
        }

        if state != DecoderState::Active {
            return None;
        }
        let due = self
            .last_refresh
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.pts.refresh_interval());
        if !due {
            return None;
        }
        self.last_refresh = Some(now);
        self.tracker.as_mut().map(|tracker| tracker.refresh_at(now))
    }

    // ------------------------------------------------------------------------
    // Command Loop
    // ------------------------------------------------------------------------

    /// Move the machine onto its own command-loop thread.
    pub fn spawn(self) -> Result<DecoderHandle> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let state = Arc::clone(&self.state);
        let status = Arc::clone(&self.status);
        let port = Arc::clone(&self.port);
        let start_abort = self.start_abort.clone();

        let thread = spawn_named(MSGLOOP_THREAD_NAME, move || self.run(receiver))?;
        Ok(DecoderHandle {
            sender,
            state,
            status,
            port,
            start_abort,
            thread: Some(thread),
        })
    }

    fn run(mut self, receiver: Receiver<Request>) {
        let interval = self.config.pts.refresh_interval();
        debug!("Command loop started");
        loop {
            match receiver.recv_timeout(interval) {
                Ok(Request { command, reply }) => {
                    let result = self.handle_command(command);
                    let _ = reply.send(result);
                    if self.state() == DecoderState::Terminated {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if let Err(err) = self.handle_command(Command::Release) {
                        warn!(error = %err, "Release on disconnect failed");
                    }
                    break;
                }
            }
            self.tick(Instant::now());
        }
        debug!("Command loop exited");
    }
}

impl Drop for DecoderStateMachine {
    fn drop(&mut self) {
        if self.main.is_some() || self.associated.is_some() {
            self.release_resources();
        }
    }
}

impl fmt::Debug for DecoderStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderStateMachine")
            .field("state", &self.state())
            .field("format", &self.params.format)
            .field("associated", &self.associated.is_some())
            .finish()
    }
}

// ============================================================================
// Handle
// ============================================================================

struct Request {
    command: Command,
    reply: Sender<Result<()>>,
}

/// Host-side handle to a decoder running on its command-loop thread.
pub struct DecoderHandle {
    sender: Sender<Request>,
    state: Arc<Mutex<DecoderState>>,
    status: Arc<StreamStatus>,
    port: Arc<OutputPort>,
    start_abort: ExitFlag,
    thread: Option<JoinHandle<()>>,
}

impl DecoderHandle {
    /// Queue `command` and wait for it to be executed.
    pub fn send(&self, command: Command) -> Result<()> {
        let (reply, result) = crossbeam_channel::bounded(1);
        self.sender
            .send(Request { command, reply })
            .map_err(|_| DecoderError::ChannelClosed)?;
        result.recv().map_err(|_| DecoderError::ChannelClosed)?
    }

    /// Cut short a Start that is waiting for the first PTS.
    pub fn abort_start(&self) {
        self.start_abort.request();
    }

    pub fn state(&self) -> DecoderState {
        *self.state.lock()
    }

    pub fn status(&self) -> DecoderStatus {
        let format = self.status.format();
        DecoderStatus {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bit_depth: format.bits_per_sample,
            decode_error_count: self.status.error_count(),
            active: self.state().is_playing(),
        }
    }

    pub fn output_port(&self) -> Arc<OutputPort> {
        Arc::clone(&self.port)
    }

    /// Release the decoder and wait for its command loop to end.
    pub fn shutdown(mut self) -> Result<()> {
        let result = match self.state() {
            DecoderState::Terminated => Ok(()),
            _ => self.send(Command::Release),
        };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(DecoderError::Internal("command loop panicked".to_string()));
            }
        }
        result
    }
}

impl fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_loopback::{
        CollectingSyncSink, OutputCall, RecordingOutput, ScriptedBitstream, SimulatedClock,
    };
    use bridge_traits::{AudioOutput, AudioRouting, PcmFormat};
    use core_runtime::events::EventBus;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Routing {}
        impl AudioRouting for Routing {
            fn apply(&self, mode: RoutingMode) -> bridge_traits::Result<()>;
        }
    }

    mock! {
        Output {}
        impl AudioOutput for Output {
            fn start(&self, format: PcmFormat) -> bridge_traits::Result<()>;
            fn pause(&self) -> bridge_traits::Result<()>;
            fn resume(&self) -> bridge_traits::Result<()>;
            fn stop(&self) -> bridge_traits::Result<()>;
            fn mute(&self, muted: bool) -> bridge_traits::Result<()>;
            fn set_volume(&self, volume: f32) -> bridge_traits::Result<()>;
            fn set_lr_volume(&self, left: f32, right: f32) -> bridge_traits::Result<()>;
            fn latency(&self) -> Duration;
        }
    }

    struct Fixture {
        clock: Arc<SimulatedClock>,
        output: Arc<RecordingOutput>,
        sync: Arc<CollectingSyncSink>,
        bus: EventBus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                clock: Arc::new(SimulatedClock::new()),
                output: Arc::new(RecordingOutput::new()),
                sync: Arc::new(CollectingSyncSink::new()),
                bus: EventBus::new(64),
            }
        }

        fn core(&self) -> CoreConfig {
            self.core_with(self.output.clone(), None)
        }

        fn core_with(
            &self,
            output: Arc<dyn AudioOutput>,
            routing: Option<Arc<dyn AudioRouting>>,
        ) -> CoreConfig {
            let mut builder = CoreConfig::builder()
                .bitstream(Arc::new(ScriptedBitstream::new()))
                .clock(self.clock.clone())
                .audio_output(output)
                .sync_events(self.sync.clone())
                .event_bus(self.bus.clone());
            if let Some(routing) = routing {
                builder = builder.routing(routing);
            }
            builder.build().unwrap()
        }

        fn machine(&self) -> DecoderStateMachine {
            DecoderStateMachine::new(self.core(), quick_config(), pcm_params(), &CodecRegistry::with_builtin())
                .unwrap()
        }

        fn check_in_first_pts(&self, pts: u64) {
            self.clock.check_in(0, pts);
            self.clock.set_first_audio_checked_in(true);
        }
    }

    fn quick_config() -> DecoderConfig {
        let mut config = DecoderConfig::default();
        config.startup.wait_count = 3;
        config.startup.wait_interval_ms = 5;
        config.decode.default_input_bytes = 1024;
        config.output.pcm_ring_bytes = 64 * 1024;
        config
    }

    fn pcm_params() -> CodecParams {
        CodecParams::new(CodecFormat::PcmS16Le, 2, 48_000)
    }

    #[test]
    fn test_init_reaches_initialized() {
        let fixture = Fixture::new();
        let machine = fixture.machine();

        assert_eq!(machine.state(), DecoderState::Initialized);
        assert!(machine.output_port().is_attached());
        assert!(machine.tracker().is_some());
        assert!(!machine.status().active);
        assert_eq!(machine.status().sample_rate, 48_000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fixture = Fixture::new();
        let mut config = quick_config();
        config.queue.main_capacity = 0;

        let result = DecoderStateMachine::new(fixture.core(), config, pcm_params(), &CodecRegistry::with_builtin());
        assert!(matches!(result, Err(DecoderError::InvalidConfig(_))));
    }

    #[test]
    fn test_codec_init_failure_reports_event() {
        let fixture = Fixture::new();
        let mut events = fixture.bus.subscribe();
        let params = CodecParams::new(CodecFormat::PcmS16Le, 0, 48_000);

        let result = DecoderStateMachine::new(fixture.core(), quick_config(), params, &CodecRegistry::with_builtin());
        assert!(matches!(result, Err(DecoderError::CodecInit { .. })));

        let mut failed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DecoderEvent::InitFailed { .. }) {
                failed += 1;
            }
        }
        assert_eq!(failed, 1);
    }

    #[test]
    fn test_start_with_checked_in_pts() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let mut machine = fixture.machine();

        machine.handle_command(Command::Start).unwrap();

        assert_eq!(machine.state(), DecoderState::Active);
        assert!(machine.status().active);
        assert_eq!(fixture.sync.lines().first().map(String::as_str), Some("AUDIO_START:0x15f90"));
        assert_eq!(fixture.output.last_started_format(), Some(PcmFormat::default()));
        assert_eq!(machine.tracker().map(|t| t.state().last_published_pts), Some(90_000));
    }

    #[test]
    fn test_start_falls_back_to_video_pts() {
        let fixture = Fixture::new();
        fixture.clock.set_video(180_000);
        let mut machine = fixture.machine();

        machine.handle_command(Command::Start).unwrap();

        assert_eq!(machine.state(), DecoderState::Active);
        assert_eq!(fixture.clock.audio_pts(), 180_000);
        assert_eq!(fixture.sync.count_prefix("AUDIO_START"), 1);
    }

    #[test]
    fn test_commands_rejected_in_wrong_state() {
        let fixture = Fixture::new();
        let mut machine = fixture.machine();

        let err = machine.handle_command(Command::Pause).unwrap_err();
        assert!(matches!(
            err,
            DecoderError::InvalidState {
                command: "Pause",
                state: "Initialized"
            }
        ));
        assert!(machine.handle_command(Command::Resume).is_err());
        assert_eq!(machine.state(), DecoderState::Initialized);
    }

    #[test]
    fn test_pause_resume_stop_release() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let mut machine = fixture.machine();
        let port = machine.output_port();

        machine.handle_command(Command::Start).unwrap();
        machine.handle_command(Command::Pause).unwrap();
        assert_eq!(machine.state(), DecoderState::Paused);
        machine.handle_command(Command::Resume).unwrap();
        assert_eq!(machine.state(), DecoderState::Active);

        machine.handle_command(Command::Stop).unwrap();
        assert_eq!(machine.state(), DecoderState::Stopped);
        assert!(!port.is_attached());
        assert!(machine.tracker().is_none());

        let calls = fixture.output.calls();
        assert!(calls.contains(&OutputCall::Pause));
        assert!(calls.contains(&OutputCall::Resume));
        assert_eq!(&calls[calls.len() - 2..], &[OutputCall::Mute(true), OutputCall::Stop]);
        for line in ["AUDIO_PAUSE", "AUDIO_RESUME", "AUDIO_STOP"] {
            assert_eq!(fixture.sync.count_prefix(line), 1, "{}", line);
        }

        assert!(machine.handle_command(Command::Start).is_err());
        machine.handle_command(Command::Release).unwrap();
        assert_eq!(machine.state(), DecoderState::Terminated);
        assert!(machine.handle_command(Command::Mute(true)).is_err());
    }

    #[test]
    fn test_stop_before_start_skips_output() {
        let fixture = Fixture::new();
        let mut machine = fixture.machine();

        machine.handle_command(Command::Stop).unwrap();

        assert_eq!(machine.state(), DecoderState::Stopped);
        assert!(fixture.output.calls().is_empty());
        assert_eq!(fixture.sync.count_prefix("AUDIO_STOP"), 0);
    }

    #[test]
    fn test_volume_is_clamped() {
        let fixture = Fixture::new();
        let mut machine = fixture.machine();

        machine.handle_command(Command::SetVolume(1.7)).unwrap();
        machine.handle_command(Command::SetVolumeLR(-0.5, 0.25)).unwrap();
        machine.handle_command(Command::Mute(false)).unwrap();

        assert_eq!(
            fixture.output.calls(),
            vec![
                OutputCall::Volume(1.0),
                OutputCall::LrVolume(0.0, 0.25),
                OutputCall::Mute(false)
            ]
        );
    }

    #[test]
    fn test_route_without_routing_is_not_available() {
        let fixture = Fixture::new();
        let mut machine = fixture.machine();

        match machine.handle_command(Command::Route(RoutingMode::LeftMono)) {
            Err(DecoderError::Bridge(err)) => assert!(err.is_not_available()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_route_forwards_to_routing() {
        let fixture = Fixture::new();
        let mut routing = MockRouting::new();
        routing
            .expect_apply()
            .with(eq(RoutingMode::SwapChannels))
            .times(1)
            .returning(|_| Ok(()));
        routing
            .expect_apply()
            .with(eq(RoutingMode::RightMono))
            .times(1)
            .returning(|_| Err(BridgeError::Register("route register busy".to_string())));

        let core = fixture.core_with(fixture.output.clone(), Some(Arc::new(routing)));
        let mut machine =
            DecoderStateMachine::new(core, quick_config(), pcm_params(), &CodecRegistry::with_builtin()).unwrap();

        machine.handle_command(Command::Route(RoutingMode::SwapChannels)).unwrap();
        assert!(matches!(
            machine.handle_command(Command::Route(RoutingMode::RightMono)),
            Err(DecoderError::Bridge(BridgeError::Register(_)))
        ));
    }

    #[test]
    fn test_pause_failure_keeps_state() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let mut output = MockOutput::new();
        output.expect_start().times(1).returning(|_| Ok(()));
        output
            .expect_pause()
            .times(1)
            .returning(|| Err(BridgeError::OperationFailed("device gone".to_string())));
        output.expect_latency().returning(|| Duration::ZERO);

        let core = fixture.core_with(Arc::new(output), None);
        let mut machine =
            DecoderStateMachine::new(core, quick_config(), pcm_params(), &CodecRegistry::with_builtin()).unwrap();

        machine.handle_command(Command::Start).unwrap();
        assert!(machine.handle_command(Command::Pause).is_err());
        assert_eq!(machine.state(), DecoderState::Active);
        assert_eq!(fixture.sync.count_prefix("AUDIO_PAUSE"), 0);
    }

    #[test]
    fn test_tick_reconfigures_after_format_change() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let mut machine = fixture.machine();
        assert!(machine.tick(Instant::now()).is_none());

        machine.handle_command(Command::Start).unwrap();
        let status = machine.stream_status();
        let new_format = PcmFormat::new(44_100, 2, 16);
        status.set_format(new_format);
        status.mark_format_changed();

        machine.tick(Instant::now());

        let calls = fixture.output.calls();
        assert_eq!(&calls[calls.len() - 2..], &[OutputCall::Stop, OutputCall::Start(new_format)]);
        assert!(!status.take_format_changed());
    }

    #[test]
    fn test_tick_refreshes_on_interval() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let mut machine = fixture.machine();
        machine.handle_command(Command::Start).unwrap();

        let now = Instant::now();
        assert!(machine.tick(now).is_none());
        assert!(machine.tick(now + Duration::from_millis(150)).is_some());
        assert!(machine.tick(now + Duration::from_millis(160)).is_none());
    }

    #[test]
    fn test_state_changes_are_announced() {
        let fixture = Fixture::new();
        let mut events = fixture.bus.subscribe();
        fixture.check_in_first_pts(90_000);
        let mut machine = fixture.machine();
        machine.handle_command(Command::Start).unwrap();

        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DecoderEvent::StateChanged { from, to } = event {
                transitions.push((from, to));
            }
        }
        assert_eq!(
            transitions,
            vec![
                ("Initializing".to_string(), "Initialized".to_string()),
                ("Initialized".to_string(), "Active".to_string())
            ]
        );
    }

    #[test]
    fn test_handle_runs_commands_on_loop_thread() {
        let fixture = Fixture::new();
        fixture.check_in_first_pts(90_000);
        let handle = fixture.machine().spawn().unwrap();

        handle.send(Command::Start).unwrap();
        assert_eq!(handle.state(), DecoderState::Active);
        assert!(handle.status().active);
        assert!(handle.output_port().is_attached());

        handle.shutdown().unwrap();
        assert!(fixture.output.calls().contains(&OutputCall::Stop));
    }

    #[test]
    fn test_abort_start_leaves_initialized() {
        let fixture = Fixture::new();
        let mut config = quick_config();
        config.startup.wait_count = 10_000;
        let machine =
            DecoderStateMachine::new(fixture.core(), config, pcm_params(), &CodecRegistry::with_builtin()).unwrap();
        let handle = machine.spawn().unwrap();

        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(30));
                handle.abort_start();
            });
            handle.send(Command::Start).unwrap();
        });
        assert_eq!(handle.state(), DecoderState::Initialized);
        assert!(fixture.sync.lines().is_empty());

        fixture.check_in_first_pts(90_000);
        handle.send(Command::Start).unwrap();
        assert_eq!(handle.state(), DecoderState::Active);
        handle.shutdown().unwrap();
    }
}
