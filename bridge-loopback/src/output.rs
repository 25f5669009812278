//! Recording audio output and routing.

use bridge_traits::{AudioOutput, AudioRouting, OutputPosition, PcmFormat, Result, RoutingMode};
use parking_lot::Mutex;
use std::time::Duration;

/// One call made on [`RecordingOutput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputCall {
    Start(PcmFormat),
    Pause,
    Resume,
    Stop,
    Mute(bool),
    Volume(f32),
    LrVolume(f32, f32),
}

#[derive(Debug)]
struct OutputState {
    calls: Vec<OutputCall>,
    latency: Duration,
    position: Option<OutputPosition>,
    playback_rate: f32,
}

/// Audio output that records calls and reports configurable timing.
#[derive(Debug)]
pub struct RecordingOutput {
    state: Mutex<OutputState>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OutputState {
                calls: Vec::new(),
                latency: Duration::ZERO,
                position: None,
                playback_rate: 1.0,
            }),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn set_position(&self, position: Option<OutputPosition>) {
        self.state.lock().position = position;
    }

    pub fn set_playback_rate(&self, rate: f32) {
        self.state.lock().playback_rate = rate;
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.state.lock().calls.clone()
    }

    /// Format of the most recent start, if any.
    pub fn last_started_format(&self) -> Option<PcmFormat> {
        self.state.lock().calls.iter().rev().find_map(|call| match call {
            OutputCall::Start(format) => Some(*format),
            _ => None,
        })
    }

    fn record(&self, call: OutputCall) -> Result<()> {
        self.state.lock().calls.push(call);
        Ok(())
    }
}

impl Default for RecordingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RecordingOutput {
    fn start(&self, format: PcmFormat) -> Result<()> {
        self.record(OutputCall::Start(format))
    }

    fn pause(&self) -> Result<()> {
        self.record(OutputCall::Pause)
    }

    fn resume(&self) -> Result<()> {
        self.record(OutputCall::Resume)
    }

    fn stop(&self) -> Result<()> {
        self.record(OutputCall::Stop)
    }

    fn mute(&self, muted: bool) -> Result<()> {
        self.record(OutputCall::Mute(muted))
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.record(OutputCall::Volume(volume))
    }

    fn set_lr_volume(&self, left: f32, right: f32) -> Result<()> {
        self.record(OutputCall::LrVolume(left, right))
    }

    fn latency(&self) -> Duration {
        self.state.lock().latency
    }

    fn output_position(&self) -> Option<OutputPosition> {
        self.state.lock().position
    }

    fn playback_rate(&self) -> f32 {
        self.state.lock().playback_rate
    }
}

/// Routing collaborator that records applied modes.
#[derive(Debug, Default)]
pub struct RecordingRouting {
    modes: Mutex<Vec<RoutingMode>>,
}

impl RecordingRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modes(&self) -> Vec<RoutingMode> {
        self.modes.lock().clone()
    }
}

impl AudioRouting for RecordingRouting {
    fn apply(&self, mode: RoutingMode) -> Result<()> {
        self.modes.lock().push(mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls() {
        let output = RecordingOutput::new();
        output.start(PcmFormat::default()).unwrap();
        output.mute(true).unwrap();
        output.set_lr_volume(0.5, 0.25).unwrap();

        assert_eq!(
            output.calls(),
            vec![
                OutputCall::Start(PcmFormat::default()),
                OutputCall::Mute(true),
                OutputCall::LrVolume(0.5, 0.25),
            ]
        );
        assert_eq!(output.last_started_format(), Some(PcmFormat::default()));
    }

    #[test]
    fn test_reconfigure_restarts() {
        let output = RecordingOutput::new();
        let format = PcmFormat::new(44_100, 1, 16);
        output.reconfigure(format).unwrap();
        assert_eq!(
            output.calls(),
            vec![OutputCall::Stop, OutputCall::Start(format)]
        );
    }

    #[test]
    fn test_routing_records_modes() {
        let routing = RecordingRouting::new();
        routing.apply(RoutingMode::SwapChannels).unwrap();
        routing.apply(RoutingMode::Stereo).unwrap();
        assert_eq!(
            routing.modes(),
            vec![RoutingMode::SwapChannels, RoutingMode::Stereo]
        );
    }
}
