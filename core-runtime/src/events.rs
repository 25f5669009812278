//! # Event Bus System
//!
//! Broadcasts decoder lifecycle and synchronization events using
//! `tokio::sync::broadcast`, so hosts and tests can observe the pipeline
//! without hooking into its threads.
//!
//! ## Overview
//!
//! - **Event Types**: [`DecoderEvent`] covers state transitions, PTS seeding,
//!   discontinuities, PCM drops, format changes and startup failures
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐    subscribe   ┌────────────┐
//! │ PtsTracker   ├────────────>│           ├───────────────>│ Host UI    │
//! └──────────────┘             │ EventBus  │                └────────────┘
//! ┌──────────────┐    emit     │ (broadcast│    subscribe   ┌────────────┐
//! │ StateMachine ├────────────>│  channel) ├───────────────>│ Test suite │
//! └──────────────┘             └───────────┘                └────────────┘
//! ```
//!
//! Emitting never blocks a decode thread: `broadcast::Sender::send` is
//! synchronous and an absent subscriber only yields a `SendError` that
//! callers ignore.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{DecoderEvent, EventBus};
//!
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(DecoderEvent::Discontinuity {
//!     previous_pts: 90_000,
//!     new_pts: 900_000,
//! })
//! .ok();
//!
//! assert!(matches!(rx.try_recv(), Ok(DecoderEvent::Discontinuity { .. })));
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Decoder Events
// ============================================================================

/// Events emitted by the decode pipeline.
///
/// State names are carried as strings so this crate stays independent of
/// the decoder's own enums.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DecoderEvent {
    /// Lifecycle transition of the decoder state machine.
    StateChanged {
        from: String,
        to: String,
    },
    /// The first audio PTS was established.
    FirstPtsSeeded {
        /// Seed value (90 kHz ticks).
        pts: u64,
        /// `true` when the wait expired and a reference clock value was adopted.
        fallback: bool,
    },
    /// A timestamp jump was confirmed and republished.
    Discontinuity {
        previous_pts: u64,
        new_pts: u64,
    },
    /// Decoded PCM was discarded to catch up with the reference clock.
    PcmDropped {
        requested_bytes: u64,
        dropped_bytes: u64,
        /// `true` when the wall-clock budget or the starvation limit ended the drop early.
        incomplete: bool,
    },
    /// The program clock was forced to the audio timestamp.
    ClockReset {
        pts: u64,
    },
    /// Decoder output layout changed.
    FormatChanged {
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    },
    /// Stream startup failed; resources have been released.
    InitFailed {
        message: String,
    },
}

impl DecoderEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            DecoderEvent::StateChanged { .. } => "Decoder state changed",
            DecoderEvent::FirstPtsSeeded { .. } => "First audio PTS established",
            DecoderEvent::Discontinuity { .. } => "Audio timestamp discontinuity",
            DecoderEvent::PcmDropped { .. } => "Decoded PCM dropped for resync",
            DecoderEvent::ClockReset { .. } => "Program clock reset to audio",
            DecoderEvent::FormatChanged { .. } => "Decoder output format changed",
            DecoderEvent::InitFailed { .. } => "Decoder initialization failed",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            DecoderEvent::InitFailed { .. } => EventSeverity::Error,
            DecoderEvent::Discontinuity { .. } | DecoderEvent::ClockReset { .. } => {
                EventSeverity::Warning
            }
            DecoderEvent::PcmDropped { incomplete: true, .. } => EventSeverity::Warning,
            DecoderEvent::StateChanged { .. } | DecoderEvent::FormatChanged { .. } => {
                EventSeverity::Info
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to decoder events.
///
/// Cloning the bus yields another producer on the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DecoderEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast `event`.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is subscribed.
    pub fn emit(&self, event: DecoderEvent) -> Result<usize, SendError<DecoderEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<DecoderEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&DecoderEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<DecoderEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<DecoderEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DecoderEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &DecoderEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next accepted event. Lag and closure surface as `RecvError`.
    pub async fn recv(&mut self) -> Result<DecoderEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking `recv`; `None` once the buffer holds nothing accepted.
    pub fn try_recv(&mut self) -> Option<Result<DecoderEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drain every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<DecoderEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn discontinuity() -> DecoderEvent {
        DecoderEvent::Discontinuity {
            previous_pts: 90_000,
            new_pts: 900_000,
        }
    }

    #[test]
    fn test_subscriber_count_tracks_receivers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(discontinuity()).is_err());

        let first = bus.subscribe();
        let _second = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_clock_reset() {
        let bus = EventBus::new(10);
        let mut decoder_side = bus.subscribe();
        let mut host_side = bus.subscribe();

        let reset = DecoderEvent::ClockReset { pts: 1234 };
        assert_eq!(bus.emit(reset.clone()).unwrap(), 2);

        assert_eq!(decoder_side.recv().await.unwrap(), reset);
        assert_eq!(host_side.recv().await.unwrap(), reset);
    }

    #[tokio::test]
    async fn test_filtered_stream_skips_other_events() {
        let bus = EventBus::new(10);
        let mut drops = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, DecoderEvent::PcmDropped { .. }));

        bus.emit(discontinuity()).unwrap();
        bus.emit(DecoderEvent::PcmDropped {
            requested_bytes: 192_000,
            dropped_bytes: 192_000,
            incomplete: false,
        })
        .unwrap();

        match drops.recv().await.unwrap() {
            DecoderEvent::PcmDropped { dropped_bytes, .. } => assert_eq!(dropped_bytes, 192_000),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_drain_collects_matching_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, DecoderEvent::Discontinuity { .. }));

        bus.emit(discontinuity()).unwrap();
        bus.emit(DecoderEvent::ClockReset { pts: 1 }).unwrap();
        bus.emit(discontinuity()).unwrap();

        assert_eq!(stream.drain(), vec![discontinuity(), discontinuity()]);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_slow_subscriber_reports_lag() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for pts in 0..5 {
            bus.emit(DecoderEvent::ClockReset { pts }).unwrap();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(_)))));
    }

    #[test]
    fn test_severity_per_event() {
        assert_eq!(
            DecoderEvent::InitFailed {
                message: "codec".into()
            }
            .severity(),
            EventSeverity::Error
        );
        assert_eq!(discontinuity().severity(), EventSeverity::Warning);
        assert_eq!(
            DecoderEvent::PcmDropped {
                requested_bytes: 10,
                dropped_bytes: 4,
                incomplete: true
            }
            .severity(),
            EventSeverity::Warning
        );
        assert_eq!(
            DecoderEvent::FirstPtsSeeded {
                pts: 0,
                fallback: false
            }
            .severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_state_change_json_tag() {
        let event = DecoderEvent::StateChanged {
            from: "Initialized".into(),
            to: "Active".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"StateChanged\""));

        let back: DecoderEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
