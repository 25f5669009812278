//! # Decoder Error Types
//!
//! Error taxonomy for the decode core. Starvation (empty/full queues and
//! rings, silent sources) and timestamp anomalies are deliberately absent:
//! they are handled in place and never surface as errors.

use crate::format::CodecFormat;
use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while setting up or driving a decoder.
#[derive(Error, Debug)]
pub enum DecoderError {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// Codec backend refused to initialize.
    #[error("Codec init failed for {format}: {reason}")]
    CodecInit { format: CodecFormat, reason: String },

    /// No backend can handle the format and passthrough is not acceptable.
    #[error("Unsupported codec format: {0}")]
    UnsupportedFormat(CodecFormat),

    /// A packet, leftover or ring buffer could not be allocated.
    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// A worker thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// Command not valid in the current lifecycle state.
    #[error("Command {command} rejected in state {state}")]
    InvalidState {
        command: &'static str,
        state: &'static str,
    },

    /// The decoder's command channel is gone.
    #[error("Decoder command channel closed")]
    ChannelClosed,

    /// Configuration values are inconsistent.
    #[error("Invalid decoder config: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// A host bridge call failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Runtime configuration error.
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecoderError {
    /// Returns `true` if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            DecoderError::Bridge(err) => !err.is_not_available(),
            DecoderError::BufferAllocation(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error aborts stream startup.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            DecoderError::CodecInit { .. }
                | DecoderError::UnsupportedFormat(_)
                | DecoderError::BufferAllocation(_)
                | DecoderError::ThreadSpawn { .. }
        )
    }
}

/// Result type for decoder operations.
pub type Result<T> = std::result::Result<T, DecoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failures() {
        let err = DecoderError::CodecInit {
            format: CodecFormat::Aac,
            reason: "no backend".into(),
        };
        assert!(err.is_startup_failure());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Codec init failed for AAC: no backend");
    }

    #[test]
    fn test_bridge_errors_transient_unless_unavailable() {
        let busy = DecoderError::from(BridgeError::OperationFailed("busy".into()));
        assert!(busy.is_transient());

        let absent = DecoderError::from(BridgeError::NotAvailable("no tsync".into()));
        assert!(!absent.is_transient());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = DecoderError::InvalidState {
            command: "Resume",
            state: "Active",
        };
        assert_eq!(err.to_string(), "Command Resume rejected in state Active");
    }
}
