//! Host Log Forwarding
//!
//! Decoder threads log through `tracing`; hosts that keep their own log
//! buffer (logcat, syslog, a vendor trace ring) receive a copy of every
//! accepted event as a [`LogRecord`] through a [`LoggerSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Severity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lower-case name, usable as an `EnvFilter` directive.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarded log event.
///
/// Fields keep the order in which the event declared them, so a record
/// renders the same way the `tracing` formatter printed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_decoder::pts`
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
    /// Innermost span the event was recorded in
    pub span: Option<String>,
    /// Emitting thread, e.g. `adec-decode`
    pub thread: Option<String>,
}

impl LogRecord {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: Vec::new(),
            span: None,
            thread: None,
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn in_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    pub fn on_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Value of the first field called `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Single-line rendering: `<time> <LEVEL> <thread> <target>: <message> k=v ...`
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {:>5} {} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str().to_ascii_uppercase(),
            self.thread.as_deref().unwrap_or("-"),
            self.target,
            self.message
        );
        for (key, value) in &self.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }
}

/// Receives log records mirrored from the core.
///
/// `log` runs synchronously on the emitting thread, which may be a decode
/// thread with a real-time budget. Slow backends should queue and return.
pub trait LoggerSink: Send + Sync {
    fn log(&self, record: LogRecord) -> Result<()>;

    /// Whether records at `level` should be built at all.
    fn accepts(&self, level: LogLevel) -> bool {
        level >= LogLevel::Info
    }
}

/// Writes each record as one line on stderr.
#[derive(Debug, Clone)]
pub struct StderrLogger {
    pub threshold: LogLevel,
}

impl Default for StderrLogger {
    fn default() -> Self {
        Self {
            threshold: LogLevel::Info,
        }
    }
}

impl LoggerSink for StderrLogger {
    fn log(&self, record: LogRecord) -> Result<()> {
        eprintln!("{}", record.to_line());
        Ok(())
    }

    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_line_keeps_field_order() {
        let mut record = LogRecord::new(LogLevel::Warn, "core_decoder::pts", "discontinuity")
            .field("apts", "0x15f90")
            .field("vpts", "0x2bf20")
            .on_thread("adec-msgloop");
        record.timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(
            record.to_line(),
            "03:04:05.000  WARN adec-msgloop core_decoder::pts: discontinuity apts=0x15f90 vpts=0x2bf20"
        );
        assert_eq!(record.get("vpts"), Some("0x2bf20"));
        assert_eq!(record.get("pcr"), None);
    }

    #[test]
    fn test_level_serde_names() {
        assert_eq!(serde_json::to_string(&LogLevel::Debug).unwrap(), "\"debug\"");
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_stderr_logger_threshold() {
        let logger = StderrLogger {
            threshold: LogLevel::Warn,
        };
        assert!(!logger.accepts(LogLevel::Info));
        assert!(logger.accepts(LogLevel::Error));
        assert!(logger
            .log(LogRecord::new(LogLevel::Error, "test", "printed").in_span("start"))
            .is_ok());
    }
}
