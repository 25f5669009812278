//! # Logging & Tracing Infrastructure
//!
//! Installs the process-wide `tracing` subscriber for the decode core.
//!
//! ## Overview
//!
//! Three layers are stacked on a `tracing-subscriber` registry:
//! - an [`EnvFilter`] resolved from, in order, an explicit directive string,
//!   the `ADEC_LOG` environment variable, or a default that puts every
//!   workspace crate at [`LoggingConfig::level`] and everything else at `warn`
//! - a fmt layer in one of the [`LogFormat`]s, writing to stderr
//! - a forwarding layer that mirrors accepted events into a host
//!   [`LoggerSink`] as [`LogRecord`]s, stamped with the emitting thread name
//!
//! Decode threads are named (`adec-getpackage`, `adec-decode`,
//! `adec-msgloop`, ...) so thread names are on by default.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::log::{LogLevel, StderrLogger};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_sink(Arc::new(StderrLogger::default()));
//!
//! init_logging(config)?;
//! ```
//!
//! ## Field conventions
//!
//! Timestamps are logged as hex strings produced by [`hex_pts`], matching the
//! text the sync subsystem receives. Byte counts use `*_bytes` field names,
//! durations `*_ms`.

use crate::error::{Error, Result};

use bridge_traits::log::{LogLevel, LogRecord, LoggerSink};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Environment variable consulted when no explicit filter is configured.
pub const LOG_ENV_VAR: &str = "ADEC_LOG";

/// Crates whose level follows [`LoggingConfig::level`] in the default filter.
const WORKSPACE_TARGETS: &[&str] = &[
    "adec_workspace",
    "core_runtime",
    "core_decoder",
    "bridge_loopback",
];

// ============================================================================
// Configuration
// ============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One JSON object per event
    Json,
    /// One line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

/// Logging configuration.
///
/// Everything except the host sink can be loaded from JSON next to the
/// decoder configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates in the default filter
    pub level: LogLevel,
    /// Full `EnvFilter` directive string, e.g. `core_decoder::pts=trace`
    pub filter: Option<String>,
    /// Read [`LOG_ENV_VAR`] when `filter` is unset
    pub use_env: bool,
    /// Log span enter/exit
    pub span_events: bool,
    pub thread_names: bool,
    #[serde(skip)]
    pub sink: Option<Arc<dyn LoggerSink>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            use_env: true,
            span_events: false,
            thread_names: true,
            sink: None,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("use_env", &self.use_env)
            .field("span_events", &self.span_events)
            .field("thread_names", &self.thread_names)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl LoggingConfig {
    /// Parse the serializable part of the configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid logging config: {}", e)))
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Ignore [`LOG_ENV_VAR`].
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn with_span_events(mut self, enable: bool) -> Self {
        self.span_events = enable;
        self
    }

    pub fn with_thread_names(mut self, enable: bool) -> Self {
        self.thread_names = enable;
        self
    }

    /// Mirror accepted events into a host logger.
    pub fn with_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Directive string used when neither `filter` nor the environment
    /// supplies one.
    pub fn default_directives(&self) -> String {
        let mut directives = vec!["warn".to_string()];
        directives.extend(
            WORKSPACE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.level)),
        );
        directives.join(",")
    }
}

// ============================================================================
// Installation
// ============================================================================

/// Install the global subscriber.
///
/// Only the first call in a process succeeds; later calls return
/// [`Error::Logging`].
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = resolve_filter(&config, env_directives(&config))?;

    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .with(HostForwardLayer {
            sink: config.sink.clone(),
        })
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn env_directives(config: &LoggingConfig) -> Option<String> {
    if !config.use_env {
        return None;
    }
    std::env::var(LOG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn resolve_filter(config: &LoggingConfig, from_env: Option<String>) -> Result<EnvFilter> {
    let directives = config
        .filter
        .clone()
        .or(from_env)
        .unwrap_or_else(|| config.default_directives());

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_thread_names(config.thread_names)
        .with_span_events(spans);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.span_events)
            .boxed(),
    }
}

// ============================================================================
// Host forwarding
// ============================================================================

struct HostForwardLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl<S> Layer<S> for HostForwardLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if !sink.accepts(level) {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let mut record = LogRecord::new(
            level,
            metadata.target(),
            fields.message.unwrap_or_default(),
        );
        record.fields = fields.pairs;
        record.span = ctx.lookup_current().map(|span| span.name().to_string());
        record.thread = std::thread::current().name().map(str::to_string);

        // Reporting through tracing here would recurse into this layer.
        if let Err(err) = sink.log(record) {
            eprintln!("host logger rejected record: {}", err);
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    pairs: Vec<(String, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.pairs.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

/// Render a 90 kHz timestamp the way the sync subsystem prints it.
///
/// ```
/// use core_runtime::logging::hex_pts;
///
/// assert_eq!(hex_pts(90_000), "0x15f90");
/// ```
pub fn hex_pts(pts: u64) -> String {
    format!("{:#x}", pts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as SinkResult;
    use parking_lot::Mutex;

    struct Recorder {
        records: Mutex<Vec<LogRecord>>,
        threshold: LogLevel,
    }

    impl Recorder {
        fn at(threshold: LogLevel) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(Vec::new()),
                threshold,
            })
        }
    }

    impl LoggerSink for Recorder {
        fn log(&self, record: LogRecord) -> SinkResult<()> {
            self.records.lock().push(record);
            Ok(())
        }

        fn accepts(&self, level: LogLevel) -> bool {
            level >= self.threshold
        }
    }

    fn forwarding_to(recorder: &Arc<Recorder>) -> impl Subscriber {
        let sink: Arc<dyn LoggerSink> = recorder.clone();
        tracing_subscriber::registry().with(HostForwardLayer { sink: Some(sink) })
    }

    #[test]
    fn test_default_directives_cover_workspace() {
        let directives = LoggingConfig::default()
            .with_level(LogLevel::Debug)
            .default_directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("core_decoder=debug"));
        assert!(directives.contains("core_runtime=debug"));
        assert!(directives.contains("bridge_loopback=debug"));
    }

    #[test]
    fn test_filter_precedence() {
        let explicit = LoggingConfig::default().with_filter("core_decoder::pts=trace");
        let filter = resolve_filter(&explicit, Some("core_decoder=error".into())).unwrap();
        assert!(filter.to_string().contains("core_decoder::pts=trace"));

        let from_env = resolve_filter(&LoggingConfig::default(), Some("core_decoder=error".into()))
            .unwrap();
        assert!(from_env.to_string().contains("core_decoder=error"));

        let fallback = resolve_filter(&LoggingConfig::default(), None).unwrap();
        assert!(fallback.to_string().contains("core_decoder=info"));
    }

    #[test]
    fn test_env_ignored_when_disabled() {
        assert_eq!(env_directives(&LoggingConfig::default().without_env()), None);
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_decoder=[[");
        assert!(matches!(resolve_filter(&config, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_from_json() {
        let config = LoggingConfig::from_json_str(
            r#"{"format":"json","level":"trace","thread_names":false}"#,
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Trace);
        assert!(!config.thread_names);
        assert!(config.use_env);
        assert!(config.sink.is_none());

        assert!(matches!(
            LoggingConfig::from_json_str(r#"{"format":"xml"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_forwarded_record_keeps_fields_and_span() {
        let recorder = Recorder::at(LogLevel::Trace);
        let _guard = tracing::subscriber::set_default(forwarding_to(&recorder));

        let span = tracing::info_span!("resync");
        span.in_scope(|| {
            tracing::warn!(
                target: "core_decoder::pts",
                apts = %hex_pts(90_000),
                drop_bytes = 192000u64,
                "dropping pcm"
            );
        });

        let records = recorder.records.lock();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.target, "core_decoder::pts");
        assert_eq!(record.message, "dropping pcm");
        assert_eq!(
            record.fields,
            vec![
                ("apts".to_string(), "0x15f90".to_string()),
                ("drop_bytes".to_string(), "192000".to_string()),
            ]
        );
        assert_eq!(record.span.as_deref(), Some("resync"));
    }

    #[test]
    fn test_sink_threshold_applies_before_building() {
        let recorder = Recorder::at(LogLevel::Warn);
        let _guard = tracing::subscriber::set_default(forwarding_to(&recorder));

        tracing::debug!("too chatty");
        tracing::error!("kept");

        let records = recorder.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn test_hex_pts() {
        assert_eq!(hex_pts(0), "0x0");
        assert_eq!(hex_pts(180_000), "0x2bf20");
    }
}
