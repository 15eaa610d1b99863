//! # Logging
//!
//! `tracing` setup for processes that embed the bridge.
//!
//! [`init_logging`] installs a global subscriber with three parts:
//! - an `EnvFilter` that keeps the bridge crates at the configured level and
//!   everything else at `warn`
//! - an optional layer mirroring events into a host [`LoggerSink`]
//!   (Logcat, OSLog, the JS console), with connection secrets redacted
//! - one console formatter: pretty, compact or flattened JSON
//!
//! The native SDK keeps its own log level; set it through
//! [`BridgeConfig::sdk_log_level`](crate::config::BridgeConfig::sdk_log_level)
//! so both sides agree.
//!
//! ```ignore
//! use bridge_traits::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//! ```

use crate::error::{Error, Result};

use bridge_traits::{LogEntry, LogLevel, LoggerSink};

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events follow [`LoggingConfig::level`].
const BRIDGE_TARGETS: &[&str] = &[
    "edge_client_workspace",
    "bridge_loopback",
    "core_runtime",
    "core_bridge",
    "core_service",
];

const REDACTED: &str = "[REDACTED]";

/// Lower-cased fragments that mark a field or option as secret.
const SECRET_MARKERS: &[&str] = &[
    "privatekey",
    "private_key",
    "token",
    "sct",
    "password",
    "secret",
];

// ============================================================================
// Configuration
// ============================================================================

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One flattened JSON object per event
    Json,
    /// Single-line, human-readable
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for the bridge crates when no custom `filter` is given.
    pub level: LogLevel,
    /// Replace secrets with `[REDACTED]` before entries reach the sink.
    pub redact_sensitive: bool,
    /// Full `EnvFilter` directive string, e.g. `"core_bridge=debug,bridge_loopback=trace"`.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Report span enter/exit in the pretty format and span context in JSON.
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_sensitive: true,
            filter: None,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("redact_sensitive", &self.redact_sensitive)
            .field("filter", &self.filter)
            .field("has_logger_sink", &self.logger_sink.is_some())
            .field("enable_spans", &self.enable_spans)
            .finish_non_exhaustive()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact_sensitive = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    /// Directive string handed to `EnvFilter`.
    fn directives(&self) -> String {
        if let Some(custom) = &self.filter {
            return custom.clone();
        }
        let level = self.level.as_sdk_level();
        std::iter::once("warn".to_string())
            .chain(BRIDGE_TARGETS.iter().map(|target| format!("{}={}", target, level)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global subscriber. Only the first call in a process succeeds.
///
/// # Errors
///
/// `Error::Config` when the filter directives do not parse or a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))?;
    let sink_layer = config
        .logger_sink
        .clone()
        .map(|sink| HostSinkLayer::new(sink, config.redact_sensitive));

    let pretty = (config.format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_span_events(if config.enable_spans {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            })
            .with_writer(io::stdout)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_writer(io::stdout)
    });
    let compact = (config.format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_writer(io::stdout)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(sink_layer)
        .with(pretty)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

// ============================================================================
// Host sink forwarding
// ============================================================================

/// Mirrors every enabled event into a [`LoggerSink`].
struct HostSinkLayer {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl HostSinkLayer {
    fn new(sink: Arc<dyn LoggerSink>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn entry_for(&self, event: &Event<'_>, level: LogLevel, span: Option<&str>) -> LogEntry {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (name, value) in fields.values {
            let value = if self.redact {
                redact_if_sensitive(&name, &value)
            } else {
                value
            };
            entry = entry.with_field(name, value);
        }
        match span {
            Some(span) => entry.in_span(span),
            None => entry,
        }
    }
}

impl<S> Layer<S> for HostSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = log_level_of(event.metadata().level());
        if level < self.sink.min_level() {
            return;
        }

        let span = ctx.lookup_current();
        let entry = self.entry_for(event, level, span.as_ref().map(|s| s.name()));
        let sink = Arc::clone(&self.sink);

        // Inside a runtime the sink runs on it; elsewhere it runs inline.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = sink.log(entry).await {
                        eprintln!("Host logger sink failed: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("Host logger sink failed: {}", e);
                }
            }
        }
    }
}

/// Collects an event's fields as strings, keeping `message` apart.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level_of(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

// ============================================================================
// Redaction
// ============================================================================

fn is_secret_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Redact a logged value that may carry connection secrets.
///
/// Field names are matched case-insensitively, so both `private_key` and the
/// option name `PrivateKey` are covered. A value holding a JSON object (such
/// as serialized connection options) keeps its shape with only the secret
/// members replaced. A PEM private key is redacted under any field name.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(options = %redact_if_sensitive("options", &json), "Options updated");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    if is_secret_name(field_name) {
        return REDACTED.to_string();
    }
    if let Some(redacted) = redact_json_members(value) {
        return redacted;
    }
    if value.contains("PRIVATE KEY") {
        return REDACTED.to_string();
    }
    value.to_string()
}

/// Returns the object with its secret members redacted, or `None` when
/// `value` is not a JSON object.
fn redact_json_members(value: &str) -> Option<String> {
    if !value.trim_start().starts_with('{') {
        return None;
    }
    let mut object: Map<String, Value> = serde_json::from_str(value).ok()?;
    for (name, member) in object.iter_mut() {
        if is_secret_name(name) {
            *member = Value::String(REDACTED.to_string());
        }
    }
    Some(Value::Object(object).to_string())
}
