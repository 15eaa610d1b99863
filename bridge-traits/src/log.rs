//! Log levels shared with the native SDK, and the host-side log sink.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Level names accepted by the SDK, most verbose first. Aliases follow the
/// canonical spelling of their level.
const SDK_LEVELS: [(&str, LogLevel); 6] = [
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("warning", LogLevel::Warn),
    ("error", LogLevel::Error),
];

impl LogLevel {
    /// Spelling passed to `NativeClient::set_log_level`.
    pub fn as_sdk_level(self) -> &'static str {
        SDK_LEVELS
            .iter()
            .find(|(_, level)| *level == self)
            .map_or("info", |(name, _)| *name)
    }

    /// Case-insensitive inverse of [`LogLevel::as_sdk_level`], also taking
    /// `warning`.
    pub fn from_sdk_level(name: &str) -> Option<Self> {
        SDK_LEVELS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, level)| *level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sdk_level())
    }
}

/// One record handed to a [`LoggerSink`]. Field values are already redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
    /// Innermost span the record was emitted in.
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn in_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_sdk_level().to_uppercase(),
            self.target
        )?;
        if let Some(span) = &self.span {
            write!(f, "{{{}}}", span)?;
        }
        write!(f, ": {}", self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Receives bridge log records inside the host (Logcat, OSLog, a JS
/// console). Secrets such as private keys, server connect tokens and
/// passwords are redacted before they get here.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Records below this level are never sent.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Writes records to stderr, one line each.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            eprintln!("{}", entry);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rendering() {
        let entry = LogEntry::new(LogLevel::Warn, "core_bridge::connection", "Connect failed")
            .with_field("handle", "3")
            .with_field("code", "NO_CHANNELS")
            .in_span("connect");

        let line = entry.to_string();
        assert!(line.contains(" WARN core_bridge::connection{connect}: Connect failed"));
        assert!(line.ends_with("code=NO_CHANNELS handle=3"));
    }

    #[test]
    fn test_sdk_level_names() {
        assert_eq!(LogLevel::Warn.as_sdk_level(), "warn");
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::from_sdk_level("Error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_sdk_level("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_sdk_level("none"), None);
        assert!(LogLevel::Debug < LogLevel::Info);
    }

    #[test]
    fn test_serde_uses_sdk_spelling() {
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"info\"");
    }

    #[tokio::test]
    async fn test_console_logger_filters_by_level() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Error,
        };
        logger
            .log(LogEntry::new(LogLevel::Debug, "test", "dropped"))
            .await
            .unwrap();
        assert_eq!(logger.min_level(), LogLevel::Error);
    }
}
