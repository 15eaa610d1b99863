//! Logging setup as seen from outside the crate.

use bridge_traits::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::Arc;

#[test]
fn test_connection_secrets_never_logged() {
    for (field, value) in [
        ("PrivateKey", "-----BEGIN"),
        ("ServerConnectToken", "demosct"),
        ("password", "my_password"),
        ("client_secret", "abc"),
    ] {
        assert_eq!(redact_if_sensitive(field, value), "[REDACTED]", "{}", field);
    }
}

#[test]
fn test_identifiers_pass_through() {
    assert_eq!(redact_if_sensitive("product_id", "pr-abcd1234"), "pr-abcd1234");
    assert_eq!(redact_if_sensitive("path", "/hello-world"), "/hello-world");
    assert_eq!(redact_if_sensitive("handle", "7"), "7");
}

#[test]
fn test_sdk_level_vocabulary_round_trips() {
    for level in [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ] {
        assert_eq!(LogLevel::from_sdk_level(level.as_sdk_level()), Some(level));
    }
    assert_eq!(LogLevel::from_sdk_level("WARNING"), Some(LogLevel::Warn));
    assert_eq!(LogLevel::from_sdk_level("verbose"), None);
}

#[test]
fn test_invalid_filter_is_rejected() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_logger_sink(Arc::new(ConsoleLogger::default()))
        .with_filter("core_bridge=notalevel");
    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}
