//! Connection options exchanged with the native SDK as a PascalCase JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{BridgeError, Result};

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_connect_token: Option<String>,

    /// Milliseconds between keep-alive probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_interval: Option<u32>,

    /// Milliseconds between keep-alive retransmissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_retry_interval: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_max_retries: Option<u32>,

    /// Options the bridge has no field for, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    pub fn server_connect_token(mut self, token: impl Into<String>) -> Self {
        self.server_connect_token = Some(token.into());
        self
    }

    pub fn keep_alive(mut self, interval_ms: u32, retry_interval_ms: u32, max_retries: u32) -> Self {
        self.keep_alive_interval = Some(interval_ms);
        self.keep_alive_retry_interval = Some(retry_interval_ms);
        self.keep_alive_max_retries = Some(max_retries);
        self
    }

    /// Parse a JSON object; non-object input is rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::InvalidOptions(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| BridgeError::InvalidOptions(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::InvalidOptions(e.to_string()))
    }

    /// Checks the values the bridge can judge without the device.
    ///
    /// Identifiers and credentials must not be blank, and keep-alive
    /// intervals must be positive.
    pub fn validate(&self) -> Result<()> {
        let strings = [
            ("ProductId", &self.product_id),
            ("DeviceId", &self.device_id),
            ("PrivateKey", &self.private_key),
            ("ServerConnectToken", &self.server_connect_token),
        ];
        for (name, value) in strings {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(BridgeError::InvalidOptions(format!("{} cannot be blank", name)));
            }
        }

        let intervals = [
            ("KeepAliveInterval", self.keep_alive_interval),
            ("KeepAliveRetryInterval", self.keep_alive_retry_interval),
        ];
        for (name, value) in intervals {
            if value == Some(0) {
                return Err(BridgeError::InvalidOptions(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ConnectionOptions")
            .field("product_id", &self.product_id)
            .field("device_id", &self.device_id)
            .field("private_key", &redacted(&self.private_key))
            .field("server_connect_token", &redacted(&self.server_connect_token))
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("keep_alive_retry_interval", &self.keep_alive_retry_interval)
            .field("keep_alive_max_retries", &self.keep_alive_max_retries)
            .field("extra", &self.extra)
            .finish()
    }
}
