//! Session configuration.
//!
//! All tunables that the session would otherwise hard-code live in
//! [`SessionConfig`]. It can be built in code, or loaded from JSON with
//! camelCase keys, where every key is optional:
//!
//! ```json
//! {
//!   "operationTimeoutMs": 5000,
//!   "eventBufferCapacity": 10,
//!   "cccdId": "00002902-0000-1000-8000-00805f9b34fb",
//!   "connect": { "autoConnect": false, "transport": "le", "phy": "le2M" }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use gattlink_protocol::ConnectOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Client Characteristic Configuration descriptor.
pub const DEFAULT_CCCD_ID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 10;

/// Errors raised while loading or validating a [`SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Settings fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	/// Per-operation deadline, counted from the driver call.
	pub operation_timeout_ms: u64,
	/// Unread events each external subscriber may hold before it overflows.
	///
	/// The bound is exact. A typed subscription counts only the events it yields.
	pub event_buffer_capacity: usize,
	/// Descriptor written to enable or disable notifications.
	pub cccd_id: Uuid,
	pub connect: ConnectOptions,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
			event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
			cccd_id: DEFAULT_CCCD_ID,
			connect: ConnectOptions::default(),
		}
	}
}

impl SessionConfig {
	/// Parses and validates a JSON document.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a JSON file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path)?;
		Self::from_json_str(&content)
	}

	pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
		self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self
	}

	pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
		self.event_buffer_capacity = capacity;
		self
	}

	pub fn with_cccd_id(mut self, id: Uuid) -> Self {
		self.cccd_id = id;
		self
	}

	pub fn with_connect_options(mut self, options: ConnectOptions) -> Self {
		self.connect = options;
		self
	}

	pub fn operation_timeout(&self) -> Duration {
		Duration::from_millis(self.operation_timeout_ms)
	}

	/// Rejects values the session cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.operation_timeout_ms == 0 {
			return Err(ConfigError::Invalid("operationTimeoutMs must be greater than zero".into()));
		}
		if self.event_buffer_capacity == 0 {
			return Err(ConfigError::Invalid("eventBufferCapacity must be greater than zero".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use gattlink_protocol::{Phy, Transport};

	use super::*;

	#[test]
	fn defaults() {
		let config = SessionConfig::default();
		assert_eq!(config.operation_timeout(), Duration::from_secs(5));
		assert_eq!(config.event_buffer_capacity, 10);
		assert_eq!(config.cccd_id.to_string(), "00002902-0000-1000-8000-00805f9b34fb");
		assert!(config.connect.auto_connect);
		assert_eq!(config.connect.transport, Transport::Le);
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let config = SessionConfig::from_json_str(r#"{ "operationTimeoutMs": 250 }"#).unwrap();
		assert_eq!(config.operation_timeout(), Duration::from_millis(250));
		assert_eq!(config.event_buffer_capacity, DEFAULT_EVENT_BUFFER_CAPACITY);
		assert_eq!(config.cccd_id, DEFAULT_CCCD_ID);
	}

	#[test]
	fn nested_connect_options() {
		let config =
			SessionConfig::from_json_str(r#"{ "connect": { "autoConnect": false, "phy": "le2M" } }"#).unwrap();
		assert!(!config.connect.auto_connect);
		assert_eq!(config.connect.phy, Phy::Le2M);
		assert_eq!(config.connect.transport, Transport::Le);
	}

	#[test]
	fn zero_capacity_is_invalid() {
		let err = SessionConfig::from_json_str(r#"{ "eventBufferCapacity": 0 }"#).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid(_)));

		let err = SessionConfig::default().with_event_buffer_capacity(0).validate().unwrap_err();
		assert!(err.to_string().contains("eventBufferCapacity"));
	}

	#[test]
	fn zero_timeout_is_invalid() {
		let config = SessionConfig::default().with_operation_timeout(Duration::ZERO);
		assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn malformed_json() {
		let err = SessionConfig::from_json_str("{ operationTimeoutMs: }").unwrap_err();
		assert!(matches!(err, ConfigError::Json(_)));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{ "eventBufferCapacity": 64, "cccdId": "0000aaaa-0000-1000-8000-00805f9b34fb" }}"#).unwrap();

		let config = SessionConfig::from_file(file.path()).unwrap();
		assert_eq!(config.event_buffer_capacity, 64);
		assert_eq!(config.cccd_id, Uuid::from_u128(0x0000aaaa_0000_1000_8000_00805f9b34fb));
	}

	#[test]
	fn missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let err = SessionConfig::from_file(dir.path().join("absent.json")).unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}

	#[test]
	fn serializes_camel_case() {
		let json = serde_json::to_value(SessionConfig::default()).unwrap();
		assert_eq!(json["operationTimeoutMs"], 5000);
		assert_eq!(json["eventBufferCapacity"], 10);
		assert_eq!(json["connect"]["autoConnect"], true);
	}
}
