//! Status codes and link state.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A platform code that has no counterpart in the target enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code}")]
pub struct UnknownCode {
	pub kind: &'static str,
	pub code: i32,
}

/// Status code attached to every driver event.
///
/// Zero is the success sentinel; every other value is a driver-defined failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GattStatus(pub i32);

impl GattStatus {
	pub const SUCCESS: GattStatus = GattStatus(0);
	pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
	pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x03);
	pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x05);
	pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x06);
	pub const INVALID_OFFSET: GattStatus = GattStatus(0x07);
	pub const INVALID_ATTRIBUTE_LENGTH: GattStatus = GattStatus(0x0d);
	pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x0f);
	pub const CONNECTION_CONGESTED: GattStatus = GattStatus(0x8f);
	/// Generic failure, also used for results synthesized without a driver event.
	pub const FAILURE: GattStatus = GattStatus(0x101);

	pub fn is_success(self) -> bool {
		self == Self::SUCCESS
	}

	pub fn code(self) -> i32 {
		self.0
	}
}

impl Default for GattStatus {
	fn default() -> Self {
		Self::SUCCESS
	}
}

impl fmt::Display for GattStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Self::SUCCESS => f.write_str("success"),
			Self::FAILURE => f.write_str("failure"),
			GattStatus(code) => write!(f, "status 0x{code:02x}"),
		}
	}
}

/// Current state of the link to the remote peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
	Connecting,
	Connected,
	Disconnecting,
	#[default]
	Disconnected,
}

impl ConnectionState {
	/// Platform profile code for this state.
	pub fn code(self) -> i32 {
		match self {
			Self::Disconnected => 0,
			Self::Connecting => 1,
			Self::Connected => 2,
			Self::Disconnecting => 3,
		}
	}

	pub fn is_connected(self) -> bool {
		self == Self::Connected
	}
}

impl TryFrom<i32> for ConnectionState {
	type Error = UnknownCode;

	fn try_from(code: i32) -> Result<Self, Self::Error> {
		match code {
			0 => Ok(Self::Disconnected),
			1 => Ok(Self::Connecting),
			2 => Ok(Self::Connected),
			3 => Ok(Self::Disconnecting),
			code => Err(UnknownCode {
				kind: "connection state",
				code,
			}),
		}
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Disconnecting => "disconnecting",
			Self::Disconnected => "disconnected",
		};
		f.write_str(name)
	}
}
