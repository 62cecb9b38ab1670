//! Parameters passed through to driver calls.

use serde::{Deserialize, Serialize};

/// How a characteristic write is acknowledged by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteType {
	/// Write request, acknowledged by the peripheral.
	#[default]
	Default,
	/// Write command, no acknowledgement on the link.
	NoResponse,
	/// Authenticated signed write command.
	Signed,
}

impl WriteType {
	pub fn code(self) -> i32 {
		match self {
			Self::NoResponse => 1,
			Self::Default => 2,
			Self::Signed => 4,
		}
	}
}

/// Physical transport used to establish the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transport {
	Auto,
	BrEdr,
	#[default]
	Le,
}

/// LE physical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phy {
	#[default]
	Le1M,
	Le2M,
	LeCoded,
}

impl Phy {
	pub fn code(self) -> i32 {
		match self {
			Self::Le1M => 1,
			Self::Le2M => 2,
			Self::LeCoded => 3,
		}
	}

	/// Bit used for this PHY in preferred-PHY masks.
	pub fn mask(self) -> i32 {
		1 << (self.code() - 1)
	}
}

/// Coding preference when [`Phy::LeCoded`] is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhyOptions {
	#[default]
	NoPreferred,
	S2,
	S8,
}

impl PhyOptions {
	pub fn code(self) -> i32 {
		match self {
			Self::NoPreferred => 0,
			Self::S2 => 1,
			Self::S8 => 2,
		}
	}
}

/// Options for the driver's connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
	/// Let the platform connect whenever the peripheral becomes available.
	pub auto_connect: bool,
	pub transport: Transport,
	/// Initial PHY. Platforms ignore this when `auto_connect` is set.
	pub phy: Phy,
}

impl Default for ConnectOptions {
	fn default() -> Self {
		Self {
			auto_connect: true,
			transport: Transport::Le,
			phy: Phy::Le1M,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn phy_masks() {
		assert_eq!(Phy::Le1M.mask(), 0b001);
		assert_eq!(Phy::Le2M.mask(), 0b010);
		assert_eq!(Phy::LeCoded.mask(), 0b100);
	}

	#[test]
	fn connect_options_fill_missing_fields() {
		let options: ConnectOptions = serde_json::from_str(r#"{"autoConnect": false}"#).unwrap();

		assert!(!options.auto_connect);
		assert_eq!(options.transport, Transport::Le);
		assert_eq!(options.phy, Phy::Le1M);
	}
}
