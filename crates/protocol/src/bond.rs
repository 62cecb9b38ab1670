//! Pairing state reported by the bonding observer.

use serde::{Deserialize, Serialize};

use crate::status::UnknownCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BondStatus {
	None,
	Bonding,
	Bonded,
}

impl BondStatus {
	pub fn code(self) -> i32 {
		match self {
			Self::None => 10,
			Self::Bonding => 11,
			Self::Bonded => 12,
		}
	}
}

impl TryFrom<i32> for BondStatus {
	type Error = UnknownCode;

	fn try_from(code: i32) -> Result<Self, Self::Error> {
		match code {
			10 => Ok(Self::None),
			11 => Ok(Self::Bonding),
			12 => Ok(Self::Bonded),
			code => Err(UnknownCode {
				kind: "bond state",
				code,
			}),
		}
	}
}

/// Bond state of one remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondState {
	/// Platform address of the device, e.g. `"C0:FF:EE:00:11:22"`.
	pub device_id: String,
	pub state: BondStatus,
}

impl BondState {
	pub fn new(device_id: impl Into<String>, state: BondStatus) -> Self {
		Self {
			device_id: device_id.into(),
			state,
		}
	}
}
