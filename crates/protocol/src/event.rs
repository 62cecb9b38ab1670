//! Driver events.
//!
//! Every outcome the driver reports arrives as one [`GattEvent`]. Variants that
//! carry a payload wrap a dedicated struct so that session operations can hand
//! the matched payload back to callers with its concrete type.
//!
//! Byte payloads are owned `Vec<u8>`, so equality is by content.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::{CharacteristicRef, DescriptorRef};
use crate::status::{ConnectionState, GattStatus};

/// The link changed state. `new_state` is authoritative regardless of `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionChanged {
	pub status: GattStatus,
	pub new_state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesDiscovered {
	pub status: GattStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicRead {
	pub characteristic_id: Uuid,
	pub instance_id: u32,
	pub value: Vec<u8>,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicWritten {
	pub characteristic_id: Uuid,
	pub instance_id: u32,
	pub status: GattStatus,
}

/// Unsolicited value change pushed by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicChanged {
	pub characteristic_id: Uuid,
	pub instance_id: u32,
	pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorRead {
	pub characteristic_id: Uuid,
	pub descriptor_id: Uuid,
	pub value: Vec<u8>,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorWritten {
	pub characteristic_id: Uuid,
	pub descriptor_id: Uuid,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtuChanged {
	pub mtu: u16,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhyRead {
	pub tx_phy: i32,
	pub rx_phy: i32,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhyUpdate {
	pub tx_phy: i32,
	pub rx_phy: i32,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRemoteRssi {
	pub rssi: i32,
	pub status: GattStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliableWriteCompleted {
	pub status: GattStatus,
}

/// One outcome reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GattEvent {
	ConnectionChanged(ConnectionChanged),
	ServicesDiscovered(ServicesDiscovered),
	CharacteristicRead(CharacteristicRead),
	CharacteristicWritten(CharacteristicWritten),
	CharacteristicChanged(CharacteristicChanged),
	DescriptorRead(DescriptorRead),
	DescriptorWritten(DescriptorWritten),
	MtuChanged(MtuChanged),
	PhyRead(PhyRead),
	PhyUpdate(PhyUpdate),
	ReadRemoteRssi(ReadRemoteRssi),
	ReliableWriteCompleted(ReliableWriteCompleted),
	/// The peripheral's attribute table changed; carries no payload.
	ServiceChanged,
}

impl GattEvent {
	/// Variant name, for logging.
	pub fn name(&self) -> &'static str {
		match self {
			Self::ConnectionChanged(_) => "ConnectionChanged",
			Self::ServicesDiscovered(_) => "ServicesDiscovered",
			Self::CharacteristicRead(_) => "CharacteristicRead",
			Self::CharacteristicWritten(_) => "CharacteristicWritten",
			Self::CharacteristicChanged(_) => "CharacteristicChanged",
			Self::DescriptorRead(_) => "DescriptorRead",
			Self::DescriptorWritten(_) => "DescriptorWritten",
			Self::MtuChanged(_) => "MtuChanged",
			Self::PhyRead(_) => "PhyRead",
			Self::PhyUpdate(_) => "PhyUpdate",
			Self::ReadRemoteRssi(_) => "ReadRemoteRssi",
			Self::ReliableWriteCompleted(_) => "ReliableWriteCompleted",
			Self::ServiceChanged => "ServiceChanged",
		}
	}

	/// Status carried by the event, `None` for unsolicited variants.
	pub fn status(&self) -> Option<GattStatus> {
		match self {
			Self::ConnectionChanged(e) => Some(e.status),
			Self::ServicesDiscovered(e) => Some(e.status),
			Self::CharacteristicRead(e) => Some(e.status),
			Self::CharacteristicWritten(e) => Some(e.status),
			Self::DescriptorRead(e) => Some(e.status),
			Self::DescriptorWritten(e) => Some(e.status),
			Self::MtuChanged(e) => Some(e.status),
			Self::PhyRead(e) => Some(e.status),
			Self::PhyUpdate(e) => Some(e.status),
			Self::ReadRemoteRssi(e) => Some(e.status),
			Self::ReliableWriteCompleted(e) => Some(e.status),
			Self::CharacteristicChanged(_) | Self::ServiceChanged => None,
		}
	}

	/// True for events the peripheral sends without a request.
	pub fn is_unsolicited(&self) -> bool {
		matches!(self, Self::CharacteristicChanged(_) | Self::ServiceChanged)
	}
}

macro_rules! event_payload {
	($($variant:ident),* $(,)?) => {
		$(
			impl From<$variant> for GattEvent {
				fn from(payload: $variant) -> Self {
					GattEvent::$variant(payload)
				}
			}

			impl TryFrom<GattEvent> for $variant {
				type Error = GattEvent;

				fn try_from(event: GattEvent) -> Result<Self, Self::Error> {
					match event {
						GattEvent::$variant(payload) => Ok(payload),
						other => Err(other),
					}
				}
			}
		)*
	};
}

event_payload!(
	ConnectionChanged,
	ServicesDiscovered,
	CharacteristicRead,
	CharacteristicWritten,
	CharacteristicChanged,
	DescriptorRead,
	DescriptorWritten,
	MtuChanged,
	PhyRead,
	PhyUpdate,
	ReadRemoteRssi,
	ReliableWriteCompleted,
);

impl CharacteristicRead {
	pub fn target(&self) -> CharacteristicRef {
		CharacteristicRef {
			id: self.characteristic_id,
			instance_id: self.instance_id,
		}
	}
}

impl CharacteristicWritten {
	pub fn target(&self) -> CharacteristicRef {
		CharacteristicRef {
			id: self.characteristic_id,
			instance_id: self.instance_id,
		}
	}
}

impl CharacteristicChanged {
	pub fn target(&self) -> CharacteristicRef {
		CharacteristicRef {
			id: self.characteristic_id,
			instance_id: self.instance_id,
		}
	}
}

impl DescriptorRead {
	pub fn is_for(&self, target: &DescriptorRef) -> bool {
		self.characteristic_id == target.characteristic.id && self.descriptor_id == target.id
	}
}

impl DescriptorWritten {
	pub fn is_for(&self, target: &DescriptorRef) -> bool {
		self.characteristic_id == target.characteristic.id && self.descriptor_id == target.id
	}
}
