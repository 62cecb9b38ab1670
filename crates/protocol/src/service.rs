//! Immutable projections of the remote attribute tree.
//!
//! A [`Service`] tree is produced by the driver after a successful discovery
//! and is never mutated afterwards; the session replaces the whole tree on the
//! next discovery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a service is advertised as primary or only included by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
	#[default]
	Primary,
	Secondary,
}

/// A GATT service with its characteristics and included services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
	pub id: Uuid,
	pub instance_id: u32,
	pub service_type: ServiceType,
	#[serde(default)]
	pub characteristics: Vec<Characteristic>,
	#[serde(default)]
	pub included_services: Vec<Service>,
}

impl Service {
	pub fn new(id: Uuid, instance_id: u32) -> Self {
		Self {
			id,
			instance_id,
			service_type: ServiceType::Primary,
			characteristics: Vec::new(),
			included_services: Vec::new(),
		}
	}

	pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
		self.characteristics.push(characteristic);
		self
	}

	pub fn with_included_service(mut self, service: Service) -> Self {
		self.included_services.push(service);
		self
	}

	/// First characteristic with the given id, in discovery order.
	pub fn characteristic(&self, id: Uuid) -> Option<&Characteristic> {
		self.characteristics.iter().find(|c| c.id == id)
	}
}

/// A characteristic on a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristic {
	pub id: Uuid,
	/// Distinguishes characteristics sharing an id within one peripheral.
	pub instance_id: u32,
	pub permissions: u32,
	pub properties: u32,
	#[serde(default)]
	pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
	pub const PROPERTY_BROADCAST: u32 = 0x01;
	pub const PROPERTY_READ: u32 = 0x02;
	pub const PROPERTY_WRITE_NO_RESPONSE: u32 = 0x04;
	pub const PROPERTY_WRITE: u32 = 0x08;
	pub const PROPERTY_NOTIFY: u32 = 0x10;
	pub const PROPERTY_INDICATE: u32 = 0x20;
	pub const PROPERTY_SIGNED_WRITE: u32 = 0x40;

	pub fn new(id: Uuid, instance_id: u32) -> Self {
		Self {
			id,
			instance_id,
			permissions: 0,
			properties: 0,
			descriptors: Vec::new(),
		}
	}

	pub fn with_properties(mut self, properties: u32) -> Self {
		self.properties = properties;
		self
	}

	pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
		self.descriptors.push(descriptor);
		self
	}

	pub fn has_property(&self, property: u32) -> bool {
		self.properties & property == property
	}

	pub fn descriptor(&self, id: Uuid) -> Option<&Descriptor> {
		self.descriptors.iter().find(|d| d.id == id)
	}

	/// Identity used to correlate driver events with requests on this characteristic.
	pub fn target(&self) -> CharacteristicRef {
		CharacteristicRef {
			id: self.id,
			instance_id: self.instance_id,
		}
	}
}

/// A descriptor on a characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
	pub id: Uuid,
	pub permissions: u32,
}

impl Descriptor {
	pub fn new(id: Uuid) -> Self {
		Self { id, permissions: 0 }
	}
}

/// Identity of a characteristic: its id plus instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicRef {
	pub id: Uuid,
	pub instance_id: u32,
}

/// Identity of a descriptor: the owning characteristic plus the descriptor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorRef {
	pub characteristic: CharacteristicRef,
	pub id: Uuid,
}

impl DescriptorRef {
	pub fn new(characteristic: &Characteristic, descriptor: &Descriptor) -> Self {
		Self {
			characteristic: characteristic.target(),
			id: descriptor.id,
		}
	}
}
