//! The driver adapter boundary.
//!
//! A [`GattDriver`] wraps the platform GATT stack. Every method only *starts*
//! work and returns immediately; the outcome arrives later as a
//! [`GattEvent`](gattlink_protocol::GattEvent) through the [`GattCallback`]
//! handed to [`GattDriver::attach`].
//!
//! Platforms differ in how values are written. Older stacks stage the value on
//! the attribute object and then commit it, newer ones take the value in the
//! call. The shape is reported once by [`GattDriver::capabilities`] and
//! resolved into an [`AttributeWriter`] when the session is built.

use gattlink_protocol::{CharacteristicRef, ConnectOptions, DescriptorRef, Phy, PhyOptions, Service, WriteType};

use crate::bridge::GattCallback;
use crate::error::{DriverError, DriverResult};

/// Call shapes supported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
	/// Writes take the value as a call argument instead of staging it first.
	pub value_in_call: bool,
}

impl Default for DriverCapabilities {
	fn default() -> Self {
		Self { value_in_call: true }
	}
}

/// Platform GATT stack as seen by the session.
///
/// Implementations must not block. Only the request serializer calls the
/// request-issuing methods, so at most one of them is outstanding at a time.
pub trait GattDriver: Send + Sync {
	fn capabilities(&self) -> DriverCapabilities {
		DriverCapabilities::default()
	}

	/// Installs the callback that receives every event. Called once, before `connect`.
	fn attach(&self, callback: GattCallback);

	fn connect(&self, options: &ConnectOptions) -> DriverResult;
	fn disconnect(&self);
	/// Releases the link handle. No events may be emitted afterwards.
	fn close(&self);

	fn discover_services(&self) -> DriverResult;
	/// Current service snapshot, read after a successful discovery.
	fn services(&self) -> Vec<Service>;

	fn read_characteristic(&self, target: &CharacteristicRef) -> DriverResult;

	fn write_characteristic(&self, _target: &CharacteristicRef, _value: &[u8], _write_type: WriteType) -> DriverResult {
		Err(DriverError::Unsupported("write characteristic"))
	}

	/// Sets the pending value and write type on the characteristic object.
	fn stage_characteristic_value(
		&self,
		_target: &CharacteristicRef,
		_value: &[u8],
		_write_type: WriteType,
	) -> DriverResult {
		Err(DriverError::Unsupported("stage characteristic value"))
	}

	/// Writes the previously staged value.
	fn commit_characteristic_write(&self, _target: &CharacteristicRef) -> DriverResult {
		Err(DriverError::Unsupported("commit characteristic write"))
	}

	fn read_descriptor(&self, target: &DescriptorRef) -> DriverResult;

	fn write_descriptor(&self, _target: &DescriptorRef, _value: &[u8]) -> DriverResult {
		Err(DriverError::Unsupported("write descriptor"))
	}

	fn stage_descriptor_value(&self, _target: &DescriptorRef, _value: &[u8]) -> DriverResult {
		Err(DriverError::Unsupported("stage descriptor value"))
	}

	fn commit_descriptor_write(&self, _target: &DescriptorRef) -> DriverResult {
		Err(DriverError::Unsupported("commit descriptor write"))
	}

	/// Enables or disables local delivery of notifications. Emits no event.
	fn set_characteristic_notification(&self, target: &CharacteristicRef, enabled: bool) -> DriverResult;

	fn request_mtu(&self, mtu: u16) -> DriverResult;
	fn read_phy(&self) -> DriverResult;
	fn set_preferred_phy(&self, tx: Phy, rx: Phy, options: PhyOptions) -> DriverResult;
	fn read_remote_rssi(&self) -> DriverResult;

	fn begin_reliable_write(&self) -> DriverResult {
		Err(DriverError::Unsupported("reliable write"))
	}

	fn execute_reliable_write(&self) -> DriverResult {
		Err(DriverError::Unsupported("reliable write"))
	}

	fn abort_reliable_write(&self) -> DriverResult {
		Err(DriverError::Unsupported("reliable write"))
	}
}

/// Strategy for issuing attribute writes in the driver's call shape.
pub trait AttributeWriter: Send + Sync {
	fn write_characteristic(
		&self,
		driver: &dyn GattDriver,
		target: &CharacteristicRef,
		value: &[u8],
		write_type: WriteType,
	) -> DriverResult;

	fn write_descriptor(&self, driver: &dyn GattDriver, target: &DescriptorRef, value: &[u8]) -> DriverResult;
}

/// Passes the value in the write call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectWrite;

impl AttributeWriter for DirectWrite {
	fn write_characteristic(
		&self,
		driver: &dyn GattDriver,
		target: &CharacteristicRef,
		value: &[u8],
		write_type: WriteType,
	) -> DriverResult {
		driver.write_characteristic(target, value, write_type)
	}

	fn write_descriptor(&self, driver: &dyn GattDriver, target: &DescriptorRef, value: &[u8]) -> DriverResult {
		driver.write_descriptor(target, value)
	}
}

/// Stages the value on the attribute, then commits it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedWrite;

impl AttributeWriter for StagedWrite {
	fn write_characteristic(
		&self,
		driver: &dyn GattDriver,
		target: &CharacteristicRef,
		value: &[u8],
		write_type: WriteType,
	) -> DriverResult {
		driver.stage_characteristic_value(target, value, write_type)?;
		driver.commit_characteristic_write(target)
	}

	fn write_descriptor(&self, driver: &dyn GattDriver, target: &DescriptorRef, value: &[u8]) -> DriverResult {
		driver.stage_descriptor_value(target, value)?;
		driver.commit_descriptor_write(target)
	}
}

/// Picks the writer matching `capabilities`.
pub fn writer_for(capabilities: DriverCapabilities) -> Box<dyn AttributeWriter> {
	if capabilities.value_in_call {
		Box::new(DirectWrite)
	} else {
		Box::new(StagedWrite)
	}
}

#[cfg(test)]
mod tests {
	use gattlink_protocol::Uuid;

	use super::*;
	use crate::testing::{DriverCall, ScriptedDriver};

	const TARGET: CharacteristicRef = CharacteristicRef {
		id: Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb),
		instance_id: 7,
	};

	#[test]
	fn direct_writer_passes_the_value_in_the_call() {
		let driver = ScriptedDriver::new();
		let writer = writer_for(driver.capabilities());

		writer
			.write_characteristic(&driver, &TARGET, &[1, 2, 3], WriteType::NoResponse)
			.unwrap();

		assert_eq!(
			driver.calls(),
			vec![DriverCall::WriteCharacteristic {
				target: TARGET,
				value: vec![1, 2, 3],
				write_type: WriteType::NoResponse,
			}]
		);
	}

	#[test]
	fn staged_writer_stages_then_commits() {
		let driver = ScriptedDriver::new().with_capabilities(DriverCapabilities { value_in_call: false });
		let writer = writer_for(driver.capabilities());

		writer
			.write_characteristic(&driver, &TARGET, &[9], WriteType::Default)
			.unwrap();

		assert_eq!(
			driver.calls(),
			vec![
				DriverCall::StageCharacteristicValue {
					target: TARGET,
					value: vec![9],
					write_type: WriteType::Default,
				},
				DriverCall::CommitCharacteristicWrite(TARGET),
			]
		);
		assert_eq!(driver.value(&TARGET), Some(vec![9]));
	}

	#[test]
	fn staged_writer_stops_when_staging_is_rejected() {
		struct ReadOnly;

		impl GattDriver for ReadOnly {
			fn attach(&self, _callback: GattCallback) {}
			fn connect(&self, _options: &ConnectOptions) -> DriverResult {
				Ok(())
			}
			fn disconnect(&self) {}
			fn close(&self) {}
			fn discover_services(&self) -> DriverResult {
				Ok(())
			}
			fn services(&self) -> Vec<Service> {
				Vec::new()
			}
			fn read_characteristic(&self, _target: &CharacteristicRef) -> DriverResult {
				Ok(())
			}
			fn read_descriptor(&self, _target: &DescriptorRef) -> DriverResult {
				Ok(())
			}
			fn set_characteristic_notification(&self, _target: &CharacteristicRef, _enabled: bool) -> DriverResult {
				Ok(())
			}
			fn request_mtu(&self, _mtu: u16) -> DriverResult {
				Ok(())
			}
			fn read_phy(&self) -> DriverResult {
				Ok(())
			}
			fn set_preferred_phy(&self, _tx: Phy, _rx: Phy, _options: PhyOptions) -> DriverResult {
				Ok(())
			}
			fn read_remote_rssi(&self) -> DriverResult {
				Ok(())
			}
		}

		let err = StagedWrite
			.write_characteristic(&ReadOnly, &TARGET, &[1], WriteType::Default)
			.unwrap_err();
		assert_eq!(err, DriverError::Unsupported("stage characteristic value"));
		assert!(ReadOnly.capabilities().value_in_call);
	}
}
