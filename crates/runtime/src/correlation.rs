//! Matching driver events to the request that caused them.
//!
//! The link has no request ids, so a pending request is identified by the
//! event variant it expects plus the identity of its target. Unsolicited
//! `CharacteristicChanged` and `ServiceChanged` events have no [`Correlation`]
//! and can never resolve a request.

use std::fmt;

use gattlink_protocol::{CharacteristicRef, DescriptorRef, GattEvent};

/// What a pending request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
	ConnectionChanged,
	ServicesDiscovered,
	CharacteristicRead(CharacteristicRef),
	CharacteristicWritten(CharacteristicRef),
	DescriptorRead(DescriptorRef),
	DescriptorWritten(DescriptorRef),
	MtuChanged,
	PhyRead,
	PhyUpdate,
	ReadRemoteRssi,
	ReliableWriteCompleted,
}

impl Correlation {
	/// Returns true if `event` terminates a request with this correlation.
	pub fn matches(&self, event: &GattEvent) -> bool {
		match (self, event) {
			(Self::ConnectionChanged, GattEvent::ConnectionChanged(_)) => true,
			(Self::ServicesDiscovered, GattEvent::ServicesDiscovered(_)) => true,
			(Self::CharacteristicRead(target), GattEvent::CharacteristicRead(read)) => read.target() == *target,
			(Self::CharacteristicWritten(target), GattEvent::CharacteristicWritten(written)) => {
				written.target() == *target
			}
			(Self::DescriptorRead(target), GattEvent::DescriptorRead(read)) => read.is_for(target),
			(Self::DescriptorWritten(target), GattEvent::DescriptorWritten(written)) => written.is_for(target),
			(Self::MtuChanged, GattEvent::MtuChanged(_)) => true,
			(Self::PhyRead, GattEvent::PhyRead(_)) => true,
			(Self::PhyUpdate, GattEvent::PhyUpdate(_)) => true,
			(Self::ReadRemoteRssi, GattEvent::ReadRemoteRssi(_)) => true,
			(Self::ReliableWriteCompleted, GattEvent::ReliableWriteCompleted(_)) => true,
			_ => false,
		}
	}

	/// Owned predicate suitable for [`EventBus::register_waiter`](crate::EventBus::register_waiter).
	pub fn predicate(self) -> impl Fn(&GattEvent) -> bool + Send + Sync + 'static {
		move |event| self.matches(event)
	}
}

impl fmt::Display for Correlation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::CharacteristicRead(target) => write!(f, "CharacteristicRead({}#{})", target.id, target.instance_id),
			Self::CharacteristicWritten(target) => {
				write!(f, "CharacteristicWritten({}#{})", target.id, target.instance_id)
			}
			Self::DescriptorRead(target) => write!(f, "DescriptorRead({}/{})", target.characteristic.id, target.id),
			Self::DescriptorWritten(target) => {
				write!(f, "DescriptorWritten({}/{})", target.characteristic.id, target.id)
			}
			other => fmt::Debug::fmt(other, f),
		}
	}
}
