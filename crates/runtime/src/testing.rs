//! Scripted [`GattDriver`] for tests.
//!
//! [`ScriptedDriver`] records every call, answers each request with the events
//! a well-behaved peripheral would produce, and can be told to answer a
//! particular call late, never, or by rejecting it. It also tracks how many
//! requests are awaiting their reply at once, which is how tests prove the
//! session never overlaps driver operations.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gattlink_protocol::{
	CharacteristicRead, CharacteristicRef, CharacteristicWritten, ConnectOptions, ConnectionChanged, ConnectionState,
	DescriptorRead, DescriptorRef, DescriptorWritten, GattEvent, GattStatus, MtuChanged, Phy, PhyOptions, PhyRead,
	PhyUpdate, ReadRemoteRssi, ReliableWriteCompleted, Service, ServicesDiscovered, WriteType,
};
use parking_lot::Mutex;

use crate::bridge::GattCallback;
use crate::driver::{DriverCapabilities, GattDriver};
use crate::error::{DriverError, DriverResult};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
	Connect(ConnectOptions),
	Disconnect,
	Close,
	DiscoverServices,
	ReadCharacteristic(CharacteristicRef),
	WriteCharacteristic {
		target: CharacteristicRef,
		value: Vec<u8>,
		write_type: WriteType,
	},
	StageCharacteristicValue {
		target: CharacteristicRef,
		value: Vec<u8>,
		write_type: WriteType,
	},
	CommitCharacteristicWrite(CharacteristicRef),
	ReadDescriptor(DescriptorRef),
	WriteDescriptor {
		target: DescriptorRef,
		value: Vec<u8>,
	},
	StageDescriptorValue {
		target: DescriptorRef,
		value: Vec<u8>,
	},
	CommitDescriptorWrite(DescriptorRef),
	SetNotification {
		target: CharacteristicRef,
		enabled: bool,
	},
	RequestMtu(u16),
	ReadPhy,
	SetPreferredPhy {
		tx: Phy,
		rx: Phy,
		options: PhyOptions,
	},
	ReadRemoteRssi,
	BeginReliableWrite,
	ExecuteReliableWrite,
	AbortReliableWrite,
}

/// Call discriminant used to script replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
	Connect,
	Disconnect,
	Close,
	DiscoverServices,
	ReadCharacteristic,
	WriteCharacteristic,
	StageCharacteristicValue,
	CommitCharacteristicWrite,
	ReadDescriptor,
	WriteDescriptor,
	StageDescriptorValue,
	CommitDescriptorWrite,
	SetNotification,
	RequestMtu,
	ReadPhy,
	SetPreferredPhy,
	ReadRemoteRssi,
	BeginReliableWrite,
	ExecuteReliableWrite,
	AbortReliableWrite,
}

impl DriverCall {
	pub fn kind(&self) -> CallKind {
		match self {
			Self::Connect(_) => CallKind::Connect,
			Self::Disconnect => CallKind::Disconnect,
			Self::Close => CallKind::Close,
			Self::DiscoverServices => CallKind::DiscoverServices,
			Self::ReadCharacteristic(_) => CallKind::ReadCharacteristic,
			Self::WriteCharacteristic { .. } => CallKind::WriteCharacteristic,
			Self::StageCharacteristicValue { .. } => CallKind::StageCharacteristicValue,
			Self::CommitCharacteristicWrite(_) => CallKind::CommitCharacteristicWrite,
			Self::ReadDescriptor(_) => CallKind::ReadDescriptor,
			Self::WriteDescriptor { .. } => CallKind::WriteDescriptor,
			Self::StageDescriptorValue { .. } => CallKind::StageDescriptorValue,
			Self::CommitDescriptorWrite(_) => CallKind::CommitDescriptorWrite,
			Self::SetNotification { .. } => CallKind::SetNotification,
			Self::RequestMtu(_) => CallKind::RequestMtu,
			Self::ReadPhy => CallKind::ReadPhy,
			Self::SetPreferredPhy { .. } => CallKind::SetPreferredPhy,
			Self::ReadRemoteRssi => CallKind::ReadRemoteRssi,
			Self::BeginReliableWrite => CallKind::BeginReliableWrite,
			Self::ExecuteReliableWrite => CallKind::ExecuteReliableWrite,
			Self::AbortReliableWrite => CallKind::AbortReliableWrite,
		}
	}
}

/// How the driver answers one call.
#[derive(Debug, Clone)]
pub enum Reply {
	/// Emit these events right away, from inside the call.
	Events(Vec<GattEvent>),
	/// Emit these events from a background task after the delay.
	Delayed(Duration, Vec<GattEvent>),
	/// Accept the call and never answer.
	Silent,
	/// Refuse the call.
	Reject(DriverError),
}

const SCRIPTED_RSSI: i32 = -60;

struct Inner {
	capabilities: DriverCapabilities,
	latency: Option<Duration>,
	callback: Mutex<Option<GattCallback>>,
	calls: Mutex<Vec<DriverCall>>,
	replies: Mutex<HashMap<CallKind, VecDeque<Reply>>>,
	services: Mutex<Vec<Service>>,
	values: Mutex<HashMap<CharacteristicRef, Vec<u8>>>,
	staged: Mutex<HashMap<CharacteristicRef, Vec<u8>>>,
	descriptor_values: Mutex<HashMap<DescriptorRef, Vec<u8>>>,
	staged_descriptors: Mutex<HashMap<DescriptorRef, Vec<u8>>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl Inner {
	fn deliver(&self, events: Vec<GattEvent>) {
		// Leave flight before the answer is visible, like a real stack freeing its slot.
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		let Some(callback) = self.callback.lock().clone() else {
			return;
		};
		for event in events {
			let _ = callback.emit(event);
		}
	}
}

/// In-memory driver with scripted replies.
#[derive(Clone)]
pub struct ScriptedDriver {
	inner: Arc<Inner>,
}

impl Default for ScriptedDriver {
	fn default() -> Self {
		Self::new()
	}
}

impl ScriptedDriver {
	/// Driver that answers every request immediately with success.
	pub fn new() -> Self {
		Self::build(DriverCapabilities::default(), None)
	}

	/// Driver that answers every request `latency` after the call.
	pub fn with_latency(latency: Duration) -> Self {
		Self::build(DriverCapabilities::default(), Some(latency))
	}

	/// Same driver, reporting different call shapes.
	pub fn with_capabilities(self, capabilities: DriverCapabilities) -> Self {
		Self::build(capabilities, self.inner.latency)
	}

	fn build(capabilities: DriverCapabilities, latency: Option<Duration>) -> Self {
		Self {
			inner: Arc::new(Inner {
				capabilities,
				latency,
				callback: Mutex::new(None),
				calls: Mutex::new(Vec::new()),
				replies: Mutex::new(HashMap::new()),
				services: Mutex::new(Vec::new()),
				values: Mutex::new(HashMap::new()),
				staged: Mutex::new(HashMap::new()),
				descriptor_values: Mutex::new(HashMap::new()),
				staged_descriptors: Mutex::new(HashMap::new()),
				in_flight: AtomicUsize::new(0),
				max_in_flight: AtomicUsize::new(0),
			}),
		}
	}

	/// Queues a reply for the next call of `kind`, overriding the default.
	pub fn respond_with(&self, kind: CallKind, reply: Reply) {
		self.inner.replies.lock().entry(kind).or_default().push_back(reply);
	}

	/// Service tree reported after discovery.
	pub fn set_services(&self, services: Vec<Service>) {
		*self.inner.services.lock() = services;
	}

	pub fn set_value(&self, target: CharacteristicRef, value: Vec<u8>) {
		self.inner.values.lock().insert(target, value);
	}

	pub fn value(&self, target: &CharacteristicRef) -> Option<Vec<u8>> {
		self.inner.values.lock().get(target).cloned()
	}

	pub fn descriptor_value(&self, target: &DescriptorRef) -> Option<Vec<u8>> {
		self.inner.descriptor_values.lock().get(target).cloned()
	}

	/// Emits an unsolicited event, as the peripheral would.
	pub fn emit(&self, event: impl Into<GattEvent>) -> bool {
		match self.inner.callback.lock().clone() {
			Some(callback) => callback.emit(event).is_ok(),
			None => false,
		}
	}

	/// The callback installed by the session, if still attached.
	pub fn callback(&self) -> Option<GattCallback> {
		self.inner.callback.lock().clone()
	}

	pub fn calls(&self) -> Vec<DriverCall> {
		self.inner.calls.lock().clone()
	}

	pub fn count(&self, kind: CallKind) -> usize {
		self.inner.calls.lock().iter().filter(|call| call.kind() == kind).count()
	}

	/// Requests issued whose reply has not been emitted yet.
	pub fn in_flight(&self) -> usize {
		self.inner.in_flight.load(Ordering::SeqCst)
	}

	/// Highest value [`in_flight`](Self::in_flight) ever reached.
	pub fn max_in_flight(&self) -> usize {
		self.inner.max_in_flight.load(Ordering::SeqCst)
	}

	fn handle(&self, call: DriverCall) -> DriverResult {
		let scripted = self
			.inner
			.replies
			.lock()
			.get_mut(&call.kind())
			.and_then(VecDeque::pop_front);
		let reply = match scripted {
			Some(reply) => reply,
			None => self.default_reply(&call),
		};
		tracing::trace!(?call, ?reply, "Scripted driver call");
		self.inner.calls.lock().push(call);

		match reply {
			Reply::Reject(err) => Err(err),
			Reply::Silent => Ok(()),
			Reply::Events(events) => {
				self.enter_flight();
				self.inner.deliver(events);
				Ok(())
			}
			Reply::Delayed(delay, events) => {
				self.enter_flight();
				let inner = Arc::clone(&self.inner);
				tokio::spawn(async move {
					tokio::time::sleep(delay).await;
					inner.deliver(events);
				});
				Ok(())
			}
		}
	}

	fn enter_flight(&self) {
		let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
	}

	fn default_reply(&self, call: &DriverCall) -> Reply {
		let events = self.default_events(call);
		match self.inner.latency {
			Some(latency) if !events.is_empty() => Reply::Delayed(latency, events),
			_ => Reply::Events(events),
		}
	}

	fn default_events(&self, call: &DriverCall) -> Vec<GattEvent> {
		let ok = GattStatus::SUCCESS;
		let connection = |new_state| GattEvent::from(ConnectionChanged { status: ok, new_state });

		match call {
			DriverCall::Connect(_) => vec![
				connection(ConnectionState::Connecting),
				connection(ConnectionState::Connected),
			],
			DriverCall::Disconnect => vec![connection(ConnectionState::Disconnected)],
			DriverCall::DiscoverServices => vec![ServicesDiscovered { status: ok }.into()],
			DriverCall::ReadCharacteristic(target) => vec![
				CharacteristicRead {
					characteristic_id: target.id,
					instance_id: target.instance_id,
					value: self.value(target).unwrap_or_default(),
					status: ok,
				}
				.into(),
			],
			DriverCall::WriteCharacteristic { target, value, .. } => {
				self.set_value(*target, value.clone());
				vec![written(target)]
			}
			DriverCall::StageCharacteristicValue { target, value, .. } => {
				self.inner.staged.lock().insert(*target, value.clone());
				Vec::new()
			}
			DriverCall::CommitCharacteristicWrite(target) => {
				if let Some(value) = self.inner.staged.lock().remove(target) {
					self.set_value(*target, value);
				}
				vec![written(target)]
			}
			DriverCall::ReadDescriptor(target) => vec![
				DescriptorRead {
					characteristic_id: target.characteristic.id,
					descriptor_id: target.id,
					value: self.descriptor_value(target).unwrap_or_default(),
					status: ok,
				}
				.into(),
			],
			DriverCall::WriteDescriptor { target, value } => {
				self.inner.descriptor_values.lock().insert(*target, value.clone());
				vec![descriptor_written(target)]
			}
			DriverCall::StageDescriptorValue { target, value } => {
				self.inner.staged_descriptors.lock().insert(*target, value.clone());
				Vec::new()
			}
			DriverCall::CommitDescriptorWrite(target) => {
				if let Some(value) = self.inner.staged_descriptors.lock().remove(target) {
					self.inner.descriptor_values.lock().insert(*target, value);
				}
				vec![descriptor_written(target)]
			}
			DriverCall::RequestMtu(mtu) => vec![MtuChanged { mtu: *mtu, status: ok }.into()],
			DriverCall::ReadPhy => vec![
				PhyRead {
					tx_phy: Phy::Le1M.code(),
					rx_phy: Phy::Le1M.code(),
					status: ok,
				}
				.into(),
			],
			DriverCall::SetPreferredPhy { tx, rx, .. } => vec![
				PhyUpdate {
					tx_phy: tx.code(),
					rx_phy: rx.code(),
					status: ok,
				}
				.into(),
			],
			DriverCall::ReadRemoteRssi => vec![
				ReadRemoteRssi {
					rssi: SCRIPTED_RSSI,
					status: ok,
				}
				.into(),
			],
			DriverCall::ExecuteReliableWrite => vec![ReliableWriteCompleted { status: ok }.into()],
			DriverCall::Close
			| DriverCall::SetNotification { .. }
			| DriverCall::BeginReliableWrite
			| DriverCall::AbortReliableWrite => Vec::new(),
		}
	}
}

fn written(target: &CharacteristicRef) -> GattEvent {
	CharacteristicWritten {
		characteristic_id: target.id,
		instance_id: target.instance_id,
		status: GattStatus::SUCCESS,
	}
	.into()
}

fn descriptor_written(target: &DescriptorRef) -> GattEvent {
	DescriptorWritten {
		characteristic_id: target.characteristic.id,
		descriptor_id: target.id,
		status: GattStatus::SUCCESS,
	}
	.into()
}

impl GattDriver for ScriptedDriver {
	fn capabilities(&self) -> DriverCapabilities {
		self.inner.capabilities
	}

	fn attach(&self, callback: GattCallback) {
		*self.inner.callback.lock() = Some(callback);
	}

	fn connect(&self, options: &ConnectOptions) -> DriverResult {
		self.handle(DriverCall::Connect(*options))
	}

	fn disconnect(&self) {
		let _ = self.handle(DriverCall::Disconnect);
	}

	fn close(&self) {
		let _ = self.handle(DriverCall::Close);
		self.inner.callback.lock().take();
	}

	fn discover_services(&self) -> DriverResult {
		self.handle(DriverCall::DiscoverServices)
	}

	fn services(&self) -> Vec<Service> {
		self.inner.services.lock().clone()
	}

	fn read_characteristic(&self, target: &CharacteristicRef) -> DriverResult {
		self.handle(DriverCall::ReadCharacteristic(*target))
	}

	fn write_characteristic(&self, target: &CharacteristicRef, value: &[u8], write_type: WriteType) -> DriverResult {
		if !self.inner.capabilities.value_in_call {
			return Err(DriverError::Unsupported("write characteristic"));
		}
		self.handle(DriverCall::WriteCharacteristic {
			target: *target,
			value: value.to_vec(),
			write_type,
		})
	}

	fn stage_characteristic_value(&self, target: &CharacteristicRef, value: &[u8], write_type: WriteType) -> DriverResult {
		self.handle(DriverCall::StageCharacteristicValue {
			target: *target,
			value: value.to_vec(),
			write_type,
		})
	}

	fn commit_characteristic_write(&self, target: &CharacteristicRef) -> DriverResult {
		self.handle(DriverCall::CommitCharacteristicWrite(*target))
	}

	fn read_descriptor(&self, target: &DescriptorRef) -> DriverResult {
		self.handle(DriverCall::ReadDescriptor(*target))
	}

	fn write_descriptor(&self, target: &DescriptorRef, value: &[u8]) -> DriverResult {
		if !self.inner.capabilities.value_in_call {
			return Err(DriverError::Unsupported("write descriptor"));
		}
		self.handle(DriverCall::WriteDescriptor {
			target: *target,
			value: value.to_vec(),
		})
	}

	fn stage_descriptor_value(&self, target: &DescriptorRef, value: &[u8]) -> DriverResult {
		self.handle(DriverCall::StageDescriptorValue {
			target: *target,
			value: value.to_vec(),
		})
	}

	fn commit_descriptor_write(&self, target: &DescriptorRef) -> DriverResult {
		self.handle(DriverCall::CommitDescriptorWrite(*target))
	}

	fn set_characteristic_notification(&self, target: &CharacteristicRef, enabled: bool) -> DriverResult {
		self.handle(DriverCall::SetNotification {
			target: *target,
			enabled,
		})
	}

	fn request_mtu(&self, mtu: u16) -> DriverResult {
		self.handle(DriverCall::RequestMtu(mtu))
	}

	fn read_phy(&self) -> DriverResult {
		self.handle(DriverCall::ReadPhy)
	}

	fn set_preferred_phy(&self, tx: Phy, rx: Phy, options: PhyOptions) -> DriverResult {
		self.handle(DriverCall::SetPreferredPhy { tx, rx, options })
	}

	fn read_remote_rssi(&self) -> DriverResult {
		self.handle(DriverCall::ReadRemoteRssi)
	}

	fn begin_reliable_write(&self) -> DriverResult {
		self.handle(DriverCall::BeginReliableWrite)
	}

	fn execute_reliable_write(&self) -> DriverResult {
		self.handle(DriverCall::ExecuteReliableWrite)
	}

	fn abort_reliable_write(&self) -> DriverResult {
		self.handle(DriverCall::AbortReliableWrite)
	}
}

impl std::fmt::Debug for ScriptedDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScriptedDriver")
			.field("calls", &self.inner.calls.lock().len())
			.field("in_flight", &self.in_flight())
			.finish()
	}
}
