//! The public session façade.
//!
//! A [`Session`] wires a [`GattDriver`] to the runtime engine: the driver's
//! callback feeds an [`EventBridge`], the bridge publishes into an
//! [`EventBus`], the [`ConnectionStateTracker`] observes every event, and
//! every request goes through one [`RequestSerializer`].
//!
//! Each operation follows the same steps: precondition checks (session open,
//! arguments and targets valid, link connected), then a driver call under
//! exclusive access, then the correlated event mapped into a typed
//! [`Outcome`]. Precondition violations are [`Error`]s; anything the
//! peripheral or the driver can legitimately do wrong is an `Outcome`.

use std::sync::Arc;
use std::time::Duration;

use gattlink_protocol::{
	Characteristic, CharacteristicChanged, CharacteristicRead, CharacteristicRef, CharacteristicWritten, ConnectionChanged,
	ConnectionState, Descriptor, DescriptorRead, DescriptorRef, DescriptorWritten, GattEvent, MtuChanged, Phy,
	PhyOptions, PhyRead, PhyUpdate, ReadRemoteRssi, ReliableWriteCompleted, Service, ServicesDiscovered, WriteType,
};
use gattlink_runtime::{
	AttributeWriter, Correlation, ConnectionStateTracker, DriverResult, Error, EventBridge, EventBus,
	EventSubscription, GattCallback, GattDriver, LinkRelease, Outcome, RequestSerializer, Result, ServiceTree,
	writer_for,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::SessionConfig;

/// Smallest ATT MTU every peripheral supports.
pub const MIN_MTU: u16 = 23;

/// Largest ATT MTU the link layer accepts.
pub const MAX_MTU: u16 = 517;

const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Client session with one remote GATT peripheral.
///
/// Operations may be called concurrently from any number of tasks; the
/// driver still sees them one at a time. Dropping the session releases the
/// link like [`close`](Self::close) does, without waiting.
pub struct Session {
	driver: Arc<dyn GattDriver>,
	config: SessionConfig,
	bus: Arc<EventBus>,
	tracker: Arc<ConnectionStateTracker>,
	serializer: Arc<RequestSerializer>,
	writer: Box<dyn AttributeWriter>,
	link: Arc<LinkRelease>,
	bridge: Mutex<Option<EventBridge>>,
}

impl Session {
	/// Builds a session over `driver` and starts the event bridge.
	///
	/// Must be called from within a tokio runtime. The link is not touched
	/// until [`connect`](Self::connect).
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] if `config` does not validate.
	pub fn open(driver: Arc<dyn GattDriver>, config: SessionConfig) -> Result<Self> {
		config
			.validate()
			.map_err(|err| Error::InvalidArgument(err.to_string()))?;

		let bus = Arc::new(EventBus::new(config.event_buffer_capacity));
		let tracker = Arc::new(ConnectionStateTracker::new({
			let driver = Arc::clone(&driver);
			move || driver.services()
		}));
		bus.attach_observer(tracker.clone());

		let capabilities = driver.capabilities();
		let writer = writer_for(capabilities);
		let serializer = Arc::new(RequestSerializer::new(Arc::clone(&bus)));
		let link = Arc::new(LinkRelease::new(Arc::clone(&driver)));
		link.on_release({
			let serializer = Arc::clone(&serializer);
			let tracker = Arc::clone(&tracker);
			move || {
				if serializer.close() {
					tracing::warn!("Driver released the link, session closed");
				}
				tracker.freeze();
			}
		});

		let (callback, rx) = GattCallback::channel();
		driver.attach(callback);
		let bridge = EventBridge::spawn(rx, Arc::clone(&bus), Arc::clone(&link));

		tracing::debug!(
			value_in_call = capabilities.value_in_call,
			timeout_ms = config.operation_timeout_ms,
			capacity = config.event_buffer_capacity,
			"Session opened"
		);

		Ok(Self {
			serializer,
			driver,
			config,
			bus,
			tracker,
			writer,
			link,
			bridge: Mutex::new(Some(bridge)),
		})
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Current link state, as of the last observed `ConnectionChanged`.
	pub fn state(&self) -> ConnectionState {
		self.tracker.state()
	}

	/// Receiver notified on every connection state change.
	pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
		self.tracker.watch_state()
	}

	/// Service tree from the last successful discovery.
	pub fn services(&self) -> ServiceTree {
		self.tracker.services()
	}

	/// Receiver notified whenever the service tree is replaced or emptied.
	pub fn service_changes(&self) -> watch::Receiver<ServiceTree> {
		self.tracker.watch_services()
	}

	/// Looks up a characteristic in the current service tree.
	pub fn find_characteristic(&self, service_id: Uuid, characteristic_id: Uuid) -> Option<Characteristic> {
		self.tracker
			.services()
			.iter()
			.filter(|service| service.id == service_id)
			.find_map(|service| service.characteristic(characteristic_id))
			.cloned()
	}

	/// Every event published from now on.
	///
	/// The subscription holds at most `eventBufferCapacity` unread events.
	/// Falling further behind is fatal for the whole session.
	///
	/// Typed subscriptions such as [`notifications`](Self::notifications)
	/// count only the events they yield against that capacity.
	pub fn events(&self) -> EventSubscription {
		self.bus.subscribe()
	}

	/// Unsolicited value notifications published from now on.
	pub fn notifications(&self) -> EventSubscription<CharacteristicChanged> {
		self.bus.subscribe_as()
	}

	pub fn is_closed(&self) -> bool {
		self.serializer.is_closed()
	}

	/// Starts connecting to the peripheral.
	///
	/// Does not wait for the link to come up. The returned subscription sees
	/// every `ConnectionChanged` caused by this call, starting with the first.
	/// [`connection_states`](Self::connection_states) gives the same progress
	/// as plain state values.
	pub async fn connect(&self) -> Result<Outcome<EventSubscription<ConnectionChanged>>> {
		let changes = self.bus.subscribe_as::<ConnectionChanged>();
		let options = self.config.connect;

		let outcome = self
			.serializer
			.trigger("connect", || self.driver.connect(&options))
			.await?;
		Ok(outcome.map(|()| changes))
	}

	/// Disconnects and waits for the resulting state change.
	pub async fn disconnect(&self) -> Result<Outcome<ConnectionState>> {
		const OPERATION: &str = "disconnect";
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::ConnectionChanged, || {
				self.driver.disconnect();
				Ok(())
			})
			.await?;
		// The link state is authoritative regardless of the reported status.
		Ok(outcome.map(|event| match event {
			GattEvent::ConnectionChanged(change) => change.new_state,
			_ => self.tracker.state(),
		}))
	}

	/// Discovers the remote services and replaces the service tree.
	///
	/// Allowed in any link state; the driver decides whether it can run.
	pub async fn discover_services(&self) -> Result<Outcome<ServiceTree>> {
		const OPERATION: &str = "discover services";
		self.ensure_open(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::ServicesDiscovered, || self.driver.discover_services())
			.await?;
		// The tracker has already replaced the tree when the waiter fires.
		Ok(outcome.settle::<ServicesDiscovered>().map(|_| self.tracker.services()))
	}

	pub async fn read_characteristic(&self, characteristic: &Characteristic) -> Result<Outcome<Vec<u8>>> {
		const OPERATION: &str = "read characteristic";
		self.ensure_open(OPERATION)?;
		let target = self.known_target(characteristic)?;
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::CharacteristicRead(target), || {
				self.driver.read_characteristic(&target)
			})
			.await?;
		Ok(outcome.settle::<CharacteristicRead>().map(|read| read.value))
	}

	pub async fn write_characteristic(
		&self,
		characteristic: &Characteristic,
		value: &[u8],
		write_type: WriteType,
	) -> Result<Outcome<()>> {
		const OPERATION: &str = "write characteristic";
		self.ensure_open(OPERATION)?;
		let target = self.known_target(characteristic)?;
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::CharacteristicWritten(target), || {
				self.writer
					.write_characteristic(self.driver.as_ref(), &target, value, write_type)
			})
			.await?;
		Ok(outcome.settle::<CharacteristicWritten>().map(|_| ()))
	}

	/// Reads `descriptor`, which must belong to `characteristic`.
	pub async fn read_descriptor(
		&self,
		characteristic: &Characteristic,
		descriptor: &Descriptor,
	) -> Result<Outcome<Vec<u8>>> {
		const OPERATION: &str = "read descriptor";
		self.ensure_open(OPERATION)?;
		self.known_target(characteristic)?;
		let target = descriptor_target(characteristic, descriptor.id)?;
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::DescriptorRead(target), || {
				self.driver.read_descriptor(&target)
			})
			.await?;
		Ok(outcome.settle::<DescriptorRead>().map(|read| read.value))
	}

	/// Writes `descriptor`, which must belong to `characteristic`.
	pub async fn write_descriptor(
		&self,
		characteristic: &Characteristic,
		descriptor: &Descriptor,
		value: &[u8],
	) -> Result<Outcome<()>> {
		const OPERATION: &str = "write descriptor";
		self.ensure_open(OPERATION)?;
		self.known_target(characteristic)?;
		let target = descriptor_target(characteristic, descriptor.id)?;
		self.ensure_connected(OPERATION)?;

		self.write_descriptor_value(OPERATION, target, value).await
	}

	/// Enables notifications for `characteristic`.
	///
	/// Turns on local delivery in the driver, then writes the enable value to
	/// the configuration descriptor (`descriptor`, or the configured CCCD).
	/// Notifications then arrive through [`notifications`](Self::notifications).
	pub async fn register_notifications(
		&self,
		characteristic: &Characteristic,
		descriptor: Option<Uuid>,
	) -> Result<Outcome<()>> {
		self.set_notifications("register notifications", characteristic, descriptor, true)
			.await
	}

	/// Reverses [`register_notifications`](Self::register_notifications).
	pub async fn unregister_notifications(
		&self,
		characteristic: &Characteristic,
		descriptor: Option<Uuid>,
	) -> Result<Outcome<()>> {
		self.set_notifications("unregister notifications", characteristic, descriptor, false)
			.await
	}

	async fn set_notifications(
		&self,
		operation: &'static str,
		characteristic: &Characteristic,
		descriptor: Option<Uuid>,
		enabled: bool,
	) -> Result<Outcome<()>> {
		self.ensure_open(operation)?;
		self.known_target(characteristic)?;
		let target = descriptor_target(characteristic, descriptor.unwrap_or(self.config.cccd_id))?;
		self.ensure_connected(operation)?;

		let value = if enabled {
			ENABLE_NOTIFICATION_VALUE
		} else {
			DISABLE_NOTIFICATION_VALUE
		};
		let outcome = self
			.execute(operation, Correlation::DescriptorWritten(target), || {
				self.driver
					.set_characteristic_notification(&target.characteristic, enabled)?;
				self.writer.write_descriptor(self.driver.as_ref(), &target, &value)
			})
			.await?;
		Ok(outcome.settle::<DescriptorWritten>().map(|_| ()))
	}

	async fn write_descriptor_value(
		&self,
		operation: &'static str,
		target: DescriptorRef,
		value: &[u8],
	) -> Result<Outcome<()>> {
		let outcome = self
			.execute(operation, Correlation::DescriptorWritten(target), || {
				self.writer.write_descriptor(self.driver.as_ref(), &target, value)
			})
			.await?;
		Ok(outcome.settle::<DescriptorWritten>().map(|_| ()))
	}

	/// Requests an ATT MTU and returns the one negotiated.
	#[doc(alias = "read_mtu")]
	pub async fn request_mtu(&self, mtu: u16) -> Result<Outcome<u16>> {
		const OPERATION: &str = "request mtu";
		self.ensure_open(OPERATION)?;
		if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
			return Err(Error::InvalidArgument(format!(
				"MTU {mtu} outside {MIN_MTU}..={MAX_MTU}"
			)));
		}
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::MtuChanged, || self.driver.request_mtu(mtu))
			.await?;
		Ok(outcome.settle::<MtuChanged>().map(|changed| changed.mtu))
	}

	pub async fn read_phy(&self) -> Result<Outcome<PhyRead>> {
		const OPERATION: &str = "read phy";
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::PhyRead, || self.driver.read_phy())
			.await?;
		Ok(outcome.settle())
	}

	pub async fn set_preferred_phy(&self, tx: Phy, rx: Phy, options: PhyOptions) -> Result<Outcome<PhyUpdate>> {
		const OPERATION: &str = "set preferred phy";
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::PhyUpdate, || {
				self.driver.set_preferred_phy(tx, rx, options)
			})
			.await?;
		Ok(outcome.settle())
	}

	/// Reads the received signal strength of the link, in dBm.
	pub async fn read_remote_rssi(&self) -> Result<Outcome<i32>> {
		const OPERATION: &str = "read remote rssi";
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::ReadRemoteRssi, || self.driver.read_remote_rssi())
			.await?;
		Ok(outcome.settle::<ReadRemoteRssi>().map(|read| read.rssi))
	}

	/// Starts queueing writes on the peripheral until execute or abort.
	pub async fn begin_reliable_write(&self) -> Result<Outcome<()>> {
		self.trigger_connected("begin reliable write", || self.driver.begin_reliable_write())
			.await
	}

	/// Commits the queued writes.
	pub async fn execute_reliable_write(&self) -> Result<Outcome<()>> {
		const OPERATION: &str = "execute reliable write";
		self.ensure_connected(OPERATION)?;

		let outcome = self
			.execute(OPERATION, Correlation::ReliableWriteCompleted, || {
				self.driver.execute_reliable_write()
			})
			.await?;
		Ok(outcome.settle::<ReliableWriteCompleted>().map(|_| ()))
	}

	/// Discards the queued writes.
	pub async fn abort_reliable_write(&self) -> Result<Outcome<()>> {
		self.trigger_connected("abort reliable write", || self.driver.abort_reliable_write())
			.await
	}

	/// Closes the session.
	///
	/// Pending and queued operations resolve to
	/// [`Failure::Cancelled`](gattlink_runtime::Failure::Cancelled), the
	/// driver is disconnected and closed exactly once, and the event bridge
	/// stops. Every later operation fails with [`Error::SessionClosed`].
	/// Afterwards [`state`](Self::state) is `Disconnected` and the service
	/// tree is empty.
	///
	/// The same happens without a call to `close` when the driver drops its
	/// callback.
	///
	/// # Errors
	///
	/// Returns [`Error::SessionClosed`] if the session was already closed,
	/// including by the driver dropping its callback.
	pub async fn close(&self) -> Result<()> {
		if !self.serializer.close() {
			return Err(Error::SessionClosed { operation: "close" });
		}
		tracing::info!(state = %self.tracker.state(), "Closing session");

		self.link.release();
		self.serializer.drain().await;

		let bridge = self.bridge.lock().take();
		if let Some(bridge) = bridge {
			bridge.shutdown().await;
		}
		Ok(())
	}

	/// Synchronous part of close, for drop paths that cannot await.
	pub(crate) fn shutdown_now(&self) {
		if !self.serializer.close() {
			return;
		}
		tracing::debug!("Session dropped without close");
		self.link.release();
		self.bridge.lock().take();
	}

	async fn execute<F>(&self, operation: &'static str, correlation: Correlation, action: F) -> Result<Outcome<GattEvent>>
	where
		F: FnOnce() -> DriverResult,
	{
		self.serializer
			.execute(operation, correlation, self.operation_timeout(), action)
			.await
	}

	async fn trigger_connected<F>(&self, operation: &'static str, action: F) -> Result<Outcome<()>>
	where
		F: FnOnce() -> DriverResult,
	{
		self.ensure_connected(operation)?;
		self.serializer.trigger(operation, action).await
	}

	fn operation_timeout(&self) -> Duration {
		self.config.operation_timeout()
	}

	fn ensure_open(&self, operation: &'static str) -> Result<()> {
		if self.serializer.is_closed() {
			return Err(Error::SessionClosed { operation });
		}
		Ok(())
	}

	/// Checks `characteristic` against the discovered tree.
	///
	/// Before the first discovery there is nothing to check against and every
	/// characteristic is passed through to the driver.
	fn known_target(&self, characteristic: &Characteristic) -> Result<CharacteristicRef> {
		let target = characteristic.target();
		let services = self.tracker.services();
		if services.is_empty() || services.iter().any(|service| contains(service, &target)) {
			return Ok(target);
		}
		Err(Error::InvalidTarget(format!(
			"characteristic {} (instance {}) is not in the discovered services",
			target.id, target.instance_id
		)))
	}

	fn ensure_connected(&self, operation: &'static str) -> Result<()> {
		self.ensure_open(operation)?;
		let state = self.tracker.state();
		if !state.is_connected() {
			return Err(Error::NotConnected { operation, state });
		}
		Ok(())
	}
}

fn contains(service: &Service, target: &CharacteristicRef) -> bool {
	service
		.characteristics
		.iter()
		.any(|characteristic| characteristic.target() == *target)
		|| service
			.included_services
			.iter()
			.any(|included| contains(included, target))
}

/// Resolves `descriptor_id` on `characteristic`.
fn descriptor_target(characteristic: &Characteristic, descriptor_id: Uuid) -> Result<DescriptorRef> {
	characteristic
		.descriptor(descriptor_id)
		.map(|descriptor| DescriptorRef::new(characteristic, descriptor))
		.ok_or_else(|| {
			Error::InvalidTarget(format!(
				"characteristic {} has no descriptor {descriptor_id}",
				characteristic.id
			))
		})
}

impl Drop for Session {
	fn drop(&mut self) {
		self.shutdown_now();
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("state", &self.tracker.state())
			.field("closed", &self.is_closed())
			.field("serializer", &self.serializer)
			.finish()
	}
}
