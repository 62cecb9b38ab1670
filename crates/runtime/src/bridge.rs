//! Bridge from the driver's callback surface into the [`EventBus`].
//!
//! The driver receives a [`GattCallback`] and invokes it from whatever thread
//! the platform uses. Each invocation becomes one [`GattEvent`] queued on an
//! unbounded channel. [`EventBridge`] owns the receiving end and is the single
//! producer that publishes into the bus.
//!
//! The link is a scoped resource of the bridge: however the bridge task ends
//! (shutdown, the callback side going away, or the runtime dropping the task)
//! the driver is told to disconnect and close, exactly once. Hooks registered
//! with [`LinkRelease::on_release`] run right after, so the owner learns that
//! the link is gone even when the driver was the side that ended it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gattlink_protocol::{
	CharacteristicChanged, CharacteristicRead, CharacteristicRef, CharacteristicWritten, ConnectionChanged,
	ConnectionState, DescriptorRead, DescriptorRef, DescriptorWritten, GattEvent, GattStatus, MtuChanged, PhyRead,
	PhyUpdate, ReadRemoteRssi, ReliableWriteCompleted, ServicesDiscovered,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::driver::GattDriver;
use crate::error::{Error, Result};

/// Handle the driver uses to report outcomes.
///
/// Cheap to clone and safe to call from any thread. Calls after the session
/// has shut down fail with [`Error::ChannelClosed`].
#[derive(Debug, Clone)]
pub struct GattCallback {
	tx: mpsc::UnboundedSender<GattEvent>,
}

impl GattCallback {
	/// Creates a callback and the receiver an [`EventBridge`] drains.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<GattEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	/// Forwards one event.
	pub fn emit(&self, event: impl Into<GattEvent>) -> Result<()> {
		self.tx.send(event.into()).map_err(|_| Error::ChannelClosed)
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	/// Reports a link state change using platform codes.
	///
	/// # Errors
	///
	/// Returns [`Error::UnknownCode`] for a state code outside the profile's
	/// range. Nothing is published in that case.
	pub fn on_connection_state_change(&self, status: i32, new_state: i32) -> Result<()> {
		let new_state = ConnectionState::try_from(new_state).inspect_err(|err| {
			tracing::error!(status, error = %err, "Driver reported an unknown connection state");
		})?;
		self.emit(ConnectionChanged {
			status: GattStatus(status),
			new_state,
		})
	}

	pub fn on_services_discovered(&self, status: i32) -> Result<()> {
		self.emit(ServicesDiscovered {
			status: GattStatus(status),
		})
	}

	pub fn on_characteristic_read(&self, target: CharacteristicRef, value: &[u8], status: i32) -> Result<()> {
		self.emit(CharacteristicRead {
			characteristic_id: target.id,
			instance_id: target.instance_id,
			value: value.to_vec(),
			status: GattStatus(status),
		})
	}

	pub fn on_characteristic_write(&self, target: CharacteristicRef, status: i32) -> Result<()> {
		self.emit(CharacteristicWritten {
			characteristic_id: target.id,
			instance_id: target.instance_id,
			status: GattStatus(status),
		})
	}

	pub fn on_characteristic_changed(&self, target: CharacteristicRef, value: &[u8]) -> Result<()> {
		self.emit(CharacteristicChanged {
			characteristic_id: target.id,
			instance_id: target.instance_id,
			value: value.to_vec(),
		})
	}

	pub fn on_descriptor_read(&self, target: DescriptorRef, value: &[u8], status: i32) -> Result<()> {
		self.emit(DescriptorRead {
			characteristic_id: target.characteristic.id,
			descriptor_id: target.id,
			value: value.to_vec(),
			status: GattStatus(status),
		})
	}

	pub fn on_descriptor_write(&self, target: DescriptorRef, status: i32) -> Result<()> {
		self.emit(DescriptorWritten {
			characteristic_id: target.characteristic.id,
			descriptor_id: target.id,
			status: GattStatus(status),
		})
	}

	pub fn on_mtu_changed(&self, mtu: u16, status: i32) -> Result<()> {
		self.emit(MtuChanged {
			mtu,
			status: GattStatus(status),
		})
	}

	pub fn on_phy_read(&self, tx_phy: i32, rx_phy: i32, status: i32) -> Result<()> {
		self.emit(PhyRead {
			tx_phy,
			rx_phy,
			status: GattStatus(status),
		})
	}

	pub fn on_phy_update(&self, tx_phy: i32, rx_phy: i32, status: i32) -> Result<()> {
		self.emit(PhyUpdate {
			tx_phy,
			rx_phy,
			status: GattStatus(status),
		})
	}

	pub fn on_read_remote_rssi(&self, rssi: i32, status: i32) -> Result<()> {
		self.emit(ReadRemoteRssi {
			rssi,
			status: GattStatus(status),
		})
	}

	pub fn on_reliable_write_completed(&self, status: i32) -> Result<()> {
		self.emit(ReliableWriteCompleted {
			status: GattStatus(status),
		})
	}

	pub fn on_service_changed(&self) -> Result<()> {
		self.emit(GattEvent::ServiceChanged)
	}
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Disconnects and closes the driver at most once.
pub struct LinkRelease {
	driver: Arc<dyn GattDriver>,
	released: AtomicBool,
	hooks: Mutex<Vec<ReleaseHook>>,
}

impl LinkRelease {
	pub fn new(driver: Arc<dyn GattDriver>) -> Self {
		Self {
			driver,
			released: AtomicBool::new(false),
			hooks: Mutex::new(Vec::new()),
		}
	}

	/// Runs `hook` once the link has been released.
	///
	/// Runs immediately if the link is already released.
	pub fn on_release<F>(&self, hook: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let mut hooks = self.hooks.lock();
		if self.is_released() {
			drop(hooks);
			hook();
			return;
		}
		hooks.push(Box::new(hook));
	}

	/// Releases the link. Returns false if it was already released.
	pub fn release(&self) -> bool {
		let hooks = {
			let mut hooks = self.hooks.lock();
			if self.released.swap(true, Ordering::AcqRel) {
				return false;
			}
			std::mem::take(&mut *hooks)
		};
		tracing::debug!(hooks = hooks.len(), "Releasing link");
		self.driver.disconnect();
		self.driver.close();
		for hook in hooks {
			hook();
		}
		true
	}

	pub fn is_released(&self) -> bool {
		self.released.load(Ordering::Acquire)
	}
}

impl std::fmt::Debug for LinkRelease {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LinkRelease")
			.field("released", &self.is_released())
			.finish()
	}
}

/// Releases the link when the bridge task ends, however it ends.
struct ReleaseOnExit(Arc<LinkRelease>);

impl Drop for ReleaseOnExit {
	fn drop(&mut self) {
		self.0.release();
	}
}

/// Task that publishes driver events into the bus.
pub struct EventBridge {
	cancel: Option<oneshot::Sender<()>>,
	handle: Option<JoinHandle<()>>,
}

impl EventBridge {
	/// Spawns the bridge task on the current tokio runtime.
	pub fn spawn(mut rx: mpsc::UnboundedReceiver<GattEvent>, bus: Arc<EventBus>, link: Arc<LinkRelease>) -> Self {
		let (cancel, mut cancel_rx) = oneshot::channel();

		let handle = tokio::spawn(async move {
			let _release = ReleaseOnExit(link);
			loop {
				tokio::select! {
					biased;

					_ = &mut cancel_rx => {
						tracing::debug!("Event bridge cancelled");
						break;
					}
					event = rx.recv() => match event {
						Some(event) => bus.publish(event),
						None => {
							tracing::debug!("Driver callback dropped, event bridge exiting");
							break;
						}
					},
				}
			}
		});

		Self {
			cancel: Some(cancel),
			handle: Some(handle),
		}
	}

	/// Stops the task and waits until it has released the link.
	pub async fn shutdown(mut self) {
		if let Some(cancel) = self.cancel.take() {
			let _ = cancel.send(());
		}
		if let Some(handle) = self.handle.take() {
			if let Err(err) = handle.await {
				tracing::warn!(error = %err, "Event bridge task failed");
			}
		}
	}

	pub fn is_finished(&self) -> bool {
		self.handle.as_ref().is_none_or(JoinHandle::is_finished)
	}
}

impl Drop for EventBridge {
	fn drop(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			let _ = cancel.send(());
		}
	}
}

impl std::fmt::Debug for EventBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBridge")
			.field("finished", &self.is_finished())
			.finish()
	}
}

#[cfg(test)]
mod tests;
