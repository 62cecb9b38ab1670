//! Link state and service tree derived from the event stream.
//!
//! [`ConnectionStateTracker`] is attached to the [`EventBus`](crate::EventBus)
//! as an observer. It never issues driver calls; it only reads the driver's
//! service snapshot after a successful discovery has been reported.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gattlink_protocol::{ConnectionState, GattEvent, Service};
use tokio::sync::watch;

use crate::bus::EventObserver;

/// Shared, immutable service tree.
pub type ServiceTree = Arc<Vec<Service>>;

type ServiceSnapshot = Box<dyn Fn() -> Vec<Service> + Send + Sync>;

/// Always-current view of the link state and the last discovered services.
pub struct ConnectionStateTracker {
	state_tx: watch::Sender<ConnectionState>,
	services_tx: watch::Sender<ServiceTree>,
	snapshot: ServiceSnapshot,
	frozen: AtomicBool,
}

impl ConnectionStateTracker {
	/// Creates a tracker in the `Disconnected` state with an empty tree.
	///
	/// `snapshot` returns the driver's current service list and is called once
	/// per successful discovery.
	pub fn new<F>(snapshot: F) -> Self
	where
		F: Fn() -> Vec<Service> + Send + Sync + 'static,
	{
		Self {
			state_tx: watch::Sender::new(ConnectionState::Disconnected),
			services_tx: watch::Sender::new(Arc::new(Vec::new())),
			snapshot: Box::new(snapshot),
			frozen: AtomicBool::new(false),
		}
	}

	pub fn state(&self) -> ConnectionState {
		*self.state_tx.borrow()
	}

	pub fn services(&self) -> ServiceTree {
		Arc::clone(&self.services_tx.borrow())
	}

	/// Receiver that is notified on every state change.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.state_tx.subscribe()
	}

	/// Receiver that is notified whenever the tree is replaced.
	pub fn watch_services(&self) -> watch::Receiver<ServiceTree> {
		self.services_tx.subscribe()
	}

	/// Marks the link as released.
	///
	/// The state becomes `Disconnected`, the service tree is emptied, and all
	/// further events are ignored.
	pub fn freeze(&self) {
		if self.frozen.swap(true, Ordering::AcqRel) {
			return;
		}
		let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
		tracing::debug!(from = %previous, "Link released, tracker frozen");
		self.services_tx.send_replace(Arc::new(Vec::new()));
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.load(Ordering::Acquire)
	}
}

impl EventObserver for ConnectionStateTracker {
	fn observe(&self, event: &GattEvent) {
		if self.frozen.load(Ordering::Acquire) {
			return;
		}

		match event {
			GattEvent::ConnectionChanged(change) => {
				let previous = self.state_tx.send_replace(change.new_state);
				if previous != change.new_state {
					tracing::info!(
						from = %previous,
						to = %change.new_state,
						status = %change.status,
						"Connection state changed"
					);
				}
			}
			GattEvent::ServicesDiscovered(discovered) if discovered.status.is_success() => {
				let services = (self.snapshot)();
				tracing::info!(services = services.len(), "Service tree replaced");
				self.services_tx.send_replace(Arc::new(services));
			}
			_ => {}
		}
	}
}

impl std::fmt::Debug for ConnectionStateTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionStateTracker")
			.field("state", &self.state())
			.field("services", &self.services_tx.borrow().len())
			.finish()
	}
}
