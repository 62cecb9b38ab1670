//! Bonding observer adapter.
//!
//! Pairing state is owned by the platform, not by the GATT link, so it is
//! reached through a separate [`BondObserver`]. The adapter turns the
//! observer's listener registration into a [`Stream`] of [`BondState`]s:
//!
//! - nothing is registered until the stream is first polled
//! - the first item is the current state, read right after registering
//! - later items are system-level changes, for any device the platform reports
//! - dropping the stream unregisters the listener
//!
//! Each call to [`bond_states`] starts a fresh sequence.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use gattlink_protocol::BondState;
use gattlink_runtime::DriverResult;
use tokio::sync::mpsc;

/// Identifier of a registered bond listener.
pub type ListenerId = u64;

/// Sink the observer pushes bond state changes into.
#[derive(Debug, Clone)]
pub struct BondListener {
	tx: mpsc::UnboundedSender<BondState>,
}

impl BondListener {
	/// Delivers a change. Returns false once the stream has been dropped.
	pub fn notify(&self, state: BondState) -> bool {
		self.tx.send(state).is_ok()
	}
}

/// Platform bonding service for one device.
pub trait BondObserver: Send + Sync {
	/// Current bond state of the device.
	fn bond_state(&self) -> BondState;

	fn register_listener(&self, listener: BondListener) -> ListenerId;

	fn unregister_listener(&self, id: ListenerId);

	/// Starts pairing. Progress is reported to registered listeners.
	fn create_bond(&self) -> DriverResult;

	/// Removes the stored bond.
	fn remove_bond(&self) -> DriverResult;
}

type OnStart = Box<dyn FnOnce(&dyn BondObserver) -> DriverResult + Send>;

enum StreamState {
	Idle(Option<OnStart>),
	Active {
		id: ListenerId,
		rx: mpsc::UnboundedReceiver<BondState>,
	},
	Done,
}

/// Stream of bond states. See the [module docs](self).
pub struct BondStates {
	observer: Arc<dyn BondObserver>,
	state: StreamState,
}

impl BondStates {
	fn new(observer: Arc<dyn BondObserver>, on_start: Option<OnStart>) -> Self {
		Self {
			observer,
			state: StreamState::Idle(on_start),
		}
	}

	fn start(&mut self, on_start: Option<OnStart>) -> BondState {
		let (tx, rx) = mpsc::unbounded_channel();
		let id = self.observer.register_listener(BondListener { tx });
		let current = self.observer.bond_state();
		tracing::debug!(listener = id, device = %current.device_id, state = ?current.state, "Bond listener registered");
		self.state = StreamState::Active { id, rx };

		if let Some(on_start) = on_start {
			if let Err(err) = on_start(self.observer.as_ref()) {
				tracing::warn!(error = %err, "Bonding request rejected");
				self.stop();
			}
		}
		current
	}

	fn stop(&mut self) {
		if let StreamState::Active { id, .. } = std::mem::replace(&mut self.state, StreamState::Done) {
			self.observer.unregister_listener(id);
			tracing::debug!(listener = id, "Bond listener unregistered");
		}
	}
}

impl Stream for BondStates {
	type Item = BondState;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		match &mut this.state {
			StreamState::Idle(on_start) => {
				let on_start = on_start.take();
				Poll::Ready(Some(this.start(on_start)))
			}
			StreamState::Active { rx, .. } => match rx.poll_recv(cx) {
				Poll::Ready(Some(state)) => Poll::Ready(Some(state)),
				Poll::Ready(None) => {
					this.stop();
					Poll::Ready(None)
				}
				Poll::Pending => Poll::Pending,
			},
			StreamState::Done => Poll::Ready(None),
		}
	}
}

impl Drop for BondStates {
	fn drop(&mut self) {
		self.stop();
	}
}

impl std::fmt::Debug for BondStates {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = match self.state {
			StreamState::Idle(_) => "idle",
			StreamState::Active { .. } => "active",
			StreamState::Done => "done",
		};
		f.debug_struct("BondStates").field("state", &state).finish()
	}
}

/// Observes bond state changes without initiating anything.
pub fn bond_states(observer: Arc<dyn BondObserver>) -> BondStates {
	BondStates::new(observer, None)
}

/// Starts pairing when the returned stream is first polled.
///
/// The listener is registered before the request is issued, so the first
/// transition is never missed. If the platform refuses to start bonding, the
/// stream yields the current state and ends.
pub fn create_bond(observer: Arc<dyn BondObserver>) -> BondStates {
	BondStates::new(observer, Some(Box::new(|observer: &dyn BondObserver| observer.create_bond())))
}

/// Removes the stored bond with the device.
pub fn release_bond(observer: &dyn BondObserver) -> DriverResult {
	observer.remove_bond().inspect_err(|err| {
		tracing::warn!(error = %err, "Removing bond failed");
	})
}
