//! Fan-out of driver events to every interested consumer.
//!
//! [`EventBus`] has three delivery paths, served in this order on every
//! [`publish`](EventBus::publish):
//!
//! 1. **Observers**: synchronous [`EventObserver`]s such as the connection
//!    state tracker. They see each event before anyone else, so state read
//!    after a request resolves is never older than the event that resolved it.
//! 2. **Waiters**: one-shot predicate matches used by pending requests.
//!    Delivery is direct and cannot lag.
//! 3. **Subscribers**: bounded queues for external consumers. A typed
//!    subscription only queues the variant it asked for, so unrelated traffic
//!    never counts against its capacity.
//!
//! A subscriber that falls behind its capacity does not silently skip events.
//! The bus is poisoned as soon as an event cannot be queued, which makes every
//! later request fail fast, and the subscriber's next receive fails with
//! [`Error::BufferOverflow`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::Stream;
use gattlink_protocol::GattEvent;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// Synchronous consumer invoked for every published event.
pub trait EventObserver: Send + Sync {
	fn observe(&self, event: &GattEvent);
}

type Predicate = Box<dyn Fn(&GattEvent) -> bool + Send + Sync>;

struct WaiterEntry {
	id: u64,
	predicate: Predicate,
	complete_tx: oneshot::Sender<GattEvent>,
}

type WaiterList = Arc<Mutex<Vec<WaiterEntry>>>;

enum Delivery {
	Queued,
	Skipped,
	Full,
	Gone,
}

struct SubscriberEntry {
	deliver: Box<dyn Fn(&GattEvent) -> Delivery + Send + Sync>,
	missed: Arc<AtomicU64>,
}

/// Single-producer, multi-consumer event distribution.
pub struct EventBus {
	capacity: usize,
	subscribers: Mutex<Vec<SubscriberEntry>>,
	observers: Mutex<Vec<Arc<dyn EventObserver>>>,
	waiters: WaiterList,
	next_waiter_id: AtomicU64,
	missed: AtomicU64,
}

impl EventBus {
	/// Creates a bus whose subscribers each buffer up to `capacity` events.
	///
	/// A capacity of zero is raised to one.
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			subscribers: Mutex::new(Vec::new()),
			observers: Mutex::new(Vec::new()),
			waiters: Arc::new(Mutex::new(Vec::new())),
			next_waiter_id: AtomicU64::new(1),
			missed: AtomicU64::new(0),
		}
	}

	/// Attaches an observer that sees every subsequent event.
	pub fn attach_observer(&self, observer: Arc<dyn EventObserver>) {
		self.observers.lock().push(observer);
	}

	/// Delivers an event to observers, matching waiters, and subscribers.
	pub fn publish(&self, event: GattEvent) {
		tracing::trace!(event = event.name(), "Publishing event");

		let observers: Vec<_> = self.observers.lock().iter().cloned().collect();
		for observer in observers {
			observer.observe(&event);
		}

		{
			let mut waiters = self.waiters.lock();
			let mut i = 0;
			while i < waiters.len() {
				if (waiters[i].predicate)(&event) {
					let entry = waiters.swap_remove(i);
					let _ = entry.complete_tx.send(event.clone());
				} else {
					i += 1;
				}
			}
		}

		self.subscribers.lock().retain(|subscriber| match (subscriber.deliver)(&event) {
			Delivery::Queued | Delivery::Skipped => true,
			Delivery::Full => {
				self.missed.fetch_add(1, Ordering::AcqRel);
				if subscriber.missed.fetch_add(1, Ordering::AcqRel) == 0 {
					tracing::error!(
						event = event.name(),
						capacity = self.capacity,
						"Event subscriber overflowed, correlation integrity lost"
					);
				}
				true
			}
			Delivery::Gone => false,
		});
	}

	/// Subscribes to all events published from now on.
	pub fn subscribe(&self) -> EventSubscription {
		self.subscribe_as()
	}

	/// Subscribes to events of one payload type, skipping all others.
	///
	/// Only events of that type are queued, up to the bus capacity.
	pub fn subscribe_as<T>(&self) -> EventSubscription<T>
	where
		T: TryFrom<GattEvent> + Send + 'static,
	{
		let (tx, rx) = mpsc::channel(self.capacity);
		let missed = Arc::new(AtomicU64::new(0));
		let deliver = move |event: &GattEvent| {
			if tx.is_closed() {
				return Delivery::Gone;
			}
			let Ok(payload) = T::try_from(event.clone()) else {
				return Delivery::Skipped;
			};
			match tx.try_send(payload) {
				Ok(()) => Delivery::Queued,
				Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
				Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
			}
		};
		self.subscribers.lock().push(SubscriberEntry {
			deliver: Box::new(deliver),
			missed: Arc::clone(&missed),
		});

		EventSubscription {
			rx,
			missed,
			_payload: PhantomData,
		}
	}

	/// Registers a waiter that receives the first event matching `predicate`.
	///
	/// The waiter is removed when it matches or when the returned handle is dropped.
	pub fn register_waiter<F>(&self, predicate: F) -> EventWaiter
	where
		F: Fn(&GattEvent) -> bool + Send + Sync + 'static,
	{
		let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
		let (complete_tx, rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry {
			id,
			predicate: Box::new(predicate),
			complete_tx,
		});

		EventWaiter {
			id,
			rx,
			waiters: Arc::clone(&self.waiters),
		}
	}

	/// Returns true once any subscriber has overflowed.
	pub fn is_poisoned(&self) -> bool {
		self.missed() > 0
	}

	/// Total number of events lost by overflowed subscribers.
	pub fn missed(&self) -> u64 {
		self.missed.load(Ordering::Acquire)
	}

	/// Number of subscriptions that have not been dropped yet.
	///
	/// Dropped subscriptions are pruned on the next publish.
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.lock().len()
	}

	/// Events each subscriber can hold unread before it overflows.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(16)
	}
}

/// Pending one-shot match registered with [`EventBus::register_waiter`].
pub struct EventWaiter {
	id: u64,
	rx: oneshot::Receiver<GattEvent>,
	waiters: WaiterList,
}

impl EventWaiter {
	/// Waits for the matching event.
	///
	/// # Errors
	///
	/// Returns [`Error::ChannelClosed`] if the bus is dropped first.
	pub async fn recv(&mut self) -> Result<GattEvent> {
		(&mut self.rx).await.map_err(|_| Error::ChannelClosed)
	}
}

impl Drop for EventWaiter {
	fn drop(&mut self) {
		let id = self.id;
		self.waiters.lock().retain(|entry| entry.id != id);
	}
}

/// Live view of events published after subscription.
///
/// `T` selects the payload: the default yields every [`GattEvent`], a payload
/// struct such as `CharacteristicChanged` yields only that variant.
pub struct EventSubscription<T = GattEvent> {
	rx: mpsc::Receiver<T>,
	missed: Arc<AtomicU64>,
	_payload: PhantomData<fn() -> T>,
}

impl<T> EventSubscription<T> {
	/// Receives the next event, or `None` once the bus is gone.
	///
	/// # Errors
	///
	/// Returns [`Error::BufferOverflow`] if this subscriber fell behind. The
	/// subscription is not usable afterwards and the bus is poisoned.
	pub async fn recv(&mut self) -> Result<Option<T>> {
		self.ensure_intact()?;
		Ok(self.rx.recv().await)
	}

	/// Returns the next buffered event without waiting.
	pub fn try_recv(&mut self) -> Result<Option<T>> {
		self.ensure_intact()?;
		match self.rx.try_recv() {
			Ok(payload) => Ok(Some(payload)),
			Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => Ok(None),
		}
	}

	/// Events this subscriber could not queue.
	pub fn missed(&self) -> u64 {
		self.missed.load(Ordering::Acquire)
	}

	/// Converts the subscription into a [`Stream`] that ends after the bus
	/// closes or after yielding an overflow error.
	pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
		futures_util::stream::unfold(Some(self), |state| async move {
			let mut subscription = state?;
			match subscription.recv().await {
				Ok(Some(payload)) => Some((Ok(payload), Some(subscription))),
				Ok(None) => None,
				Err(err) => Some((Err(err), None)),
			}
		})
	}

	fn ensure_intact(&self) -> Result<()> {
		match self.missed() {
			0 => Ok(()),
			missed => Err(Error::BufferOverflow { missed }),
		}
	}
}

impl<T> std::fmt::Debug for EventSubscription<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventSubscription")
			.field("buffered", &self.rx.len())
			.field("missed", &self.missed())
			.finish()
	}
}
