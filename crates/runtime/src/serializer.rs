//! Single-flight execution of driver requests.
//!
//! The link below cannot multiplex operations, so [`RequestSerializer`] holds
//! one async lock around the whole issue-and-wait cycle of a request. The
//! correlated event is awaited through a bus waiter registered before the
//! driver call, so a driver that answers synchronously cannot race the wait.
//!
//! The serializer also owns the session's closed flag. Closing wakes every
//! caller that is queued on the lock or waiting for an event; they resolve to
//! [`Failure::Cancelled`] instead of hanging.

use std::sync::Arc;
use std::time::Duration;

use gattlink_protocol::GattEvent;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::bus::{EventBus, EventWaiter};
use crate::correlation::Correlation;
use crate::error::{DriverResult, Error, Result};
use crate::outcome::{Failure, Outcome};

/// A request whose driver call has been issued and whose event is awaited.
///
/// Dropping it removes the waiter from the bus, so an event that arrives
/// after a timeout or cancellation is only seen by subscribers.
struct PendingRequest {
	operation: &'static str,
	correlation: Correlation,
	issued_at: Instant,
	deadline: Instant,
	waiter: EventWaiter,
}

impl PendingRequest {
	async fn settle(mut self, closed: watch::Receiver<bool>) -> Outcome<GattEvent> {
		let timeout = self.deadline - self.issued_at;

		tokio::select! {
			biased;

			_ = wait_closed(closed) => {
				tracing::warn!(operation = self.operation, correlation = %self.correlation, "Request cancelled by close");
				Outcome::Failed(Failure::Cancelled)
			}
			received = tokio::time::timeout_at(self.deadline, self.waiter.recv()) => match received {
				Ok(Ok(event)) => {
					tracing::debug!(
						operation = self.operation,
						correlation = %self.correlation,
						status = ?event.status(),
						elapsed_ms = self.issued_at.elapsed().as_millis() as u64,
						"Request resolved"
					);
					Outcome::Completed(event)
				}
				Ok(Err(_)) => {
					tracing::warn!(operation = self.operation, "Event source went away while waiting");
					Outcome::Failed(Failure::Cancelled)
				}
				Err(_) => {
					tracing::warn!(
						operation = self.operation,
						correlation = %self.correlation,
						timeout_ms = timeout.as_millis() as u64,
						"Request timed out"
					);
					Outcome::Failed(Failure::TimedOut(timeout))
				}
			},
		}
	}
}

/// Resolves once `closed` turns true.
async fn wait_closed(mut closed: watch::Receiver<bool>) {
	// The sender lives in the serializer; losing it means the session is gone.
	let _ = closed.wait_for(|closed| *closed).await;
}

/// Guarantees at most one request in flight against the driver.
pub struct RequestSerializer {
	lock: Mutex<()>,
	bus: Arc<EventBus>,
	closed: watch::Sender<bool>,
}

impl RequestSerializer {
	pub fn new(bus: Arc<EventBus>) -> Self {
		Self {
			lock: Mutex::new(()),
			bus,
			closed: watch::Sender::new(false),
		}
	}

	/// Runs `action` under exclusive access and waits for the event matching
	/// `correlation`.
	///
	/// The deadline is counted from the moment `action` is invoked; time spent
	/// queued on the lock does not count against it.
	///
	/// # Errors
	///
	/// Returns [`Error::SessionClosed`] if the serializer is already closed, and
	/// [`Error::BufferOverflow`] once the bus is poisoned. Everything else,
	/// including cancellation by a later close, is an [`Outcome`].
	pub async fn execute<F>(
		&self,
		operation: &'static str,
		correlation: Correlation,
		timeout: Duration,
		action: F,
	) -> Result<Outcome<GattEvent>>
	where
		F: FnOnce() -> DriverResult,
	{
		self.ensure_usable(operation)?;
		tracing::debug!(operation, %correlation, "try");

		let Some(_guard) = self.acquire(operation).await else {
			return Ok(Outcome::Failed(Failure::Cancelled));
		};
		if self.is_closed() {
			return Ok(Outcome::Failed(Failure::Cancelled));
		}
		self.ensure_healthy()?;

		let waiter = self.bus.register_waiter(correlation.predicate());
		tracing::debug!(operation, %correlation, "Issuing driver call");
		let issued_at = Instant::now();

		if let Err(err) = action() {
			tracing::warn!(operation, error = %err, "Driver rejected the call");
			return Ok(Outcome::Failed(Failure::Rejected(err)));
		}

		let pending = PendingRequest {
			operation,
			correlation,
			issued_at,
			deadline: issued_at + timeout,
			waiter,
		};
		Ok(pending.settle(self.closed.subscribe()).await)
	}

	/// Runs `action` under exclusive access without waiting for any event.
	///
	/// Used for calls whose progress is observed elsewhere, such as connect.
	pub async fn trigger<F>(&self, operation: &'static str, action: F) -> Result<Outcome<()>>
	where
		F: FnOnce() -> DriverResult,
	{
		self.ensure_usable(operation)?;
		tracing::debug!(operation, "try");

		let Some(_guard) = self.acquire(operation).await else {
			return Ok(Outcome::Failed(Failure::Cancelled));
		};
		if self.is_closed() {
			return Ok(Outcome::Failed(Failure::Cancelled));
		}

		tracing::debug!(operation, "Issuing driver call");
		match action() {
			Ok(()) => Ok(Outcome::Completed(())),
			Err(err) => {
				tracing::warn!(operation, error = %err, "Driver rejected the call");
				Ok(Outcome::Failed(Failure::Rejected(err)))
			}
		}
	}

	/// Marks the serializer closed and wakes every queued or waiting caller.
	///
	/// Returns false if it was already closed.
	pub fn close(&self) -> bool {
		!self.closed.send_replace(true)
	}

	pub fn is_closed(&self) -> bool {
		*self.closed.borrow()
	}

	/// Waits until no request holds the lock.
	///
	/// After [`close`](Self::close) this returns once the in-flight request,
	/// if any, has observed the cancellation and released exclusivity.
	pub async fn drain(&self) {
		drop(self.lock.lock().await);
	}

	/// Returns true if a request currently holds exclusive access.
	pub fn is_busy(&self) -> bool {
		self.lock.try_lock().is_err()
	}

	async fn acquire(&self, operation: &'static str) -> Option<tokio::sync::MutexGuard<'_, ()>> {
		tokio::select! {
			biased;

			_ = wait_closed(self.closed.subscribe()) => {
				tracing::warn!(operation, "Queued request cancelled by close");
				None
			}
			guard = self.lock.lock() => Some(guard),
		}
	}

	fn ensure_usable(&self, operation: &'static str) -> Result<()> {
		if self.is_closed() {
			return Err(Error::SessionClosed { operation });
		}
		self.ensure_healthy()
	}

	fn ensure_healthy(&self) -> Result<()> {
		if self.bus.is_poisoned() {
			return Err(Error::BufferOverflow {
				missed: self.bus.missed(),
			});
		}
		Ok(())
	}
}

impl std::fmt::Debug for RequestSerializer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestSerializer")
			.field("closed", &self.is_closed())
			.field("busy", &self.is_busy())
			.finish()
	}
}
