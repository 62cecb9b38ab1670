//! Per-operation results.
//!
//! A GATT operation can fail in ways that are expected and recoverable: the
//! peripheral answers with an error status, never answers, the driver refuses
//! the call, or the session is closed underneath it. These are returned as
//! [`Outcome::Failed`] rather than as [`Error`](crate::Error).

use std::time::Duration;

use gattlink_protocol::{
	CharacteristicRead, CharacteristicWritten, ConnectionChanged, DescriptorRead, DescriptorWritten, GattEvent,
	GattStatus, MtuChanged, PhyRead, PhyUpdate, ReadRemoteRssi, ReliableWriteCompleted, ServicesDiscovered,
};
use thiserror::Error;

use crate::error::DriverError;

/// Why an operation did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
	/// The correlated event arrived with a non-success status.
	#[error("peripheral reported {0}")]
	Status(GattStatus),

	/// The driver refused to start the operation.
	#[error(transparent)]
	Rejected(#[from] DriverError),

	/// No correlated event arrived before the deadline.
	#[error("no response within {}ms", .0.as_millis())]
	TimedOut(Duration),

	/// The session was closed while the operation was pending.
	#[error("operation cancelled by session close")]
	Cancelled,
}

impl Failure {
	/// Status code equivalent of this failure.
	///
	/// Failures that did not come from the peripheral map to [`GattStatus::FAILURE`].
	pub fn status(&self) -> GattStatus {
		match self {
			Failure::Status(status) => *status,
			_ => GattStatus::FAILURE,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Failure::TimedOut(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Failure::Cancelled)
	}
}

/// Result of one session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
	Completed(T),
	Failed(Failure),
}

impl<T> Outcome<T> {
	pub fn is_completed(&self) -> bool {
		matches!(self, Outcome::Completed(_))
	}

	/// Status code equivalent, [`GattStatus::SUCCESS`] when completed.
	pub fn status(&self) -> GattStatus {
		match self {
			Outcome::Completed(_) => GattStatus::SUCCESS,
			Outcome::Failed(failure) => failure.status(),
		}
	}

	pub fn completed(self) -> Option<T> {
		match self {
			Outcome::Completed(value) => Some(value),
			Outcome::Failed(_) => None,
		}
	}

	pub fn failure(&self) -> Option<&Failure> {
		match self {
			Outcome::Completed(_) => None,
			Outcome::Failed(failure) => Some(failure),
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
		match self {
			Outcome::Completed(value) => Outcome::Completed(f(value)),
			Outcome::Failed(failure) => Outcome::Failed(failure),
		}
	}

	pub fn into_result(self) -> std::result::Result<T, Failure> {
		match self {
			Outcome::Completed(value) => Ok(value),
			Outcome::Failed(failure) => Err(failure),
		}
	}
}

impl<T> From<Failure> for Outcome<T> {
	fn from(failure: Failure) -> Self {
		Outcome::Failed(failure)
	}
}

/// Event payloads that can terminate a request.
pub trait Terminal: TryFrom<GattEvent> {
	fn status(&self) -> GattStatus;
}

macro_rules! terminal {
	($($payload:ty),* $(,)?) => {
		$(
			impl Terminal for $payload {
				fn status(&self) -> GattStatus {
					self.status
				}
			}
		)*
	};
}

terminal!(
	ConnectionChanged,
	ServicesDiscovered,
	CharacteristicRead,
	CharacteristicWritten,
	DescriptorRead,
	DescriptorWritten,
	MtuChanged,
	PhyRead,
	PhyUpdate,
	ReadRemoteRssi,
	ReliableWriteCompleted,
);

impl Outcome<GattEvent> {
	/// Narrows a matched event to its payload type, folding a non-success
	/// status into [`Failure::Status`].
	pub fn settle<T: Terminal>(self) -> Outcome<T> {
		let event = match self {
			Outcome::Completed(event) => event,
			Outcome::Failed(failure) => return Outcome::Failed(failure),
		};

		match T::try_from(event) {
			Ok(payload) if payload.status().is_success() => Outcome::Completed(payload),
			Ok(payload) => Outcome::Failed(Failure::Status(payload.status())),
			Err(_) => {
				tracing::error!("Correlated event does not carry the expected payload");
				Outcome::Failed(Failure::Status(GattStatus::FAILURE))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn settle_success() {
		let event = GattEvent::from(MtuChanged {
			mtu: 185,
			status: GattStatus::SUCCESS,
		});

		let outcome = Outcome::Completed(event).settle::<MtuChanged>();
		assert_eq!(outcome.status(), GattStatus::SUCCESS);
		assert_eq!(outcome.completed().map(|m| m.mtu), Some(185));
	}

	#[test]
	fn settle_folds_error_status() {
		let event = GattEvent::from(ReadRemoteRssi {
			rssi: 0,
			status: GattStatus::READ_NOT_PERMITTED,
		});

		let outcome = Outcome::Completed(event).settle::<ReadRemoteRssi>();
		assert_eq!(outcome, Outcome::Failed(Failure::Status(GattStatus::READ_NOT_PERMITTED)));
	}

	#[test]
	fn non_driver_failures_report_generic_status() {
		let timed_out: Outcome<PhyRead> = Failure::TimedOut(Duration::from_millis(50)).into();
		assert_eq!(timed_out.status(), GattStatus::FAILURE);
		assert!(timed_out.failure().is_some_and(Failure::is_timeout));
		assert_eq!(
			timed_out.into_result().unwrap_err().to_string(),
			"no response within 50ms"
		);

		let rejected = Failure::from(DriverError::Busy);
		assert_eq!(rejected.to_string(), "driver is busy with another operation");
	}
}
