//! Error types for the GATT session runtime.
//!
//! Only conditions the caller cannot recover from by retrying live here:
//! precondition violations and loss of correlation integrity. Expected
//! per-operation failures (non-success status, timeout, cancellation, a driver
//! refusing the call) are reported as [`Outcome`](crate::Outcome) data instead.

use gattlink_protocol::{ConnectionState, UnknownCode};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a driver call that only triggers work.
pub type DriverResult = std::result::Result<(), DriverError>;

/// Errors that can occur in the session runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// Operation attempted after the session was closed.
	#[error("Session closed: cannot {operation} on a closed session")]
	SessionClosed { operation: &'static str },

	/// Operation requires an established link.
	#[error("Not connected: {operation} requires a connected link (current state: {state})")]
	NotConnected {
		operation: &'static str,
		state: ConnectionState,
	},

	/// Target does not belong to the attribute tree it was used with.
	#[error("Invalid target: {0}")]
	InvalidTarget(String),

	/// Argument outside the range the link layer accepts.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// A bus subscriber fell behind and events were lost.
	///
	/// Correlation can no longer be trusted, so the whole session is unusable.
	#[error("Event buffer overflow: a subscriber missed {missed} events")]
	BufferOverflow { missed: u64 },

	/// The event bridge went away while a consumer still expected events.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// The driver reported a platform code with no known meaning.
	#[error(transparent)]
	UnknownCode(#[from] UnknownCode),
}

impl Error {
	/// Returns true for programmer errors that must not be retried.
	pub fn is_precondition(&self) -> bool {
		matches!(
			self,
			Error::SessionClosed { .. }
				| Error::NotConnected { .. }
				| Error::InvalidTarget(_)
				| Error::InvalidArgument(_)
		)
	}

	/// Returns true if the session can no longer be used.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::BufferOverflow { .. } | Error::SessionClosed { .. })
	}
}

/// Reasons a driver refuses to start an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
	/// No link handle exists yet (connect has not been issued) or it was released.
	#[error("driver has no link handle")]
	NotAttached,

	/// The platform stack still has an operation outstanding.
	#[error("driver is busy with another operation")]
	Busy,

	/// The driver does not implement this call shape.
	#[error("{0} is not supported by this driver")]
	Unsupported(&'static str),

	/// The platform call returned failure.
	#[error("driver rejected the call: {0}")]
	Rejected(String),
}
