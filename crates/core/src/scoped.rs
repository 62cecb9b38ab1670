//! Scoped session lifetime.

use std::future::Future;
use std::sync::Arc;

use gattlink_runtime::{GattDriver, Result};

use crate::config::SessionConfig;
use crate::session::Session;

/// Closes the session if the scope is left without reaching the explicit close.
struct CloseOnDrop(Arc<Session>);

impl Drop for CloseOnDrop {
	fn drop(&mut self) {
		self.0.shutdown_now();
	}
}

/// Opens a session, runs `f` with it, and closes it afterwards.
///
/// The session is closed on every exit path: after `f` completes, when `f`
/// closed it itself, and when the returned future is dropped before
/// finishing. Clones of the `Arc` that outlive the scope see a closed session.
///
/// # Errors
///
/// Returns the error from [`Session::open`]. Errors inside `f` are part of
/// its output `T`.
pub async fn with_session<F, Fut, T>(driver: Arc<dyn GattDriver>, config: SessionConfig, f: F) -> Result<T>
where
	F: FnOnce(Arc<Session>) -> Fut,
	Fut: Future<Output = T>,
{
	let session = Arc::new(Session::open(driver, config)?);
	let guard = CloseOnDrop(Arc::clone(&session));

	let value = f(Arc::clone(&session)).await;

	if !session.is_closed() {
		// Only fails if `f` raced us to close, which leaves the same end state.
		let _ = session.close().await;
	}
	drop(guard);
	Ok(value)
}
