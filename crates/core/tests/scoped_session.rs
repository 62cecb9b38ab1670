//! Scoped session lifetime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gattlink::{Error, SessionConfig, with_session};
use gattlink_runtime::testing::{CallKind, ScriptedDriver};

#[tokio::test]
async fn closes_after_the_body_returns() {
	common::init_tracing();
	let driver = ScriptedDriver::new();

	let (kept, rssi) = with_session(Arc::new(driver.clone()), SessionConfig::default(), |session| async move {
		let mut states = session.connection_states();
		session.connect().await.unwrap().into_result().unwrap();
		states.wait_for(|state| state.is_connected()).await.unwrap();
		let rssi = session.read_remote_rssi().await.unwrap().completed();
		(session, rssi)
	})
	.await
	.unwrap();

	assert_eq!(rssi, Some(-60));
	assert!(kept.is_closed());
	assert!(matches!(kept.read_remote_rssi().await, Err(Error::SessionClosed { .. })));
	assert_eq!(driver.count(CallKind::Close), 1);
}

#[tokio::test]
async fn body_may_close_the_session_itself() {
	let driver = ScriptedDriver::new();

	with_session(Arc::new(driver.clone()), SessionConfig::default(), |session| async move {
		session.close().await.unwrap();
	})
	.await
	.unwrap();

	assert_eq!(driver.count(CallKind::Disconnect), 1);
	assert_eq!(driver.count(CallKind::Close), 1);
}

#[tokio::test]
async fn dropping_the_scope_closes_the_session() {
	let driver = ScriptedDriver::new();

	let scope = with_session(Arc::new(driver.clone()), SessionConfig::default(), |_session| async move {
		std::future::pending::<()>().await;
	});
	let result = tokio::time::timeout(Duration::from_millis(20), scope).await;

	assert!(result.is_err());
	assert_eq!(driver.count(CallKind::Close), 1);
}

#[tokio::test]
async fn invalid_config_never_opens() {
	let driver = ScriptedDriver::new();
	let config = SessionConfig::default().with_event_buffer_capacity(0);

	let result = with_session(Arc::new(driver.clone()), config, |_session| async {}).await;

	assert!(matches!(result, Err(Error::InvalidArgument(_))));
	assert!(driver.calls().is_empty());
	assert!(driver.callback().is_none());
}
