//! End-to-end properties of a session over a scripted driver.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{connected, open, x, y};
use gattlink::{
	CharacteristicChanged, ConnectionState, Failure, GattStatus, Outcome, SessionConfig, WriteType,
};
use gattlink_protocol::{CharacteristicRead, ConnectionChanged};
use gattlink_runtime::testing::{CallKind, Reply, ScriptedDriver};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operations_never_overlap() {
	let driver = ScriptedDriver::with_latency(Duration::from_millis(3));
	let session = connected(&driver, SessionConfig::default()).await;

	let mut tasks = Vec::new();
	for n in 0..16u8 {
		let session = Arc::clone(&session);
		tasks.push(tokio::spawn(async move {
			match n % 4 {
				0 => session.read_characteristic(&x()).await.map(|o| o.is_completed()),
				1 => session
					.write_characteristic(&x(), &[n], WriteType::Default)
					.await
					.map(|o| o.is_completed()),
				2 => session.request_mtu(23 + u16::from(n)).await.map(|o| o.is_completed()),
				_ => session.read_remote_rssi().await.map(|o| o.is_completed()),
			}
		}));
	}

	let mut completed = 0;
	for task in tasks {
		if task.await.unwrap().unwrap() {
			completed += 1;
		}
	}

	assert_eq!(completed, 16);
	assert_eq!(driver.max_in_flight(), 1);
	assert_eq!(driver.in_flight(), 0);
}

#[tokio::test]
async fn read_resolves_only_to_its_own_characteristic() {
	let driver = ScriptedDriver::new();
	let session = connected(&driver, SessionConfig::default()).await;
	let mut notifications = session.notifications();

	// A stale read for Y and a notification for X land before the real answer.
	driver.respond_with(
		CallKind::ReadCharacteristic,
		Reply::Delayed(
			Duration::from_millis(5),
			vec![
				CharacteristicRead {
					characteristic_id: y().id,
					instance_id: y().instance_id,
					value: vec![0xbb],
					status: GattStatus::SUCCESS,
				}
				.into(),
				CharacteristicChanged {
					characteristic_id: x().id,
					instance_id: x().instance_id,
					value: vec![0xcc],
				}
				.into(),
				CharacteristicRead {
					characteristic_id: x().id,
					instance_id: x().instance_id,
					value: vec![0xaa],
					status: GattStatus::SUCCESS,
				}
				.into(),
			],
		),
	);

	let value = session.read_characteristic(&x()).await.unwrap();
	assert_eq!(value, Outcome::Completed(vec![0xaa]));

	let notification = notifications.recv().await.unwrap().unwrap();
	assert_eq!(notification.value, vec![0xcc]);
}

#[tokio::test(start_paused = true)]
async fn timeout_releases_exclusivity() {
	let driver = ScriptedDriver::new();
	let config = SessionConfig::default().with_operation_timeout(Duration::from_millis(500));
	let session = connected(&driver, config).await;
	driver.respond_with(CallKind::ReadCharacteristic, Reply::Silent);

	let started = tokio::time::Instant::now();
	let outcome = session.read_characteristic(&x()).await.unwrap();
	assert_eq!(outcome, Outcome::Failed(Failure::TimedOut(Duration::from_millis(500))));
	assert!(started.elapsed() < Duration::from_secs(1));

	let mtu = session.request_mtu(185).await.unwrap();
	assert_eq!(mtu, Outcome::Completed(185));
}

#[tokio::test]
async fn state_follows_the_last_connection_event() {
	let driver = ScriptedDriver::new();
	let session = open(&driver, SessionConfig::default());
	let mut events = session.events();

	let sequence = [
		(GattStatus::SUCCESS, ConnectionState::Connecting),
		(GattStatus::SUCCESS, ConnectionState::Connected),
		(GattStatus(8), ConnectionState::Connected),
		(GattStatus(19), ConnectionState::Disconnected),
		(GattStatus::FAILURE, ConnectionState::Connecting),
	];
	for (status, new_state) in sequence {
		driver.emit(ConnectionChanged { status, new_state });
		events.recv().await.unwrap().unwrap();
		assert_eq!(session.state(), new_state);
	}
}

#[tokio::test]
async fn close_cancels_a_pending_operation() {
	let driver = ScriptedDriver::new();
	let config = SessionConfig::default().with_operation_timeout(Duration::from_secs(3600));
	let session = connected(&driver, config).await;
	driver.respond_with(CallKind::ReadCharacteristic, Reply::Silent);

	let pending = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.read_characteristic(&x()).await }
	});
	while driver.count(CallKind::ReadCharacteristic) == 0 {
		tokio::task::yield_now().await;
	}

	tokio::time::timeout(Duration::from_secs(1), session.close())
		.await
		.unwrap()
		.unwrap();
	let outcome = tokio::time::timeout(Duration::from_secs(1), pending)
		.await
		.unwrap()
		.unwrap()
		.unwrap();

	assert_eq!(outcome, Outcome::Failed(Failure::Cancelled));
	assert_eq!(driver.count(CallKind::Disconnect), 1);
	assert_eq!(driver.count(CallKind::Close), 1);

	drop(session);
	assert_eq!(driver.count(CallKind::Close), 1);
}

#[tokio::test]
async fn connect_discover_write_scenario() {
	let driver = ScriptedDriver::new();
	let session = open(&driver, SessionConfig::default());
	let mut states = session.connection_states();

	let mut changes = session.connect().await.unwrap().completed().unwrap();
	let mut observed = Vec::new();
	while observed.last() != Some(&ConnectionState::Connected) {
		observed.push(changes.recv().await.unwrap().unwrap().new_state);
	}
	assert_eq!(observed, vec![ConnectionState::Connecting, ConnectionState::Connected]);
	drop(changes);
	assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

	let services = session.discover_services().await.unwrap().completed().unwrap();
	assert!(!services.is_empty());
	let target = session.find_characteristic(common::SERVICE, common::X).unwrap();

	let mut notifications = session.notifications();
	let notifier = {
		let driver = driver.clone();
		tokio::spawn(async move {
			for value in 0..8u8 {
				driver.emit(CharacteristicChanged {
					characteristic_id: y().id,
					instance_id: y().instance_id,
					value: vec![value],
				});
				tokio::task::yield_now().await;
			}
		})
	};

	let written = session
		.write_characteristic(&target, &[1, 2, 3], WriteType::Default)
		.await
		.unwrap();
	notifier.await.unwrap();

	assert_eq!(written, Outcome::Completed(()));
	assert_eq!(driver.value(&x().target()), Some(vec![1, 2, 3]));
	assert_eq!(driver.value(&y().target()), None);

	let first = notifications.recv().await.unwrap().unwrap();
	assert_eq!(first.target(), y().target());
}
