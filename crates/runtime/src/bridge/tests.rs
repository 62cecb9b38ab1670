use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use gattlink_protocol::{CharacteristicChanged, CharacteristicRef, ConnectionChanged, ConnectionState, GattStatus, Uuid};

use super::*;
use crate::testing::{CallKind, ScriptedDriver};

const HEART_RATE: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

fn bridge() -> (ScriptedDriver, GattCallback, Arc<EventBus>, Arc<LinkRelease>, EventBridge) {
	let driver = ScriptedDriver::new();
	let bus = Arc::new(EventBus::new(16));
	let link = Arc::new(LinkRelease::new(Arc::new(driver.clone())));
	let (callback, rx) = GattCallback::channel();
	let bridge = EventBridge::spawn(rx, Arc::clone(&bus), Arc::clone(&link));
	(driver, callback, bus, link, bridge)
}

#[tokio::test]
async fn callbacks_are_published_in_order() {
	let (_driver, callback, bus, _link, _bridge) = bridge();
	let mut events = bus.subscribe();
	let target = CharacteristicRef {
		id: HEART_RATE,
		instance_id: 3,
	};

	callback.on_connection_state_change(0, 2).unwrap();
	callback.on_characteristic_changed(target, &[0x06, 0x48]).unwrap();
	callback.on_service_changed().unwrap();

	assert_eq!(
		events.recv().await.unwrap(),
		Some(GattEvent::from(ConnectionChanged {
			status: GattStatus::SUCCESS,
			new_state: ConnectionState::Connected,
		}))
	);
	assert_eq!(
		events.recv().await.unwrap(),
		Some(GattEvent::from(CharacteristicChanged {
			characteristic_id: HEART_RATE,
			instance_id: 3,
			value: vec![0x06, 0x48],
		}))
	);
	assert_eq!(events.recv().await.unwrap(), Some(GattEvent::ServiceChanged));
}

#[tokio::test]
async fn unknown_connection_state_is_rejected() {
	let (_driver, callback, bus, _link, _bridge) = bridge();
	let mut events = bus.subscribe();

	let err = callback.on_connection_state_change(0, 9).unwrap_err();
	assert!(matches!(err, Error::UnknownCode(code) if code.code == 9));

	callback.on_mtu_changed(185, 0).unwrap();
	let next = events.recv().await.unwrap().unwrap();
	assert_eq!(next.name(), "MtuChanged");
}

#[tokio::test]
async fn shutdown_releases_the_link_once() {
	let (driver, callback, _bus, link, bridge) = bridge();

	bridge.shutdown().await;

	assert!(link.is_released());
	assert!(!link.release());
	assert_eq!(driver.count(CallKind::Disconnect), 1);
	assert_eq!(driver.count(CallKind::Close), 1);
	assert!(callback.emit(GattEvent::ServiceChanged).is_err());
}

#[tokio::test]
async fn dropping_the_bridge_releases_the_link() {
	let (driver, _callback, _bus, link, bridge) = bridge();

	drop(bridge);
	tokio::time::timeout(Duration::from_secs(1), async {
		while !link.is_released() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	assert_eq!(driver.count(CallKind::Close), 1);
}

#[tokio::test]
async fn losing_every_callback_ends_the_bridge() {
	let (driver, callback, _bus, link, bridge) = bridge();

	drop(callback);
	tokio::time::timeout(Duration::from_secs(1), async {
		while !bridge.is_finished() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	assert!(link.is_released());
	assert_eq!(driver.count(CallKind::Disconnect), 1);
}

#[tokio::test]
async fn release_hooks_run_once_after_the_driver_is_closed() {
	let (driver, callback, _bus, link, _bridge) = bridge();
	let runs = Arc::new(AtomicUsize::new(0));
	let closes_seen = Arc::new(AtomicUsize::new(0));
	link.on_release({
		let runs = Arc::clone(&runs);
		let closes_seen = Arc::clone(&closes_seen);
		let driver = driver.clone();
		move || {
			closes_seen.store(driver.count(CallKind::Close), Ordering::SeqCst);
			runs.fetch_add(1, Ordering::SeqCst);
		}
	});

	drop(callback);
	tokio::time::timeout(Duration::from_secs(1), async {
		while runs.load(Ordering::SeqCst) == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	assert!(!link.release());
	assert_eq!(runs.load(Ordering::SeqCst), 1);
	assert_eq!(closes_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn hook_added_after_release_runs_immediately() {
	let driver = ScriptedDriver::new();
	let link = LinkRelease::new(Arc::new(driver));
	assert!(link.release());

	let ran = Arc::new(AtomicBool::new(false));
	link.on_release({
		let ran = Arc::clone(&ran);
		move || ran.store(true, Ordering::SeqCst)
	});
	assert!(ran.load(Ordering::SeqCst));
}
