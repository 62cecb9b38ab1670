//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use gattlink::{Characteristic, ConnectionState, Descriptor, Service, Session, SessionConfig, Uuid};
use gattlink_runtime::testing::ScriptedDriver;
use tracing_subscriber::EnvFilter;

pub const SERVICE: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
pub const X: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
pub const Y: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);
pub const CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
	TRACING.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.compact()
			.try_init();
	});
}

pub fn x() -> Characteristic {
	Characteristic::new(X, 1)
		.with_properties(Characteristic::PROPERTY_READ | Characteristic::PROPERTY_WRITE)
		.with_descriptor(Descriptor::new(CCCD))
}

pub fn y() -> Characteristic {
	Characteristic::new(Y, 2)
		.with_properties(Characteristic::PROPERTY_NOTIFY)
		.with_descriptor(Descriptor::new(CCCD))
}

pub fn services() -> Vec<Service> {
	vec![Service::new(SERVICE, 0).with_characteristic(x()).with_characteristic(y())]
}

/// Opens a session over `driver` with the fixture service tree.
pub fn open(driver: &ScriptedDriver, config: SessionConfig) -> Arc<Session> {
	init_tracing();
	driver.set_services(services());
	Arc::new(Session::open(Arc::new(driver.clone()), config).unwrap())
}

/// Opens and connects, returning once the link is up.
pub async fn connected(driver: &ScriptedDriver, config: SessionConfig) -> Arc<Session> {
	let session = open(driver, config);
	let mut states = session.connection_states();
	session.connect().await.unwrap().into_result().unwrap();
	states.wait_for(|state| *state == ConnectionState::Connected).await.unwrap();
	session
}
