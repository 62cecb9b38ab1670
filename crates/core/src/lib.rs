//! gattlink - single-flight client sessions for GATT peripherals
//!
//! A [`Session`] drives one remote peripheral through a platform
//! [`GattDriver`]. The driver may only have one operation outstanding and
//! reports every outcome on a single callback surface without request ids;
//! the session serializes operations, correlates each event with the request
//! that caused it, and turns silence into timeouts.
//!
//! ```ignore
//! let session = Session::open(driver, SessionConfig::default())?;
//! let _progress = session.connect().await?;
//! session.connection_states().wait_for(|state| state.is_connected()).await?;
//!
//! session.discover_services().await?.into_result()?;
//! let characteristic = session.find_characteristic(SERVICE, CONTROL_POINT).unwrap();
//! session
//! 	.write_characteristic(&characteristic, &[1, 2, 3], WriteType::Default)
//! 	.await?
//! 	.into_result()?;
//! session.close().await?;
//! ```
//!
//! Operation results are [`Outcome`]s: a non-success status, a timeout, a
//! driver refusing the call, or cancellation by [`Session::close`] are all
//! normal data. [`Error`] is reserved for precondition violations and for
//! lost events, after which the session cannot be trusted.
//!
//! Bonding is independent of the link and lives in [`bonding`].

pub mod bonding;
pub mod config;
pub mod scoped;
pub mod session;

pub use bonding::{BondListener, BondObserver, BondStates, ListenerId, bond_states, create_bond, release_bond};
pub use config::{ConfigError, SessionConfig};
pub use gattlink_protocol as protocol;
pub use gattlink_protocol::{
	BondState, BondStatus, Characteristic, CharacteristicChanged, CharacteristicRef, ConnectOptions, ConnectionState,
	Descriptor, DescriptorRef, GattEvent, GattStatus, Phy, PhyOptions, Service, Transport, Uuid, WriteType,
};
pub use gattlink_runtime::{
	DriverCapabilities, DriverError, DriverResult, Error, EventSubscription, Failure, GattCallback, GattDriver,
	Outcome, Result, ServiceTree,
};
pub use scoped::with_session;
pub use session::Session;
