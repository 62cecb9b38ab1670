//! Event and value types for the gattlink session layer.
//!
//! This crate holds the data that crosses the boundary between a GATT driver
//! and the session engine:
//!
//! - [`GattEvent`] - one outcome reported by the driver (connection change,
//!   read, write, notification, MTU/PHY/RSSI result)
//! - [`GattStatus`] and [`ConnectionState`] - status codes and link state
//! - [`Service`], [`Characteristic`], [`Descriptor`] - immutable projections of
//!   the remote attribute tree
//! - [`BondState`] - pairing state reported by the bonding observer
//! - [`ConnectOptions`], [`WriteType`], [`Phy`] - parameters for driver calls
//!
//! Types in this crate carry no behavior beyond construction, lookup and
//! serialization. Request correlation and session state live in
//! `gattlink-runtime`.

pub mod bond;
pub mod event;
pub mod options;
pub mod service;
pub mod status;

pub use bond::{BondState, BondStatus};
pub use event::*;
pub use options::*;
pub use service::{Characteristic, CharacteristicRef, Descriptor, DescriptorRef, Service, ServiceType};
pub use status::{ConnectionState, GattStatus, UnknownCode};

pub use uuid::Uuid;
