//! gattlink runtime - event bus, request serialization and correlation
//!
//! This crate holds the session engine that sits between a platform GATT
//! stack and the public `Session` API:
//!
//! - **Event bus**: fan-out of driver events to observers, waiters and subscribers
//! - **State tracker**: connection state and service tree derived from events
//! - **Serializer**: one request in flight at a time, with deadlines and cancellation
//! - **Correlation**: matching an event to the request that caused it
//! - **Bridge**: driver callbacks in, published events out
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  GattCallback   ┌─────────────┐
//!  │  GattDriver  │ ───────────────▶│ EventBridge │
//!  └──────▲───────┘                 └──────┬──────┘
//!         │ driver calls                   │ publish
//!  ┌──────┴────────────┐  waiter   ┌──────▼──────┐   observe   ┌──────────────┐
//!  │ RequestSerializer │◀──────────│  EventBus   │────────────▶│ StateTracker │
//!  └───────────────────┘           └──────┬──────┘             └──────────────┘
//!                                         │ subscribe
//!                                         ▼
//!                                  external consumers
//! ```
//!
//! Only the serializer issues request calls on the driver. The tracker never
//! calls the driver except to read the service snapshot after discovery.

pub mod bridge;
pub mod bus;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod serializer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tracker;

pub use bridge::{EventBridge, GattCallback, LinkRelease};
pub use bus::{EventBus, EventObserver, EventSubscription, EventWaiter};
pub use correlation::Correlation;
pub use driver::{AttributeWriter, DirectWrite, DriverCapabilities, GattDriver, StagedWrite, writer_for};
pub use error::{DriverError, DriverResult, Error, Result};
pub use outcome::{Failure, Outcome, Terminal};
pub use serializer::RequestSerializer;
pub use tracker::{ConnectionStateTracker, ServiceTree};
