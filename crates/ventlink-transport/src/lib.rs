//! Transport adapter contract for the unit's wireless link.
//!
//! The session layer never touches a radio stack directly. It drives an
//! implementation of [`Transport`]: connect with a deadline, write and read a
//! characteristic, subscribe to notifications, and learn about dropped links.
//!
//! The `sim` feature adds [`sim::SimulatedUnit`], an in-process unit used by
//! tests and the CLI.

pub mod error;
pub mod gatt;
pub mod traits;

#[cfg(feature = "sim")]
pub mod sim;

pub use error::{Result, TransportError};
pub use gatt::{uuid16_to_string, Characteristic, SERVICE_UUID16};
pub use traits::{DisconnectHandler, NotificationHandler, Transport};

#[cfg(feature = "sim")]
pub use sim::{Faults, SimulatedUnit};
