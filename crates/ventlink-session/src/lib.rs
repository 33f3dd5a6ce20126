//! Session layer for ventilation units.
//!
//! A [`Session`] owns one link, serializes every exchange on it, tracks
//! authentication as a tri-state and keeps the last decoded state. The
//! [`PollCoordinator`] refreshes that state periodically and reconnects after
//! drops; [`SessionManager`] holds one session per device address.

pub mod auth;
pub mod config;
pub mod error;
pub mod manager;
pub mod poll;
pub mod session;
mod snapshot;

pub use auth::AuthStatus;
pub use config::{PollConfig, SessionConfig};
pub use error::{Result, SessionError, UpdateFailed, UpdateFailure};
pub use manager::SessionManager;
pub use poll::{PollCoordinator, PollEvent, PollHandle};
pub use session::{
    DisconnectListener, Exclusive, Session, SessionEvent, StateListener, BRIGHTNESS_MAX,
    SPEED_MAX, SPEED_MIN,
};
