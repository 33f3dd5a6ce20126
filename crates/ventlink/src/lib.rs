//! Talk to wireless ventilation units.
//!
//! ventlink speaks the unit's fixed-frame protocol over any link that
//! implements [`transport::Transport`]: it encodes commands, validates
//! responses and notifications, keeps an authenticated session alive and
//! polls device state on a schedule.
//!
//! # Crate Structure
//!
//! - [`frame`]: command/response frame codec and the device state record
//! - [`transport`]: the link contract (plus a simulated unit behind `sim`)
//! - [`session`]: session, poll coordinator and session manager (behind `session`)

/// Re-export frame types.
pub mod frame {
    pub use ventlink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use ventlink_transport::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use ventlink_session::*;
}
