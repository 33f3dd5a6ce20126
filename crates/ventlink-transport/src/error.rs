use std::time::Duration;

use crate::gatt::Characteristic;

/// Errors reported by a transport adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The link could not be established.
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The connection attempt did not finish in time.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// An operation needed an open link.
    #[error("not connected")]
    NotConnected,

    /// A characteristic write failed.
    #[error("write to {characteristic} failed: {reason}")]
    Write {
        characteristic: Characteristic,
        reason: String,
    },

    /// A characteristic read failed.
    #[error("read from {characteristic} failed: {reason}")]
    Read {
        characteristic: Characteristic,
        reason: String,
    },

    /// Enabling or disabling notifications failed.
    #[error("notification setup on {characteristic} failed: {reason}")]
    Subscribe {
        characteristic: Characteristic,
        reason: String,
    },

    /// The adapter has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
