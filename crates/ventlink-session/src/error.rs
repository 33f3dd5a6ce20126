use std::fmt;

use serde::Serialize;

/// Errors that can occur in session operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ventlink_transport::TransportError),

    /// An inbound frame failed validation.
    #[error("frame rejected: {0}")]
    Frame(#[from] ventlink_frame::FrameError),

    /// The link is down (or dropped during the operation).
    #[error("not connected")]
    NotConnected,

    /// A control command was refused before anything was written.
    #[error("{command} rejected: {reason}")]
    CommandRejected {
        command: &'static str,
        reason: &'static str,
    },

    /// AUTH was sent but the unit has not confirmed it.
    #[error("authentication not confirmed by device")]
    AuthNotConfirmed,

    /// The command went out but no decodable state came back.
    #[error("no state data available")]
    NoDataAvailable,

    /// The session was stopped.
    #[error("session stopped")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Category of a failed poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFailure {
    /// The link could not be established.
    Connectivity,
    /// Connected, but no usable state was obtained.
    Data,
    /// The coordinator or session is shutting down.
    Shutdown,
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateFailure::Connectivity => "connectivity",
            UpdateFailure::Data => "data",
            UpdateFailure::Shutdown => "shutdown",
        })
    }
}

/// Recoverable poll-cycle failure reported to the host. The next cycle retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("update failed ({kind}): {cause}")]
pub struct UpdateFailed {
    pub kind: UpdateFailure,
    pub cause: String,
}

impl UpdateFailed {
    pub fn new(kind: UpdateFailure, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    pub(crate) fn from_session(kind: UpdateFailure, err: &SessionError) -> Self {
        match err {
            SessionError::Shutdown => Self::new(UpdateFailure::Shutdown, err.to_string()),
            _ => Self::new(kind, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_failed_display_carries_kind_and_cause() {
        let failed = UpdateFailed::new(UpdateFailure::Connectivity, "device not reachable");
        assert_eq!(
            failed.to_string(),
            "update failed (connectivity): device not reachable"
        );
    }

    #[test]
    fn shutdown_wins_over_cycle_kind() {
        let failed = UpdateFailed::from_session(UpdateFailure::Data, &SessionError::Shutdown);
        assert_eq!(failed.kind, UpdateFailure::Shutdown);
    }
}
