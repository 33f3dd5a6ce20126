use std::fmt;

use ventlink_frame::FrameError;
use ventlink_session::{SessionError, UpdateFailed, UpdateFailure};
use ventlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    let code = match err {
        TransportError::Timeout(_) => TIMEOUT,
        TransportError::Shutdown => FAILURE,
        TransportError::Connect { .. }
        | TransportError::NotConnected
        | TransportError::Write { .. }
        | TransportError::Read { .. }
        | TransportError::Subscribe { .. } => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: &FrameError) -> CliError {
    let code = match err {
        FrameError::InvalidPassword | FrameError::UnknownCommand(_) => USAGE,
        _ => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn session_error(context: &str, err: &SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::NotConnected => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SessionError::CommandRejected { .. } | SessionError::AuthNotConfirmed => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        SessionError::NoDataAvailable => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SessionError::Shutdown => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn update_failed(failed: &UpdateFailed) -> CliError {
    let code = match failed.kind {
        UpdateFailure::Connectivity => TRANSPORT_ERROR,
        UpdateFailure::Data => DATA_INVALID,
        UpdateFailure::Shutdown => FAILURE,
    };
    CliError::new(code, failed.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn transport_timeout_maps_to_124() {
        let err = transport_error("connect", &TransportError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("connect: "));
    }

    #[test]
    fn auth_refusal_maps_to_permission_denied() {
        let err = session_error(
            "set speed",
            &SessionError::CommandRejected {
                command: "SET_SPEED",
                reason: "not authenticated",
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn nested_frame_error_keeps_its_code() {
        let err = session_error("read", &SessionError::Frame(FrameError::EmptyPayload));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn update_failure_kinds() {
        let connectivity = update_failed(&UpdateFailed::new(UpdateFailure::Connectivity, "down"));
        assert_eq!(connectivity.code, TRANSPORT_ERROR);
        let data = update_failed(&UpdateFailed::new(UpdateFailure::Data, "empty"));
        assert_eq!(data.code, DATA_INVALID);
    }
}
