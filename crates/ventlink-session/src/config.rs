use std::fmt;
use std::time::Duration;

use ventlink_frame::Password;
use ventlink_transport::Characteristic;

/// Configuration for one session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Password sent in every command frame.
    /// Credential material: redacted in debug output, never logged.
    pub password: Password,
    /// Characteristic used for writes, direct reads and notifications.
    pub characteristic: Characteristic,
    /// Ceiling for a single connect attempt.
    pub connect_timeout: Duration,
    /// Pause after every command write.
    pub command_settle: Duration,
    /// Extra pause after AUTH for the confirmation notification.
    pub auth_settle: Duration,
    /// Pause between GET_STATE and the direct read.
    pub read_settle: Duration,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn with_password(password: Password) -> Self {
        Self {
            password,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password: Password::default(),
            characteristic: Characteristic::DATA,
            connect_timeout: Duration::from_secs(20),
            command_settle: Duration::from_millis(200),
            auth_settle: Duration::from_millis(500),
            read_settle: Duration::from_secs(1),
            event_capacity: 64,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("password", &self.password)
            .field("characteristic", &self.characteristic)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_settle", &self.command_settle)
            .field("auth_settle", &self.auth_settle)
            .field("read_settle", &self.read_settle)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

/// Configuration for the poll coordinator.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between scheduled cycles.
    pub interval: Duration,
    /// Wait after a successful GET_STATE before reading the snapshot.
    pub settle_window: Duration,
    /// First early retry after a disconnect.
    pub reconnect_delay: Duration,
    /// Upper bound for the doubling retry delay.
    pub max_reconnect_delay: Duration,
    /// Capacity of the poll event channel.
    pub event_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            settle_window: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(60),
            event_capacity: 64,
        }
    }
}
