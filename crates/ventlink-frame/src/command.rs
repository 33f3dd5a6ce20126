//! Command codes and the shared device password.

use std::fmt;

use crate::error::{FrameError, Result};

/// Length of the password field in a command frame.
pub const PASSWORD_LEN: usize = 4;

/// Factory default password of the unit.
pub const DEFAULT_PASSWORD: &str = "0000";

/// Command codes understood by the unit.
///
/// The same code is echoed as the first payload byte of the matching response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Auth = 0x01,
    SetSpeed = 0x02,
    SetMode = 0x03,
    SetPower = 0x04,
    GetState = 0x05,
    SetTimer = 0x06,
    ResetFilter = 0x07,
    SetBrightness = 0x08,
}

impl Command {
    /// Wire code of this command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Command::Auth => "AUTH",
            Command::SetSpeed => "SET_SPEED",
            Command::SetMode => "SET_MODE",
            Command::SetPower => "SET_POWER",
            Command::GetState => "GET_STATE",
            Command::SetTimer => "SET_TIMER",
            Command::ResetFilter => "RESET_FILTER",
            Command::SetBrightness => "SET_BRIGHTNESS",
        }
    }

    /// All known commands in code order.
    pub fn all() -> [Command; 8] {
        [
            Command::Auth,
            Command::SetSpeed,
            Command::SetMode,
            Command::SetPower,
            Command::GetState,
            Command::SetTimer,
            Command::ResetFilter,
            Command::SetBrightness,
        ]
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self> {
        Command::all()
            .into_iter()
            .find(|cmd| cmd.code() == code)
            .ok_or(FrameError::UnknownCommand(code))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.code())
    }
}

/// The 4-byte ASCII password carried in every command frame.
///
/// Longer input is truncated and shorter input is zero-padded. Treated as
/// credential material: `Debug` never prints the bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Password([u8; PASSWORD_LEN]);

impl Password {
    /// Build a password from an ASCII string.
    pub fn new(password: &str) -> Result<Self> {
        if !password.is_ascii() {
            return Err(FrameError::InvalidPassword);
        }
        let mut bytes = [0u8; PASSWORD_LEN];
        for (dst, src) in bytes.iter_mut().zip(password.bytes()) {
            *dst = src;
        }
        Ok(Self(bytes))
    }

    /// Raw password field as written on the wire.
    pub fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl Default for Password {
    fn default() -> Self {
        let mut bytes = [0u8; PASSWORD_LEN];
        bytes.copy_from_slice(DEFAULT_PASSWORD.as_bytes());
        Self(bytes)
    }
}

impl std::str::FromStr for Password {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password(<redacted:{PASSWORD_LEN} bytes>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_match_wire_constants() {
        assert_eq!(Command::Auth.code(), 0x01);
        assert_eq!(Command::SetSpeed.code(), 0x02);
        assert_eq!(Command::SetMode.code(), 0x03);
        assert_eq!(Command::SetPower.code(), 0x04);
        assert_eq!(Command::GetState.code(), 0x05);
        assert_eq!(Command::SetTimer.code(), 0x06);
        assert_eq!(Command::ResetFilter.code(), 0x07);
        assert_eq!(Command::SetBrightness.code(), 0x08);
    }

    #[test]
    fn command_try_from_rejects_unknown() {
        assert_eq!(Command::try_from(0x05).unwrap(), Command::GetState);
        assert_eq!(
            Command::try_from(0x42).unwrap_err(),
            FrameError::UnknownCommand(0x42)
        );
    }

    #[test]
    fn password_truncates_and_pads() {
        assert_eq!(Password::new("123456").unwrap().as_bytes(), b"1234");
        assert_eq!(Password::new("12").unwrap().as_bytes(), &[b'1', b'2', 0, 0]);
        assert_eq!(Password::default().as_bytes(), b"0000");
    }

    #[test]
    fn password_rejects_non_ascii() {
        assert_eq!(Password::new("пароль"), Err(FrameError::InvalidPassword));
    }

    #[test]
    fn password_debug_is_redacted() {
        let rendered = format!("{:?}", Password::new("9876").unwrap());
        assert!(!rendered.contains("9876"));
        assert!(rendered.contains("redacted"));
    }
}
