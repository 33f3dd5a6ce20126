//! Decoded device state carried by GET_STATE responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FrameError, Result};

/// Fixed part of the state record (everything up to and including VOC).
pub const STATE_RECORD_MIN_LEN: usize = 14;

/// Unknown marker for one-byte readings.
pub const UNKNOWN_U8: u8 = 0xFF;

/// Unknown marker for two-byte readings.
pub const UNKNOWN_U16: u16 = 0xFFFF;

/// Operating modes of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Mode {
    Auto = 0,
    Winter = 1,
    Summer = 2,
    Ventilation = 3,
    Supply = 4,
    Exhaust = 5,
}

impl Mode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Auto => "AUTO",
            Mode::Winter => "WINTER",
            Mode::Summer => "SUMMER",
            Mode::Ventilation => "VENTILATION",
            Mode::Supply => "SUPPLY",
            Mode::Exhaust => "EXHAUST",
        }
    }

    pub fn all() -> [Mode; 6] {
        [
            Mode::Auto,
            Mode::Winter,
            Mode::Summer,
            Mode::Ventilation,
            Mode::Supply,
            Mode::Exhaust,
        ]
    }
}

impl TryFrom<u8> for Mode {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self> {
        Mode::all()
            .into_iter()
            .find(|mode| mode.code() == code)
            .ok_or(FrameError::UnknownMode(code))
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Mode::all()
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mode '{s}'"))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete snapshot of the unit's sensors and actuators.
///
/// `None` means the unit reported the reading as unknown (or did not send it),
/// never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: bool,
    pub speed: u8,
    pub mode: Option<Mode>,
    pub winter_mode_active: bool,
    pub auto_mode_active: bool,
    pub temp_in: i8,
    pub temp_out: i8,
    pub temp_exhaust: i8,
    pub temp_supply: i8,
    pub humidity: Option<u8>,
    pub co2: Option<u16>,
    pub voc: Option<u16>,
    pub filter_timer_days: Option<u8>,
    pub brightness: Option<u8>,
}

/// Parse the body of a GET_STATE response (payload minus the echoed code).
///
/// An unrecognised mode code keeps `previous_mode` instead of clearing it.
/// Bodies shorter than [`STATE_RECORD_MIN_LEN`] are rejected whole.
pub fn parse_state(body: &[u8], previous_mode: Option<Mode>) -> Result<DeviceState> {
    if body.len() < STATE_RECORD_MIN_LEN {
        return Err(FrameError::StateTooShort {
            len: body.len(),
            min: STATE_RECORD_MIN_LEN,
        });
    }

    let mode = match Mode::try_from(body[2]) {
        Ok(mode) => Some(mode),
        Err(_) => {
            warn!(code = body[2], "unknown mode value received");
            previous_mode
        }
    };

    Ok(DeviceState {
        power: body[0] != 0,
        speed: body[1],
        mode,
        winter_mode_active: body[3] != 0,
        auto_mode_active: body[4] != 0,
        temp_in: body[5] as i8,
        temp_out: body[6] as i8,
        temp_exhaust: body[7] as i8,
        temp_supply: body[8] as i8,
        humidity: known_u8(body[9]),
        co2: known_u16(u16::from_le_bytes([body[10], body[11]])),
        voc: known_u16(u16::from_le_bytes([body[12], body[13]])),
        filter_timer_days: body.get(14).copied(),
        brightness: body.get(15).copied(),
    })
}

/// Encode a state record body (device side of the protocol).
///
/// Optional trailing fields are only written while every field before them is
/// present, since the record is positional.
pub fn encode_state(state: &DeviceState) -> Vec<u8> {
    let mut body = Vec::with_capacity(STATE_RECORD_MIN_LEN + 2);
    body.push(u8::from(state.power));
    body.push(state.speed);
    body.push(state.mode.map(Mode::code).unwrap_or(UNKNOWN_U8));
    body.push(u8::from(state.winter_mode_active));
    body.push(u8::from(state.auto_mode_active));
    body.push(state.temp_in as u8);
    body.push(state.temp_out as u8);
    body.push(state.temp_exhaust as u8);
    body.push(state.temp_supply as u8);
    body.push(state.humidity.unwrap_or(UNKNOWN_U8));
    body.extend_from_slice(&state.co2.unwrap_or(UNKNOWN_U16).to_le_bytes());
    body.extend_from_slice(&state.voc.unwrap_or(UNKNOWN_U16).to_le_bytes());
    if let Some(days) = state.filter_timer_days {
        body.push(days);
        if let Some(brightness) = state.brightness {
            body.push(brightness);
        }
    }
    body
}

fn known_u8(raw: u8) -> Option<u8> {
    (raw != UNKNOWN_U8).then_some(raw)
}

fn known_u16(raw: u16) -> Option<u16> {
    (raw != UNKNOWN_U16).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: [u8; 14] = [
        0x01, 0x05, 0x00, 0x00, 0x01, 0x14, 0x12, 0x10, 0x11, 0xFF, 0xFF, 0xFF, 0x64, 0x00,
    ];

    #[test]
    fn parses_sample_record() {
        let state = parse_state(&SAMPLE, None).unwrap();

        assert!(state.power);
        assert_eq!(state.speed, 5);
        assert_eq!(state.mode, Some(Mode::Auto));
        assert!(!state.winter_mode_active);
        assert!(state.auto_mode_active);
        assert_eq!(
            (state.temp_in, state.temp_out, state.temp_exhaust, state.temp_supply),
            (20, 18, 16, 17)
        );
        assert_eq!(state.humidity, None);
        assert_eq!(state.co2, None);
        assert_eq!(state.voc, Some(100));
        assert_eq!(state.filter_timer_days, None);
        assert_eq!(state.brightness, None);
    }

    #[test]
    fn sample_record_serializes_with_null_unknowns() {
        let state = parse_state(&SAMPLE, None).unwrap();
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["power"], serde_json::json!(true));
        assert_eq!(json["speed"], serde_json::json!(5));
        assert_eq!(json["mode"], serde_json::json!("AUTO"));
        assert!(json["humidity"].is_null());
        assert!(json["co2"].is_null());
        assert_eq!(json["voc"], serde_json::json!(100));
    }

    #[test]
    fn unknown_mode_keeps_previous_value() {
        let mut body = SAMPLE;
        body[2] = 9;

        let kept = parse_state(&body, Some(Mode::Summer)).unwrap();
        assert_eq!(kept.mode, Some(Mode::Summer));

        let none = parse_state(&body, None).unwrap();
        assert_eq!(none.mode, None);
    }

    #[test]
    fn negative_temperatures() {
        let mut body = SAMPLE;
        body[6] = 0xF6;
        let state = parse_state(&body, None).unwrap();
        assert_eq!(state.temp_out, -10);
    }

    #[test]
    fn optional_trailing_fields() {
        let mut body = SAMPLE.to_vec();
        body.push(42);
        let with_filter = parse_state(&body, None).unwrap();
        assert_eq!(with_filter.filter_timer_days, Some(42));
        assert_eq!(with_filter.brightness, None);

        body.push(80);
        let with_brightness = parse_state(&body, None).unwrap();
        assert_eq!(with_brightness.brightness, Some(80));
    }

    #[test]
    fn short_record_rejected() {
        let err = parse_state(&SAMPLE[..13], None).unwrap_err();
        assert_eq!(err, FrameError::StateTooShort { len: 13, min: 14 });
    }

    #[test]
    fn encode_matches_sample() {
        let state = parse_state(&SAMPLE, None).unwrap();
        assert_eq!(encode_state(&state), SAMPLE.to_vec());
    }

    #[test]
    fn mode_from_str_is_case_insensitive() {
        assert_eq!("ventilation".parse::<Mode>().unwrap(), Mode::Ventilation);
        assert_eq!(" EXHAUST ".parse::<Mode>().unwrap(), Mode::Exhaust);
        assert!("turbo".parse::<Mode>().is_err());
    }
}
