use std::time::Duration;

use clap::{ArgAction, Args, Subcommand};
use ventlink_frame::{Command as FrameCommand, Mode, Password, DEFAULT_PASSWORD};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a 20-byte command frame.
    Encode(EncodeArgs),
    /// Validate and decode an inbound frame given as hex.
    Decode(DecodeArgs),
    /// Run poll cycles and control commands against a simulated unit.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command name (e.g. get-state, SET_SPEED) or code (e.g. 0x05).
    #[arg(value_parser = parse_command)]
    pub command: FrameCommand,
    /// Device password (4 ASCII characters).
    #[arg(long, env = "VENTLINK_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    pub password: Password,
    /// Argument byte, decimal or 0x-hex. Repeat for several.
    #[arg(long = "arg", value_name = "BYTE", value_parser = parse_byte, action = ArgAction::Append)]
    pub args: Vec<u8>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex (separators allowed).
    pub hex: String,
    /// Mode to keep if the record carries an unknown mode code.
    #[arg(long, value_name = "MODE")]
    pub previous_mode: Option<Mode>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address reported by the simulated unit.
    #[arg(long, default_value = "SIM:00:00:00:00:01")]
    pub address: String,
    /// Password the session sends.
    #[arg(long, env = "VENTLINK_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    pub password: Password,
    /// Password the simulated unit expects.
    #[arg(long, default_value = DEFAULT_PASSWORD)]
    pub device_password: Password,
    /// Number of poll cycles before any control command.
    #[arg(long, default_value_t = 1)]
    pub cycles: u32,

    /// Unit never pushes notifications (direct reads only).
    #[arg(long)]
    pub no_notify: bool,
    /// Unit accepts AUTH without confirming it.
    #[arg(long)]
    pub silent_auth: bool,
    /// Unit refuses connections.
    #[arg(long)]
    pub refuse_connect: bool,
    /// Direct reads return a corrupted frame.
    #[arg(long)]
    pub garble_reads: bool,

    /// Switch the unit on or off.
    #[arg(long, value_name = "on|off", value_parser = parse_on_off)]
    pub set_power: Option<bool>,
    /// Fan speed (clamped to 1..=10).
    #[arg(long, value_name = "N")]
    pub set_speed: Option<u8>,
    /// Operating mode.
    #[arg(long, value_name = "MODE")]
    pub set_mode: Option<Mode>,
    /// Display brightness (clamped to 0..=100).
    #[arg(long, value_name = "N")]
    pub set_brightness: Option<u8>,
    /// Reset the filter timer.
    #[arg(long)]
    pub reset_filter: bool,

    /// Pause after AUTH and before the direct read (e.g. 50ms).
    #[arg(long, default_value = "50ms", value_parser = parse_duration)]
    pub settle: Duration,
    /// Poll settle window (e.g. 100ms).
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub window: Duration,

    /// Keep polling and print every event until interrupted.
    #[arg(long)]
    pub follow: bool,
    /// Poll interval in follow mode.
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub interval: Duration,
    /// Stop follow mode after this long.
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Accepts `get-state`, `GET_STATE`, `5` or `0x05`.
pub fn parse_command(input: &str) -> Result<FrameCommand, String> {
    let trimmed = input.trim();
    if let Ok(code) = parse_byte(trimmed) {
        return FrameCommand::try_from(code).map_err(|err| err.to_string());
    }
    let normalized = trimmed.to_ascii_uppercase().replace('-', "_");
    FrameCommand::all()
        .into_iter()
        .find(|cmd| cmd.name() == normalized)
        .ok_or_else(|| format!("unknown command '{input}'"))
}

pub fn parse_byte(input: &str) -> Result<u8, String> {
    let trimmed = input.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| format!("invalid byte value: {input}"))
}

pub fn parse_on_off(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("expected on or off, got '{input}'")),
    }
}

/// `150ms`, `2s`, `3m`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        _ => Duration::from_secs(value),
    })
}
