use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use ventlink_frame::DeviceState;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Two-column table with a header row.
pub fn print_table(header: [&str; 2], rows: &[(String, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for (key, value) in rows {
        table.add_row(vec![key.clone(), value.clone()]);
    }
    println!("{table}");
}

/// Lowercase hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse hex, tolerating a `0x` prefix, whitespace, `:` and `-` separators.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = trimmed
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| format!("invalid hex in '{input}'"))?;
            u8::from_str_radix(text, 16).map_err(|_| format!("invalid hex digit pair '{text}'"))
        })
        .collect()
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn on_off(value: bool) -> String {
    let text = if value { "on" } else { "off" };
    text.to_string()
}

pub fn state_rows(state: &DeviceState) -> Vec<(String, String)> {
    vec![
        ("power".into(), on_off(state.power)),
        ("speed".into(), state.speed.to_string()),
        ("mode".into(), or_unknown(state.mode)),
        ("winter_mode_active".into(), on_off(state.winter_mode_active)),
        ("auto_mode_active".into(), on_off(state.auto_mode_active)),
        ("temp_in".into(), format!("{} °C", state.temp_in)),
        ("temp_out".into(), format!("{} °C", state.temp_out)),
        ("temp_exhaust".into(), format!("{} °C", state.temp_exhaust)),
        ("temp_supply".into(), format!("{} °C", state.temp_supply)),
        ("humidity".into(), or_unknown(state.humidity.map(|h| format!("{h} %")))),
        ("co2".into(), or_unknown(state.co2.map(|c| format!("{c} ppm")))),
        ("voc".into(), or_unknown(state.voc)),
        ("filter_timer_days".into(), or_unknown(state.filter_timer_days)),
        ("brightness".into(), or_unknown(state.brightness)),
    ]
}

/// One-line summary used by `pretty` output.
pub fn state_summary(state: &DeviceState) -> String {
    format!(
        "power={} speed={} mode={} in={} out={} humidity={} co2={} voc={}",
        on_off(state.power),
        state.speed,
        or_unknown(state.mode),
        state.temp_in,
        state.temp_out,
        or_unknown(state.humidity),
        or_unknown(state.co2),
        or_unknown(state.voc),
    )
}
