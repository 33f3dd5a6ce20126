use serde::Serialize;
use ventlink_frame::{decode_frame, parse_state, AuthReply, DeviceState, ResponseKind};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_raw, print_table, state_rows, state_summary, to_hex, OutputFormat};

#[derive(Serialize)]
struct DecodeOutput {
    code: u8,
    command: Option<&'static str>,
    kind: &'static str,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<DeviceState>,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = crate::output::parse_hex(&args.hex).map_err(|msg| CliError::new(USAGE, msg))?;
    let response = decode_frame(&bytes).map_err(|err| frame_error("invalid frame", &err))?;

    let mut out = DecodeOutput {
        code: response.code,
        command: response.command().map(|cmd| cmd.name()),
        kind: "other",
        body: to_hex(&response.body),
        auth: None,
        state: None,
    };
    match response.kind() {
        ResponseKind::Auth(reply) => {
            out.kind = "auth";
            out.auth = Some(match reply {
                AuthReply::Acknowledged => "acknowledged",
                AuthReply::Accepted => "accepted",
                AuthReply::Rejected(_) => "rejected",
            });
        }
        ResponseKind::State(body) => {
            out.kind = "state";
            let state = parse_state(&body, args.previous_mode)
                .map_err(|err| frame_error("invalid state record", &err))?;
            out.state = Some(state);
        }
        ResponseKind::Other(_) => {}
    }

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("code".to_string(), format!("{:#04x}", out.code)),
                ("command".to_string(), out.command.unwrap_or("unknown").to_string()),
                ("kind".to_string(), out.kind.to_string()),
                ("body".to_string(), out.body.clone()),
            ];
            if let Some(auth) = out.auth {
                rows.push(("auth".to_string(), auth.to_string()));
            }
            if let Some(state) = &out.state {
                rows.extend(state_rows(state));
            }
            print_table(["FIELD", "VALUE"], &rows);
        }
        OutputFormat::Pretty => {
            let command = out.command.unwrap_or("unknown");
            match (&out.state, out.auth) {
                (Some(state), _) => println!("{command}: {}", state_summary(state)),
                (None, Some(auth)) => println!("{command}: {auth}"),
                (None, None) => println!("{command}: body={}", out.body),
            }
        }
        OutputFormat::Raw => print_raw(&response.body),
    }
    Ok(SUCCESS)
}
