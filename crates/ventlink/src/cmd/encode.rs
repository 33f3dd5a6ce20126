use serde::Serialize;
use ventlink_frame::{encode_command, CommandFrame, MAX_ARGS};

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, print_raw, print_table, to_hex, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    command: &'static str,
    code: u8,
    frame: String,
    args: String,
    checksum: u8,
    truncated: bool,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = encode_command(args.command, &args.password, &args.args);
    let out = EncodeOutput {
        command: args.command.name(),
        code: args.command.code(),
        frame: to_hex(frame.as_ref()),
        args: to_hex(used_args(&frame, args.args.len())),
        checksum: frame.checksum(),
        truncated: args.args.len() > MAX_ARGS,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            ["FIELD", "VALUE"],
            &[
                ("command".into(), format!("{} ({:#04x})", out.command, out.code)),
                ("args".into(), out.args.clone()),
                ("checksum".into(), format!("{:#04x}", out.checksum)),
                ("truncated".into(), out.truncated.to_string()),
                ("frame".into(), out.frame.clone()),
            ],
        ),
        OutputFormat::Pretty => println!("{} {}", args.command, out.frame),
        OutputFormat::Raw => print_raw(frame.as_ref()),
    }
    Ok(SUCCESS)
}

fn used_args(frame: &CommandFrame, supplied: usize) -> &[u8] {
    &frame.args()[..supplied.min(MAX_ARGS)]
}

#[cfg(test)]
mod tests {
    use ventlink_frame::{Command, Password};

    use super::*;

    #[test]
    fn used_args_stops_at_frame_capacity() {
        let frame = encode_command(Command::SetTimer, &Password::default(), &[1; 20]);
        assert_eq!(used_args(&frame, 20).len(), MAX_ARGS);
        assert_eq!(used_args(&frame, 2), &[1, 1]);
    }
}
