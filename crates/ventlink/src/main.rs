mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ventlink", version, about = "Ventilation unit frame and session CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ventlink_frame::{Command as FrameCommand, Mode};

    use super::*;

    #[test]
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from([
            "ventlink",
            "encode",
            "set-speed",
            "--password",
            "1234",
            "--arg",
            "4",
        ])
        .expect("encode args should parse");

        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.command, FrameCommand::SetSpeed);
        assert_eq!(args.args, vec![4]);
    }

    #[test]
    fn rejects_non_ascii_password() {
        let err = Cli::try_parse_from(["ventlink", "encode", "get-state", "--password", "pässwörd"])
            .expect_err("non-ascii password should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_simulate_controls() {
        let cli = Cli::try_parse_from([
            "ventlink",
            "simulate",
            "--cycles",
            "3",
            "--set-power",
            "off",
            "--set-mode",
            "winter",
            "--settle",
            "20ms",
        ])
        .expect("simulate args should parse");

        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.cycles, 3);
        assert_eq!(args.set_power, Some(false));
        assert_eq!(args.set_mode, Some(Mode::Winter));
        assert_eq!(args.settle, Duration::from_millis(20));
        assert!(!args.follow);
    }

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["ventlink", "decode", "55aa01050505", "--format", "json"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
