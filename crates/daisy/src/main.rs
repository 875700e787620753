mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "daisy", version, about = "Talk to the daisy home-automation board")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_subcommand() {
        let cli = Cli::try_parse_from([
            "daisy",
            "request",
            "setRelay",
            "--id",
            "3",
            "--state",
            "on",
            "--port",
            "/dev/ttyACM0",
            "--timeout",
            "2s",
        ])
        .expect("request args should parse");

        match cli.command {
            Command::Request(args) => {
                assert_eq!(args.target.subject, "setRelay");
                assert_eq!(args.target.id, Some(3));
                assert_eq!(args.port.port, "/dev/ttyACM0");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_pending_with_request_flag() {
        let err = Cli::try_parse_from([
            "daisy",
            "decode",
            "0x4180",
            "--request",
            "--pending",
            "getDHT",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_unknown_relay_state() {
        let err = Cli::try_parse_from(["daisy", "encode", "setRelay", "--id", "1", "--state", "maybe"])
            .expect_err("invalid state should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
