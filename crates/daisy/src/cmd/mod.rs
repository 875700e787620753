use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use daisy_protocol::{Request, RequestSubject};
use daisy_transport::SerialConnector;

use crate::exit::{encode_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod monitor;
pub mod request;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print telemetry pushed by the board.
    Monitor(MonitorArgs),
    /// Send one request to the board and print the reply.
    Request(RequestArgs),
    /// Show the bytes a request encodes to, without touching the board.
    Encode(EncodeArgs),
    /// Run the frame decoder over a literal byte stream.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PortArgs {
    /// Serial device the board is attached to.
    #[arg(long, env = "SERIAL_PORT", default_value = SerialConnector::DEFAULT_PATH)]
    pub port: String,
    /// Serial line speed.
    #[arg(long, env = "SERIAL_PORT_BAUD_RATE", default_value_t = SerialConnector::DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

impl PortArgs {
    pub fn connector(&self) -> SerialConnector {
        SerialConnector::new(&self.port, self.baud)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RelaySwitch {
    On,
    Off,
}

#[derive(Args, Debug)]
pub struct SubjectArgs {
    /// Request subject: setRelay, getRelay, toggleRelay, getSoilMoisture, getDHT, getDS18B20.
    pub subject: String,
    /// Relay or sensor id.
    #[arg(long)]
    pub id: Option<u8>,
    /// Relay state for setRelay.
    #[arg(long, value_enum)]
    pub state: Option<RelaySwitch>,
}

impl SubjectArgs {
    pub fn to_request(&self) -> CliResult<Request> {
        let subject =
            RequestSubject::from_name(&self.subject).map_err(|err| encode_error("invalid request", err))?;
        let args = daisy_protocol::RequestArgs {
            id: self.id,
            state: self.state.map(|state| state == RelaySwitch::On),
        };
        Request::from_args(subject, args).map_err(|err| encode_error("invalid request", err))
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub target: SubjectArgs,
    #[command(flatten)]
    pub port: PortArgs,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub target: SubjectArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Bits such as "00 0000 0010 1000000", or hex with a 0x prefix.
    pub input: String,
    /// Subject of the request assumed to be awaiting a response.
    #[arg(long, value_name = "SUBJECT")]
    pub pending: Option<String>,
    /// Decode the input as a single outbound request packet.
    #[arg(long, conflicts_with = "pending")]
    pub request: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
