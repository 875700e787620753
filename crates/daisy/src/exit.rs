use std::fmt;
use std::io;

use daisy_board::BoardError;
use daisy_protocol::{EncodeError, ProtocolError};
use daisy_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn encode_error(context: &str, err: EncodeError) -> CliError {
    CliError::new(USAGE, format!("{context}: {err}"))
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    match err {
        ProtocolError::InvalidBitLiteral(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn board_error(context: &str, err: BoardError) -> CliError {
    match err {
        BoardError::Encode(err) => encode_error(context, err),
        BoardError::Transport(err) => transport_error(context, err),
        BoardError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BoardError::Failure { .. } | BoardError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daisy_protocol::RequestSubject;
    use std::time::Duration;

    #[test]
    fn board_errors_map_to_exit_codes() {
        assert_eq!(
            board_error("x", BoardError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            board_error(
                "x",
                BoardError::Encode(EncodeError::InvalidSubject("nope".into()))
            )
            .code,
            USAGE
        );
        let failure = board_error(
            "request failed",
            BoardError::Failure {
                subject: RequestSubject::SetRelay,
                code: 0,
                message: "Invalid relay ID.".into(),
            },
        );
        assert_eq!(failure.code, FAILURE);
        assert_eq!(
            failure.to_string(),
            "request failed: setRelay failed: Invalid relay ID."
        );
    }

    #[test]
    fn bad_bit_literal_is_usage_error() {
        assert_eq!(
            protocol_error("x", ProtocolError::InvalidBitLiteral('z')).code,
            USAGE
        );
    }
}
