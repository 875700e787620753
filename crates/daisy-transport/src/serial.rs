use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{BoardStream, Connector};

/// Opens a serial device at a fixed path and baud rate (8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Default device path when none is configured.
    pub const DEFAULT_PATH: &'static str = "/dev/ttyUSB0";
    /// Default line speed of the board firmware.
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH, Self::DEFAULT_BAUD_RATE)
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<BoardStream> {
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|source| TransportError::Open {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path, baud = self.baud_rate, "opened serial device");
        Ok(BoardStream::from_serial(port))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}
