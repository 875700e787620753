use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected byte stream to the board; implements Read + Write.
///
/// In production this wraps a serial port. On Unix it can also wrap a Unix
/// domain socket, which is how simulators and tests stand in for hardware.
pub struct BoardStream {
    inner: BoardStreamInner,
}

enum BoardStreamInner {
    Serial(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for BoardStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BoardStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            BoardStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for BoardStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BoardStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            BoardStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            BoardStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            BoardStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl BoardStream {
    /// Wrap an opened serial port.
    pub(crate) fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: BoardStreamInner::Serial(port),
        }
    }

    /// Wrap a connected Unix domain socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: BoardStreamInner::Unix(stream),
        }
    }

    /// Set how long a read may block before returning a timeout error.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        match &mut self.inner {
            BoardStreamInner::Serial(port) => port.set_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            BoardStreamInner::Unix(stream) => {
                stream.set_read_timeout(Some(timeout)).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream so one handle can read while another writes.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            BoardStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            #[cfg(unix)]
            BoardStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }
}

impl std::fmt::Debug for BoardStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            BoardStreamInner::Serial(port) => f
                .debug_struct("BoardStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            #[cfg(unix)]
            BoardStreamInner::Unix(_) => f.debug_struct("BoardStream").field("type", &"unix").finish(),
        }
    }
}

/// Something that can (re)open the link to the board.
///
/// Called from a blocking context every time the transport connects, so
/// implementations may block on device I/O.
pub trait Connector: Send + Sync + 'static {
    /// Open a fresh stream.
    fn connect(&self) -> Result<BoardStream>;

    /// Human-readable name of the endpoint for logs.
    fn describe(&self) -> String;
}
