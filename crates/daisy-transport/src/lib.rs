//! Physical link to the board.
//!
//! Provides a unified stream over the devices the board can sit behind:
//! - Serial ports (the production path)
//! - Unix domain sockets (simulators and tests)
//!
//! [`SerialTransport`] owns the connection, reconnects after failures and
//! defers writes while the link is down. Everything above it only sees
//! bytes going in and out.

pub mod error;
pub mod serial;
pub mod supervisor;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::SerialConnector;
pub use supervisor::{LinkEvent, LinkState, SerialTransport, TransportConfig, WriteHandle};
pub use traits::{BoardStream, Connector};
