//! Host side of the board conversation.
//!
//! The wire carries no request identifiers, so at most one request may be
//! outstanding at a time. [`Board`] queues requests, dispatches them one by
//! one, matches each response to the request in flight and fans telemetry
//! out to subscribers.

pub mod board;
pub mod correlator;
pub mod error;

pub use board::{Board, BoardConfig, ByteSink};
pub use correlator::{Correlator, Dispatched};
pub use error::{BoardError, Result};
