//! Protocol engine for the daisy home-automation board.
//!
//! The board speaks a compact, bit-packed protocol over a serial line:
//! it pushes sensor telemetry on its own and answers one host request at a
//! time.
//!
//! # Crate Structure
//!
//! - [`protocol`] — Bit codec, message schemas, frame decoder and request encoder
//! - [`transport`] — Reconnecting serial link (behind `board` feature)
//! - [`board`] — Request correlation and telemetry fan-out (behind `board` feature)

/// Re-export protocol types.
pub mod protocol {
    pub use daisy_protocol::*;
}

/// Re-export transport types (requires `board` feature).
#[cfg(feature = "board")]
pub mod transport {
    pub use daisy_transport::*;
}

/// Re-export board types (requires `board` feature).
#[cfg(feature = "board")]
pub mod board {
    pub use daisy_board::*;
}
