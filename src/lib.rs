//! Host-side driver for Firmata-speaking boards (Arduino and friends) over
//! a serial link.
//!
//! The crate encodes outbound Firmata commands, decodes the inbound byte
//! stream, tracks per-pin capabilities and modes, and walks a freshly
//! connected board through the protocol handshake before any pin I/O is
//! trusted. Everything runs single-threaded and pump-driven: the host
//! application calls [`Board::pump_write`] and [`Board::pump_read`] once per
//! frame or loop iteration, and no call blocks beyond the transport's small
//! internal timeout.
//!
//! ## Overview
//!
//! * [`Board`] is the facade: construct it with a [`PinConfig`] naming the
//!   role of each pin, then pump it. Connection, handshake, and reconnect
//!   after unplug all happen inside the pumps.
//! * Digital and analog writes are coalesced against cached output state,
//!   so calling [`Board::write_digital`] every frame costs wire bytes only
//!   when a value actually changes.
//! * Inbound samples land in caches read synchronously via
//!   [`Board::read_digital`] and [`Board::read_analog`]; I2C replies,
//!   string messages, and unknown traffic queue up behind
//!   [`Board::next_event`].
//! * The [`Transport`] trait decouples the engine from the serial port;
//!   [`SerialTransport`] is the production implementation.
//!
//! ## Example
//!
//! ```no_run
//! use firmata_host::{Board, PinConfig};
//!
//! # fn main() -> firmata_host::Result<()> {
//! let config = PinConfig::parse(&[
//!     "", "", "digitalIn", "digitalOut", "", "", "pwmOut", "",
//!     "", "servo", "", "", "", "digitalOut",
//! ])?;
//! let mut board = Board::open_serial("/dev/ttyACM0", 57_600, config);
//!
//! loop {
//!     board.pump_read()?;
//!     if board.is_ready() {
//!         let pressed = board.read_digital(2)?;
//!         board.write_digital(13, pressed)?;
//!     }
//!     board.pump_write()?;
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # }
//! ```

pub mod board;
pub mod codec;
pub mod consts;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod link;
pub mod pins;
pub mod transport;

pub use board::{Board, DEFAULT_SERVO_MAX_PULSE_US, DEFAULT_SERVO_MIN_PULSE_US};
pub use decoder::{Decoder, Message};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use link::LinkPhase;
pub use pins::{PinCapability, PinConfig, PinMode};
pub use transport::{SerialTransport, Transport};
