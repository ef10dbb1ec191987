use crate::pins::PinMode;
use thiserror::Error;

/// Errors that can occur while driving a Firmata board.
///
/// Contract violations (bad pin index, wrong mode, oversized value, broken
/// configuration) indicate caller defects and are never silently coerced.
/// Transport failures are recovered inside the pumps and normally only show
/// up in the log; they appear here when a transport method is called
/// directly. Protocol anomalies from the device itself are surfaced through
/// [`crate::decoder::Message`] rather than this enum, except for an
/// unsupported firmware version, which is fatal for the device.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Error from the serial port layer.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Pin index is outside the valid range.
    #[error("Pin {pin} out of range (0-{})", .max - 1)]
    PinOutOfRange {
        /// The offending pin index.
        pin: u8,
        /// Exclusive upper bound in effect (board pin count once known).
        max: usize,
    },
    /// The operation requires a pin mode the pin is not configured for.
    #[error("Pin {pin} is configured as {actual:?}, operation requires {required:?}")]
    PinModeMismatch {
        /// The pin the operation addressed.
        pin: u8,
        /// The mode the operation requires.
        required: PinMode,
        /// The mode the pin currently has.
        actual: PinMode,
    },
    /// The board reported no capability for this pin/mode combination.
    #[error("Pin {pin} does not support mode {mode:?}")]
    UnsupportedPinMode {
        /// The pin whose capabilities were checked.
        pin: u8,
        /// The unsupported mode.
        mode: PinMode,
    },
    /// A value argument is outside the protocol range.
    #[error("Value {value} out of range (max {max})")]
    ValueOutOfRange {
        /// The offending value.
        value: u32,
        /// Inclusive maximum for this argument.
        max: u32,
    },
    /// The caller-supplied pin configuration table is malformed.
    #[error("Invalid pin configuration for pin {pin}: {message}")]
    InvalidPinConfig {
        /// Index into the configuration table.
        pin: u8,
        /// What is wrong with the entry.
        message: String,
    },
    /// The outbound buffer is full. Commands are being enqueued far faster
    /// than the transport drains them; this is fatal, not retryable.
    #[error("Outbound buffer full ({capacity} bytes): commands enqueued faster than the transport drains them")]
    OutboundBufferFull {
        /// Configured buffer capacity.
        capacity: usize,
    },
    /// The device firmware is older than this protocol implementation
    /// supports. Fatal for the connected device.
    #[error("Unsupported firmware version {major}.{minor}, need at least 2.0")]
    UnsupportedFirmware {
        /// Reported major version.
        major: u8,
        /// Reported minor version.
        minor: u8,
    },
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
