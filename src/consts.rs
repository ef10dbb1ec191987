//! Firmata protocol constants: command bytes, sysex commands, and addressing
//! limits. All byte values are fixed by the wire protocol (Firmata v2.x,
//! <https://github.com/firmata/protocol>) and must not be changed.

// --- Status bytes (upper nibble carries the command for channel-addressed
// --- messages, lower nibble the pin/port/channel) ---

/// Two data bytes follow: the 8 input bits of one digital port.
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Two data bytes follow: one analog channel sample (or PWM write).
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable/disable analog reporting per channel.
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable/disable digital reporting per 8-pin port.
pub const REPORT_DIGITAL: u8 = 0xD0;

/// Set a pin to INPUT/OUTPUT/ANALOG/PWM/etc. Followed by pin and mode bytes.
pub const SET_PIN_MODE: u8 = 0xF4;
/// Protocol version request (alone) or response (followed by major, minor).
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset the firmware to its power-up defaults.
pub const SYSTEM_RESET: u8 = 0xFF;

/// Opens a sysex frame.
pub const SYSEX_START: u8 = 0xF0;
/// Closes a sysex frame.
pub const SYSEX_END: u8 = 0xF7;

// --- Sysex command bytes (first payload byte after SYSEX_START) ---

/// Analog write to any pin number, value in as many 7-bit bytes as needed.
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// Ask for supported modes and resolutions of all pins.
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolutions.
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for a pin's current mode and value.
pub const PIN_STATE_QUERY: u8 = 0x6D;
/// Reply with a pin's current mode and value.
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
/// Configure a servo: min pulse, max pulse, initial angle.
pub const SERVO_CONFIG: u8 = 0x70;
/// A string message, 14 bits per character.
pub const STRING_DATA: u8 = 0x71;
/// Send an I2C read/write request.
pub const I2C_REQUEST: u8 = 0x76;
/// Reply to an I2C read request.
pub const I2C_REPLY: u8 = 0x77;
/// Configure I2C delay times and power pins.
pub const I2C_CONFIG: u8 = 0x78;
/// Report name and version of the firmware.
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Set the sampling rate of the firmware main loop.
pub const SAMPLING_INTERVAL: u8 = 0x7A;

/// Terminates one pin's (mode, resolution) list inside CAPABILITY_RESPONSE.
pub const CAPABILITY_PIN_SEPARATOR: u8 = 0x7F;

// --- I2C_REQUEST mode byte layout ---
pub mod i2c {
    /// Set when the slave address needs 10-bit addressing; bits 0-2 of the
    /// mode byte then hold bits 8-10 of the address.
    pub const TEN_BIT_ADDRESS_MODE: u8 = 1 << 5;
    pub const MODE_WRITE: u8 = 0b00 << 3;
    pub const MODE_READ_ONCE: u8 = 0b01 << 3;
    pub const MODE_READ_CONTINUOUSLY: u8 = 0b10 << 3;
    pub const MODE_STOP_READING: u8 = 0b11 << 3;
}

// --- Addressing limits ---

/// Highest pin index addressable anywhere in the protocol (7-bit field).
pub const MAX_PINS: usize = 128;
/// Number of 8-pin digital ports covering `MAX_PINS`.
pub const MAX_PORTS: usize = MAX_PINS / 8;
/// Number of analog channels addressable in the short ANALOG_MESSAGE form.
pub const MAX_ANALOG_CHANNELS: usize = 16;
/// Highest pin index written with the short ANALOG_MESSAGE form; pins at or
/// above this use EXTENDED_ANALOG.
pub const MAX_SHORT_ANALOG_PIN: usize = 15;
/// Exclusive upper bound of a value carried as two 7-bit bytes.
pub const MAX_U14: u16 = 1 << 14;

/// Oldest firmware version (major, minor) this engine speaks.
pub const MIN_FIRMWARE_VERSION: (u8, u8) = (2, 0);
/// Firmware versions above this support PIN_STATE_QUERY.
pub const PIN_STATE_QUERY_VERSION: (u8, u8) = (2, 1);

/// Outbound buffer capacity in bytes. Running into this limit means the
/// caller enqueues commands far faster than the serial link drains them.
pub const OUTBOUND_CAPACITY: usize = 8192;
