//! Pure byte-level helpers shared by the command encoder and the message
//! decoder: 14-bit split/join and sysex framing.
//!
//! Everything above the status-byte boundary (0x80) is a command; data bytes
//! carry 7 bits each, so multi-byte values travel as little-endian 7-bit
//! groups.

use crate::consts;

/// Splits a 14-bit value into its two 7-bit wire bytes, LSB first.
///
/// Values >= 16384 are a programmer error; callers validate before encoding.
#[inline]
pub fn split_u14(value: u16) -> [u8; 2] {
    debug_assert!(value < consts::MAX_U14, "u14 value {value} out of range");
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Reassembles a 14-bit value from its two wire bytes (LSB, MSB).
#[inline]
pub fn join_u14(lsb: u8, msb: u8) -> u16 {
    (lsb as u16 & 0x7F) | ((msb as u16 & 0x7F) << 7)
}

/// True for bytes that open a message (status bytes), false for data bytes.
#[inline]
pub fn is_status_byte(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// Extracts the command nibble of a channel-addressed status byte.
#[inline]
pub fn command_nibble(status: u8) -> u8 {
    status & 0xF0
}

/// Extracts the channel/pin/port nibble of a channel-addressed status byte.
#[inline]
pub fn channel_nibble(status: u8) -> u8 {
    status & 0x0F
}

/// Decodes a 14-bit-per-character string payload (pairs of 7-bit bytes).
/// A trailing unpaired byte is ignored.
pub fn decode_u14_string(payload: &[u8]) -> String {
    payload
        .chunks_exact(2)
        .map(|pair| join_u14(pair[0], pair[1]) as u8 as char)
        .collect()
}

/// Decodes a payload of u14 pairs into their low bytes. Used for I2C reply
/// data, where each transported byte occupies one pair.
pub fn decode_u14_bytes(payload: &[u8]) -> Vec<u8> {
    payload
        .chunks_exact(2)
        .map(|pair| join_u14(pair[0], pair[1]) as u8)
        .collect()
}

/// Decodes a little-endian sequence of 7-bit groups into one value, as used
/// by PIN_STATE_RESPONSE and EXTENDED_ANALOG payloads.
pub fn join_u7_groups(payload: &[u8]) -> u32 {
    payload
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (((b & 0x7F) as u32) << (7 * i)))
}
