//! Outbound command encoding.
//!
//! One method per logical command, each appending its exact wire bytes to a
//! bounded FIFO buffer. The buffer is drained by the write pump; commands
//! leave in the order they were encoded. Hitting the capacity limit is a
//! fatal error, see [`crate::consts::OUTBOUND_CAPACITY`].

use crate::codec::split_u14;
use crate::consts;
use crate::error::{Error, Result};
use crate::pins::PinMode;
use log::trace;

/// Builds outbound byte sequences and buffers them until flushed.
#[derive(Debug)]
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Bytes waiting for the write pump, oldest first.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Removes the `count` oldest bytes after a successful transport write.
    pub fn consume(&mut self, count: usize) {
        self.buffer.drain(..count.min(self.buffer.len()));
    }

    /// Drops everything still buffered. Called on disconnect; commands from
    /// a dead connection must not leak into the next epoch.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn ensure_room(&self, needed: usize) -> Result<()> {
        if self.buffer.len() + needed > consts::OUTBOUND_CAPACITY {
            Err(Error::OutboundBufferFull {
                capacity: consts::OUTBOUND_CAPACITY,
            })
        } else {
            Ok(())
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_room(bytes.len())?;
        trace!("Encoded: {:02X?}", bytes);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    // --- Simple commands ---

    /// Enables or disables push reporting for one analog channel.
    pub fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        self.push(&[consts::REPORT_ANALOG | (channel & 0x0F), enable as u8])
    }

    /// Enables or disables push reporting for one 8-pin digital port.
    pub fn report_digital(&mut self, port: u8, enable: bool) -> Result<()> {
        self.push(&[consts::REPORT_DIGITAL | (port & 0x0F), enable as u8])
    }

    /// Sets a pin's mode.
    pub fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.push(&[consts::SET_PIN_MODE, pin & 0x7F, mode.to_byte()])
    }

    /// Writes all 8 output bits of a digital port.
    pub fn digital_message(&mut self, port: u8, bits: u8) -> Result<()> {
        let [lsb, msb] = split_u14(bits as u16);
        self.push(&[consts::DIGITAL_MESSAGE | (port & 0x0F), lsb, msb])
    }

    /// Writes an analog/PWM/servo value, choosing the short form for low pin
    /// indexes and the EXTENDED_ANALOG sysex otherwise.
    pub fn analog_write(&mut self, pin: u8, value: u16) -> Result<()> {
        if (pin as usize) < consts::MAX_SHORT_ANALOG_PIN {
            let [lsb, msb] = split_u14(value);
            self.push(&[consts::ANALOG_MESSAGE | (pin & 0x0F), lsb, msb])
        } else {
            self.extended_analog_write(pin, value)
        }
    }

    /// EXTENDED_ANALOG write for any pin index. Always carries at least two
    /// 7-bit value bytes, matching what standard firmwares expect.
    pub fn extended_analog_write(&mut self, pin: u8, value: u16) -> Result<()> {
        let mut bytes = vec![
            consts::SYSEX_START,
            consts::EXTENDED_ANALOG,
            pin & 0x7F,
            (value & 0x7F) as u8,
        ];
        let mut rest = value >> 7;
        loop {
            bytes.push((rest & 0x7F) as u8);
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        bytes.push(consts::SYSEX_END);
        self.push(&bytes)
    }

    /// Single-byte protocol version request; the first command of every
    /// handshake.
    pub fn request_version(&mut self) -> Result<()> {
        self.push(&[consts::REPORT_VERSION])
    }

    /// Asks for the firmware's name and version.
    pub fn request_firmware(&mut self) -> Result<()> {
        self.sysex(consts::REPORT_FIRMWARE, &[])
    }

    /// Asks for the capability table of every pin.
    pub fn request_capabilities(&mut self) -> Result<()> {
        self.sysex(consts::CAPABILITY_QUERY, &[])
    }

    /// Asks for one pin's current mode and value.
    pub fn request_pin_state(&mut self, pin: u8) -> Result<()> {
        self.sysex(consts::PIN_STATE_QUERY, &[pin & 0x7F])
    }

    /// Resets the firmware to power-up defaults.
    pub fn system_reset(&mut self) -> Result<()> {
        self.push(&[consts::SYSTEM_RESET])
    }

    /// Configures a servo pin: pulse range in microseconds plus the initial
    /// angle. Field order on the wire is min, max, angle.
    pub fn servo_config(
        &mut self,
        pin: u8,
        min_pulse_us: u16,
        max_pulse_us: u16,
        angle: u16,
    ) -> Result<()> {
        let mut payload = vec![pin & 0x7F];
        payload.extend_from_slice(&split_u14(min_pulse_us));
        payload.extend_from_slice(&split_u14(max_pulse_us));
        payload.extend_from_slice(&split_u14(angle));
        self.sysex(consts::SERVO_CONFIG, &payload)
    }

    /// Sets the firmware's sampling interval in milliseconds.
    pub fn sampling_interval(&mut self, interval_ms: u16) -> Result<()> {
        self.sysex(consts::SAMPLING_INTERVAL, &split_u14(interval_ms))
    }

    // --- I2C request shapes ---

    /// I2C write request: each data byte travels as a u14 pair.
    pub fn i2c_write(&mut self, slave_address: u16, data: &[u8]) -> Result<()> {
        let mut payload = Self::i2c_header(slave_address, consts::i2c::MODE_WRITE);
        for &byte in data {
            payload.extend_from_slice(&split_u14(byte as u16));
        }
        self.sysex(consts::I2C_REQUEST, &payload)
    }

    /// I2C read-once request for `count` bytes.
    pub fn i2c_read_once(&mut self, slave_address: u16, count: u16) -> Result<()> {
        let mut payload = Self::i2c_header(slave_address, consts::i2c::MODE_READ_ONCE);
        payload.extend_from_slice(&split_u14(count));
        self.sysex(consts::I2C_REQUEST, &payload)
    }

    /// I2C continuous-read request; replies arrive at the sampling interval.
    pub fn i2c_read_continuously(&mut self, slave_address: u16) -> Result<()> {
        let payload = Self::i2c_header(slave_address, consts::i2c::MODE_READ_CONTINUOUSLY);
        self.sysex(consts::I2C_REQUEST, &payload)
    }

    /// Stops a continuous read on the given slave.
    pub fn i2c_stop_reading(&mut self, slave_address: u16) -> Result<()> {
        let payload = Self::i2c_header(slave_address, consts::i2c::MODE_STOP_READING);
        self.sysex(consts::I2C_REQUEST, &payload)
    }

    /// I2C_CONFIG: power-pin setting and read delay in microseconds.
    pub fn i2c_config(&mut self, power_pin: bool, delay_us: u16) -> Result<()> {
        let mut payload = vec![power_pin as u8];
        payload.extend_from_slice(&split_u14(delay_us));
        self.sysex(consts::I2C_CONFIG, &payload)
    }

    /// Address byte plus mode byte of every I2C request. Addresses above 255
    /// switch the request to 10-bit mode: bit 5 of the mode byte flags it and
    /// bits 8-10 of the address fold into the mode byte's low bits. This
    /// layout is what stock firmwares parse; reproduce exactly.
    fn i2c_header(slave_address: u16, mode: u8) -> Vec<u8> {
        let mut mode_byte = mode;
        if slave_address > 0xFF {
            mode_byte |= consts::i2c::TEN_BIT_ADDRESS_MODE;
            mode_byte |= ((slave_address >> 8) & 0x07) as u8;
        }
        vec![(slave_address & 0xFF) as u8, mode_byte]
    }

    fn sysex(&mut self, command: u8, payload: &[u8]) -> Result<()> {
        self.ensure_room(payload.len() + 3)?;
        trace!("Encoded sysex 0x{:02X}: {:02X?}", command, payload);
        self.buffer.push(consts::SYSEX_START);
        self.buffer.push(command);
        self.buffer.extend_from_slice(payload);
        self.buffer.push(consts::SYSEX_END);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(f: impl FnOnce(&mut Encoder) -> Result<()>) -> Vec<u8> {
        let mut encoder = Encoder::new();
        f(&mut encoder).unwrap();
        encoder.pending().to_vec()
    }

    #[test]
    fn report_commands() {
        assert_eq!(encoded(|e| e.report_analog(3, true)), [0xC3, 0x01]);
        assert_eq!(encoded(|e| e.report_analog(3, false)), [0xC3, 0x00]);
        assert_eq!(encoded(|e| e.report_digital(1, true)), [0xD1, 0x01]);
    }

    #[test]
    fn set_pin_mode_bytes() {
        assert_eq!(
            encoded(|e| e.set_pin_mode(13, PinMode::Output)),
            [0xF4, 13, 0x01]
        );
        assert_eq!(
            encoded(|e| e.set_pin_mode(14, PinMode::Analog)),
            [0xF4, 14, 0x02]
        );
    }

    #[test]
    fn digital_message_carries_port_bits_as_u14() {
        assert_eq!(encoded(|e| e.digital_message(1, 0xA5)), [0x91, 0x25, 0x01]);
    }

    #[test]
    fn analog_write_uses_short_form_for_low_pins() {
        assert_eq!(encoded(|e| e.analog_write(5, 200)), [0xE5, 0x48, 0x01]);
    }

    #[test]
    fn analog_write_switches_to_extended_form() {
        // Pin 22 is beyond the short form's 4-bit channel field
        assert_eq!(
            encoded(|e| e.analog_write(22, 200)),
            [0xF0, 0x6F, 22, 0x48, 0x01, 0xF7]
        );
    }

    #[test]
    fn extended_analog_emits_at_least_two_value_bytes() {
        assert_eq!(
            encoded(|e| e.extended_analog_write(20, 0)),
            [0xF0, 0x6F, 20, 0x00, 0x00, 0xF7]
        );
    }

    #[test]
    fn handshake_queries() {
        assert_eq!(encoded(|e| e.request_version()), [0xF9]);
        assert_eq!(encoded(|e| e.request_firmware()), [0xF0, 0x79, 0xF7]);
        assert_eq!(encoded(|e| e.request_capabilities()), [0xF0, 0x6B, 0xF7]);
        assert_eq!(encoded(|e| e.request_pin_state(7)), [0xF0, 0x6D, 7, 0xF7]);
        assert_eq!(encoded(|e| e.system_reset()), [0xFF]);
    }

    #[test]
    fn servo_config_field_order_is_min_max_angle() {
        assert_eq!(
            encoded(|e| e.servo_config(9, 544, 2400, 90)),
            [0xF0, 0x70, 9, 0x20, 0x04, 0x60, 0x12, 0x5A, 0x00, 0xF7]
        );
    }

    #[test]
    fn i2c_write_7bit_address() {
        assert_eq!(
            encoded(|e| e.i2c_write(0x40, &[0xAB])),
            [0xF0, 0x76, 0x40, 0x00, 0x2B, 0x01, 0xF7]
        );
    }

    #[test]
    fn i2c_ten_bit_address_folds_high_bits_into_mode_byte() {
        // Address 300 = 0x12C: low byte 0x2C, bit 8 folded into the mode
        // byte alongside the 10-bit flag.
        assert_eq!(
            encoded(|e| e.i2c_write(300, &[])),
            [0xF0, 0x76, 0x2C, 0x21, 0xF7]
        );
        assert_eq!(
            encoded(|e| e.i2c_read_once(300, 4)),
            [0xF0, 0x76, 0x2C, 0x29, 0x04, 0x00, 0xF7]
        );
    }

    #[test]
    fn i2c_read_shapes() {
        assert_eq!(
            encoded(|e| e.i2c_read_once(0x68, 2)),
            [0xF0, 0x76, 0x68, 0x08, 0x02, 0x00, 0xF7]
        );
        assert_eq!(
            encoded(|e| e.i2c_read_continuously(0x68)),
            [0xF0, 0x76, 0x68, 0x10, 0xF7]
        );
        assert_eq!(
            encoded(|e| e.i2c_stop_reading(0x68)),
            [0xF0, 0x76, 0x68, 0x18, 0xF7]
        );
        assert_eq!(
            encoded(|e| e.i2c_config(true, 100)),
            [0xF0, 0x78, 0x01, 0x64, 0x00, 0xF7]
        );
    }

    #[test]
    fn sampling_interval_bytes() {
        assert_eq!(
            encoded(|e| e.sampling_interval(1000)),
            [0xF0, 0x7A, 0x68, 0x07, 0xF7]
        );
    }

    #[test]
    fn fifo_consume_preserves_order() {
        let mut encoder = Encoder::new();
        encoder.request_version().unwrap();
        encoder.system_reset().unwrap();
        assert_eq!(encoder.pending(), [0xF9, 0xFF]);
        encoder.consume(1);
        assert_eq!(encoder.pending(), [0xFF]);
        encoder.clear();
        assert!(encoder.is_empty());
    }

    #[test]
    fn buffer_full_is_fatal() {
        let mut encoder = Encoder::new();
        loop {
            match encoder.system_reset() {
                Ok(()) => continue,
                Err(Error::OutboundBufferFull { capacity }) => {
                    assert_eq!(capacity, consts::OUTBOUND_CAPACITY);
                    break;
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(encoder.pending().len(), consts::OUTBOUND_CAPACITY);
    }
}
