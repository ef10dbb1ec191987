//! Inbound message decoding.
//!
//! A state machine over the raw byte stream: the read pump feeds it whatever
//! bytes the transport currently has, and it yields one typed [`Message`]
//! per completed frame. Partial frames survive across pump cycles; a
//! disconnect resets the machine so a stale half-frame can never splice into
//! the next connection's bytes.

use crate::codec::{
    command_nibble, channel_nibble, decode_u14_bytes, decode_u14_string, is_status_byte,
    join_u14, join_u7_groups,
};
use crate::consts;
use crate::pins::{PinCapability, PinMode};
use log::{trace, warn};

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Push-reported sample for one analog channel (0-1023 on 10-bit boards).
    AnalogSample { channel: u8, value: u16 },
    /// Push-reported input bits for one 8-pin digital port.
    DigitalSample { port: u8, bits: u8 },
    /// Reply to the bare REPORT_VERSION request.
    ProtocolVersion { major: u8, minor: u8 },
    /// REPORT_FIRMWARE sysex: version plus the firmware's name.
    Firmware { major: u8, minor: u8, name: String },
    /// Full per-pin capability table.
    Capabilities(Vec<PinCapability>),
    /// One pin's current mode and value.
    PinState { pin: u8, mode: PinMode, value: u32 },
    /// Data read from an I2C slave.
    I2cReply {
        address: u16,
        register: u16,
        data: Vec<u8>,
    },
    /// Free-form string from the firmware (diagnostics, mostly).
    StringData(String),
    /// Sysex command this engine does not understand; raw payload attached.
    UnknownSysex { command: u8, payload: Vec<u8> },
    /// Status byte outside the known command set.
    UnknownCommand(u8),
}

#[derive(Debug)]
enum State {
    /// Waiting for a status byte.
    Idle,
    /// Collecting the two data bytes of a simple command.
    AwaitingData { status: u8, first: Option<u8> },
    /// Accumulating sysex payload until SYSEX_END.
    InSysex { payload: Vec<u8> },
}

/// Stateful byte-stream parser for inbound Firmata traffic.
#[derive(Debug)]
pub struct Decoder {
    state: State,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Discards any partial frame. Must be called on disconnect.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Consumes one byte; yields a message when it completes a frame.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        match &mut self.state {
            State::Idle => self.start_frame(byte),
            State::AwaitingData { status, first } => {
                if is_status_byte(byte) {
                    // A status byte mid-frame means we lost data bytes;
                    // resynchronize on the new frame.
                    warn!(
                        "Status byte 0x{byte:02X} interrupted frame 0x{:02X}, resyncing",
                        *status
                    );
                    self.state = State::Idle;
                    return self.start_frame(byte);
                }
                match first.take() {
                    None => {
                        *first = Some(byte);
                        None
                    }
                    Some(first_byte) => {
                        let status = *status;
                        self.state = State::Idle;
                        Some(Self::finish_simple(status, first_byte, byte))
                    }
                }
            }
            State::InSysex { payload } => {
                if byte == consts::SYSEX_END {
                    let payload = std::mem::take(payload);
                    self.state = State::Idle;
                    Some(Self::parse_sysex(payload))
                } else if is_status_byte(byte) {
                    warn!("Status byte 0x{byte:02X} inside sysex frame, resyncing");
                    self.state = State::Idle;
                    self.start_frame(byte)
                } else {
                    payload.push(byte);
                    None
                }
            }
        }
    }

    fn start_frame(&mut self, byte: u8) -> Option<Message> {
        if byte == consts::SYSEX_START {
            self.state = State::InSysex {
                payload: Vec::new(),
            };
            return None;
        }
        if !is_status_byte(byte) {
            // Stray data byte, e.g. the tail of a frame begun before we
            // connected. Skip until the next status byte.
            trace!("Skipping stray data byte 0x{byte:02X}");
            return None;
        }
        match command_nibble(byte) {
            consts::DIGITAL_MESSAGE | consts::ANALOG_MESSAGE => {
                self.state = State::AwaitingData {
                    status: byte,
                    first: None,
                };
                None
            }
            _ if byte == consts::REPORT_VERSION => {
                self.state = State::AwaitingData {
                    status: byte,
                    first: None,
                };
                None
            }
            _ => {
                warn!("Unknown command byte 0x{byte:02X}");
                Some(Message::UnknownCommand(byte))
            }
        }
    }

    fn finish_simple(status: u8, first: u8, second: u8) -> Message {
        if status == consts::REPORT_VERSION {
            return Message::ProtocolVersion {
                major: first,
                minor: second,
            };
        }
        match command_nibble(status) {
            consts::DIGITAL_MESSAGE => Message::DigitalSample {
                port: channel_nibble(status),
                bits: join_u14(first, second) as u8,
            },
            consts::ANALOG_MESSAGE => Message::AnalogSample {
                channel: channel_nibble(status),
                value: join_u14(first, second),
            },
            // start_frame only admits the patterns above
            _ => Message::UnknownCommand(status),
        }
    }

    fn parse_sysex(payload: Vec<u8>) -> Message {
        let Some((&command, body)) = payload.split_first() else {
            warn!("Empty sysex frame");
            return Message::UnknownSysex {
                command: 0,
                payload: Vec::new(),
            };
        };
        match command {
            consts::REPORT_FIRMWARE if body.len() >= 2 => Message::Firmware {
                major: body[0],
                minor: body[1],
                name: decode_u14_string(&body[2..]),
            },
            consts::CAPABILITY_RESPONSE => Message::Capabilities(Self::parse_capabilities(body)),
            consts::PIN_STATE_RESPONSE if body.len() >= 2 => Message::PinState {
                pin: body[0],
                mode: PinMode::from_byte(body[1]),
                value: join_u7_groups(&body[2..]),
            },
            consts::I2C_REPLY if body.len() >= 4 => Message::I2cReply {
                address: join_u14(body[0], body[1]),
                register: join_u14(body[2], body[3]),
                data: decode_u14_bytes(&body[4..]),
            },
            consts::STRING_DATA => Message::StringData(decode_u14_string(body)),
            _ => {
                warn!(
                    "Unknown or malformed sysex 0x{command:02X} ({} payload bytes)",
                    body.len()
                );
                Message::UnknownSysex {
                    command,
                    payload: body.to_vec(),
                }
            }
        }
    }

    /// Capability responses list, per pin, (mode, resolution) pairs closed by
    /// a 0x7F marker. The pin order is the board's pin numbering. Tables
    /// beyond the protocol's 7-bit pin addressing are truncated; those pins
    /// could never be addressed anyway.
    fn parse_capabilities(body: &[u8]) -> Vec<PinCapability> {
        let mut pins = Vec::new();
        let mut current = PinCapability::default();
        let mut bytes = body.iter();
        while let Some(&byte) = bytes.next() {
            if byte == consts::CAPABILITY_PIN_SEPARATOR {
                if pins.len() >= consts::MAX_PINS {
                    warn!(
                        "Capability response describes more than {} pins, truncating",
                        consts::MAX_PINS
                    );
                    break;
                }
                pins.push(std::mem::take(&mut current));
            } else if let Some(&resolution) = bytes.next() {
                current.add(byte, resolution);
            } else {
                warn!("Capability response ends mid-pair (mode 0x{byte:02X})");
            }
        }
        pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<Message> {
        bytes.iter().filter_map(|&b| decoder.push(b)).collect()
    }

    #[test]
    fn analog_sample() {
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &[0xE3, 0x7F, 0x07]);
        assert_eq!(
            messages,
            [Message::AnalogSample {
                channel: 3,
                value: 1023
            }]
        );
    }

    #[test]
    fn digital_sample() {
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &[0x91, 0x25, 0x01]);
        assert_eq!(
            messages,
            [Message::DigitalSample {
                port: 1,
                bits: 0xA5
            }]
        );
    }

    #[test]
    fn protocol_version() {
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &[0xF9, 2, 3]);
        assert_eq!(messages, [Message::ProtocolVersion { major: 2, minor: 3 }]);
    }

    #[test]
    fn frames_survive_split_delivery() {
        let mut decoder = Decoder::new();
        assert!(decode_all(&mut decoder, &[0xE0, 0x10]).is_empty());
        // Second pump cycle completes the frame
        assert_eq!(
            decode_all(&mut decoder, &[0x02]),
            [Message::AnalogSample {
                channel: 0,
                value: 0x110
            }]
        );
    }

    #[test]
    fn firmware_report_with_name() {
        let mut decoder = Decoder::new();
        let mut bytes = vec![0xF0, 0x79, 2, 5];
        for ch in "StandardFirmata".bytes() {
            bytes.push(ch & 0x7F);
            bytes.push(0);
        }
        bytes.push(0xF7);
        assert_eq!(
            decode_all(&mut decoder, &bytes),
            [Message::Firmware {
                major: 2,
                minor: 5,
                name: "StandardFirmata".into()
            }]
        );
    }

    #[test]
    fn capability_response_parsing_is_idempotent() {
        // Two pins: one digital-only, one with analog(10)
        let body = [
            0x00, 1, 0x01, 1, 0x7F, // pin 0: input, output
            0x00, 1, 0x02, 10, 0x7F, // pin 1: input, analog @10 bits
        ];
        let first = Decoder::parse_capabilities(&body);
        let second = Decoder::parse_capabilities(&body);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0].supports(PinMode::Input));
        assert!(!first[0].supports(PinMode::Analog));
        assert!(first[1].supports(PinMode::Analog));
        assert_eq!(first[1].resolution(PinMode::Analog), Some(10));
    }

    #[test]
    fn oversized_capability_response_is_truncated() {
        let mut body = Vec::new();
        for _ in 0..300 {
            body.extend_from_slice(&[0x00, 1, 0x7F]);
        }
        let pins = Decoder::parse_capabilities(&body);
        assert_eq!(pins.len(), consts::MAX_PINS);
    }

    #[test]
    fn pin_state_response() {
        let mut decoder = Decoder::new();
        let messages = decode_all(&mut decoder, &[0xF0, 0x6E, 5, 0x01, 0x01, 0xF7]);
        assert_eq!(
            messages,
            [Message::PinState {
                pin: 5,
                mode: PinMode::Output,
                value: 1
            }]
        );
    }

    #[test]
    fn i2c_reply() {
        let mut decoder = Decoder::new();
        let bytes = [
            0xF0, 0x77, 0x68, 0x00, 0x06, 0x00, 0x2B, 0x01, 0x0F, 0x00, 0xF7,
        ];
        assert_eq!(
            decode_all(&mut decoder, &bytes),
            [Message::I2cReply {
                address: 0x68,
                register: 6,
                data: vec![0xAB, 0x0F]
            }]
        );
    }

    #[test]
    fn unknown_command_and_sysex_are_surfaced() {
        let mut decoder = Decoder::new();
        assert_eq!(
            decode_all(&mut decoder, &[0xF5]),
            [Message::UnknownCommand(0xF5)]
        );
        assert_eq!(
            decode_all(&mut decoder, &[0xF0, 0x65, 0x01, 0x02, 0xF7]),
            [Message::UnknownSysex {
                command: 0x65,
                payload: vec![1, 2]
            }]
        );
    }

    #[test]
    fn stray_data_bytes_are_skipped() {
        let mut decoder = Decoder::new();
        // Tail of a frame from before we connected, then a valid frame
        assert_eq!(
            decode_all(&mut decoder, &[0x12, 0x34, 0xE0, 0x00, 0x01]),
            [Message::AnalogSample {
                channel: 0,
                value: 128
            }]
        );
    }

    #[test]
    fn reset_discards_partial_frames() {
        let mut decoder = Decoder::new();
        assert!(decode_all(&mut decoder, &[0xF0, 0x6C, 0x00]).is_empty());
        decoder.reset();
        // The old sysex must not resume; this is a fresh frame
        assert_eq!(
            decode_all(&mut decoder, &[0xE1, 0x00, 0x00]),
            [Message::AnalogSample {
                channel: 1,
                value: 0
            }]
        );
    }

    #[test]
    fn status_byte_mid_frame_resynchronizes() {
        let mut decoder = Decoder::new();
        // Analog frame loses its data bytes; the version frame still decodes
        assert_eq!(
            decode_all(&mut decoder, &[0xE0, 0xF9, 2, 3]),
            [Message::ProtocolVersion { major: 2, minor: 3 }]
        );
    }
}
