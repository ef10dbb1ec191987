//! The board engine: the one object callers hold.
//!
//! Owns the pin model, the outbound encoder, the inbound decoder, the
//! handshake state, and the transport. Everything is single-threaded and
//! pump-driven: the host calls [`Board::pump_write`] and [`Board::pump_read`]
//! once per frame; neither call blocks beyond the transport's own small
//! timeout.

use crate::consts;
use crate::decoder::{Decoder, Message};
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::link::{Link, LinkPhase};
use crate::pins::{PinCapability, PinConfig, PinMode, PinModel};
use crate::transport::{SerialTransport, Transport};
use log::{debug, warn};
use std::collections::VecDeque;

/// Default servo pulse range in microseconds; the values stock firmwares use.
pub const DEFAULT_SERVO_MIN_PULSE_US: u16 = 544;
pub const DEFAULT_SERVO_MAX_PULSE_US: u16 = 2400;

const MAX_BYTE_VALUE: u32 = 255;
const MAX_SERVO_ANGLE: u32 = 180;
const MAX_I2C_ADDRESS: u32 = 0x3FF;

/// A Firmata board driven over a [`Transport`].
///
/// Constructed with a pin configuration table; connection and handshake
/// happen lazily inside the pumps, and repeat automatically after any
/// disconnect. Pin operations issued before the handshake completes update
/// the local caches but put nothing on the wire.
#[derive(Debug)]
pub struct Board<T: Transport> {
    transport: T,
    config: PinConfig,
    pins: PinModel,
    encoder: Encoder,
    decoder: Decoder,
    link: Link,
    events: VecDeque<Message>,
}

impl Board<SerialTransport> {
    /// Convenience constructor over a serial port.
    pub fn open_serial(
        port_name: impl Into<String>,
        baud_rate: u32,
        config: PinConfig,
    ) -> Self {
        Self::new(SerialTransport::new(port_name, baud_rate), config)
    }
}

impl<T: Transport> Board<T> {
    /// Creates the engine. No I/O happens until the first pump call.
    pub fn new(transport: T, config: PinConfig) -> Self {
        Self {
            transport,
            config,
            pins: PinModel::new(),
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            link: Link::new(),
            events: VecDeque::new(),
        }
    }

    // --- Pumps ---

    /// Drains the outbound buffer into the transport. Call once per frame.
    ///
    /// Transport failures are recovered locally (logged, state reset, link
    /// reopened on a later cycle); the returned errors are contract or
    /// configuration defects.
    pub fn pump_write(&mut self) -> Result<()> {
        self.ensure_link()?;
        while self.transport.is_open() && !self.encoder.is_empty() {
            match self.transport.write(self.encoder.pending()) {
                Ok(0) => break,
                Ok(written) => self.encoder.consume(written),
                Err(e) => {
                    self.handle_transport_failure(&e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Consumes whatever bytes the transport has buffered and dispatches the
    /// decoded messages. Call once per frame.
    pub fn pump_read(&mut self) -> Result<()> {
        self.ensure_link()?;
        let mut buf = [0u8; 256];
        while self.transport.is_open() {
            match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(count) => {
                    for &byte in &buf[..count] {
                        if let Some(message) = self.decoder.push(byte) {
                            self.dispatch(message)?;
                        }
                    }
                }
                Err(e) => {
                    self.handle_transport_failure(&e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Next inbound message the engine does not consume itself (I2C replies,
    /// strings, unknown commands/sysex). FIFO per connection epoch.
    pub fn next_event(&mut self) -> Option<Message> {
        self.events.pop_front()
    }

    // --- Connection state ---

    /// True while the transport is open. Says nothing about the handshake.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// True once the handshake finished and pin I/O reaches the wire.
    pub fn is_ready(&self) -> bool {
        self.transport.is_open() && self.link.is_ready()
    }

    pub fn link_phase(&self) -> LinkPhase {
        self.link.phase()
    }

    /// Count of completed handshakes; bumps on every (re)initialization.
    pub fn connection_epoch(&self) -> u32 {
        self.link.epoch()
    }

    /// Firmware version (major, minor), once reported.
    pub fn firmware_version(&self) -> Option<(u8, u8)> {
        self.link.version()
    }

    /// Firmware name from REPORT_FIRMWARE, empty until reported.
    pub fn firmware_name(&self) -> &str {
        self.link.firmware_name()
    }

    pub fn digital_pin_count(&self) -> u8 {
        self.pins.digital_count()
    }

    pub fn analog_pin_count(&self) -> u8 {
        self.pins.analog_count()
    }

    /// Total pin count; zero until the capability table arrives.
    pub fn pin_count(&self) -> u8 {
        self.pins.total_pins()
    }

    // --- Pin operations ---

    /// True iff the device reported `mode` among `pin`'s capabilities.
    /// Always false before the handshake delivers the table.
    pub fn capability_of(&self, pin: u8, mode: PinMode) -> Result<bool> {
        self.check_pin(pin)?;
        Ok(self.pins.capability_of(pin, mode))
    }

    /// The reported resolution for a pin/mode pair, once known.
    pub fn resolution_of(&self, pin: u8, mode: PinMode) -> Result<Option<u8>> {
        self.check_pin(pin)?;
        Ok(self.pins.capability(pin).and_then(|c| c.resolution(mode)))
    }

    /// Current mode of a pin (`Illegal` until assigned).
    pub fn pin_mode(&self, pin: u8) -> Result<PinMode> {
        self.check_pin(pin)?;
        Ok(self.pins.mode_of(pin))
    }

    /// Sets a pin's mode, validating against the capability table when it is
    /// known. Servo pins additionally get a servo configuration and an
    /// initial zero-angle write, so the horn does not jump to the midpoint
    /// the moment the firmware attaches it. Analog pins get their channel's
    /// reporting enabled.
    pub fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.check_pin(pin)?;
        if self.pins.capabilities_known() && !self.pins.capability_of(pin, mode) {
            return Err(Error::UnsupportedPinMode { pin, mode });
        }
        if self.is_ready() {
            self.transmit_mode(pin, mode)?;
            if mode == PinMode::Analog {
                if let Some(channel) = self.pins.pin_to_analog_channel(pin) {
                    self.encoder.report_analog(channel, true)?;
                }
            }
        }
        self.pins.record_mode(pin, mode);
        Ok(())
    }

    /// Puts one mode assignment on the wire. Servo pins get a servo
    /// configuration and an initial zero-angle write instead of a plain
    /// SET_PIN_MODE; the firmware attaches the servo on the config command.
    fn transmit_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        if mode == PinMode::Servo {
            self.encoder.servo_config(
                pin,
                DEFAULT_SERVO_MIN_PULSE_US,
                DEFAULT_SERVO_MAX_PULSE_US,
                0,
            )?;
            self.encoder.analog_write(pin, 0)
        } else {
            self.encoder.set_pin_mode(pin, mode)
        }
    }

    /// Cached sample of an analog channel (push-reported by the device once
    /// its reporting is enabled). The backing pin must be in Analog mode.
    pub fn read_analog(&self, channel: u8) -> Result<u16> {
        self.check_analog_channel(channel)?;
        self.pins
            .require_mode(self.pins.analog_channel_to_pin(channel), PinMode::Analog)?;
        Ok(self.pins.analog_value(channel))
    }

    /// Cached input bit of a digital pin. The pin must be in Input mode.
    pub fn read_digital(&self, pin: u8) -> Result<bool> {
        self.check_pin(pin)?;
        self.pins.require_mode(pin, PinMode::Input)?;
        Ok(self.pins.digital_value(pin))
    }

    /// Writes a digital output. The pin must be in Output mode. The full
    /// port byte is transmitted only when it actually changed.
    pub fn write_digital(&mut self, pin: u8, on: bool) -> Result<()> {
        self.check_pin(pin)?;
        self.pins.require_mode(pin, PinMode::Output)?;
        if let Some((port, bits)) = self.pins.update_digital_output(pin, on) {
            if self.is_ready() {
                self.encoder.digital_message(port, bits)?;
            }
        }
        Ok(())
    }

    /// Writes a PWM value (0-255). The pin must be in Pwm or Servo mode.
    /// Coalesced per pin against the last written value.
    pub fn write_analog(&mut self, pin: u8, value: u16) -> Result<()> {
        self.check_pin(pin)?;
        if value as u32 > MAX_BYTE_VALUE {
            return Err(Error::ValueOutOfRange {
                value: value as u32,
                max: MAX_BYTE_VALUE,
            });
        }
        let mode = self.pins.mode_of(pin);
        if mode != PinMode::Pwm && mode != PinMode::Servo {
            return Err(Error::PinModeMismatch {
                pin,
                required: PinMode::Pwm,
                actual: mode,
            });
        }
        self.write_analog_coalesced(pin, value)
    }

    /// Writes a servo angle (0-180). The pin must be in Servo mode.
    pub fn write_servo(&mut self, pin: u8, angle: u16) -> Result<()> {
        self.check_pin(pin)?;
        if angle as u32 > MAX_SERVO_ANGLE {
            return Err(Error::ValueOutOfRange {
                value: angle as u32,
                max: MAX_SERVO_ANGLE,
            });
        }
        self.pins.require_mode(pin, PinMode::Servo)?;
        self.write_analog_coalesced(pin, angle)
    }

    /// Reconfigures a servo pin's pulse range and moves it to `angle`.
    pub fn setup_servo(
        &mut self,
        pin: u8,
        angle: u16,
        min_pulse_us: u16,
        max_pulse_us: u16,
    ) -> Result<()> {
        self.check_pin(pin)?;
        if angle as u32 > MAX_SERVO_ANGLE {
            return Err(Error::ValueOutOfRange {
                value: angle as u32,
                max: MAX_SERVO_ANGLE,
            });
        }
        for pulse in [min_pulse_us, max_pulse_us] {
            if pulse >= consts::MAX_U14 {
                return Err(Error::ValueOutOfRange {
                    value: pulse as u32,
                    max: (consts::MAX_U14 - 1) as u32,
                });
            }
        }
        self.pins.require_mode(pin, PinMode::Servo)?;
        if self.is_ready() {
            self.encoder
                .servo_config(pin, min_pulse_us, max_pulse_us, angle)?;
        }
        Ok(())
    }

    /// Enables or disables push reporting for one analog channel.
    pub fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        self.check_analog_channel(channel)?;
        if self.is_ready() {
            self.encoder.report_analog(channel, enable)?;
        }
        Ok(())
    }

    /// Enables or disables push reporting for one digital port.
    pub fn report_digital(&mut self, port: u8, enable: bool) -> Result<()> {
        if port as usize >= consts::MAX_PORTS {
            return Err(Error::PinOutOfRange {
                pin: port,
                max: consts::MAX_PORTS,
            });
        }
        if self.is_ready() {
            self.encoder.report_digital(port, enable)?;
        }
        Ok(())
    }

    /// Asks the firmware to reset to power-up defaults.
    pub fn system_reset(&mut self) -> Result<()> {
        self.encoder.system_reset()
    }

    /// Asks for the firmware's name and version; the reply updates
    /// [`Board::firmware_name`] and [`Board::firmware_version`].
    pub fn query_firmware(&mut self) -> Result<()> {
        self.encoder.request_firmware()
    }

    /// Sets the firmware's sampling interval for push reports.
    pub fn set_sampling_interval(&mut self, interval_ms: u16) -> Result<()> {
        if interval_ms >= consts::MAX_U14 {
            return Err(Error::ValueOutOfRange {
                value: interval_ms as u32,
                max: (consts::MAX_U14 - 1) as u32,
            });
        }
        self.encoder.sampling_interval(interval_ms)
    }

    // --- I2C ---

    /// Writes bytes to an I2C slave. Addresses above 255 use 10-bit mode.
    pub fn i2c_write(&mut self, slave_address: u16, data: &[u8]) -> Result<()> {
        self.check_i2c_address(slave_address)?;
        self.encoder.i2c_write(slave_address, data)
    }

    /// Requests a single read of `count` bytes; the reply arrives as an
    /// [`Message::I2cReply`] event.
    pub fn i2c_read_once(&mut self, slave_address: u16, count: u16) -> Result<()> {
        self.check_i2c_address(slave_address)?;
        if count >= consts::MAX_U14 {
            return Err(Error::ValueOutOfRange {
                value: count as u32,
                max: (consts::MAX_U14 - 1) as u32,
            });
        }
        self.encoder.i2c_read_once(slave_address, count)
    }

    /// Starts continuous reads at the sampling interval.
    pub fn i2c_read_continuously(&mut self, slave_address: u16) -> Result<()> {
        self.check_i2c_address(slave_address)?;
        self.encoder.i2c_read_continuously(slave_address)
    }

    /// Stops a continuous read.
    pub fn i2c_stop_reading(&mut self, slave_address: u16) -> Result<()> {
        self.check_i2c_address(slave_address)?;
        self.encoder.i2c_stop_reading(slave_address)
    }

    /// Configures the firmware's I2C power pins and read delay.
    pub fn i2c_config(&mut self, power_pin: bool, delay_us: u16) -> Result<()> {
        if delay_us >= consts::MAX_U14 {
            return Err(Error::ValueOutOfRange {
                value: delay_us as u32,
                max: (consts::MAX_U14 - 1) as u32,
            });
        }
        self.encoder.i2c_config(power_pin, delay_us)
    }

    // --- Internals ---

    fn check_pin(&self, pin: u8) -> Result<()> {
        let max = if self.pins.capabilities_known() {
            self.pins.total_pins() as usize
        } else {
            consts::MAX_PINS
        };
        if (pin as usize) < max {
            Ok(())
        } else {
            Err(Error::PinOutOfRange { pin, max })
        }
    }

    fn check_analog_channel(&self, channel: u8) -> Result<()> {
        let max = if self.pins.capabilities_known() {
            self.pins.analog_count() as usize
        } else {
            consts::MAX_ANALOG_CHANNELS
        };
        if (channel as usize) < max {
            Ok(())
        } else {
            Err(Error::PinOutOfRange { pin: channel, max })
        }
    }

    fn check_i2c_address(&self, address: u16) -> Result<()> {
        if address as u32 > MAX_I2C_ADDRESS {
            Err(Error::ValueOutOfRange {
                value: address as u32,
                max: MAX_I2C_ADDRESS,
            })
        } else {
            Ok(())
        }
    }

    fn write_analog_coalesced(&mut self, pin: u8, value: u16) -> Result<()> {
        if self.pins.update_analog_output(pin, value) && self.is_ready() {
            self.encoder.analog_write(pin, value)?;
        }
        Ok(())
    }

    /// Keeps the transport and handshake in step: notices a closed
    /// transport, discards stale engine state, retries the open, and kicks
    /// off the handshake once the stream is back.
    fn ensure_link(&mut self) -> Result<()> {
        if self.transport.is_open() {
            return Ok(());
        }
        if self.link.phase() != LinkPhase::Disconnected {
            warn!("Transport closed, discarding connection state");
            self.discard_connection_state();
        }
        if let Err(e) = self.transport.open() {
            self.handle_transport_failure(&e);
            return Ok(());
        }
        if self.transport.is_open() {
            debug!("Transport open, starting handshake");
            self.encoder.request_version()?;
            self.link.set_phase(LinkPhase::AwaitingFirmwareVersion);
        }
        Ok(())
    }

    fn handle_transport_failure(&mut self, error: &Error) {
        warn!("Transport failure, resetting connection: {error}");
        self.transport.close();
        self.discard_connection_state();
    }

    /// Nothing learned from a dead connection is trusted: capabilities,
    /// modes, partial frames, unflushed commands, and undelivered events
    /// all go.
    fn discard_connection_state(&mut self) {
        self.pins.reset();
        self.decoder.reset();
        self.encoder.clear();
        self.events.clear();
        self.link.reset();
    }

    fn dispatch(&mut self, message: Message) -> Result<()> {
        match message {
            Message::AnalogSample { channel, value } => {
                self.pins.record_analog_sample(channel, value);
                Ok(())
            }
            Message::DigitalSample { port, bits } => {
                self.pins.record_digital_port(port, bits);
                Ok(())
            }
            Message::ProtocolVersion { major, minor } => self.version_received(major, minor),
            Message::Firmware { major, minor, name } => {
                debug!("Firmware '{name}' {major}.{minor}");
                self.link.record_firmware_name(&name);
                self.version_received(major, minor)
            }
            Message::Capabilities(capabilities) => self.capabilities_received(capabilities),
            Message::PinState { pin, mode, .. } => {
                self.pin_state_received(pin, mode);
                Ok(())
            }
            other => {
                // I2C replies, strings, unknown commands: the caller's
                // business, queued for next_event().
                self.events.push_back(other);
                Ok(())
            }
        }
    }

    fn version_received(&mut self, major: u8, minor: u8) -> Result<()> {
        if (major, minor) < consts::MIN_FIRMWARE_VERSION {
            return Err(Error::UnsupportedFirmware { major, minor });
        }
        if self.link.record_version(major, minor)
            && self.link.phase() == LinkPhase::AwaitingFirmwareVersion
        {
            debug!("Firmware version {major}.{minor}, querying capabilities");
            self.encoder.request_capabilities()?;
            self.link.set_phase(LinkPhase::AwaitingCapabilities);
        }
        Ok(())
    }

    /// Adopts the capability table, assigns every pin a mode (configured
    /// pins validated, the rest defaulted to Analog-if-supported else
    /// Input), transmits the assignments, and moves on to pin-state queries
    /// or directly to reporting enablement.
    fn capabilities_received(&mut self, capabilities: Vec<PinCapability>) -> Result<()> {
        if self.link.phase() != LinkPhase::AwaitingCapabilities {
            warn!(
                "Capability response in phase {:?}, ignoring",
                self.link.phase()
            );
            return Ok(());
        }
        self.pins.adopt_capabilities(capabilities);
        let total = self.pins.total_pins();
        debug!(
            "Capabilities: {} pins ({} digital, {} analog)",
            total,
            self.pins.digital_count(),
            self.pins.analog_count()
        );
        if self.config.len() > total as usize {
            return Err(Error::InvalidPinConfig {
                pin: total,
                message: format!(
                    "configuration table covers {} pins, board has {total}",
                    self.config.len()
                ),
            });
        }
        for pin in 0..total {
            let mode = match self.config.mode_for(pin) {
                Some(configured) => {
                    if !self.pins.capability_of(pin, configured) {
                        return Err(Error::UnsupportedPinMode {
                            pin,
                            mode: configured,
                        });
                    }
                    configured
                }
                None if self.config.covers(pin) => PinMode::Illegal,
                None => {
                    // Beyond the configuration table: best-effort default.
                    if self.pins.capability_of(pin, PinMode::Analog) {
                        PinMode::Analog
                    } else if self.pins.capability_of(pin, PinMode::Input) {
                        PinMode::Input
                    } else {
                        PinMode::Illegal
                    }
                }
            };
            self.pins.record_mode(pin, mode);
            if mode != PinMode::Illegal {
                self.transmit_mode(pin, mode)?;
            }
        }
        if self.link.supports_pin_state_query() && total > 2 {
            for pin in 2..total {
                self.encoder.request_pin_state(pin)?;
            }
            self.link.set_phase(LinkPhase::AwaitingPinStates(total - 2));
        } else {
            self.enable_reporting()?;
            self.link.enter_ready();
        }
        Ok(())
    }

    fn pin_state_received(&mut self, pin: u8, mode: PinMode) {
        let LinkPhase::AwaitingPinStates(remaining) = self.link.phase() else {
            debug!("Pin state for {pin} outside handshake, ignoring");
            return;
        };
        // Explicitly configured pins keep their assignment; only pins
        // beyond the table adopt what the firmware reports.
        if !self.config.covers(pin) && pin < self.pins.total_pins() {
            self.pins.record_mode(pin, mode);
        }
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            if let Err(e) = self.enable_reporting() {
                warn!("Failed to enable reporting: {e}");
                return;
            }
            self.link.enter_ready();
        } else {
            self.link.set_phase(LinkPhase::AwaitingPinStates(remaining));
        }
    }

    /// Turns on push reporting: every analog channel, then every digital
    /// port from the one spanning the highest pin down to port 0.
    fn enable_reporting(&mut self) -> Result<()> {
        for channel in 0..self.pins.analog_count() {
            self.encoder.report_analog(channel, true)?;
        }
        let top_pin = if self.pins.analog_count() > 0 {
            self.pins.analog_channel_to_pin(self.pins.analog_count() - 1)
        } else {
            self.pins.total_pins().saturating_sub(1)
        };
        for port in (0..=(top_pin >> 3)).rev() {
            self.encoder.report_digital(port, true)?;
        }
        Ok(())
    }
}
