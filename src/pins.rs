//! The pin model: per-pin capabilities, current modes, and the sample cache
//! that doubles as a write-coalescing filter.

use crate::consts;
use crate::error::{Error, Result};

/// A pin's operating mode, as carried in SET_PIN_MODE and capability data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Input,
    Output,
    Analog,
    Pwm,
    Servo,
    Shift,
    I2c,
    /// Sentinel for "not yet configured" or "unsupported mode byte".
    Illegal,
}

/// Number of concrete (non-sentinel) pin modes.
pub const TOTAL_PIN_MODES: usize = 7;

impl PinMode {
    /// The protocol byte for this mode. `Illegal` has no wire encoding.
    pub fn to_byte(self) -> u8 {
        match self {
            PinMode::Input => 0x00,
            PinMode::Output => 0x01,
            PinMode::Analog => 0x02,
            PinMode::Pwm => 0x03,
            PinMode::Servo => 0x04,
            PinMode::Shift => 0x05,
            PinMode::I2c => 0x06,
            PinMode::Illegal => 0x7F,
        }
    }

    /// Maps a protocol mode byte back to a variant; unknown bytes become
    /// `Illegal` rather than failing the decoder.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => PinMode::Input,
            0x01 => PinMode::Output,
            0x02 => PinMode::Analog,
            0x03 => PinMode::Pwm,
            0x04 => PinMode::Servo,
            0x05 => PinMode::Shift,
            0x06 => PinMode::I2c,
            _ => PinMode::Illegal,
        }
    }

    /// Index into per-mode capability tables, `None` for `Illegal`.
    fn table_index(self) -> Option<usize> {
        match self {
            PinMode::Illegal => None,
            other => Some(other.to_byte() as usize),
        }
    }
}

/// Ordered, string-keyed pin configuration supplied at construction.
///
/// Entries use the conventional names `digitalIn`, `digitalOut`, `analogIn`,
/// `pwmOut`, `servo`, `i2c`; an empty string leaves the pin unconfigured.
/// Parsed once, so a typo fails construction instead of a later handshake.
#[derive(Debug, Clone, Default)]
pub struct PinConfig {
    entries: Vec<Option<PinMode>>,
}

impl PinConfig {
    /// Parses a configuration table. Index position is the pin number.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        if entries.len() > consts::MAX_PINS {
            return Err(Error::InvalidPinConfig {
                pin: 0,
                message: format!(
                    "configuration table has {} entries, protocol maximum is {}",
                    entries.len(),
                    consts::MAX_PINS
                ),
            });
        }
        let mut parsed = Vec::with_capacity(entries.len());
        for (pin, entry) in entries.iter().enumerate() {
            let mode = match entry.as_ref() {
                "" => None,
                "digitalIn" => Some(PinMode::Input),
                "digitalOut" => Some(PinMode::Output),
                "analogIn" => Some(PinMode::Analog),
                "pwmOut" => Some(PinMode::Pwm),
                "servo" => Some(PinMode::Servo),
                "i2c" => Some(PinMode::I2c),
                other => {
                    return Err(Error::InvalidPinConfig {
                        pin: pin as u8,
                        message: format!("unrecognized entry {other:?}"),
                    });
                }
            };
            parsed.push(mode);
        }
        Ok(Self { entries: parsed })
    }

    /// Number of pins the table covers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no pin is covered by the table.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured mode for `pin`, if the table covers and configures it.
    pub fn mode_for(&self, pin: u8) -> Option<PinMode> {
        self.entries.get(pin as usize).copied().flatten()
    }

    /// True when the table covers `pin`, configured or not. Pin-state
    /// responses never overwrite covered pins.
    pub fn covers(&self, pin: u8) -> bool {
        (pin as usize) < self.entries.len()
    }
}

/// One pin's capability set: the resolution reported for each supported mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinCapability {
    resolutions: [Option<u8>; TOTAL_PIN_MODES],
}

impl PinCapability {
    /// Records one (mode, resolution) pair from a capability response.
    /// Unknown mode bytes are dropped.
    pub fn add(&mut self, mode_byte: u8, resolution: u8) {
        if let Some(index) = PinMode::from_byte(mode_byte).table_index() {
            self.resolutions[index] = Some(resolution);
        }
    }

    /// True iff the device reported this mode for the pin.
    pub fn supports(&self, mode: PinMode) -> bool {
        mode.table_index()
            .map(|index| self.resolutions[index].is_some())
            .unwrap_or(false)
    }

    /// The reported resolution (bits) for `mode`, if supported.
    pub fn resolution(&self, mode: PinMode) -> Option<u8> {
        mode.table_index().and_then(|index| self.resolutions[index])
    }
}

/// The authoritative table of pin capabilities, current modes, and cached
/// input/output samples.
///
/// Capabilities and modes are populated during the handshake and cleared on
/// disconnect; the sample caches live for the lifetime of the engine and
/// start zeroed. Output caches also serve as the coalescing filter: an
/// update only reports "changed" (and therefore only reaches the wire) when
/// the transmitted unit actually differs.
#[derive(Debug)]
pub struct PinModel {
    capabilities: Vec<PinCapability>,
    modes: Vec<PinMode>,
    digital_count: u8,
    analog_count: u8,
    analog_input: [u16; consts::MAX_ANALOG_CHANNELS],
    digital_input: [u8; consts::MAX_PORTS],
    analog_output: [u16; consts::MAX_PINS],
    digital_output: [u8; consts::MAX_PORTS],
}

impl Default for PinModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PinModel {
    pub fn new() -> Self {
        Self {
            capabilities: Vec::new(),
            modes: Vec::new(),
            digital_count: 0,
            analog_count: 0,
            analog_input: [0; consts::MAX_ANALOG_CHANNELS],
            digital_input: [0; consts::MAX_PORTS],
            analog_output: [0; consts::MAX_PINS],
            digital_output: [0; consts::MAX_PORTS],
        }
    }

    /// Discards capabilities and modes. Called on disconnect; nothing learned
    /// from the previous connection is trusted afterwards. Sample caches stay.
    pub fn reset(&mut self) {
        self.capabilities.clear();
        self.modes.clear();
        self.digital_count = 0;
        self.analog_count = 0;
    }

    /// Installs a freshly received capability table and derives the pin
    /// counts: channels reporting the Analog capability are the board's
    /// analog pins, everything else is digital.
    pub fn adopt_capabilities(&mut self, capabilities: Vec<PinCapability>) {
        let analog = capabilities
            .iter()
            .filter(|c| c.supports(PinMode::Analog))
            .count();
        self.analog_count = analog as u8;
        self.digital_count = (capabilities.len() - analog) as u8;
        self.modes = vec![PinMode::Illegal; capabilities.len()];
        self.capabilities = capabilities;
    }

    pub fn capabilities_known(&self) -> bool {
        !self.capabilities.is_empty()
    }

    /// Total pin count; zero until capabilities arrive.
    pub fn total_pins(&self) -> u8 {
        self.digital_count + self.analog_count
    }

    pub fn digital_count(&self) -> u8 {
        self.digital_count
    }

    pub fn analog_count(&self) -> u8 {
        self.analog_count
    }

    /// Maps an analog channel to its real (high) pin index.
    pub fn analog_channel_to_pin(&self, channel: u8) -> u8 {
        self.digital_count + channel
    }

    /// Maps a real pin index to its analog channel, if it is an analog pin.
    pub fn pin_to_analog_channel(&self, pin: u8) -> Option<u8> {
        if pin >= self.digital_count && pin < self.total_pins() {
            Some(pin - self.digital_count)
        } else {
            None
        }
    }

    /// True iff the device reported `mode` for `pin`. Always false before
    /// capabilities are known. `pin` must be below the known pin count.
    pub fn capability_of(&self, pin: u8, mode: PinMode) -> bool {
        if !self.capabilities_known() {
            return false;
        }
        debug_assert!(
            (pin as usize) < self.capabilities.len(),
            "pin {pin} beyond capability table"
        );
        self.capabilities
            .get(pin as usize)
            .map(|c| c.supports(mode))
            .unwrap_or(false)
    }

    /// The raw capability entry for a pin, once known.
    pub fn capability(&self, pin: u8) -> Option<&PinCapability> {
        self.capabilities.get(pin as usize)
    }

    /// Current mode of `pin`; `Illegal` until assigned.
    pub fn mode_of(&self, pin: u8) -> PinMode {
        self.modes
            .get(pin as usize)
            .copied()
            .unwrap_or(PinMode::Illegal)
    }

    /// Records the current mode of a pin. Transmission is the caller's job.
    pub fn record_mode(&mut self, pin: u8, mode: PinMode) {
        if let Some(slot) = self.modes.get_mut(pin as usize) {
            *slot = mode;
        }
    }

    /// Checks `mode_of(pin) == required`, as a contract error.
    pub fn require_mode(&self, pin: u8, required: PinMode) -> Result<()> {
        let actual = self.mode_of(pin);
        if actual == required {
            Ok(())
        } else {
            Err(Error::PinModeMismatch {
                pin,
                required,
                actual,
            })
        }
    }

    // --- Sample cache, read side ---

    /// Stores a pushed analog sample. Returns the previous value.
    pub fn record_analog_sample(&mut self, channel: u8, value: u16) -> u16 {
        let slot = &mut self.analog_input[channel as usize % consts::MAX_ANALOG_CHANNELS];
        std::mem::replace(slot, value)
    }

    /// Stores a pushed digital port byte. Returns the previous value.
    pub fn record_digital_port(&mut self, port: u8, bits: u8) -> u8 {
        let slot = &mut self.digital_input[port as usize % consts::MAX_PORTS];
        std::mem::replace(slot, bits)
    }

    /// Cached sample for an analog channel (0-1023 for 10-bit boards).
    pub fn analog_value(&self, channel: u8) -> u16 {
        self.analog_input[channel as usize % consts::MAX_ANALOG_CHANNELS]
    }

    /// Cached input bit for a digital pin.
    pub fn digital_value(&self, pin: u8) -> bool {
        let port = (pin >> 3) as usize % consts::MAX_PORTS;
        self.digital_input[port] & (1 << (pin % 8)) != 0
    }

    // --- Sample cache, write side (coalescing) ---

    /// Folds a digital write into the output port byte. Returns
    /// `Some((port, bits))` when the port byte changed and must be
    /// transmitted, `None` when the write coalesces away.
    pub fn update_digital_output(&mut self, pin: u8, on: bool) -> Option<(u8, u8)> {
        let port = (pin >> 3) as usize % consts::MAX_PORTS;
        let mask = 1u8 << (pin % 8);
        let old = self.digital_output[port];
        let new = if on { old | mask } else { old & !mask };
        self.digital_output[port] = new;
        (new != old).then_some((port as u8, new))
    }

    /// Caches an analog/PWM/servo output value for a pin. Returns true when
    /// the value changed and must be transmitted.
    pub fn update_analog_output(&mut self, pin: u8, value: u16) -> bool {
        let slot = &mut self.analog_output[pin as usize % consts::MAX_PINS];
        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }
}
