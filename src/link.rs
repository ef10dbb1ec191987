//! Connection/initialization state.
//!
//! After every (re)connect the device must be walked through the same
//! handshake before any pin I/O is trusted: version query, capability
//! query, optional per-pin state queries, then reporting enablement. The
//! phases here gate what [`crate::board::Board`] transmits; the transition
//! logic itself lives in the board, next to the messages that drive it.

use crate::consts;
use log::debug;

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No open transport, or state discarded after a failure.
    Disconnected,
    /// REPORT_VERSION sent, waiting for the reply.
    AwaitingFirmwareVersion,
    /// CAPABILITY_QUERY sent, waiting for the table.
    AwaitingCapabilities,
    /// PIN_STATE_QUERY sent per pin; counts replies still outstanding.
    AwaitingPinStates(u8),
    /// Handshake complete; pin I/O reaches the wire.
    Ready,
}

/// Handshake phase, firmware identity, and the connection epoch.
#[derive(Debug)]
pub struct Link {
    phase: LinkPhase,
    epoch: u32,
    version: Option<(u8, u8)>,
    firmware_name: String,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub fn new() -> Self {
        Self {
            phase: LinkPhase::Disconnected,
            epoch: 0,
            version: None,
            firmware_name: String::new(),
        }
    }

    /// Back to square one. The epoch is *not* bumped here; it counts
    /// completed handshakes, not attempts.
    pub fn reset(&mut self) {
        self.phase = LinkPhase::Disconnected;
        self.version = None;
        self.firmware_name.clear();
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: LinkPhase) {
        if phase != self.phase {
            debug!("Link phase {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;
    }

    pub fn is_ready(&self) -> bool {
        self.phase == LinkPhase::Ready
    }

    /// Monotonic count of completed handshakes. Distinguishes state from
    /// successive connection attempts.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Marks the handshake complete and opens a new epoch.
    pub fn enter_ready(&mut self) {
        self.epoch += 1;
        self.set_phase(LinkPhase::Ready);
        debug!(
            "Handshake complete, connection epoch {} (firmware {})",
            self.epoch,
            self.version_string()
        );
    }

    /// Records a version report. Returns true when this is the first report
    /// since the last reset, i.e. the one that should advance the handshake.
    pub fn record_version(&mut self, major: u8, minor: u8) -> bool {
        let first = self.version.is_none();
        self.version = Some((major, minor));
        first
    }

    pub fn record_firmware_name(&mut self, name: &str) {
        self.firmware_name = name.to_string();
    }

    pub fn version(&self) -> Option<(u8, u8)> {
        self.version
    }

    pub fn version_string(&self) -> String {
        match self.version {
            Some((major, minor)) => format!("{major}.{minor}"),
            None => "unknown".to_string(),
        }
    }

    pub fn firmware_name(&self) -> &str {
        &self.firmware_name
    }

    /// PIN_STATE_QUERY exists only in firmwares newer than 2.1.
    pub fn supports_pin_state_query(&self) -> bool {
        self.version
            .map(|v| v > consts::PIN_STATE_QUERY_VERSION)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_counts_completed_handshakes_only() {
        let mut link = Link::new();
        assert_eq!(link.epoch(), 0);
        link.set_phase(LinkPhase::AwaitingFirmwareVersion);
        link.reset();
        assert_eq!(link.epoch(), 0);
        link.enter_ready();
        assert_eq!(link.epoch(), 1);
        link.reset();
        link.enter_ready();
        assert_eq!(link.epoch(), 2);
    }

    #[test]
    fn only_the_first_version_report_advances() {
        let mut link = Link::new();
        assert!(link.record_version(2, 3));
        assert!(!link.record_version(2, 3));
        link.reset();
        assert!(link.record_version(2, 3));
    }

    #[test]
    fn pin_state_query_needs_firmware_above_2_1() {
        let mut link = Link::new();
        assert!(!link.supports_pin_state_query());
        link.record_version(2, 1);
        assert!(!link.supports_pin_state_query());
        link.record_version(2, 2);
        assert!(link.supports_pin_state_query());
        link.record_version(3, 0);
        assert!(link.supports_pin_state_query());
    }
}
