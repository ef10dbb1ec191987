//! Shared test fixtures: an in-memory transport and a scripted handshake.

use firmata_host::{Board, PinConfig, Result, Transport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Inner {
    open: bool,
    refuse_open: bool,
    fail_open: bool,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

/// In-memory [`Transport`]: tests feed inbound bytes and inspect outbound
/// ones. Cloning shares the underlying buffers, so a clone kept by the test
/// observes the instance owned by the board.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Rc<RefCell<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for the board's next read pump.
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.borrow_mut().rx.extend(bytes);
    }

    /// Returns and clears everything the board has written so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().tx)
    }

    /// Simulates the cable being pulled.
    pub fn unplug(&self) {
        self.inner.borrow_mut().open = false;
    }

    /// Makes subsequent open attempts fail silently, like an absent device.
    pub fn refuse_open(&self, refuse: bool) {
        self.inner.borrow_mut().refuse_open = refuse;
    }

    /// Makes subsequent open attempts return a hard error.
    pub fn fail_open(&self, fail: bool) {
        self.inner.borrow_mut().fail_open = fail;
    }
}

impl Transport for MockTransport {
    fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    fn open(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_open {
            return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into());
        }
        if !inner.refuse_open {
            inner.open = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.inner.borrow_mut().open = false;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.borrow_mut();
        let count = buf.len().min(inner.rx.len());
        for slot in buf[..count].iter_mut() {
            *slot = inner.rx.pop_front().unwrap();
        }
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.inner.borrow_mut().tx.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// The 14-entry configuration table used throughout these tests: a button on
/// pin 2, LEDs on 3 and 13, PWM on 6, a servo on 9.
pub fn uno_config() -> PinConfig {
    PinConfig::parse(&[
        "",
        "",
        "digitalIn",
        "digitalOut",
        "",
        "",
        "pwmOut",
        "",
        "",
        "servo",
        "",
        "",
        "",
        "digitalOut",
    ])
    .unwrap()
}

/// Capability response for an Uno-shaped board: pins 0 and 1 report nothing
/// (serial), pins 2-13 are digital with PWM and servo support, pins 14-19
/// are analog inputs at 10 bits.
pub fn uno_capability_response() -> Vec<u8> {
    let mut bytes = vec![0xF0, 0x6C];
    for _ in 0..2 {
        bytes.push(0x7F);
    }
    for _ in 2..14 {
        bytes.extend_from_slice(&[0x00, 1, 0x01, 1, 0x03, 8, 0x04, 14, 0x7F]);
    }
    for _ in 14..20 {
        bytes.extend_from_slice(&[0x00, 1, 0x02, 10, 0x7F]);
    }
    bytes.push(0xF7);
    bytes
}

/// One PIN_STATE_RESPONSE frame.
pub fn pin_state_response(pin: u8, mode: u8, value: u8) -> Vec<u8> {
    vec![0xF0, 0x6E, pin, mode, value, 0xF7]
}

/// Fresh board plus a handle onto its transport.
pub fn board() -> (Board<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    (Board::new(transport.clone(), uno_config()), transport)
}

/// Drives a fresh board through the whole handshake against firmware 2.3
/// and leaves it Ready, with the transport's write log cleared.
pub fn ready_board() -> (Board<MockTransport>, MockTransport) {
    let (mut board, transport) = board();
    board.pump_write().unwrap();
    transport.feed(&[0xF9, 2, 3]);
    board.pump_read().unwrap();
    transport.feed(&uno_capability_response());
    board.pump_read().unwrap();
    for pin in 2..14 {
        transport.feed(&pin_state_response(pin, 0x00, 0));
    }
    for pin in 14..20 {
        transport.feed(&pin_state_response(pin, 0x02, 0));
    }
    board.pump_read().unwrap();
    assert!(board.is_ready(), "fixture handshake did not complete");
    board.pump_write().unwrap();
    transport.take_written();
    (board, transport)
}
