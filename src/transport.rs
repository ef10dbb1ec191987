//! Byte-duplex transport abstraction and its serial-port implementation.
//!
//! The engine only needs open/closed state plus non-blocking-ish reads and
//! writes; everything else about the link (device paths, baud rates, retry
//! cadence) stays on this side of the [`Transport`] trait.

use crate::error::Result;
use log::{debug, trace, warn};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// A byte-oriented duplex stream with explicit open/closed state.
///
/// Calls must not block beyond a small internal timeout; a pump cycle that
/// cannot make progress simply returns and tries again next cycle.
pub trait Transport {
    /// True while the underlying stream is usable.
    fn is_open(&self) -> bool;

    /// Tries to (re)open the stream. Implementations may throttle attempts;
    /// check [`Transport::is_open`] afterwards. An `Err` signals a hard
    /// fault, not merely an absent device.
    fn open(&mut self) -> Result<()>;

    /// Closes the stream. Idempotent.
    fn close(&mut self);

    /// Reads whatever bytes are immediately available, up to `buf.len()`.
    /// Returns 0 when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes as much of `buf` as the stream accepts right now. Returns the
    /// number of bytes taken; 0 means "try again next cycle".
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Per-call serial I/O timeout. Keeps the pumps bounded.
const SERIAL_IO_TIMEOUT: Duration = Duration::from_millis(50);
/// Minimum spacing between reopen attempts after a failure.
const REOPEN_INTERVAL: Duration = Duration::from_secs(2);

/// [`Transport`] over a serial port, with throttled reconnect attempts so a
/// missing device costs one open() syscall every couple of seconds instead
/// of one per frame.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    last_attempt: Option<Instant>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialTransport {
    /// Creates a closed transport for the given device path and baud rate.
    /// The first pump cycle performs the actual open.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
            last_attempt: None,
        }
    }

    /// The configured device path.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        if let Some(last) = self.last_attempt {
            if last.elapsed() < REOPEN_INTERVAL {
                return Ok(());
            }
        }
        self.last_attempt = Some(Instant::now());
        debug!("Opening serial port {} @ {} baud", self.port_name, self.baud_rate);
        match serialport::new(&self.port_name, self.baud_rate)
            .timeout(SERIAL_IO_TIMEOUT)
            .open()
        {
            Ok(port) => {
                self.port = Some(port);
                Ok(())
            }
            Err(e) => {
                // Device absent or busy: an operating condition, retried on
                // a later cycle. Surfaced through the log only.
                warn!("Failed to open {}: {e}", self.port_name);
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.port_name);
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Ok(0);
        };
        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                warn!("Serial read failed on {}: {e}", self.port_name);
                self.close();
                return Err(e.into());
            }
        };
        if available == 0 {
            return Ok(0);
        }
        let want = available.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => {
                trace!("Serial read {} bytes: {:02X?}", n, &buf[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                warn!("Serial read failed on {}: {e}", self.port_name);
                self.close();
                Err(e.into())
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Ok(0);
        };
        match port.write(buf) {
            Ok(n) => {
                trace!("Serial wrote {} of {} bytes", n, buf.len());
                Ok(n)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => {
                warn!("Serial write failed on {}: {e}", self.port_name);
                self.close();
                Err(e.into())
            }
        }
    }
}
