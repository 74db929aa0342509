//! The serial endpoint contract (spec §4.1: "Serial Endpoint").
//!
//! A byte-level duplex line: blocking `write_all` plus a bounded `read`
//! that returns whatever is available once `timeout` elapses. Timing out
//! with zero bytes is not an error (spec §4.2 "Failure modes") — it is
//! represented as `Ok(vec![])`, letting the caller (the `Transport`) decide
//! what silence means.

use std::io;
use std::time::Duration;

pub trait SerialEndpoint: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block for up to `timeout` waiting for bytes, then return whatever
    /// arrived (possibly empty on timeout).
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;
}

/// Real serial backend, built on the `serialport` crate.
pub struct RealSerialEndpoint {
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerialEndpoint {
    pub fn open(cfg: &crate::config::SerialConfig) -> crate::error::Result<Self> {
        cfg.validate()?;

        let parity = match cfg.parity {
            crate::config::Parity::None => serialport::Parity::None,
            crate::config::Parity::Even => serialport::Parity::Even,
            crate::config::Parity::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(&cfg.port, cfg.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(parity)
            .stop_bits(serialport::StopBits::One)
            .timeout(cfg.read_timeout)
            .open()
            .map_err(|e| crate::error::DartError::SerialFatal(e.to_string()))?;

        Ok(Self { port })
    }
}

impl SerialEndpoint for RealSerialEndpoint {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.port.set_timeout(timeout)?;
        let mut buf = [0u8; 512];
        match self.port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Scriptable in-memory endpoint used by tests (spec §8's scenarios are all
/// expressed against this).
///
/// Every `write_all` is recorded verbatim in `writes()`. `read()` pops one
/// scripted chunk per call (with `with_echo` enabled, the first chunk after
/// a write echoes the bytes just written, simulating RS-485 electrical
/// echo before the real reply).
#[derive(Default)]
pub struct MockSerialEndpoint {
    writes: Vec<Vec<u8>>,
    replies: std::collections::VecDeque<Vec<u8>>,
    echo_writes: bool,
}

impl MockSerialEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_echo(mut self) -> Self {
        self.echo_writes = true;
        self
    }

    /// Queue a chunk to be returned by a future `read()` call.
    pub fn script_reply(&mut self, bytes: impl Into<Vec<u8>>) {
        self.replies.push_back(bytes.into());
    }

    #[must_use]
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }
}

impl SerialEndpoint for MockSerialEndpoint {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writes.push(bytes.to_vec());
        if self.echo_writes {
            self.replies.push_back(bytes.to_vec());
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        // A zero-duration read models a non-blocking drain poll: on real
        // hardware it only ever sees bytes that had already arrived before
        // the call, never something a future write is about to provoke. A
        // scripted reply represents exactly the latter, so it must not be
        // popped here (`Transport::transact`'s pre-send drain would
        // otherwise eat the reply it's about to earn).
        if timeout.is_zero() {
            return Ok(Vec::new());
        }
        Ok(self.replies.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_writes() {
        let mut ep = MockSerialEndpoint::new();
        ep.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(ep.writes(), &[vec![1, 2, 3]]);
    }

    #[test]
    fn mock_echo_returns_written_bytes_first() {
        let mut ep = MockSerialEndpoint::new().with_echo();
        ep.write_all(&[0xAA, 0xBB]).unwrap();
        ep.script_reply(vec![0x01, 0x02]);

        let first = ep.read(Duration::from_millis(10)).unwrap();
        assert_eq!(first, vec![0xAA, 0xBB]);
        let second = ep.read(Duration::from_millis(10)).unwrap();
        assert_eq!(second, vec![0x01, 0x02]);
    }

    #[test]
    fn mock_zero_timeout_read_never_pops_a_scripted_reply() {
        let mut ep = MockSerialEndpoint::new();
        ep.script_reply(vec![0xAA]);
        assert_eq!(ep.read(Duration::from_millis(0)).unwrap(), Vec::<u8>::new());
        assert_eq!(ep.read(Duration::from_millis(10)).unwrap(), vec![0xAA]);
    }

    #[test]
    fn mock_read_on_empty_queue_times_out_with_no_bytes() {
        let mut ep = MockSerialEndpoint::new();
        assert_eq!(ep.read(Duration::from_millis(10)).unwrap(), Vec::<u8>::new());
    }
}
