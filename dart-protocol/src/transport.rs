//! Owns the serial endpoint, the sequence bit, and the one-transaction-at-
//! a-time lock (spec §4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dart_core::prelude::{FrameBuffer, SerialEndpoint};

use crate::dc;
use crate::framer::{build_frame, ETX, SF};

struct Inner {
    endpoint: Box<dyn SerialEndpoint>,
    /// Held for the Transport's entire address range, not per-pump (spec §9:
    /// "a single Transport holds one seq bit for its entire address range").
    seq_bit: u8,
}

pub struct Transport {
    inner: parking_lot::Mutex<Inner>,
    /// Inter-frame silence used to mark end-of-burst while reading a reply.
    frame_gap: Duration,
    default_timeout: Duration,
    /// Set once the endpoint reports a hard I/O error (spec §7
    /// `SerialFatal`: "Transport marked dead; external operations return a
    /// terminal error").
    dead: AtomicBool,
}

impl Transport {
    #[must_use]
    pub fn new(
        endpoint: Box<dyn SerialEndpoint>,
        frame_gap: Duration,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: parking_lot::Mutex::new(Inner {
                endpoint,
                seq_bit: 0x00,
            }),
            frame_gap,
            default_timeout,
            dead: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Relaxed)
    }

    /// Build and send `blocks` to `addr`, then read until the reply settles
    /// (ends `ETX,SF` and no further bytes arrive for `frame_gap`) or
    /// `timeout` elapses. Never returns an error: a silent pump yields an
    /// empty `Vec` (spec §4.2 "Failure modes" — the caller decides what
    /// silence means).
    pub fn transact(&self, addr: u8, blocks: &[Vec<u8>], timeout: Duration) -> Vec<u8> {
        let mut inner = self.inner.lock();

        // Drain whatever stale bytes are sitting in the line before we send.
        let _ = inner.endpoint.read(Duration::from_millis(0));

        let frame = build_frame(addr, inner.seq_bit, blocks);
        inner.seq_bit ^= 0x80;
        if inner.endpoint.write_all(&frame).is_err() {
            self.dead.store(true, Ordering::Relaxed);
            return Vec::new();
        }

        let mut buf = FrameBuffer::new();
        let deadline = Instant::now() + timeout;
        let mut last_rx = Instant::now();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let read_budget = remaining.min(self.frame_gap);

            match inner.endpoint.read(read_budget) {
                Ok(bytes) if !bytes.is_empty() => {
                    buf.extend(&bytes);
                    last_rx = Instant::now();
                    // RS-485 echo: the line reflects exactly what we just
                    // sent before any reply arrives. Strip it on sight.
                    if buf.starts_with(&frame) {
                        buf.advance(frame.len());
                    }
                }
                Ok(_) => {}
                Err(_) => {
                    self.dead.store(true, Ordering::Relaxed);
                    break;
                }
            }

            if !buf.is_empty() && buf.ends_with_delimiter(ETX, SF) && last_rx.elapsed() >= self.frame_gap {
                break;
            }
        }

        buf.take_all().to_vec()
    }

    /// Same as `transact` but does not wait for a reply — fire-and-forget
    /// commands such as AUTHORIZE/RESET whose DC1 acknowledgement arrives on
    /// the next poll anyway.
    pub fn send(&self, addr: u8, blocks: &[Vec<u8>]) {
        let mut inner = self.inner.lock();
        let frame = build_frame(addr, inner.seq_bit, blocks);
        inner.seq_bit ^= 0x80;
        if inner.endpoint.write_all(&frame).is_err() {
            self.dead.store(true, Ordering::Relaxed);
        }
    }

    /// Build a single CD1 block and transact it against `0x50 + pump_id`,
    /// returning the raw reply bytes.
    pub fn cd1(&self, pump_id: u8, dcc: u8) -> Vec<u8> {
        let addr = 0x50 + pump_id;
        self.transact(addr, &[dc::cd1(dcc)], self.default_timeout)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dart_core::serial::MockSerialEndpoint;

    #[test]
    fn transact_sends_exactly_one_frame_and_times_out_on_silence() {
        let endpoint = MockSerialEndpoint::new();
        let transport = Transport::new(
            Box::new(endpoint),
            Duration::from_millis(5),
            Duration::from_millis(30),
        );

        let reply = transport.transact(0x50, &[dc::cd1(dc::dcc::RETURN_STATUS)], Duration::from_millis(30));
        assert!(reply.is_empty());
        assert!(!transport.is_dead(), "silence alone must not mark the transport dead");
    }

    #[test]
    fn transact_strips_echo_before_returning_the_reply() {
        // Script the exact bytes the line will echo back as the first chunk,
        // then the genuine reply as the second — same shape a half-duplex
        // RS-485 capture would show.
        let sent_block = dc::cd1(dc::dcc::RETURN_STATUS);
        let echoed_frame = build_frame(0x50, 0x00, &[sent_block]);

        let mut endpoint = MockSerialEndpoint::new();
        endpoint.script_reply(echoed_frame);
        endpoint.script_reply(vec![0x11, 0x22, 0x03, 0xFA]);

        let transport = Transport::new(
            Box::new(endpoint),
            Duration::from_millis(5),
            Duration::from_millis(100),
        );

        let reply = transport.transact(0x50, &[dc::cd1(dc::dcc::RETURN_STATUS)], Duration::from_millis(100));
        assert_eq!(reply, vec![0x11, 0x22, 0x03, 0xFA]);
    }

    #[test]
    fn seq_bit_toggles_across_successive_transactions() {
        let endpoint = MockSerialEndpoint::new();
        let transport = Transport::new(
            Box::new(endpoint),
            Duration::from_millis(5),
            Duration::from_millis(20),
        );

        transport.transact(0x50, &[dc::cd1(dc::dcc::RETURN_STATUS)], Duration::from_millis(20));
        transport.transact(0x50, &[dc::cd1(dc::dcc::RETURN_STATUS)], Duration::from_millis(20));

        let writes = {
            let inner = transport.inner.lock();
            // seq bit already toggled twice, should be back to 0x00.
            inner.seq_bit
        };
        assert_eq!(writes, 0x00);
    }

    #[test]
    fn cd1_returns_raw_reply() {
        let mut endpoint = MockSerialEndpoint::new();
        endpoint.script_reply(vec![0xAA, 0xBB, 0x03, 0xFA]);
        let transport = Transport::new(
            Box::new(endpoint),
            Duration::from_millis(5),
            Duration::from_millis(50),
        );
        let reply = transport.cd1(0x00, dc::dcc::RESET);
        assert_eq!(reply, vec![0xAA, 0xBB, 0x03, 0xFA]);
    }
}
