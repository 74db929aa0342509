//! A streaming byte buffer for frame recognition.
//!
//! Bytes arrive from the serial endpoint in arbitrary chunks that may split
//! a frame anywhere, or contain several frames back to back (spec §4.1,
//! "Multiple frames in one read"). `FrameBuffer` accumulates raw bytes and
//! offers zero-copy-ish prefix inspection so the `Transport` can detect
//! echoed frames and the `Framer` can split on `STX`.

use bytes::{Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Returns `true` if the buffered bytes start with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.buf.len() >= prefix.len() && &self.buf[..prefix.len()] == prefix
    }

    /// Drop the first `n` bytes.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        let _ = self.buf.split_to(n);
    }

    /// Remove and return a contiguous `Bytes` view of everything buffered.
    pub fn take_all(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Returns `true` if the buffer ends with the two-byte `ETX, SF`
    /// delimiter that marks a completed DART frame (or the tail of an ACK).
    #[must_use]
    pub fn ends_with_delimiter(&self, etx: u8, sf: u8) -> bool {
        let n = self.buf.len();
        n >= 2 && self.buf[n - 2] == etx && self.buf[n - 1] == sf
    }

    /// Split the buffered bytes into fragments starting at each `STX`
    /// (spec §4.1: "split on STX while preserving the leading STX of each
    /// fragment"). Bytes preceding the first `STX` are dropped as noise.
    #[must_use]
    pub fn split_on_stx(&self, stx: u8) -> Vec<Bytes> {
        let data = &self.buf[..];
        let starts: Vec<usize> = data
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| (b == stx).then_some(i))
            .collect();

        let mut out = Vec::with_capacity(starts.len());
        for (idx, &start) in starts.iter().enumerate() {
            let end = starts.get(idx + 1).copied().unwrap_or(data.len());
            out.push(Bytes::copy_from_slice(&data[start..end]));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_matches_exact_prefix() {
        let mut b = FrameBuffer::new();
        b.extend(&[0x02, 0x50, 0xF0]);
        assert!(b.starts_with(&[0x02, 0x50]));
        assert!(!b.starts_with(&[0x02, 0x51]));
    }

    #[test]
    fn advance_drops_prefix() {
        let mut b = FrameBuffer::new();
        b.extend(&[1, 2, 3, 4]);
        b.advance(2);
        assert_eq!(b.as_slice(), &[3, 4]);
    }

    #[test]
    fn ends_with_delimiter_detects_etx_sf() {
        let mut b = FrameBuffer::new();
        b.extend(&[0x01, 0x03, 0xFA]);
        assert!(b.ends_with_delimiter(0x03, 0xFA));
        b.extend(&[0x99]);
        assert!(!b.ends_with_delimiter(0x03, 0xFA));
    }

    #[test]
    fn split_on_stx_preserves_leading_byte_per_fragment() {
        let mut b = FrameBuffer::new();
        b.extend(&[0x02, 1, 2, 0x02, 3, 4]);
        let frags = b.split_on_stx(0x02);
        assert_eq!(frags.len(), 2);
        assert_eq!(&frags[0][..], &[0x02, 1, 2]);
        assert_eq!(&frags[1][..], &[0x02, 3, 4]);
    }

    #[test]
    fn split_on_stx_drops_noise_before_first_stx() {
        let mut b = FrameBuffer::new();
        b.extend(&[0xEE, 0xEE, 0x02, 1, 2]);
        let frags = b.split_on_stx(0x02);
        assert_eq!(frags.len(), 1);
        assert_eq!(&frags[0][..], &[0x02, 1, 2]);
    }
}
