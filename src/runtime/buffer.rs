//! Per-connection bounded byte buffer.
//!
//! Each connection (and each relay direction) owns exactly one
//! `BoundedBuffer`. Bytes enter at the write cursor and leave at the read
//! cursor; both cursors only move forward until the buffer is fully drained
//! and explicitly reset.
//!
//! ## Cursor Layout
//!
//! ```text
//! 0          out             in               C-1   C
//! | consumed | pending data  |  free space    |    |
//! ```
//!
//! One slot is kept in reserve, so the usable space is `C - 1`.

use std::fmt;
use std::io::{self, Read, Write};

/// Default buffer capacity in bytes.
pub const BUFFER_CAPACITY: usize = 4096;

/// Fixed-capacity byte segment with monotonic read/write cursors.
///
/// Pending length is always `in - out`. It is never inferred from the
/// content, so payloads containing zero bytes pass through unchanged.
pub struct BoundedBuffer {
    /// Backing storage, `capacity` bytes long.
    data: Box<[u8]>,
    /// Next write offset.
    write_pos: usize,
    /// Next read offset.
    read_pos: usize,
}

impl BoundedBuffer {
    /// Create a buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    /// Create a buffer with a custom capacity.
    ///
    /// # Panics
    /// Panics if `capacity < 2`, since one slot is always reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "buffer capacity must be at least 2 bytes");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Total capacity, including the reserved slot.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes that can still be written before the buffer is full.
    pub fn has_space(&self) -> usize {
        (self.capacity() - 1) - self.write_pos
    }

    /// Bytes written but not yet read.
    pub fn has_data(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Pending bytes, in order.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Copy as much of `src` as fits into the free region.
    ///
    /// Returns the number of bytes accepted.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.has_space());
        self.data[self.write_pos..self.write_pos + n].copy_from_slice(&src[..n]);
        self.write_pos += n;
        n
    }

    /// Copy pending bytes into `dst`, consuming them.
    ///
    /// Returns the number of bytes produced.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.has_data());
        dst[..n].copy_from_slice(&self.data[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        n
    }

    /// Issue a single read from `reader` into the free region.
    ///
    /// Returns `Ok(0)` either on end-of-stream or when there is no space;
    /// callers check `has_space()` first to tell them apart.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let end = self.capacity() - 1;
        let n = reader.read(&mut self.data[self.write_pos..end])?;
        debug_assert!(n <= end - self.write_pos);
        self.write_pos += n.min(end - self.write_pos);
        Ok(n)
    }

    /// Issue a single write of the pending region to `writer`.
    pub fn flush_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        let n = writer.write(&self.data[self.read_pos..self.write_pos])?;
        self.read_pos += n.min(self.has_data());
        Ok(n)
    }

    /// Zero the storage and both cursors.
    ///
    /// Refuses to discard pending bytes: the buffer is left untouched and
    /// an error describing the pending length is returned instead.
    pub fn reset(&mut self) -> Result<(), ResetError> {
        let pending = self.has_data();
        if pending != 0 {
            return Err(ResetError { pending });
        }
        self.data.fill(0);
        self.write_pos = 0;
        self.read_pos = 0;
        Ok(())
    }
}

impl Default for BoundedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity())
            .field("in", &self.write_pos)
            .field("out", &self.read_pos)
            .finish()
    }
}

/// Returned by [`BoundedBuffer::reset`] when data is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetError {
    /// Bytes that a reset would have discarded.
    pub pending: usize,
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer reset with {} bytes still pending", self.pending)
    }
}

impl std::error::Error for ResetError {}

impl From<ResetError> for io::Error {
    fn from(e: ResetError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_buffer() {
        let buf = BoundedBuffer::new();
        assert_eq!(buf.capacity(), BUFFER_CAPACITY);
        assert_eq!(buf.has_space(), BUFFER_CAPACITY - 1);
        assert_eq!(buf.has_data(), 0);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn test_space_and_data_sum_to_usable_capacity() {
        let mut buf = BoundedBuffer::new();
        let mut accepted = 0;

        for len in [1usize, 17, 300, 1024, 2000, 753] {
            let chunk = vec![0xAB; len];
            accepted += buf.write(&chunk);
            assert_eq!(buf.has_data(), accepted);
            assert_eq!(buf.has_space() + buf.has_data(), BUFFER_CAPACITY - 1);
        }

        // 1+17+300+1024+2000+753 = 4095, exactly the usable space
        assert_eq!(accepted, BUFFER_CAPACITY - 1);
        assert_eq!(buf.has_space(), 0);
    }

    #[test]
    fn test_write_truncates_at_capacity() {
        let mut buf = BoundedBuffer::with_capacity(8);
        assert_eq!(buf.write(b"0123456789"), 7);
        assert_eq!(buf.pending(), b"0123456");
        assert_eq!(buf.write(b"x"), 0);
    }

    #[test]
    fn test_read_consumes_in_order() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"hello\0world");

        let mut out = [0u8; 6];
        assert_eq!(buf.read(&mut out), 6);
        assert_eq!(&out, b"hello\0");
        assert_eq!(buf.has_data(), 5);

        let mut rest = [0u8; 32];
        assert_eq!(buf.read(&mut rest), 5);
        assert_eq!(&rest[..5], b"world");
        assert_eq!(buf.has_data(), 0);

        // Cursors do not rewind until reset
        assert_eq!(buf.has_space(), BUFFER_CAPACITY - 1 - 11);
    }

    #[test]
    fn test_reset_rejected_with_pending_data() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"abc");

        assert_eq!(buf.reset(), Err(ResetError { pending: 3 }));
        assert_eq!(buf.pending(), b"abc");
    }

    #[test]
    fn test_reset_after_drain_matches_fresh_buffer() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"payload");
        let mut sink = [0u8; 7];
        buf.read(&mut sink);

        buf.reset().unwrap();
        let fresh = BoundedBuffer::new();
        assert_eq!(buf.has_space(), fresh.has_space());
        assert_eq!(buf.has_data(), fresh.has_data());
        assert!(buf.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_from_and_flush_to() {
        let mut buf = BoundedBuffer::with_capacity(6);
        let mut src: &[u8] = b"abcdefgh";

        assert_eq!(buf.fill_from(&mut src).unwrap(), 5);
        assert_eq!(buf.has_space(), 0);
        // No room left: the reader is handed an empty slice
        assert_eq!(buf.fill_from(&mut src).unwrap(), 0);

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(buf.flush_to(&mut out).unwrap(), 5);
        assert_eq!(out, b"abcde");
        assert_eq!(buf.has_data(), 0);
    }

    #[test]
    fn test_reset_error_into_io_error() {
        let err: io::Error = ResetError { pending: 9 }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("9 bytes"));
    }
}
