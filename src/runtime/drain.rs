//! Drain handlers shared by the echo server and the relay.
//!
//! Under edge-triggered notification a readiness event is delivered once per
//! state change. A readable handler therefore reads until the OS reports
//! would-block (or the buffer fills, or the peer closes); any byte left
//! behind would not be announced again until new data arrived. The writable
//! handler writes until the buffer is empty or the send buffer is full, and
//! on a full send buffer yields back to the wait instead of spinning.

use crate::runtime::BoundedBuffer;
use std::io::{self, Read, Write};

/// Outcome of [`drain_readable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filled {
    /// The buffer had no free space; nothing was read.
    NoSpace,
    /// Bytes read before would-block or a full buffer. May be zero.
    Data(usize),
    /// The peer signalled end-of-stream after this many bytes were read.
    Eof(usize),
}

/// Outcome of [`drain_writable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flushed {
    /// Everything pending was written and the buffer has been reset.
    Complete(usize),
    /// The sink stopped accepting bytes; data is still pending.
    Blocked(usize),
}

/// Read from `source` into `buffer` until exhausted.
///
/// Interrupted reads are retried; any error other than would-block is
/// returned to the caller.
pub fn drain_readable<R>(source: &mut R, buffer: &mut BoundedBuffer) -> io::Result<Filled>
where
    R: Read + ?Sized,
{
    if buffer.has_space() == 0 {
        return Ok(Filled::NoSpace);
    }

    let mut total = 0;
    while buffer.has_space() > 0 {
        match buffer.fill_from(source) {
            Ok(0) => return Ok(Filled::Eof(total)),
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(Filled::Data(total))
}

/// Write pending bytes from `buffer` to `sink` until empty or blocked.
///
/// On completion the buffer is reset so the next read cycle starts at
/// offset zero with full space.
pub fn drain_writable<W>(sink: &mut W, buffer: &mut BoundedBuffer) -> io::Result<Flushed>
where
    W: Write + ?Sized,
{
    let mut total = 0;
    while buffer.has_data() > 0 {
        match buffer.flush_to(sink) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(Flushed::Blocked(total));
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buffer.reset()?;
    Ok(Flushed::Complete(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader that replays a fixed script of results.
    struct Script {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Script {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.steps.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    /// Writer that accepts at most `budget` bytes before blocking.
    struct Throttled {
        written: Vec<u8>,
        budget: usize,
        chunk: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget).min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn would_block() -> io::Result<Vec<u8>> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    #[test]
    fn test_read_drains_until_would_block() {
        let mut src = Script::new(vec![
            Ok(b"abc".to_vec()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"def".to_vec()),
            would_block(),
            Ok(b"late".to_vec()),
        ]);
        let mut buf = BoundedBuffer::new();

        assert_eq!(drain_readable(&mut src, &mut buf).unwrap(), Filled::Data(6));
        assert_eq!(buf.pending(), b"abcdef");
    }

    #[test]
    fn test_read_nothing_available() {
        let mut src = Script::new(vec![would_block()]);
        let mut buf = BoundedBuffer::new();
        assert_eq!(drain_readable(&mut src, &mut buf).unwrap(), Filled::Data(0));
    }

    #[test]
    fn test_read_eof_after_data() {
        let mut src = Script::new(vec![Ok(b"bye".to_vec()), Ok(Vec::new())]);
        let mut buf = BoundedBuffer::new();

        assert_eq!(drain_readable(&mut src, &mut buf).unwrap(), Filled::Eof(3));
        assert_eq!(buf.pending(), b"bye");
    }

    #[test]
    fn test_read_stops_at_full_buffer() {
        let mut src = Script::new(vec![Ok(vec![7u8; 20])]);
        let mut buf = BoundedBuffer::with_capacity(9);

        assert_eq!(drain_readable(&mut src, &mut buf).unwrap(), Filled::Data(8));
        assert_eq!(buf.has_space(), 0);

        // Back-pressure: a full buffer reads nothing
        assert_eq!(drain_readable(&mut src, &mut buf).unwrap(), Filled::NoSpace);
    }

    #[test]
    fn test_read_fatal_error_propagates() {
        let mut src = Script::new(vec![
            Ok(b"x".to_vec()),
            Err(io::ErrorKind::ConnectionReset.into()),
        ]);
        let mut buf = BoundedBuffer::new();

        let err = drain_readable(&mut src, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_write_completes_and_resets() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"hello\0world");
        let mut sink = Throttled {
            written: Vec::new(),
            budget: usize::MAX,
            chunk: 4,
        };

        assert_eq!(drain_writable(&mut sink, &mut buf).unwrap(), Flushed::Complete(11));
        assert_eq!(sink.written, b"hello\0world");
        assert_eq!(buf.has_space(), buf.capacity() - 1);
    }

    #[test]
    fn test_write_partial_then_resume() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"0123456789");
        let mut sink = Throttled {
            written: Vec::new(),
            budget: 6,
            chunk: 4,
        };

        assert_eq!(drain_writable(&mut sink, &mut buf).unwrap(), Flushed::Blocked(6));
        assert_eq!(buf.pending(), b"6789");

        sink.budget = 100;
        assert_eq!(drain_writable(&mut sink, &mut buf).unwrap(), Flushed::Complete(4));
        assert_eq!(sink.written, b"0123456789");
    }

    #[test]
    fn test_write_zero_is_error() {
        let mut buf = BoundedBuffer::new();
        buf.write(b"data");
        let mut sink: &mut [u8] = &mut [];

        let err = drain_writable(&mut sink, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(buf.has_data(), 4);
    }

    #[test]
    fn test_write_empty_buffer_completes() {
        let mut buf = BoundedBuffer::new();
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(drain_writable(&mut sink, &mut buf).unwrap(), Flushed::Complete(0));
    }
}
