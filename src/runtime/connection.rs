//! Echo connection state machine.
//!
//! A connection alternates between read interest and write interest and
//! never holds both: bytes are read into its buffer until the socket is
//! drained, then interest flips to write until the buffer is echoed back.
//!
//! If the peer sends end-of-stream while bytes are still buffered, the echo
//! is flushed first and the connection closes once the buffer is empty.

use crate::runtime::drain::{drain_readable, drain_writable, Filled, Flushed};
use crate::runtime::{BoundedBuffer, Error, Readiness, Registration};
use mio::event::Source;
use mio::{Interest, Token};
use slab::Slab;
use std::io::{Read, Write};
use tracing::trace;

/// Current interest of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Registered for read readiness.
    Reading,
    /// Registered for write readiness; buffer holds the pending echo.
    Writing,
    /// Connection is being closed.
    Closing,
}

/// What the event loop should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Keep,
    Close,
}

/// A single echo connection.
///
/// Owns its stream and its buffer; no buffer is ever shared between two
/// connections.
#[derive(Debug)]
pub struct Connection<S> {
    /// Non-blocking stream.
    pub stream: S,
    /// Current connection state.
    pub state: ConnState,
    buffer: BoundedBuffer,
    registration: Registration,
    /// Peer has sent end-of-stream.
    peer_closed: bool,
}

impl<S> Connection<S>
where
    S: Read + Write + Source,
{
    /// Create a connection in the accepted state. Call [`open`](Self::open)
    /// to register it.
    pub fn new(stream: S, token: Token) -> Self {
        Self {
            stream,
            state: ConnState::Reading,
            buffer: BoundedBuffer::new(),
            registration: Registration::new(token),
            peer_closed: false,
        }
    }

    /// Register the connection for read readiness.
    pub fn open(&mut self, readiness: &Readiness) -> Result<(), Error> {
        self.registration
            .update(readiness, &mut self.stream, Some(Interest::READABLE))?;
        self.state = ConnState::Reading;
        Ok(())
    }

    /// Bytes waiting to be echoed.
    pub fn pending(&self) -> usize {
        self.buffer.has_data()
    }

    /// Whether the peer has already sent end-of-stream.
    pub(crate) fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Handle read readiness.
    pub fn on_readable(&mut self, readiness: &Readiness) -> Result<Next, Error> {
        if self.state != ConnState::Reading {
            return Ok(Next::Keep);
        }

        match drain_readable(&mut self.stream, &mut self.buffer)? {
            // Buffer still full from a previous cycle; the write side frees it
            Filled::NoSpace | Filled::Data(0) => Ok(Next::Keep),
            Filled::Data(n) => {
                trace!(bytes = n, "Drained readable");
                self.start_writing(readiness)?;
                Ok(Next::Keep)
            }
            Filled::Eof(n) => {
                trace!(bytes = n, "Peer sent end-of-stream");
                self.peer_closed = true;
                if self.buffer.has_data() == 0 {
                    return Ok(self.close());
                }
                self.start_writing(readiness)?;
                Ok(Next::Keep)
            }
        }
    }

    /// Handle write readiness.
    pub fn on_writable(&mut self, readiness: &Readiness) -> Result<Next, Error> {
        if self.state != ConnState::Writing {
            return Ok(Next::Keep);
        }

        match drain_writable(&mut self.stream, &mut self.buffer)? {
            // Send buffer full: keep write interest and wait for the next edge
            Flushed::Blocked(n) => {
                trace!(bytes = n, pending = self.buffer.has_data(), "Write blocked");
                Ok(Next::Keep)
            }
            Flushed::Complete(n) => {
                trace!(bytes = n, "Echo flushed");
                if self.peer_closed {
                    return Ok(self.close());
                }
                self.start_reading(readiness)?;
                Ok(Next::Keep)
            }
        }
    }

    /// Deregister the stream. Failures are tolerated at this point.
    pub fn teardown(&mut self, readiness: &Readiness) {
        self.registration.release(readiness, &mut self.stream);
        self.state = ConnState::Closing;
    }

    fn start_writing(&mut self, readiness: &Readiness) -> Result<(), Error> {
        self.registration
            .update(readiness, &mut self.stream, Some(Interest::WRITABLE))?;
        self.state = ConnState::Writing;
        Ok(())
    }

    fn start_reading(&mut self, readiness: &Readiness) -> Result<(), Error> {
        self.registration
            .update(readiness, &mut self.stream, Some(Interest::READABLE))?;
        self.state = ConnState::Reading;
        Ok(())
    }

    fn close(&mut self) -> Next {
        self.state = ConnState::Closing;
        Next::Close
    }
}

/// Table of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove; the slab key doubles as the
/// connection's readiness token.
#[derive(Debug)]
pub struct ConnectionTable<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionTable<S> {
    /// Create a new table with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Whether another connection can be inserted.
    pub fn has_room(&self) -> bool {
        self.connections.len() < self.max_connections
    }

    /// Key the next inserted connection will receive.
    pub fn next_id(&self) -> usize {
        self.connections.vacant_key()
    }

    /// Insert a connection.
    ///
    /// Returns `None` if the table is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Option<usize> {
        if !self.has_room() {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the table.
    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    #[cfg(test)]
    fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
