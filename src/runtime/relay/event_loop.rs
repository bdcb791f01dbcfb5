//! Relay event loop: local input/output ⇄ one remote peer.
//!
//! Two buffers, four readiness sources:
//!
//! ```text
//! local input --(readable)--> outbound --(socket writable)--> remote
//! local output <--(writable)-- inbound <--(socket readable)-- remote
//! ```
//!
//! A source is registered only while its buffer can make progress: read
//! sources while the buffer has space, write sources while it has data.
//! Interest is recomputed after every batch of events.

use crate::runtime::drain::{drain_readable, drain_writable, Filled, Flushed};
use crate::runtime::registry::combine;
use crate::runtime::{BoundedBuffer, Error, Readiness, Registration};
use mio::net::TcpStream;
use mio::unix::SourceFd;
use mio::{Events, Interest, Token};
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::io::AsRawFd;
use tracing::{debug, trace};

const SOCKET: Token = Token(0);
const LOCAL_INPUT: Token = Token(1);
const LOCAL_OUTPUT: Token = Token(2);

/// Half-close progress of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Both directions live.
    Open,
    /// Local input ended and the socket's write half has been shut down.
    LocalHalfClosed,
    /// The remote also ended; the session is over.
    Closed,
}

/// A relay session between local endpoints and one connected stream.
pub struct Relay<I, O> {
    readiness: Readiness,
    event_capacity: usize,
    stream: TcpStream,
    input: I,
    output: O,
    /// Local input waiting to be sent.
    outbound: BoundedBuffer,
    /// Remote data waiting to be written locally.
    inbound: BoundedBuffer,
    state: RelayState,
    input_eof: bool,
    remote_eof: bool,
    socket_reg: Registration,
    input_reg: Registration,
    output_reg: Registration,
}

impl<I, O> Relay<I, O>
where
    I: Read + AsRawFd,
    O: Write + AsRawFd,
{
    /// `stream`, `input` and `output` must all be in non-blocking mode.
    pub fn new(
        stream: TcpStream,
        input: I,
        output: O,
        event_capacity: usize,
    ) -> Result<Self, Error> {
        Ok(Self {
            readiness: Readiness::new()?,
            event_capacity: event_capacity.max(1),
            stream,
            input,
            output,
            outbound: BoundedBuffer::new(),
            inbound: BoundedBuffer::new(),
            state: RelayState::Open,
            input_eof: false,
            remote_eof: false,
            socket_reg: Registration::new(SOCKET),
            input_reg: Registration::new(LOCAL_INPUT),
            output_reg: Registration::new(LOCAL_OUTPUT),
        })
    }

    #[cfg(test)]
    fn state(&self) -> RelayState {
        self.state
    }

    /// Relay until both sides have ended.
    ///
    /// Returns `Err(Error::PeerTerminated)` if the remote closes before local
    /// input does. Remote data already received is written out first.
    pub fn run(mut self) -> Result<(), Error> {
        let result = self.event_loop();
        self.teardown();
        result
    }

    fn event_loop(&mut self) -> Result<(), Error> {
        let mut events = Events::with_capacity(self.event_capacity);
        self.sync_interest()?;

        loop {
            self.readiness.wait(&mut events, None)?;

            for event in events.iter() {
                match event.token() {
                    LOCAL_INPUT => self.on_input_readable()?,
                    SOCKET => {
                        if event.is_writable() || event.is_write_closed() || event.is_error() {
                            self.on_socket_writable()?;
                        }
                        if event.is_readable() || event.is_read_closed() || event.is_error() {
                            self.on_socket_readable()?;
                        }
                    }
                    LOCAL_OUTPUT => self.on_output_writable()?,
                    _ => {}
                }
            }

            self.advance()?;
            if let Some(result) = self.finished() {
                return result;
            }
            self.sync_interest()?;
        }
    }

    fn on_input_readable(&mut self) -> Result<(), Error> {
        if self.input_eof {
            return Ok(());
        }
        match drain_readable(&mut self.input, &mut self.outbound)? {
            Filled::NoSpace => {}
            Filled::Data(n) => trace!(bytes = n, "Read local input"),
            Filled::Eof(n) => {
                trace!(bytes = n, "Read local input");
                debug!("Local input reached end-of-stream");
                self.input_eof = true;
            }
        }
        Ok(())
    }

    fn on_socket_writable(&mut self) -> Result<(), Error> {
        if self.outbound.has_data() == 0 {
            return Ok(());
        }
        match drain_writable(&mut self.stream, &mut self.outbound)? {
            Flushed::Complete(n) | Flushed::Blocked(n) => trace!(bytes = n, "Sent to peer"),
        }
        Ok(())
    }

    fn on_socket_readable(&mut self) -> Result<(), Error> {
        if self.remote_eof {
            return Ok(());
        }
        match drain_readable(&mut self.stream, &mut self.inbound)? {
            Filled::NoSpace => {}
            Filled::Data(n) => trace!(bytes = n, "Received from peer"),
            Filled::Eof(n) => {
                trace!(bytes = n, "Received from peer");
                debug!("Peer reached end-of-stream");
                self.remote_eof = true;
            }
        }
        Ok(())
    }

    fn on_output_writable(&mut self) -> Result<(), Error> {
        if self.inbound.has_data() == 0 {
            return Ok(());
        }
        match drain_writable(&mut self.output, &mut self.inbound)? {
            Flushed::Complete(n) | Flushed::Blocked(n) => trace!(bytes = n, "Wrote local output"),
        }
        Ok(())
    }

    /// Shut down the socket's write half once local input has ended and
    /// everything read from it has been sent.
    fn advance(&mut self) -> Result<(), Error> {
        if self.state == RelayState::Open && self.input_eof && self.outbound.has_data() == 0 {
            self.stream.shutdown(Shutdown::Write)?;
            self.state = RelayState::LocalHalfClosed;
            debug!("Shut down write half");
        }
        Ok(())
    }

    /// Terminal outcome, once the remote has ended and its data is written.
    fn finished(&mut self) -> Option<Result<(), Error>> {
        if !self.remote_eof || self.inbound.has_data() > 0 {
            return None;
        }
        match self.state {
            RelayState::LocalHalfClosed => {
                self.state = RelayState::Closed;
                Some(Ok(()))
            }
            RelayState::Open if !self.input_eof => Some(Err(Error::PeerTerminated)),
            // Local input ended but outbound bytes are still being sent
            RelayState::Open => None,
            RelayState::Closed => Some(Ok(())),
        }
    }

    fn sync_interest(&mut self) -> Result<(), Error> {
        let input =
            (!self.input_eof && self.outbound.has_space() > 0).then_some(Interest::READABLE);
        let socket_read =
            (!self.remote_eof && self.inbound.has_space() > 0).then_some(Interest::READABLE);
        let socket_write = (self.outbound.has_data() > 0).then_some(Interest::WRITABLE);
        let output = (self.inbound.has_data() > 0).then_some(Interest::WRITABLE);

        let input_fd = self.input.as_raw_fd();
        let output_fd = self.output.as_raw_fd();

        self.input_reg
            .update(&self.readiness, &mut SourceFd(&input_fd), input)?;
        self.socket_reg.update(
            &self.readiness,
            &mut self.stream,
            combine(socket_read, socket_write),
        )?;
        self.output_reg
            .update(&self.readiness, &mut SourceFd(&output_fd), output)?;
        Ok(())
    }

    fn teardown(&mut self) {
        let input_fd = self.input.as_raw_fd();
        let output_fd = self.output.as_raw_fd();

        self.input_reg
            .release(&self.readiness, &mut SourceFd(&input_fd));
        self.socket_reg.release(&self.readiness, &mut self.stream);
        self.output_reg
            .release(&self.readiness, &mut SourceFd(&output_fd));
    }
}
