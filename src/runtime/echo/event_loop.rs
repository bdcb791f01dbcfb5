//! mio event loop for the echo server.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking read/write syscalls until they would block.
//!
//! ## Failure Scope
//!
//! Registry failures, listener setup and non-transient accept errors end
//! the loop. I/O errors on one connection close only that connection.

use crate::config::Config;
use crate::runtime::connection::{Connection, ConnectionTable, Next};
use crate::runtime::{Error, Readiness};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Pending-connection queue length for the listener.
const LISTEN_BACKLOG: i32 = 5;

/// Single-threaded echo server.
pub struct EchoServer {
    readiness: Readiness,
    events: Events,
    listener: TcpListener,
    connections: ConnectionTable<TcpStream>,
}

impl EchoServer {
    /// Bind the listener and register it for read readiness.
    pub fn bind(addr: SocketAddr, config: &Config) -> Result<Self, Error> {
        let readiness = Readiness::new()?;
        let listener = create_listener(addr).map_err(Error::Listen)?;
        let mut listener = TcpListener::from_std(listener);
        readiness.add_interest(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        info!(
            addr = %addr,
            max_connections = config.max_connections,
            event_capacity = config.event_capacity,
            "Echo server listening"
        );

        Ok(Self {
            readiness,
            events: Events::with_capacity(config.event_capacity.max(1)),
            listener,
            connections: ConnectionTable::new(config.max_connections),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr().map_err(Error::Listen)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serve until a fatal error occurs.
    pub fn run(mut self) -> Result<(), Error> {
        loop {
            self.turn(None)?;
        }
    }

    /// Wait for readiness once and dispatch every returned event in order.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let Self {
            readiness,
            events,
            listener,
            connections,
        } = self;

        readiness.wait(events, timeout)?;

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept_connections(listener, readiness, connections)?,
                Token(conn_id) => {
                    let Some(conn) = connections.get_mut(conn_id) else {
                        continue;
                    };

                    match handle_connection_event(conn, event, readiness) {
                        Ok(Next::Keep) => {}
                        Ok(Next::Close) => close_connection(readiness, connections, conn_id),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            debug!(conn_id, error = %e, "Connection error");
                            close_connection(readiness, connections, conn_id);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Accept until the listener would block.
///
/// Edge-triggered: connections already queued when the event fired are not
/// announced again, so all of them must be taken now.
fn accept_connections(
    listener: &TcpListener,
    readiness: &Readiness,
    connections: &mut ConnectionTable<TcpStream>,
) -> Result<(), Error> {
    loop {
        match listener.accept() {
            // mio hands back streams already in non-blocking mode
            Ok((stream, peer)) => {
                if !connections.has_room() {
                    warn!(peer = %peer, "Connection limit reached, dropping connection");
                    continue;
                }

                let conn_id = connections.next_id();
                let mut conn = Connection::new(stream, Token(conn_id));
                conn.open(readiness)?;
                let inserted = connections.insert(conn);
                debug_assert_eq!(inserted, Some(conn_id));

                debug!(conn_id, peer = %peer, "Accepted connection");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if is_transient_accept_error(e) => {
                trace!(error = %e, "Transient accept error");
            }
            Err(e) => return Err(Error::Accept(e)),
        }
    }
    Ok(())
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    ) || e.raw_os_error() == Some(libc::EPROTO)
}

fn handle_connection_event(
    conn: &mut Connection<TcpStream>,
    event: &Event,
    readiness: &Readiness,
) -> Result<Next, Error> {
    // Error and hang-up conditions are surfaced by the next read or write
    if (event.is_readable() || event.is_read_closed() || event.is_error())
        && conn.on_readable(readiness)? == Next::Close
    {
        return Ok(Next::Close);
    }

    if event.is_writable() || event.is_write_closed() || event.is_error() {
        return conn.on_writable(readiness);
    }

    Ok(Next::Keep)
}

fn close_connection(
    readiness: &Readiness,
    connections: &mut ConnectionTable<TcpStream>,
    conn_id: usize,
) {
    if let Some(mut conn) = connections.remove(conn_id) {
        if conn.pending() > 0 {
            debug!(conn_id, pending = conn.pending(), "Discarding unsent echo");
        }
        conn.teardown(readiness);
        debug!(conn_id, peer_closed = conn.peer_closed(), "Connection closed");
    }
}

/// Create a non-blocking IPv4/IPv6 TCP listener.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
