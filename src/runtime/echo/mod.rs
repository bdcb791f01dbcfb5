//! Edge-triggered echo server.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS). One
//! thread accepts every connection and echoes each one's bytes back to it.

mod event_loop;

pub use event_loop::EchoServer;

use crate::config::Config;
use crate::runtime::Error;
use std::net::SocketAddr;

/// Bind `addr` and serve until a fatal error occurs.
pub fn run(addr: SocketAddr, config: &Config) -> Result<(), Error> {
    EchoServer::bind(addr, config)?.run()
}
