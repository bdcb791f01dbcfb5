//! Runtime error taxonomy.
//!
//! Transient conditions (would-block, interrupted) never surface here; the
//! drain handlers swallow them. What remains is either scoped to a single
//! connection or fatal for the whole event loop.

use std::fmt;
use std::io;

/// Errors produced by the event loops.
#[derive(Debug)]
pub enum Error {
    /// A readiness registry call failed. Always fatal.
    Registry(io::Error),
    /// Creating, binding or listening on the listener socket failed.
    Listen(io::Error),
    /// Accept failed with something other than a transient error.
    Accept(io::Error),
    /// I/O on a single connection failed.
    Io(io::Error),
    /// The relay peer closed its side before local input ended.
    PeerTerminated,
}

impl Error {
    /// Whether the error ends the event loop rather than one connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registry(e) => write!(f, "readiness registry error: {e}"),
            Error::Listen(e) => write!(f, "listen error: {e}"),
            Error::Accept(e) => write!(f, "accept error: {e}"),
            Error::Io(e) => write!(f, "{e}"),
            Error::PeerTerminated => write!(f, "server terminated unexpectedly"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Registry(e) | Error::Listen(e) | Error::Accept(e) | Error::Io(e) => Some(e),
            Error::PeerTerminated => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
