//! Readiness registry: the edge-triggered event set shared by one loop.
//!
//! Wraps a mio `Poll` (epoll on Linux, kqueue on macOS). mio registrations
//! are always edge-triggered, so every handler must drain its source until
//! the OS reports would-block.
//!
//! One `Readiness` is created per event loop and passed to every component
//! explicitly; nothing here is process-global.

use crate::runtime::Error;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::time::Duration;
use tracing::debug;

/// Owned handle to the OS readiness set.
pub struct Readiness {
    poll: Poll,
}

impl Readiness {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            poll: Poll::new().map_err(Error::Registry)?,
        })
    }

    /// Start watching `source` for `interest`.
    pub fn add_interest<S>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .register(source, token, interest)
            .map_err(Error::Registry)
    }

    /// Replace the interest of an already registered `source`.
    ///
    /// Re-arming also re-reports readiness that is already pending, which is
    /// what lets a handler stop early on a full buffer and resume later.
    pub fn modify_interest<S>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .reregister(source, token, interest)
            .map_err(Error::Registry)
    }

    /// Stop watching `source`.
    pub fn remove_interest<S>(&self, source: &mut S) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .deregister(source)
            .map_err(Error::Registry)
    }

    /// Teardown variant of [`remove_interest`](Self::remove_interest).
    /// Failures are logged and otherwise ignored.
    pub fn release<S>(&self, source: &mut S)
    where
        S: Source + ?Sized,
    {
        if let Err(e) = self.poll.registry().deregister(source) {
            debug!(error = %e, "Deregister during teardown failed");
        }
    }

    /// Block until at least one registered source is ready.
    ///
    /// `timeout` of `None` waits indefinitely. Interrupted waits are retried.
    pub fn wait(&mut self, events: &mut Events, timeout: Option<Duration>) -> Result<(), Error> {
        loop {
            match self.poll.poll(events, timeout) {
                Ok(()) => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Registry(e)),
            }
        }
    }
}

/// Tracks the interest currently registered for one source.
///
/// `update` issues whichever of add/modify/remove moves the registration
/// to the wanted interest, and nothing when it already matches.
#[derive(Debug)]
pub struct Registration {
    token: Token,
    current: Option<Interest>,
}

impl Registration {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            current: None,
        }
    }

    /// Currently registered interest, if any.
    #[cfg(test)]
    fn interest(&self) -> Option<Interest> {
        self.current
    }

    pub fn update<S>(
        &mut self,
        readiness: &Readiness,
        source: &mut S,
        want: Option<Interest>,
    ) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        match (self.current, want) {
            (None, None) => {}
            (None, Some(interest)) => readiness.add_interest(source, self.token, interest)?,
            (Some(cur), Some(interest)) if cur == interest => {}
            (Some(_), Some(interest)) => readiness.modify_interest(source, self.token, interest)?,
            (Some(_), None) => readiness.remove_interest(source)?,
        }
        self.current = want;
        Ok(())
    }

    /// Drop the registration during teardown, tolerating failures.
    pub fn release<S>(&mut self, readiness: &Readiness, source: &mut S)
    where
        S: Source + ?Sized,
    {
        if self.current.take().is_some() {
            readiness.release(source);
        }
    }
}

/// Union of two optional interests.
pub fn combine(a: Option<Interest>, b: Option<Interest>) -> Option<Interest> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a | b),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream as StdUnixStream;

    fn pair() -> (mio::net::UnixStream, StdUnixStream) {
        let (a, b) = StdUnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        (mio::net::UnixStream::from_std(a), b)
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine(None, None), None);
        assert_eq!(combine(Some(Interest::READABLE), None), Some(Interest::READABLE));
        assert_eq!(combine(None, Some(Interest::WRITABLE)), Some(Interest::WRITABLE));
        assert_eq!(
            combine(Some(Interest::READABLE), Some(Interest::WRITABLE)),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }

    #[test]
    fn test_registration_transitions() {
        let readiness = Readiness::new().unwrap();
        let (mut stream, _peer) = pair();
        let mut reg = Registration::new(Token(7));

        reg.update(&readiness, &mut stream, Some(Interest::READABLE)).unwrap();
        assert_eq!(reg.interest(), Some(Interest::READABLE));

        // Same interest is a no-op
        reg.update(&readiness, &mut stream, Some(Interest::READABLE)).unwrap();

        reg.update(&readiness, &mut stream, Some(Interest::WRITABLE)).unwrap();
        assert_eq!(reg.interest(), Some(Interest::WRITABLE));

        reg.update(&readiness, &mut stream, None).unwrap();
        assert_eq!(reg.interest(), None);

        // Re-adding after removal must not fail as a double registration
        reg.update(&readiness, &mut stream, Some(Interest::READABLE)).unwrap();
        reg.release(&readiness, &mut stream);
        assert_eq!(reg.interest(), None);
    }

    #[test]
    fn test_modify_rearms_pending_readiness() {
        let mut readiness = Readiness::new().unwrap();
        let mut events = Events::with_capacity(8);
        let (mut stream, mut peer) = pair();
        let mut reg = Registration::new(Token(1));

        peer.write_all(b"x").unwrap();
        reg.update(&readiness, &mut stream, Some(Interest::READABLE)).unwrap();
        readiness.wait(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(1) && e.is_readable()));

        // Nothing was read; flipping interest away and back re-reports it
        reg.update(&readiness, &mut stream, Some(Interest::WRITABLE)).unwrap();
        reg.update(&readiness, &mut stream, Some(Interest::READABLE)).unwrap();
        readiness.wait(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(1) && e.is_readable()));
    }

    // kqueue ignores ENOENT on deregister, so this only holds for epoll.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_remove_unregistered_is_registry_error() {
        let readiness = Readiness::new().unwrap();
        let (mut stream, _peer) = pair();
        let err = readiness.remove_interest(&mut stream).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }
}
