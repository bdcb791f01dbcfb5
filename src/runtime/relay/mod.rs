//! Terminal relay client.
//!
//! Connects to one peer and relays standard input to it and its replies to
//! standard output, all from a single readiness loop.
//!
//! Standard input and output are driven through duplicated descriptors so
//! no userspace buffering sits between the loop and the kernel; bytes held
//! in such a buffer would never be announced by an edge-triggered event.
//! Both must be pollable (terminal, pipe or socket); regular files are
//! rejected by the registry.

mod event_loop;

pub use event_loop::{Relay, RelayState};

use crate::config::Config;
use crate::runtime::Error;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsFd, AsRawFd, RawFd};
use tracing::{debug, info};

/// Connect to `peer` and relay standard input/output until both sides end.
pub fn run(peer: SocketAddr, config: &Config) -> Result<(), Error> {
    let stream = std::net::TcpStream::connect(peer)?;
    info!(
        peer = %peer,
        local = %stream.local_addr()?,
        "Connected to peer"
    );
    stream.set_nonblocking(true)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let input = File::from(stdin.as_fd().try_clone_to_owned()?);
    let output = File::from(stdout.as_fd().try_clone_to_owned()?);

    // Duplicates share file status flags with the originals, so setting
    // O_NONBLOCK through fd 0/1 covers both. Restored on drop.
    let _stdin_mode = NonBlocking::enable(stdin.as_raw_fd())?;
    let _stdout_mode = NonBlocking::enable(stdout.as_raw_fd())?;

    let relay = Relay::new(
        mio::net::TcpStream::from_std(stream),
        input,
        output,
        config.event_capacity,
    )?;
    relay.run()
}

/// Puts a descriptor in non-blocking mode and restores its original file
/// status flags when dropped.
struct NonBlocking {
    fd: RawFd,
    original: libc::c_int,
}

impl NonBlocking {
    fn enable(fd: RawFd) -> io::Result<Self> {
        // SAFETY: F_GETFL only reads descriptor flags.
        let original = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if original < 0 {
            return Err(io::Error::last_os_error());
        }
        if original & libc::O_NONBLOCK == 0 {
            // SAFETY: F_SETFL with flags derived from F_GETFL.
            if unsafe { libc::fcntl(fd, libc::F_SETFL, original | libc::O_NONBLOCK) } < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { fd, original })
    }
}

impl Drop for NonBlocking {
    fn drop(&mut self) {
        // SAFETY: restores the flags read in `enable` on the same descriptor.
        if unsafe { libc::fcntl(self.fd, libc::F_SETFL, self.original) } < 0 {
            debug!(fd = self.fd, error = %io::Error::last_os_error(), "Failed to restore fd flags");
        }
    }
}
