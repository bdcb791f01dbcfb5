//! Single-threaded readiness runtime.
//!
//! Two front-ends share the same building blocks:
//! - `echo`: accepts many connections and echoes their bytes back
//! - `relay`: relays a local terminal to one remote peer
//!
//! Shared abstractions:
//! - `BoundedBuffer`: Per-connection fixed-capacity byte buffer
//! - `Readiness` / `Registration`: Edge-triggered interest management
//! - `drain`: Read/write-until-would-block handlers

pub mod buffer;
pub mod connection;
pub mod drain;
pub mod echo;
mod error;
pub mod registry;
pub mod relay;

pub use buffer::{BoundedBuffer, ResetError, BUFFER_CAPACITY};
pub use error::Error;
pub use registry::{Readiness, Registration};

use crate::config::{Config, Mode};

/// Run the front-end selected by the configuration.
pub fn run(config: &Config) -> Result<(), Error> {
    match config.mode {
        Mode::Server { listen } => echo::run(listen, config),
        Mode::Client { peer } => relay::run(peer, config),
    }
}
