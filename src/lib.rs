//! edge-echo: single-threaded edge-triggered networking
//!
//! Two modes share one readiness runtime:
//! - `server`: accepts many TCP connections and echoes their bytes back
//! - `client`: relays the terminal to one remote peer with half-close
//!
//! Features:
//! - One thread, one edge-triggered readiness loop (epoll/kqueue)
//! - Bounded per-connection buffers with back-pressure
//! - Configuration via CLI arguments or TOML file

pub mod config;
pub mod runtime;
