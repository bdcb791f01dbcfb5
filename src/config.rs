//! Configuration module for edge-echo.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "edge-echo")]
#[command(author = "edge-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "Edge-triggered TCP echo server and terminal relay", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every byte back to its sender
    Server {
        /// Port to listen on
        port: Option<u16>,

        /// Maximum number of simultaneous connections
        #[arg(short = 'm', long)]
        max_connections: Option<usize>,
    },
    /// Relay standard input/output to a remote peer
    Client {
        /// Peer IPv4 or IPv6 address
        addr: String,

        /// Peer port
        port: u16,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Readiness events fetched per wait
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    9877
}

fn default_max_connections() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which front-end to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Echo server bound to `listen`.
    Server { listen: SocketAddr },
    /// Terminal relay connected to `peer`.
    Client { peer: SocketAddr },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub max_connections: usize,
    pub event_capacity: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli.command, cli.log_level, toml_config)
    }

    fn merge(
        command: Command,
        log_level: Option<String>,
        toml_config: TomlConfig,
    ) -> Result<Self, ConfigError> {
        let server = toml_config.server;
        let mut max_connections = server.max_connections;

        let mode = match command {
            Command::Server {
                port,
                max_connections: cli_max,
            } => {
                max_connections = cli_max.unwrap_or(max_connections);
                Mode::Server {
                    listen: SocketAddr::new(server.host, port.unwrap_or(server.port)),
                }
            }
            Command::Client { addr, port } => {
                let ip: IpAddr = addr
                    .parse()
                    .map_err(|_| ConfigError::InvalidAddress(addr.clone()))?;
                Mode::Client {
                    peer: SocketAddr::new(ip, port),
                }
            }
        };

        if max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1"));
        }
        if server.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1"));
        }

        Ok(Config {
            mode,
            max_connections,
            event_capacity: server.event_capacity,
            log_level: log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidAddress(String),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidAddress(addr) => {
                write!(f, "Invalid peer address '{addr}'")
            }
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
