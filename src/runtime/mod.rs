//! Server multiplexing runtimes.
//!
//! Two interchangeable scheduling strategies sit behind the same contract:
//! - `poll`: readiness-based event loop on a single thread (mio);
//! - `tasks`: one cooperative task per connection (tokio, current-thread).
//!
//! Both drive the same chat engine (`crate::chat`) and reproduce the same
//! connection lifecycle: welcome on accept, departure broadcast on
//! zero-length read, I/O error, or peer close.

pub mod poll;
pub mod tasks;

use crate::config::{Config, RuntimeType};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;

/// Run the server with the configured scheduling strategy.
pub fn run(config: Config) -> Result<(), StartupError> {
    match config.runtime {
        RuntimeType::Poll => {
            info!("Using readiness-polling runtime (mio)");
            poll::run(config)
        }
        RuntimeType::Tasks => {
            info!("Using cooperative-task runtime (tokio)");
            tasks::run(config)
        }
    }
}

/// Resolve a host/port pair, preferring IPv4 like the historical protocol.
///
/// An empty host falls back to `default_host` (all interfaces server-side,
/// loopback client-side).
pub fn resolve_addr(host: &str, port: u16, default_host: &str) -> Result<SocketAddr, StartupError> {
    let host = if host.is_empty() { default_host } else { host };
    let mut candidates = (host, port)
        .to_socket_addrs()
        .map_err(|_| StartupError::Resolution {
            host: host.to_string(),
            port,
        })?
        .collect::<Vec<_>>();
    candidates.sort_by_key(|addr| !addr.is_ipv4());
    candidates.into_iter().next().ok_or(StartupError::Resolution {
        host: host.to_string(),
        port,
    })
}

/// Fatal startup failures; everything past startup recovers locally.
#[derive(Debug)]
pub enum StartupError {
    /// Address lookup failed.
    Resolution { host: String, port: u16 },
    /// The listening socket could not be created or bound.
    Bind(SocketAddr, io::Error),
    /// The multiplexing loop itself failed.
    Io(io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Resolution { host, port } => {
                write!(f, "Impossible de résoudre l'adresse {host}:{port}")
            }
            StartupError::Bind(addr, e) => write!(f, "Failed to bind {addr}: {e}"),
            StartupError::Io(e) => write!(f, "Server I/O failure: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<io::Error> for StartupError {
    fn from(e: io::Error) -> Self {
        StartupError::Io(e)
    }
}
