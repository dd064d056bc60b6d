//! tchat: a line-oriented TCP chat server and client.
//!
//! One binary, two roles:
//! - `tchat -s` runs the server, multiplexing every peer on a single logical
//!   thread (readiness polling by default, cooperative tasks with
//!   `--runtime tasks`);
//! - `tchat` runs the interactive client.
//!
//! Features:
//! - 100-byte wire chunks with per-line sender headers
//! - slash commands (`/pseudo`, `/help`, `/?`) with arity checking
//! - broadcast fan-out through per-connection outbound queues
//! - configuration via CLI arguments or TOML file

mod chat;
mod client;
mod config;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        server = config.server,
        runtime = ?config.runtime,
        "Starting tchat"
    );

    if config.server {
        runtime::run(config)?;
    } else {
        client::run(config)?;
    }

    Ok(())
}
