//! Configuration module for the tchat binary.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.
//!
//! The automatic `-h` short flag of the help output is disabled because the
//! chat CLI historically uses `-h` for the server host; `--help` stays
//! available.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the chat binary.
#[derive(Parser, Debug)]
#[command(name = "tchat")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP chat server and client", long_about = None)]
#[command(disable_help_flag = true)]
pub struct CliArgs {
    /// Run as server (without this flag the binary runs as client)
    #[arg(short = 's', long = "server")]
    pub server: bool,

    /// Host to bind (server) or connect to (client)
    #[arg(short = 'h', long = "host")]
    pub host: Option<String>,

    /// TCP port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Server scheduling strategy
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeType>,

    /// Path to TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print help
    #[arg(long, action = clap::ArgAction::HelpLong)]
    pub help: Option<bool>,
}

/// Server scheduling strategies; equivalent external behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// Readiness-polling event loop on one thread (mio).
    Poll,
    /// One cooperative task per connection (tokio, current-thread).
    Tasks,
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
    /// Host to bind or connect to
    #[serde(default)]
    pub host: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheduling strategy
    pub runtime: Option<RuntimeType>,
    /// Maximum number of simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            runtime: None,
            max_connections: default_max_connections(),
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

fn default_port() -> u16 {
    3030
}

fn default_max_connections() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: bool,
    pub host: String,
    pub port: u16,
    pub runtime: RuntimeType,
    pub max_connections: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = match CliArgs::try_parse() {
            Ok(cli) => cli,
            Err(e)
                if matches!(
                    e.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                let _ = e.print();
                std::process::exit(0);
            }
            Err(e) => return Err(ConfigError::Cli(e)),
        };

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            server: cli.server,
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            runtime: cli
                .runtime
                .or(toml_config.server.runtime)
                .unwrap_or(RuntimeType::Poll),
            max_connections: toml_config.server.max_connections,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Cli(clap::Error),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Cli(e) => write!(f, "{e}"),
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "");
        assert_eq!(config.server.port, 3030);
        assert_eq!(config.server.max_connections, 1024);
        assert!(config.server.runtime.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 4040
            runtime = "tasks"
            max_connections = 64

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4040);
        assert_eq!(config.server.runtime, Some(RuntimeType::Tasks));
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_flags() {
        let cli =
            CliArgs::try_parse_from(["tchat", "-s", "-h", "example.org", "-p", "4242"]).unwrap();
        assert!(cli.server);
        assert_eq!(cli.host.as_deref(), Some("example.org"));
        assert_eq!(cli.port, Some(4242));
    }

    #[test]
    fn test_cli_log_level_absent_vs_explicit() {
        // An explicit `--log-level info` must stay distinguishable from the
        // flag being absent, so it can override a TOML-configured level.
        let cli = CliArgs::try_parse_from(["tchat"]).unwrap();
        assert_eq!(cli.log_level, None);

        let cli = CliArgs::try_parse_from(["tchat", "--log-level", "info"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_cli_rejects_flag_without_value() {
        assert!(CliArgs::try_parse_from(["tchat", "-p"]).is_err());
        assert!(CliArgs::try_parse_from(["tchat", "-h"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(CliArgs::try_parse_from(["tchat", "--bogus"]).is_err());
    }
}
