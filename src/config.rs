//! Agent configuration from environment variables and positional arguments.
//!
//! Values are loaded from `HAL_AGENT_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HAL_AGENT_PORT` | 5001 | TCP port the runner connects to |
//! | `HAL_AGENT_SOCKET_DIR` | system temp dir | Where driver sockets are created |
//! | `HAL_AGENT_DRIVER_READY_TIMEOUT` | 10 | Seconds to wait for a launched driver, 1..=3600 |
//! | `HAL_AGENT_LOG` | info | Log filter |
//! | `HAL_AGENT_LOG_FORMAT` | pretty | `pretty` or `json` |
//! | `HAL_AGENT_LOG_FILE` | unset | Log file (stderr when unset) |
//!
//! # Positional Arguments
//!
//! `[<driver32> [<driver64>] [<spec-dir>]]` override the built-in driver
//! binary paths and interface spec directory.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ipc::protocol::Bitness;
use crate::telemetry::{LogConfig, LogFormat};

/// Well-known port the test runner connects to.
pub const DEFAULT_PORT: u16 = 5001;

pub const DEFAULT_DRIVER32_PATH: &str = "/data/local/tmp/32/hal_driver32";
pub const DEFAULT_DRIVER64_PATH: &str = "/data/local/tmp/64/hal_driver64";
pub const DEFAULT_SPEC_DIR: &str = "/data/local/tmp/spec";

/// Upper bound on `HAL_AGENT_DRIVER_READY_TIMEOUT`, in seconds.
pub const MAX_DRIVER_READY_TIMEOUT_SECS: u64 = 3600;

/// Most positional arguments the agent accepts.
pub const MAX_POSITIONAL_ARGS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("Too many arguments: got {got}, at most {max} accepted")]
    TooManyArguments { got: usize, max: usize },
}

/// Driver binaries and the interface spec directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPaths {
    pub driver32: PathBuf,
    pub driver64: PathBuf,
    pub spec_dir: PathBuf,
}

impl Default for DriverPaths {
    fn default() -> Self {
        Self {
            driver32: PathBuf::from(DEFAULT_DRIVER32_PATH),
            driver64: PathBuf::from(DEFAULT_DRIVER64_PATH),
            spec_dir: PathBuf::from(DEFAULT_SPEC_DIR),
        }
    }
}

impl DriverPaths {
    /// Apply positional arguments (program name excluded) over the defaults.
    pub fn from_args(args: &[String]) -> Result<Self, UsageError> {
        if args.len() > MAX_POSITIONAL_ARGS {
            return Err(UsageError::TooManyArguments {
                got: args.len(),
                max: MAX_POSITIONAL_ARGS,
            });
        }

        let mut paths = Self::default();
        if let Some(p) = args.first() {
            paths.driver32 = PathBuf::from(p);
        }
        if let Some(p) = args.get(1) {
            paths.driver64 = PathBuf::from(p);
        }
        if let Some(p) = args.get(2) {
            paths.spec_dir = PathBuf::from(p);
        }
        Ok(paths)
    }

    pub fn driver_for(&self, bitness: Bitness) -> &PathBuf {
        match bitness {
            Bitness::Bits32 => &self.driver32,
            Bitness::Bits64 => &self.driver64,
        }
    }
}

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub port: u16,
    pub drivers: DriverPaths,
    pub socket_dir: PathBuf,
    pub driver_ready_timeout: Duration,
    pub log: LogConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            drivers: DriverPaths::default(),
            socket_dir: std::env::temp_dir(),
            driver_ready_timeout: Duration::from_secs(10),
            log: LogConfig::default(),
        }
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u16` env var, returning `default` on missing or invalid.
fn parse_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u16>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load logging configuration from environment.
pub fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("HAL_AGENT_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = std::env::var("HAL_AGENT_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(defaults.format);
    let output_path = std::env::var_os("HAL_AGENT_LOG_FILE").map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> AgentConfig {
    let defaults = AgentConfig::default();

    let port = parse_u16("HAL_AGENT_PORT", DEFAULT_PORT);
    let port = if port == 0 { DEFAULT_PORT } else { port };
    let socket_dir = std::env::var_os("HAL_AGENT_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.socket_dir);
    let ready_secs =
        parse_u64("HAL_AGENT_DRIVER_READY_TIMEOUT", 10).clamp(1, MAX_DRIVER_READY_TIMEOUT_SECS);

    AgentConfig {
        port,
        drivers: defaults.drivers,
        socket_dir,
        driver_ready_timeout: Duration::from_secs(ready_secs),
        log: load_log_config(),
    }
}
