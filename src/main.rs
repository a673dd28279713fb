//! HAL test agent entry point.
//!
//! ```text
//! hal-test-agent [<driver32> [<driver64>] [<spec-dir>]]
//! ```
//!
//! Changes into the directory holding the executable, then listens for test
//! runner connections and forks one session process per connection.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hal_test_agent::config::{self, DriverPaths};
use hal_test_agent::telemetry;
use hal_test_agent::Agent;
use tracing::{error, info};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("hal-test-agent");
    let positional = args.get(1..).unwrap_or_default();

    match positional.first().map(String::as_str) {
        Some("help" | "--help" | "-h") => {
            print_usage(program);
            return ExitCode::SUCCESS;
        }
        Some("version" | "--version" | "-V") => {
            println!("hal-test-agent {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let drivers = match DriverPaths::from_args(positional) {
        Ok(drivers) => drivers,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(program);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = enter_executable_dir(program) {
        eprintln!("Failed to change to executable directory: {}", e);
        return ExitCode::FAILURE;
    }

    let mut config = config::load();
    config.drivers = drivers;

    if let Err(e) = telemetry::init_logging(&config.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        port = config.port,
        driver32 = %config.drivers.driver32.display(),
        driver64 = %config.drivers.driver64.display(),
        spec_dir = %config.drivers.spec_dir.display(),
        "starting agent"
    );

    match Agent::new(config).run() {
        Ok(never) => match never {},
        Err(e) => {
            error!(error = %e, "agent stopped");
            eprintln!("Agent error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn enter_executable_dir(program: &str) -> std::io::Result<()> {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from(program));
    match exe.parent() {
        Some(dir) if dir != Path::new("") => std::env::set_current_dir(dir),
        _ => Ok(()),
    }
}

fn print_usage(program: &str) {
    eprintln!(
        "HAL test agent v{version}

USAGE:
    {program} [<driver32> [<driver64>] [<spec-dir>]]

ARGUMENTS:
    driver32   32-bit driver binary (default: {d32})
    driver64   64-bit driver binary (default: {d64})
    spec-dir   Interface spec directory (default: {spec})

ENVIRONMENT:
    HAL_AGENT_PORT                  Listening port (default: {port})
    HAL_AGENT_SOCKET_DIR            Directory for driver sockets
    HAL_AGENT_DRIVER_READY_TIMEOUT  Seconds to wait for a launched driver
    HAL_AGENT_LOG                   Log filter (debug, info, warn, error)
    HAL_AGENT_LOG_FORMAT            pretty or json
    HAL_AGENT_LOG_FILE              Log to this file instead of stderr",
        version = env!("CARGO_PKG_VERSION"),
        program = program,
        d32 = config::DEFAULT_DRIVER32_PATH,
        d64 = config::DEFAULT_DRIVER64_PATH,
        spec = config::DEFAULT_SPEC_DIR,
        port = config::DEFAULT_PORT,
    );
}
