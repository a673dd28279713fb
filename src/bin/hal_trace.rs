//! Offline trace tool.
//!
//! ```text
//! hal-trace replay <trace> [--driver PATH] [--spec-dir DIR] [--service FQNAME=SERVICE]...
//! hal-trace services <trace>
//! hal-trace cleanup <trace>
//! hal-trace dump <trace>
//! ```
//!
//! Exit codes: 0 success, 1 failure, 2 usage error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hal_test_agent::config;
use hal_test_agent::drivers::{
    DriverTable, HalCategory, LaunchSpec, RemoteDriver, ServiceInstanceKey,
};
use hal_test_agent::telemetry;
use hal_test_agent::trace::{
    cleanup_trace, list_test_services, ReplayEngine, ReplayReport, TraceReader,
};
use tracing::{error, info, warn};

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    match command {
        "help" | "--help" | "-h" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        "version" | "--version" | "-V" => {
            println!("hal-trace {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let Some(trace) = args.get(2).map(PathBuf::from) else {
        eprintln!("Missing trace file for '{}'", command);
        print_usage();
        return ExitCode::from(EXIT_USAGE);
    };

    if let Err(e) = telemetry::init_logging(&config::load_log_config()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let rest = &args[3..];
    match command {
        "replay" => match ReplayOptions::parse(rest) {
            Ok(options) => ExitCode::from(run_replay(&trace, options)),
            Err(msg) => {
                eprintln!("{}", msg);
                print_usage();
                ExitCode::from(EXIT_USAGE)
            }
        },
        "services" | "cleanup" | "dump" if !rest.is_empty() => {
            eprintln!("Unexpected argument: {}", rest[0]);
            ExitCode::from(EXIT_USAGE)
        }
        "services" => ExitCode::from(run_services(&trace)),
        "cleanup" => ExitCode::from(run_cleanup(&trace)),
        "dump" => ExitCode::from(run_dump(&trace)),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::from(EXIT_USAGE)
        }
    }
}

#[derive(Debug)]
struct ReplayOptions {
    driver: PathBuf,
    spec_dir: PathBuf,
    service_names: HashMap<String, String>,
}

impl ReplayOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self {
            driver: PathBuf::from(config::DEFAULT_DRIVER64_PATH),
            spec_dir: PathBuf::from(config::DEFAULT_SPEC_DIR),
            service_names: HashMap::new(),
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}", arg))
            };
            match arg.as_str() {
                "--driver" => options.driver = PathBuf::from(value()?),
                "--spec-dir" => options.spec_dir = PathBuf::from(value()?),
                "--service" => {
                    let mapping = value()?;
                    let (fq, service) = mapping
                        .split_once('=')
                        .filter(|(fq, service)| !fq.is_empty() && !service.is_empty())
                        .ok_or_else(|| format!("Expected FQNAME=SERVICE, got '{}'", mapping))?;
                    options.service_names.insert(fq.to_string(), service.to_string());
                }
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }
        Ok(options)
    }
}

fn run_replay(trace: &Path, options: ReplayOptions) -> u8 {
    let agent_config = config::load();

    let services = match list_test_services(trace) {
        Ok(services) => services,
        Err(e) => {
            eprintln!("Failed to scan trace: {}", e);
            return EXIT_FAILURE;
        }
    };

    let mut table = DriverTable::new();
    for fq in &services {
        let instance = options
            .service_names
            .get(fq)
            .map(String::as_str)
            .unwrap_or(ServiceInstanceKey::DEFAULT_INSTANCE);
        let Some(key) = ServiceInstanceKey::from_fq_name(fq, instance) else {
            warn!(fq_name = %fq, "skipping malformed interface name");
            continue;
        };

        let spec = LaunchSpec {
            binary: options.driver.clone(),
            socket_path: agent_config.socket_dir.join(format!(
                "hal_trace_{}_{}.sock",
                table.len(),
                std::process::id()
            )),
            service_name: instance.to_string(),
            spec_dir: options.spec_dir.clone(),
            ready_timeout: agent_config.driver_ready_timeout,
        };
        match RemoteDriver::launch(&spec) {
            Ok(driver) => {
                table.register(key, HalCategory::Hidl, Box::new(driver));
            }
            Err(e) => {
                error!(service = %key, error = %e, "driver launch failed");
                eprintln!("Failed to launch driver for {}: {}", key, e);
                return EXIT_FAILURE;
            }
        }
    }
    info!(drivers = table.len(), "drivers ready for replay");

    let result = ReplayEngine::new(&mut table)
        .with_service_names(options.service_names)
        .replay_file(trace);
    match result {
        Ok(report) => {
            print_report(&report);
            0
        }
        Err(e) => {
            eprintln!("Replay failed: {}", e);
            EXIT_FAILURE
        }
    }
}

fn print_report(report: &ReplayReport) {
    println!(
        "replayed {} pair(s), skipped {}, default fallbacks {}, mismatches {}",
        report.pairs_replayed,
        report.pairs_skipped,
        report.default_fallbacks,
        report.mismatches.len()
    );
    for m in &report.mismatches {
        println!(
            "  pair {}: {} {} expected {} got {}",
            m.pair,
            m.service,
            m.function,
            m.expected.to_text(),
            m.actual.to_text()
        );
    }
}

fn run_services(trace: &Path) -> u8 {
    match list_test_services(trace) {
        Ok(services) => {
            for fq in services {
                println!("{}", fq);
            }
            0
        }
        Err(e) => {
            eprintln!("Failed to scan trace: {}", e);
            EXIT_FAILURE
        }
    }
}

fn run_cleanup(trace: &Path) -> u8 {
    match cleanup_trace(trace) {
        Ok(report) => {
            println!(
                "kept {} record(s), removed {} client duplicate(s) and {} unpaired",
                report.kept, report.removed_client_duplicates, report.removed_unpaired
            );
            0
        }
        Err(e) => {
            eprintln!("Cleanup failed: {}", e);
            EXIT_FAILURE
        }
    }
}

fn run_dump(trace: &Path) -> u8 {
    let reader = match TraceReader::open(trace) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_FAILURE;
        }
    };
    for record in reader {
        match record {
            Ok(record) => println!("{}", record),
            Err(e) => {
                eprintln!("{}", e);
                return EXIT_FAILURE;
            }
        }
    }
    0
}

fn print_usage() {
    eprintln!(
        "hal-trace - HAL call trace tool v{version}

USAGE:
    hal-trace <COMMAND> <TRACE> [OPTIONS]

COMMANDS:
    replay     Replay a trace against freshly launched drivers
    services   List the interfaces a trace exercises
    cleanup    Drop duplicate and unpaired records in place
    dump       Print one line per record
    version    Show version information
    help       Show this help message

REPLAY OPTIONS:
    --driver PATH              Driver binary (default: {driver})
    --spec-dir DIR             Interface spec directory (default: {spec})
    --service FQNAME=SERVICE   Service instance for an interface (repeatable)

EXIT CODES:
    0  Success (verification mismatches are reported, not failures)
    1  Failure
    2  Usage error",
        version = env!("CARGO_PKG_VERSION"),
        driver = config::DEFAULT_DRIVER64_PATH,
        spec = config::DEFAULT_SPEC_DIR,
    );
}
