//! Command dispatch for one agent session.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::protocol::{AgentCapability, AgentCommand, AgentResponse, Bitness, ResponsePayload};
use super::shell::execute_shell_commands;
use crate::config::{AgentConfig, DriverPaths};
use crate::drivers::{
    Catalog, DriverId, DriverRegistry, DriverTable, FunctionMessage, HalCategory, LaunchSpec,
    RemoteDriver, ServiceInstanceKey, ERROR_RESULT,
};
use crate::telemetry::MeasurementContext;

/// Whether the session continues after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Settings the handler needs to launch drivers.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub drivers: DriverPaths,
    pub socket_dir: PathBuf,
    pub driver_ready_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for HandlerConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            drivers: config.drivers.clone(),
            socket_dir: config.socket_dir.clone(),
            driver_ready_timeout: config.driver_ready_timeout,
        }
    }
}

/// Per-session command handler. Owns the session's driver table and
/// measurement context; nothing here is shared with other sessions.
pub struct SessionHandler {
    config: HandlerConfig,
    drivers: DriverTable,
    measurement: MeasurementContext,
}

impl SessionHandler {
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config,
            drivers: DriverTable::new(),
            measurement: MeasurementContext::new(),
        }
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    pub fn drivers_mut(&mut self) -> &mut DriverTable {
        &mut self.drivers
    }

    pub fn measurement(&self) -> &MeasurementContext {
        &self.measurement
    }

    /// Execute one command.
    pub fn handle(&mut self, command: AgentCommand) -> (AgentResponse, Flow) {
        debug!(command = command.name(), "handling command");
        match command {
            AgentCommand::Capability => (self.capability(), Flow::Continue),
            AgentCommand::ListHals { paths } => (self.list_hals(&paths), Flow::Continue),
            AgentCommand::CheckDriverService { service_name } => {
                (self.check_driver_service(&service_name), Flow::Continue)
            }
            AgentCommand::LaunchDriverService {
                service_name,
                package,
                version,
                interface,
                instance,
                category,
                bitness,
                driver_path,
            } => {
                let key = ServiceInstanceKey::new(package, version, interface, instance);
                let response = self.launch_driver_service(&service_name, key, category, bitness, driver_path);
                (response, Flow::Continue)
            }
            AgentCommand::ListApis { driver_id } => (self.list_apis(driver_id), Flow::Continue),
            AgentCommand::CallApi { driver_id, call } => (self.call_api(driver_id, &call), Flow::Continue),
            AgentCommand::ExecuteShellCommand { commands } => {
                if commands.is_empty() {
                    return (AgentResponse::fail("no shell command given"), Flow::Continue);
                }
                let output = execute_shell_commands(&commands);
                (AgentResponse::with_payload(ResponsePayload::Shell(output)), Flow::Continue)
            }
            AgentCommand::StartMeasurement => {
                self.measurement.start();
                (AgentResponse::success(), Flow::Continue)
            }
            AgentCommand::StopMeasurement => {
                let snapshot = self.measurement.stop();
                (
                    AgentResponse::with_payload(ResponsePayload::Measurements(snapshot)),
                    Flow::Continue,
                )
            }
            AgentCommand::Exit => {
                info!("exit requested");
                (AgentResponse::success(), Flow::Exit)
            }
        }
    }

    fn capability(&self) -> AgentResponse {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        AgentResponse::with_payload(ResponsePayload::Capability(AgentCapability {
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            hostname,
            commands: AgentCommand::NAMES.iter().map(|s| s.to_string()).collect(),
        }))
    }

    fn list_hals(&self, paths: &[PathBuf]) -> AgentResponse {
        let dirs: Vec<&Path> = if paths.is_empty() {
            vec![self.config.drivers.spec_dir.as_path()]
        } else {
            paths.iter().map(PathBuf::as_path).collect()
        };

        let mut catalog = Catalog::default();
        for dir in dirs {
            if let Err(e) = catalog.add_dir(dir) {
                warn!(error = %e, "cannot list interface specs");
                return AgentResponse::fail(e.to_string());
            }
        }
        AgentResponse::with_payload(ResponsePayload::Hals { hals: catalog.hal_names() })
    }

    fn check_driver_service(&self, service_name: &str) -> AgentResponse {
        match self.drivers.lookup_service(service_name) {
            Some(_) => AgentResponse::success(),
            None => AgentResponse::fail(format!("service {} not launched", service_name)),
        }
    }

    fn launch_driver_service(
        &mut self,
        service_name: &str,
        key: ServiceInstanceKey,
        category: HalCategory,
        bitness: Bitness,
        driver_path: Option<PathBuf>,
    ) -> AgentResponse {
        if let Some(id) = self.drivers.resolve(&key) {
            debug!(service = %key, driver_id = %id, "driver already launched");
            self.drivers.bind_service(service_name, id);
            return AgentResponse::with_payload(ResponsePayload::Driver { driver_id: id });
        }

        let binary = driver_path.unwrap_or_else(|| self.config.drivers.driver_for(bitness).clone());
        let spec = LaunchSpec {
            binary,
            socket_path: self.socket_path(service_name),
            service_name: service_name.to_string(),
            spec_dir: self.config.drivers.spec_dir.clone(),
            ready_timeout: self.config.driver_ready_timeout,
        };

        match RemoteDriver::launch(&spec) {
            Ok(driver) => {
                let driver_id = self
                    .drivers
                    .register_service(service_name, key, category, Box::new(driver));
                AgentResponse::with_payload(ResponsePayload::Driver { driver_id })
            }
            Err(e) => {
                warn!(service = %key, error = %e, "driver launch failed");
                AgentResponse::fail(e.to_string())
            }
        }
    }

    fn list_apis(&self, driver_id: DriverId) -> AgentResponse {
        let Some(key) = self.drivers.key(driver_id) else {
            return AgentResponse::fail(format!("unknown driver id {}", driver_id));
        };

        let mut apis = self.drivers.list_apis(driver_id);
        if apis.is_empty() {
            // Fall back to the interface spec when the driver cannot enumerate itself.
            if let Ok(catalog) = Catalog::load_dir(&self.config.drivers.spec_dir) {
                if let Some(spec) = catalog.find(&key.package, &key.version, &key.interface) {
                    apis = spec.apis.clone();
                }
            }
        }
        AgentResponse::with_payload(ResponsePayload::Apis { apis })
    }

    fn call_api(&mut self, driver_id: DriverId, call: &FunctionMessage) -> AgentResponse {
        if self.drivers.key(driver_id).is_none() {
            return AgentResponse::fail(format!("unknown driver id {}", driver_id));
        }

        let started = Instant::now();
        let result = self.drivers.invoke(driver_id, call);
        self.measurement.record(&call.name, started.elapsed());

        if result == ERROR_RESULT {
            return AgentResponse::fail(format!("driver {} failed to execute {}", driver_id, call.name));
        }
        AgentResponse::with_payload(ResponsePayload::CallResult { result })
    }

    fn socket_path(&self, service_name: &str) -> PathBuf {
        let safe: String = service_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.config
            .socket_dir
            .join(format!("hal_driver_{}_{}.sock", safe, std::process::id()))
    }
}
