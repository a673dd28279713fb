//! Driver registry contract and the in-process driver table.
//!
//! The replay engine and the session handler depend only on [`DriverRegistry`].
//! [`DriverTable`] is the concrete implementation used by the binaries: a
//! plugin table keyed by service instance, holding in-process drivers or
//! [`RemoteDriver`](super::RemoteDriver) handles to driver subprocesses.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::message::{FunctionCallMessage, FunctionMessage, FunctionResultMessage, ERROR_RESULT, VOID_RESULT};
use crate::ipc::framing::FrameError;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Driver transport error: {0}")]
    Transport(#[from] FrameError),

    #[error("Driver protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Unsupported function: {0}")]
    Unsupported(String),

    #[error("Driver call failed: {0}")]
    Failed(String),
}

/// Opaque identity of a registered driver.
///
/// Lookups that find nothing return `None`; there is no sentinel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub u32);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Driver variants the registry distinguishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalCategory {
    Conventional,
    Legacy,
    #[default]
    Hidl,
    SharedLibrary,
}

/// Render a trace-style float version as `major.minor`.
///
/// Always one decimal, so only single-digit minor versions survive:
/// `1.10` parses to the same `f32` as `1.1` and renders as `"1.1"`.
pub fn format_version(version: f32) -> String {
    format!("{:.1}", version)
}

/// Fully-qualified interface name: `package@version::interface`.
pub fn fq_name(package: &str, version: &str, interface: &str) -> String {
    format!("{}@{}::{}", package, version, interface)
}

/// Split `package@version::interface` into its parts.
pub fn parse_fq_name(fq_name: &str) -> Option<(&str, &str, &str)> {
    let (package, rest) = fq_name.split_once('@')?;
    let (version, interface) = rest.split_once("::")?;
    if package.is_empty() || version.is_empty() || interface.is_empty() {
        return None;
    }
    Some((package, version, interface))
}

/// Lookup key for one concrete service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceInstanceKey {
    pub package: String,
    pub version: String,
    pub interface: String,
    pub instance: String,
}

impl ServiceInstanceKey {
    /// Instance name used when the caller supplies none.
    pub const DEFAULT_INSTANCE: &'static str = "default";

    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        interface: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            interface: interface.into(),
            instance: instance.into(),
        }
    }

    /// Key for `instance` of a `package@version::interface` name.
    pub fn from_fq_name(fq_name: &str, instance: impl Into<String>) -> Option<Self> {
        let (package, version, interface) = parse_fq_name(fq_name)?;
        Some(Self::new(package, version, interface, instance))
    }

    pub fn fq_name(&self) -> String {
        fq_name(&self.package, &self.version, &self.interface)
    }
}

impl fmt::Display for ServiceInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.fq_name(), self.instance)
    }
}

/// The narrow contract the agent core requires from driver loading.
pub trait DriverRegistry {
    /// Find the driver serving `key`.
    fn resolve(&self, key: &ServiceInstanceKey) -> Option<DriverId>;

    /// Run a call and return its textual result.
    ///
    /// [`VOID_RESULT`] means the call produced no reportable return;
    /// [`ERROR_RESULT`] means the driver failed.
    fn invoke(&mut self, id: DriverId, call: &FunctionCallMessage) -> String;

    /// Compare a recorded result with an actual one.
    fn verify(
        &self,
        id: DriverId,
        expected: &FunctionResultMessage,
        actual: &FunctionResultMessage,
    ) -> bool;

    /// Names of the APIs a driver exposes.
    fn list_apis(&self, _id: DriverId) -> Vec<String> {
        Vec::new()
    }
}

/// One loaded driver.
pub trait Driver {
    /// Execute a call. `Ok(None)` means the call returned nothing.
    fn call(&mut self, call: &FunctionMessage) -> Result<Option<FunctionMessage>, DriverError>;

    /// Result comparison; drivers with lossy or nondeterministic outputs override this.
    fn verify(&self, expected: &FunctionMessage, actual: &FunctionMessage) -> bool {
        expected.name == actual.name && expected.return_values == actual.return_values
    }

    fn apis(&self) -> Vec<String> {
        Vec::new()
    }
}

struct Entry {
    key: ServiceInstanceKey,
    category: HalCategory,
    driver: Box<dyn Driver>,
}

/// Plugin table of loaded drivers.
///
/// Drivers launched on behalf of a client are also indexed by the service
/// name the client chose, which is independent of the key's instance.
#[derive(Default)]
pub struct DriverTable {
    entries: Vec<Entry>,
    by_key: HashMap<ServiceInstanceKey, DriverId>,
    services: HashMap<String, DriverId>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver for `key`. Re-registering a key replaces the driver
    /// and keeps its id.
    pub fn register(
        &mut self,
        key: ServiceInstanceKey,
        category: HalCategory,
        driver: Box<dyn Driver>,
    ) -> DriverId {
        if let Some(&id) = self.by_key.get(&key) {
            warn!(service = %key, driver_id = %id, "replacing registered driver");
            let entry = &mut self.entries[id.0 as usize];
            entry.category = category;
            entry.driver = driver;
            return id;
        }

        let id = DriverId(self.entries.len() as u32);
        debug!(service = %key, driver_id = %id, ?category, "driver registered");
        self.by_key.insert(key.clone(), id);
        self.entries.push(Entry { key, category, driver });
        id
    }

    /// Register a driver and record it under `service_name`.
    pub fn register_service(
        &mut self,
        service_name: impl Into<String>,
        key: ServiceInstanceKey,
        category: HalCategory,
        driver: Box<dyn Driver>,
    ) -> DriverId {
        let id = self.register(key, category, driver);
        self.bind_service(service_name, id);
        id
    }

    /// Point `service_name` at an already registered driver. Returns false
    /// if `id` is unknown.
    pub fn bind_service(&mut self, service_name: impl Into<String>, id: DriverId) -> bool {
        if self.entry(id).is_none() {
            return false;
        }
        let service_name = service_name.into();
        debug!(service_name = %service_name, driver_id = %id, "service name bound");
        self.services.insert(service_name, id);
        true
    }

    /// Find a driver by the service name it was launched under.
    pub fn lookup_service(&self, service_name: &str) -> Option<DriverId> {
        self.services.get(service_name).copied()
    }

    pub fn key(&self, id: DriverId) -> Option<&ServiceInstanceKey> {
        self.entry(id).map(|e| &e.key)
    }

    pub fn category(&self, id: DriverId) -> Option<HalCategory> {
        self.entry(id).map(|e| e.category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: DriverId) -> Option<&Entry> {
        self.entries.get(id.0 as usize)
    }
}

impl DriverRegistry for DriverTable {
    fn resolve(&self, key: &ServiceInstanceKey) -> Option<DriverId> {
        self.by_key.get(key).copied()
    }

    fn invoke(&mut self, id: DriverId, call: &FunctionCallMessage) -> String {
        let Some(entry) = self.entries.get_mut(id.0 as usize) else {
            warn!(driver_id = %id, "invoke on unknown driver");
            return ERROR_RESULT.to_string();
        };

        match entry.driver.call(call) {
            Ok(Some(result)) => result.to_text(),
            Ok(None) => VOID_RESULT.to_string(),
            Err(e) => {
                warn!(service = %entry.key, function = %call.name, error = %e, "driver call failed");
                ERROR_RESULT.to_string()
            }
        }
    }

    fn verify(
        &self,
        id: DriverId,
        expected: &FunctionResultMessage,
        actual: &FunctionResultMessage,
    ) -> bool {
        self.entry(id)
            .map(|e| e.driver.verify(expected, actual))
            .unwrap_or(false)
    }

    fn list_apis(&self, id: DriverId) -> Vec<String> {
        self.entry(id).map(|e| e.driver.apis()).unwrap_or_default()
    }
}
