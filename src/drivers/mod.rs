//! Driver registry boundary.
//!
//! The agent core only needs resolve / invoke / verify from whatever loads
//! drivers. This module defines that contract plus the table, subprocess
//! driver, and spec catalog the binaries use to satisfy it.

mod catalog;
mod message;
mod registry;
mod remote;

pub use catalog::{Catalog, CatalogError, InterfaceSpec, SPEC_EXTENSION};
pub use message::{
    CallOutput, FunctionCallMessage, FunctionMessage, FunctionResultMessage, ERROR_RESULT,
    VOID_RESULT,
};
pub use registry::{
    format_version, fq_name, parse_fq_name, Driver, DriverError, DriverId, DriverRegistry,
    DriverTable, HalCategory, ServiceInstanceKey,
};
pub use remote::{DriverRequest, LaunchError, LaunchSpec, RemoteDriver, READY_LINE};
