//! Agent command and response messages.
//!
//! Each frame on an agent session carries one JSON message. Commands are
//! tagged by a `command` field; every command gets exactly one response.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::{DriverId, FunctionMessage, HalCategory, ServiceInstanceKey};
use crate::telemetry::MeasurementSnapshot;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Driver binary word size; picks between the two configured driver paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bitness {
    #[serde(rename = "32")]
    Bits32,
    #[default]
    #[serde(rename = "64")]
    Bits64,
}

fn default_instance() -> String {
    ServiceInstanceKey::DEFAULT_INSTANCE.to_string()
}

/// Commands a test runner can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    Capability,

    ListHals {
        #[serde(default)]
        paths: Vec<PathBuf>,
    },

    CheckDriverService {
        service_name: String,
    },

    LaunchDriverService {
        service_name: String,
        package: String,
        version: String,
        interface: String,
        #[serde(default = "default_instance")]
        instance: String,
        #[serde(default)]
        category: HalCategory,
        #[serde(default)]
        bitness: Bitness,
        #[serde(default)]
        driver_path: Option<PathBuf>,
    },

    ListApis {
        driver_id: DriverId,
    },

    CallApi {
        driver_id: DriverId,
        call: FunctionMessage,
    },

    ExecuteShellCommand {
        commands: Vec<String>,
    },

    StartMeasurement,

    StopMeasurement,

    Exit,
}

impl AgentCommand {
    /// Names of every command, as sent on the wire.
    pub const NAMES: &'static [&'static str] = &[
        "capability",
        "list_hals",
        "check_driver_service",
        "launch_driver_service",
        "list_apis",
        "call_api",
        "execute_shell_command",
        "start_measurement",
        "stop_measurement",
        "exit",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentCommand::Capability => "capability",
            AgentCommand::ListHals { .. } => "list_hals",
            AgentCommand::CheckDriverService { .. } => "check_driver_service",
            AgentCommand::LaunchDriverService { .. } => "launch_driver_service",
            AgentCommand::ListApis { .. } => "list_apis",
            AgentCommand::CallApi { .. } => "call_api",
            AgentCommand::ExecuteShellCommand { .. } => "execute_shell_command",
            AgentCommand::StartMeasurement => "start_measurement",
            AgentCommand::StopMeasurement => "stop_measurement",
            AgentCommand::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    Success,
    Fail,
}

/// What the agent can do; answer to `capability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub agent_version: String,
    /// Pid of the session process serving this connection.
    pub pid: u32,
    pub hostname: String,
    pub commands: Vec<String>,
}

/// Output of `execute_shell_command`, one entry per command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShellOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_codes: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Capability(AgentCapability),
    Hals { hals: Vec<String> },
    Driver { driver_id: DriverId },
    Apis { apis: Vec<String> },
    CallResult { result: String },
    Shell(ShellOutput),
    Measurements(MeasurementSnapshot),
}

/// One response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub code: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

impl AgentResponse {
    pub fn success() -> Self {
        Self {
            code: ResponseCode::Success,
            reason: None,
            payload: None,
        }
    }

    pub fn with_payload(payload: ResponsePayload) -> Self {
        Self {
            code: ResponseCode::Success,
            reason: None,
            payload: Some(payload),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Fail,
            reason: Some(reason.into()),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success
    }
}

pub fn decode_command(bytes: &[u8]) -> Result<AgentCommand, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::InvalidFormat("empty command".into()));
    }
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_command(command: &AgentCommand) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(command)?)
}

pub fn decode_response(bytes: &[u8]) -> Result<AgentResponse, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_response(response: &AgentResponse) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(response)?)
}
