//! Drivers running in their own process, reached over a Unix socket.
//!
//! The agent starts the driver binary with
//!
//! ```text
//! <binary> --socket <path> --service <name> --spec-dir <dir>
//! ```
//!
//! and waits for the driver to print `ready` on stdout. Requests and replies
//! then travel as frames (see [`crate::ipc::framing`]): requests are JSON
//! [`DriverRequest`]s, replies are the textual call result.

use std::io::{self, BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::message::{CallOutput, FunctionMessage};
use super::registry::{Driver, DriverError};
use crate::ipc::framing::{recv_frame, send_frame};
use crate::notify::CallbackNotifier;

/// Line a driver prints on stdout once its socket accepts connections.
pub const READY_LINE: &str = "ready";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Driver binary not found: {0}")]
    MissingBinary(PathBuf),

    #[error("Failed to spawn driver: {0}")]
    Spawn(#[source] io::Error),

    #[error("Driver for {service} not ready after {timeout:?}")]
    NotReady { service: String, timeout: Duration },

    #[error("Failed to connect to driver socket: {0}")]
    Connect(#[source] io::Error),
}

/// Request sent to a driver process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum DriverRequest {
    Call { call: FunctionMessage },
    ListApis,
}

/// Everything needed to start one driver process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: PathBuf,
    pub socket_path: PathBuf,
    pub service_name: String,
    pub spec_dir: PathBuf,
    pub ready_timeout: Duration,
}

/// Handle to a driver process.
pub struct RemoteDriver {
    service: String,
    stream: UnixStream,
    child: Option<Child>,
    socket_path: Option<PathBuf>,
}

impl RemoteDriver {
    /// Spawn the driver binary and connect once it reports ready.
    pub fn launch(spec: &LaunchSpec) -> Result<Self, LaunchError> {
        if !spec.binary.is_file() {
            return Err(LaunchError::MissingBinary(spec.binary.clone()));
        }
        let _ = std::fs::remove_file(&spec.socket_path);

        let mut child = Command::new(&spec.binary)
            .arg("--socket")
            .arg(&spec.socket_path)
            .arg("--service")
            .arg(&spec.service_name)
            .arg("--spec-dir")
            .arg(&spec.spec_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(LaunchError::Spawn)?;

        let ready = Arc::new(CallbackNotifier::new());
        if let Some(stdout) = child.stdout.take() {
            let ready = ready.clone();
            let service = spec.service_name.clone();
            thread::spawn(move || watch_stdout(stdout, &service, &ready));
        }

        if !ready.wait_for(spec.ready_timeout) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LaunchError::NotReady {
                service: spec.service_name.clone(),
                timeout: spec.ready_timeout,
            });
        }

        let stream = match UnixStream::connect(&spec.socket_path) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LaunchError::Connect(e));
            }
        };

        info!(service = %spec.service_name, pid = child.id(), "driver launched");
        Ok(Self {
            service: spec.service_name.clone(),
            stream,
            child: Some(child),
            socket_path: Some(spec.socket_path.clone()),
        })
    }

    /// Attach to a driver that is already listening on `socket_path`.
    pub fn connect(socket_path: &Path, service: impl Into<String>) -> Result<Self, LaunchError> {
        let stream = UnixStream::connect(socket_path).map_err(LaunchError::Connect)?;
        Ok(Self {
            service: service.into(),
            stream,
            child: None,
            socket_path: None,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn request(&self, request: &DriverRequest) -> Result<String, DriverError> {
        let mut stream = &self.stream;
        send_frame(&mut stream, &serde_json::to_vec(request)?)?;
        let reply = recv_frame(&mut stream)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

impl Driver for RemoteDriver {
    fn call(&mut self, call: &FunctionMessage) -> Result<Option<FunctionMessage>, DriverError> {
        let text = self.request(&DriverRequest::Call { call: call.clone() })?;
        match CallOutput::classify(&text) {
            CallOutput::Void => Ok(None),
            CallOutput::Error => Err(DriverError::Failed(format!(
                "{} reported an error for {}",
                self.service, call.name
            ))),
            CallOutput::Text(body) => Ok(Some(FunctionMessage::from_text(body)?)),
        }
    }

    fn apis(&self) -> Vec<String> {
        let parsed = self
            .request(&DriverRequest::ListApis)
            .and_then(|text| serde_json::from_str::<Vec<String>>(&text).map_err(DriverError::from));
        match parsed {
            Ok(apis) => apis,
            Err(e) => {
                warn!(service = %self.service, error = %e, "failed to list driver APIs");
                Vec::new()
            }
        }
    }
}

impl Drop for RemoteDriver {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(path) = self.socket_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn watch_stdout(stdout: impl io::Read, service: &str, ready: &CallbackNotifier) {
    // Keep draining after ready so the driver never blocks on a full pipe.
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        if line.trim() == READY_LINE {
            ready.notify();
        } else {
            debug!(service, output = %line, "driver stdout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::net::UnixListener;

    fn fake_driver(dir: &Path, replies: Vec<&'static str>) -> (PathBuf, thread::JoinHandle<Vec<DriverRequest>>) {
        let path = dir.join("driver.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            for reply in replies {
                let bytes = recv_frame(&mut stream).unwrap();
                seen.push(serde_json::from_slice(&bytes).unwrap());
                send_frame(&mut stream, reply.as_bytes()).unwrap();
            }
            seen
        });
        (path, handle)
    }

    #[test]
    fn call_parses_result_text() {
        let dir = tempfile::tempdir().unwrap();
        let (path, handle) = fake_driver(dir.path(), vec![r#"{"name":"add","return_values":[3]}"#]);

        let mut driver = RemoteDriver::connect(&path, "default").unwrap();
        let result = driver
            .call(&FunctionMessage::call("add", vec![json!(1), json!(2)]))
            .unwrap()
            .unwrap();
        assert_eq!(result.return_values, vec![json!(3)]);

        let seen = handle.join().unwrap();
        assert!(matches!(&seen[0], DriverRequest::Call { call } if call.name == "add"));
    }

    #[test]
    fn sentinels_map_to_void_and_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, handle) = fake_driver(dir.path(), vec!["void", "error"]);

        let mut driver = RemoteDriver::connect(&path, "default").unwrap();
        assert!(driver.call(&FunctionMessage::call("reset", vec![])).unwrap().is_none());
        assert!(matches!(
            driver.call(&FunctionMessage::call("reset", vec![])),
            Err(DriverError::Failed(_))
        ));
        handle.join().unwrap();
    }

    #[test]
    fn apis_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let (path, handle) = fake_driver(dir.path(), vec![r#"["open","close"]"#]);

        let driver = RemoteDriver::connect(&path, "default").unwrap();
        assert_eq!(driver.apis(), vec!["open".to_string(), "close".to_string()]);
        assert!(matches!(handle.join().unwrap()[0], DriverRequest::ListApis));
    }

    #[test]
    fn launch_rejects_missing_binary() {
        let spec = LaunchSpec {
            binary: PathBuf::from("/nonexistent/hal_driver64"),
            socket_path: PathBuf::from("/tmp/unused.sock"),
            service_name: "default".into(),
            spec_dir: PathBuf::from("."),
            ready_timeout: Duration::from_millis(10),
        };
        assert!(matches!(RemoteDriver::launch(&spec), Err(LaunchError::MissingBinary(_))));
    }
}
