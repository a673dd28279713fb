//! HAL Test Agent
//!
//! Lets a remote test runner drive device-resident HAL drivers over a socket,
//! and replays recorded call traces to catch behavioral regressions.
//!
//! # Components
//!
//! - **Framing** ([`ipc::framing`]): `<decimal length>\n<payload>` frames, used
//!   for agent sessions, driver sockets and trace files alike
//! - **Acceptor** ([`ipc::serve`]): one forked process per connection
//! - **Session loop** ([`ipc::run_session`]): one command in, one response out
//! - **Drivers** ([`drivers`]): the registry contract plus the driver table
//! - **Traces** ([`trace`]): record store, replay verification, cleanup
//!
//! # Isolation
//!
//! Sessions never share an address space. Each session process builds its
//! own driver table, so a crash inside one driver call only ends that session.

#[cfg(not(unix))]
compile_error!("hal-test-agent relies on fork(2) and Unix sockets");

pub mod config;
pub mod drivers;
pub mod ipc;
pub mod notify;
pub mod telemetry;
pub mod trace;

use std::convert::Infallible;

use config::AgentConfig;
use ipc::{HandlerConfig, ServerError, SessionHandler};

/// The agent: configuration plus the accept loop.
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Listen on the configured port and serve sessions until accept or fork fails.
    pub fn run(&self) -> Result<Infallible, ServerError> {
        let listener = ipc::bind(self.config.port)?;
        let handler_config = HandlerConfig::from(&self.config);
        ipc::serve(listener, move || SessionHandler::new(handler_config.clone()))
    }
}
