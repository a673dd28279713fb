//! Agent socket interface.
//!
//! Framing, command/response messages, the per-session command loop, and
//! the forking connection acceptor.

pub mod framing;
pub mod protocol;
pub mod server;

mod handler;
mod session;
mod shell;

pub use framing::{encode_frame, recv_frame, send_frame, FrameError, MAX_HEADER_SIZE};
pub use handler::{Flow, HandlerConfig, SessionHandler};
pub use protocol::{
    decode_command, decode_response, encode_command, encode_response, AgentCapability,
    AgentCommand, AgentResponse, Bitness, ProtocolError, ResponseCode, ResponsePayload,
    ShellOutput,
};
pub use server::{bind, serve, ServerError};
pub use session::{run_session, SessionEnd};
pub use shell::execute_shell_commands;
