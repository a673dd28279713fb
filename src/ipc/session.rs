//! Per-session command loop.
//!
//! One frame in, one frame out, strictly in receipt order. The loop ends when
//! the peer disconnects, a frame cannot be read or written, or the peer sends
//! `exit`.

use std::io::{Read, Write};

use tracing::{error, info, warn};

use super::framing::{recv_frame, send_frame, FrameError};
use super::handler::{Flow, SessionHandler};
use super::protocol::{decode_command, encode_response, AgentResponse};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent `exit`.
    Exit,
    /// The peer closed the connection between frames.
    PeerClosed,
    /// A frame could not be read or written.
    TransportError,
}

impl SessionEnd {
    /// Process exit status for a session process ending this way.
    pub fn exit_code(self) -> i32 {
        match self {
            SessionEnd::Exit => 0,
            SessionEnd::PeerClosed | SessionEnd::TransportError => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Running,
    Terminated(SessionEnd),
}

/// Serve commands from `stream` until the session terminates.
pub fn run_session<S: Read + Write>(stream: &mut S, handler: &mut SessionHandler) -> SessionEnd {
    loop {
        if let SessionState::Terminated(end) = step(stream, handler) {
            return end;
        }
    }
}

fn step<S: Read + Write>(stream: &mut S, handler: &mut SessionHandler) -> SessionState {
    let frame = match recv_frame(stream) {
        Ok(frame) => frame,
        Err(FrameError::PeerClosed) => {
            info!("peer closed connection");
            return SessionState::Terminated(SessionEnd::PeerClosed);
        }
        Err(e) => {
            error!(error = %e, "failed to receive command");
            return SessionState::Terminated(SessionEnd::TransportError);
        }
    };

    let (response, flow) = match decode_command(&frame) {
        Ok(command) => handler.handle(command),
        Err(e) => {
            warn!(error = %e, "malformed command");
            (AgentResponse::fail(format!("malformed command: {}", e)), Flow::Continue)
        }
    };

    let bytes = match encode_response(&response) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to encode response");
            return SessionState::Terminated(SessionEnd::TransportError);
        }
    };

    if let Err(e) = send_frame(stream, &bytes) {
        error!(error = %e, "failed to send response");
        return SessionState::Terminated(SessionEnd::TransportError);
    }

    match flow {
        Flow::Continue => SessionState::Running,
        Flow::Exit => SessionState::Terminated(SessionEnd::Exit),
    }
}
