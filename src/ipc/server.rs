//! Connection acceptor.
//!
//! Every accepted connection is served by its own forked process, so a
//! session that crashes or hangs cannot take down the acceptor or a sibling
//! session. The acceptor itself is single-threaded and only blocks in
//! `accept`.

use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use thiserror::Error;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use super::handler::SessionHandler;
use super::session::run_session;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Fork failed: {0}")]
    Fork(#[source] io::Error),
}

enum Forked {
    Parent(libc::pid_t),
    Child,
}

/// Bind the runner-facing listening socket on all interfaces.
pub fn bind(port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind(("0.0.0.0", port)).map_err(|source| ServerError::Bind { port, source })
}

/// Accept connections forever, forking one session process per connection.
///
/// `make_handler` runs in the child, so every session starts from fresh
/// driver state. Returns only on accept or fork failure.
pub fn serve<F>(listener: TcpListener, make_handler: F) -> Result<Infallible, ServerError>
where
    F: Fn() -> SessionHandler,
{
    ignore_child_exits();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "agent listening");
    }

    loop {
        let (stream, peer) = listener.accept().map_err(|e| {
            error!(error = %e, "accept failed");
            ServerError::Accept(e)
        })?;

        match fork_session()? {
            Forked::Parent(pid) => {
                debug!(%peer, pid, "session forked");
                drop(stream);
            }
            Forked::Child => {
                drop(listener);
                restore_child_exits();
                let code = run_child(stream, peer, &make_handler);
                std::process::exit(code);
            }
        }
    }
}

fn run_child<F>(mut stream: TcpStream, peer: SocketAddr, make_handler: &F) -> i32
where
    F: Fn() -> SessionHandler,
{
    let session_id = Uuid::new_v4();
    let _span = info_span!("session", id = %session_id, %peer, pid = std::process::id()).entered();
    info!("session started");

    let _ = stream.set_nodelay(true);
    let mut handler = make_handler();
    let end = run_session(&mut stream, &mut handler);
    // Dropping the handler stops any driver processes this session launched.
    drop(handler);

    info!(?end, "session ended");
    end.exit_code()
}

fn fork_session() -> Result<Forked, ServerError> {
    // SAFETY: the acceptor is single-threaded, so the child starts from a
    // consistent copy of the process and only runs the session loop before
    // exiting.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => {
            let e = io::Error::last_os_error();
            error!(error = %e, "fork failed");
            Err(ServerError::Fork(e))
        }
        0 => Ok(Forked::Child),
        pid => Ok(Forked::Parent(pid)),
    }
}

fn ignore_child_exits() {
    // SAFETY: installing SIG_IGN for SIGCHLD has no preconditions; finished
    // session processes are then reaped by the kernel.
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
    }
}

/// Sessions wait on their own children (shell commands, drivers), which
/// needs the default SIGCHLD disposition back.
fn restore_child_exits() {
    // SAFETY: as above.
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}
