//! Shell command execution for `execute_shell_command`.

use std::process::Command;

use tracing::{debug, warn};

use super::protocol::ShellOutput;

/// Exit code reported when a command could not be started or was killed by a signal.
pub const SPAWN_FAILED_CODE: i32 = -1;

/// Run each command through `sh -c`, in order, collecting its output.
///
/// A command that fails does not stop the ones after it.
pub fn execute_shell_commands(commands: &[String]) -> ShellOutput {
    let mut output = ShellOutput::default();

    for command in commands {
        debug!(%command, "executing shell command");
        match Command::new("sh").arg("-c").arg(command).output() {
            Ok(out) => {
                output.stdout.push(String::from_utf8_lossy(&out.stdout).into_owned());
                output.stderr.push(String::from_utf8_lossy(&out.stderr).into_owned());
                output.exit_codes.push(out.status.code().unwrap_or(SPAWN_FAILED_CODE));
            }
            Err(e) => {
                warn!(%command, error = %e, "failed to spawn shell");
                output.stdout.push(String::new());
                output.stderr.push(e.to_string());
                output.exit_codes.push(SPAWN_FAILED_CODE);
            }
        }
    }

    output
}
