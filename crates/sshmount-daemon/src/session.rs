//! Remote command execution over an authenticated session
//!
//! A [`RemoteSession`] runs one shell command at a time on the remote host.
//! [`RemoteSession::run`] layers the exit-status check on top of it and picks
//! which output streams the caller gets back.

use tracing::trace;

use sshmount_core::{CommandOutput, MountError, SessionError};

/// Which streams [`RemoteSession::run`] hands back on success
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// stdout followed by stderr; for tools that print diagnostics on stderr
    Combined,
    /// stdout alone; for queries whose output gets parsed
    StdoutOnly,
}

/// An authenticated channel able to execute remote commands.
///
/// Not safe for concurrent command issuance; whoever owns the session is the
/// only one issuing commands on it.
pub trait RemoteSession: Send + 'static {
    /// Run `command` through the remote shell and wait for it to exit
    fn exec(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Run `command`, failing with [`MountError::CommandFailed`] on a non-zero exit.
    ///
    /// Transport failures surface as the same variant with no exit code.
    fn run(&mut self, command: &str, mode: OutputMode) -> Result<String, MountError> {
        trace!(command, "running remote command");

        let output = self.exec(command).map_err(|e| MountError::CommandFailed {
            command: command.to_string(),
            stderr: e.to_string(),
            exit_code: None,
        })?;

        if !output.is_success() {
            trace!(command, exit_code = output.exit_code, "remote command failed");
            return Err(MountError::CommandFailed {
                command: command.to_string(),
                stderr: output.stderr,
                exit_code: Some(output.exit_code),
            });
        }

        Ok(match mode {
            OutputMode::Combined => output.stdout + &output.stderr,
            OutputMode::StdoutOnly => output.stdout,
        })
    }
}

impl<S: RemoteSession + ?Sized> RemoteSession for Box<S> {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        (**self).exec(command)
    }
}
