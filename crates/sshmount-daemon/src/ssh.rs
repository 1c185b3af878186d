//! Remote session backed by the system ssh client
//!
//! Each command runs as its own `ssh` invocation in batch mode, so
//! authentication must already be possible without prompting (agent, keys,
//! or a multiplexed master connection configured through `options`).

use std::process::{Command, Stdio};

use tracing::trace;

use sshmount_core::{CommandOutput, SessionError, SshConfig};

use crate::session::RemoteSession;

/// ssh exits with this status when the connection itself failed
const SSH_CONNECTION_ERROR: i32 = 255;

/// [`RemoteSession`] running commands through `ssh`
#[derive(Clone, Debug)]
pub struct ProcessSession {
    config: SshConfig,
}

impl ProcessSession {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// `user@host`, or just `host` without a configured user
    pub fn destination(&self) -> String {
        match &self.config.user {
            Some(user) => format!("{}@{}", user, self.config.host),
            None => self.config.host.clone(),
        }
    }

    /// Build the `ssh` command that runs `remote_command` on the host
    pub fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-p").arg(self.config.port.to_string());
        if let Some(identity) = &self.config.identity_file {
            cmd.arg("-i").arg(identity);
        }
        for option in &self.config.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(self.destination()).arg("--").arg(remote_command);
        cmd
    }
}

impl RemoteSession for ProcessSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let output = self
            .command(command)
            .stdin(Stdio::null())
            .output()
            .map_err(SessionError::Spawn)?;

        let stdout = String::from_utf8(output.stdout).map_err(|_| SessionError::InvalidOutput)?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(SSH_CONNECTION_ERROR) => Err(SessionError::Disconnected(stderr.trim_end().into())),
            Some(exit_code) => {
                trace!(command, exit_code, "ssh command finished");
                Ok(CommandOutput {
                    stdout,
                    stderr,
                    exit_code,
                })
            }
            None => Err(SessionError::Disconnected("ssh terminated by signal".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn args(cmd: &Command) -> Vec<&OsStr> {
        cmd.get_args().collect()
    }

    #[test]
    fn test_minimal_command() {
        let session = ProcessSession::new(SshConfig {
            host: "10.0.0.5".into(),
            ..SshConfig::default()
        });

        let cmd = session.command("id -u");
        assert_eq!(cmd.get_program(), "ssh");
        assert_eq!(
            args(&cmd),
            ["-o", "BatchMode=yes", "-p", "22", "10.0.0.5", "--", "id -u"]
        );
    }

    #[test]
    fn test_full_command() {
        let session = ProcessSession::new(SshConfig {
            ssh_binary: PathBuf::from("/usr/bin/ssh"),
            host: "vm.local".into(),
            port: 2222,
            user: Some("ubuntu".into()),
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
            options: vec!["StrictHostKeyChecking=no".into()],
        });

        assert_eq!(session.destination(), "ubuntu@vm.local");
        let cmd = session.command("sudo which sshfs");
        assert_eq!(cmd.get_program(), "/usr/bin/ssh");
        assert_eq!(
            args(&cmd),
            [
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "-o",
                "StrictHostKeyChecking=no",
                "ubuntu@vm.local",
                "--",
                "sudo which sshfs",
            ]
        );
    }

    #[test]
    fn test_missing_ssh_binary() {
        let mut session = ProcessSession::new(SshConfig {
            ssh_binary: PathBuf::from("/nonexistent/ssh"),
            ..SshConfig::default()
        });

        assert!(matches!(session.exec("true"), Err(SessionError::Spawn(_))));
    }
}
