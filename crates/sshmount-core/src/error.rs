//! Error types for mount setup

use thiserror::Error;

/// Errors raised while bootstrapping or running a mount
#[derive(Error, Debug)]
pub enum MountError {
    /// A remote command exited non-zero, or the transport failed running it
    #[error("remote command `{command}` failed: {stderr}")]
    CommandFailed {
        command: String,
        stderr: String,
        /// `None` when the transport gave up before an exit status arrived
        exit_code: Option<i32>,
    },

    #[error("sshfs is not installed on the remote host")]
    SshfsMissing,

    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("bridge server error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("failed to spawn mount worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl MountError {
    /// True for the terminal "no sshfs on the remote host" failure
    pub fn is_sshfs_missing(&self) -> bool {
        matches!(self, MountError::SshfsMissing)
    }
}

/// Transport-level failures reported by a remote session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to start remote command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("remote output is not valid UTF-8")]
    InvalidOutput,
}

/// Failures of the bridge server itself
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to launch {what}: {source}")]
    Launch {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote sshfs exited with status {0}")]
    RemoteExited(i32),

    #[error("local sftp-server exited with status {0}")]
    SftpServerExited(i32),
}
