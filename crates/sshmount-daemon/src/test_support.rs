//! Scripted remote session for unit tests

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use sshmount_core::{CommandOutput, SessionError};

use crate::session::RemoteSession;

enum Scripted {
    Reply(CommandOutput),
    Disconnect,
}

/// Session answering from a fixed script; unknown commands exit 127
pub struct ScriptedSession {
    script: HashMap<String, Scripted>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reply(mut self, command: &str, output: CommandOutput) -> Self {
        self.script.insert(command.to_string(), Scripted::Reply(output));
        self
    }

    pub fn ok(self, command: &str, stdout: &str) -> Self {
        self.reply(command, CommandOutput::success(stdout))
    }

    pub fn disconnect(mut self, command: &str) -> Self {
        self.script.insert(command.to_string(), Scripted::Disconnect);
        self
    }

    /// Shared log of every command executed, readable after the session moved
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }
}

impl RemoteSession for ScriptedSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        self.log.lock().push(command.to_string());
        match self.script.get(command) {
            Some(Scripted::Reply(output)) => Ok(output.clone()),
            Some(Scripted::Disconnect) => Err(SessionError::Disconnected("scripted".into())),
            None => Ok(CommandOutput::failure(
                127,
                format!("sh: 1: {}: not found", command),
            )),
        }
    }
}

/// A remote host with the snap package and the given libfuse version
pub fn snap_host(fuse_version: &str) -> ScriptedSession {
    ScriptedSession::new()
        .ok(
            "sudo multipass-sshfs.env",
            "LD_LIBRARY_PATH=/snap/multipass-sshfs/current/lib\nSNAP=/snap/multipass-sshfs/current\n",
        )
        .reply(
            &format!("sudo {} -V", SNAP_SSHFS),
            CommandOutput {
                stdout: "SSHFS version 2.10\n".into(),
                stderr: format!("FUSE library version: {}\nfusermount version: 2.9.9\n", fuse_version),
                exit_code: 0,
            },
        )
}

/// Executable command line produced for [`snap_host`]
pub const SNAP_SSHFS: &str =
    "env LD_LIBRARY_PATH=/snap/multipass-sshfs/current/lib /snap/multipass-sshfs/current/bin/sshfs";

/// Add the provisioning and id commands for `target` owned by ubuntu:ubuntu (1000:1000)
pub fn with_provisioning(session: ScriptedSession, target: &str) -> ScriptedSession {
    session
        .ok(&format!("sudo mkdir -p '{}'", target), "")
        .ok("id -nu", "ubuntu\n")
        .ok("id -ng", "ubuntu\n")
        .ok(&format!("sudo chown 'ubuntu:ubuntu' '{}'", target), "")
        .ok("id -u", "1000\n")
        .ok("id -g", "1000\n")
}
