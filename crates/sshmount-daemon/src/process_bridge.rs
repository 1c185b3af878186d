//! Bridge server built from two processes
//!
//! The remote sshfs runs in slave mode: it speaks SFTP over its own stdio
//! instead of opening a connection. This bridge starts it through
//! [`ProcessSession`] and wires its stdio to a local `sftp-server`:
//!
//! ```text
//! local sftp-server ──stdout──► pump ──► ssh stdin  ──► remote sshfs (slave)
//! local sftp-server ◄──stdin─── pump ◄── ssh stdout ◄── remote sshfs (slave)
//! ```
//!
//! Stopping kills both processes; the pumps see EOF and exit.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use sshmount_core::{shell_quote, BridgeError, Config, Id, SshfsInvocation};

use crate::bridge::{
    shutdown_channel, BridgeParams, BridgeServer, ShutdownHandle, ShutdownListener,
};
use crate::ssh::ProcessSession;

/// Local settings of a [`ProcessBridge`]
#[derive(Clone, Debug)]
pub struct ProcessBridgeConfig {
    pub sftp_server: PathBuf,
    pub poll_interval: Duration,
    /// Prefix for running sshfs with elevated privilege
    pub elevate: String,
}

impl ProcessBridgeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sftp_server: config.bridge.sftp_server.clone(),
            poll_interval: config.bridge.poll_interval(),
            elevate: config.probe.elevate.clone(),
        }
    }
}

/// Remote sshfs in slave mode piped to a local sftp-server
pub struct ProcessBridge {
    session: ProcessSession,
    remote_command: String,
    config: ProcessBridgeConfig,
    handle: ShutdownHandle,
    listener: ShutdownListener,
}

impl BridgeServer for ProcessBridge {
    type Session = ProcessSession;
    type Config = ProcessBridgeConfig;

    fn new(
        params: BridgeParams<ProcessSession>,
        config: ProcessBridgeConfig,
    ) -> Result<Self, BridgeError> {
        if !params.uid_map.is_empty() || !params.gid_map.is_empty() {
            warn!(
                uid_entries = params.uid_map.len(),
                gid_entries = params.gid_map.len(),
                "process bridge applies only the default uid/gid, explicit id maps are ignored"
            );
        }

        let remote_command = remote_mount_command(
            &params.invocation,
            &params.source,
            &params.target,
            params.default_uid,
            params.default_gid,
            &config.elevate,
        );
        debug!(command = %remote_command, "remote sshfs command");

        let (handle, listener) = shutdown_channel();
        Ok(Self {
            session: params.session,
            remote_command,
            config,
            handle,
            listener,
        })
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    fn serve(&mut self) -> Result<(), BridgeError> {
        let mut remote = self
            .session
            .command(&self.remote_command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| BridgeError::Launch {
                what: "remote sshfs",
                source,
            })?;

        let mut local = match Command::new(&self.config.sftp_server)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                terminate(&mut remote);
                return Err(BridgeError::Launch {
                    what: "sftp-server",
                    source,
                });
            }
        };

        let pumps = [
            pump("sshfs-to-sftp", remote.stdout.take(), local.stdin.take()),
            pump("sftp-to-sshfs", local.stdout.take(), remote.stdin.take()),
        ];

        let result = self.watch(&mut remote, &mut local);

        terminate(&mut remote);
        terminate(&mut local);
        for pump in pumps.into_iter().flatten() {
            if pump.join().is_err() {
                warn!("bridge pump panicked");
            }
        }

        result
    }
}

impl ProcessBridge {
    /// Poll for shutdown or either process exiting
    fn watch(&self, remote: &mut Child, local: &mut Child) -> Result<(), BridgeError> {
        loop {
            if self.listener.wait_timeout(self.config.poll_interval) {
                return Ok(());
            }
            if let Some(status) = remote.try_wait()? {
                return exit_result(status, BridgeError::RemoteExited);
            }
            if let Some(status) = local.try_wait()? {
                return exit_result(status, BridgeError::SftpServerExited);
            }
        }
    }
}

fn exit_result(status: ExitStatus, error: fn(i32) -> BridgeError) -> Result<(), BridgeError> {
    if status.success() {
        Ok(())
    } else {
        Err(error(status.code().unwrap_or(-1)))
    }
}

/// Kill a child if it is still running and reap it
fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            if let Err(e) = child.kill() {
                debug!(error = %e, "kill failed");
            }
            let _ = child.wait();
        }
    }
}

/// Copy `reader` into `writer` on a thread until either side closes
fn pump<R, W>(name: &str, reader: Option<R>, writer: Option<W>) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (mut reader, mut writer) = (reader?, writer?);
    let label = name.to_string();
    let spawned = thread::Builder::new().name(label.clone()).spawn(move || {
        if let Err(e) = io::copy(&mut reader, &mut writer) {
            debug!(pump = %label, error = %e, "pump closed");
        }
    });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(pump = name, error = %e, "failed to start pump");
            None
        }
    }
}

/// Command line starting the slave sshfs for `source` on `target`
pub fn remote_mount_command(
    invocation: &SshfsInvocation,
    source: &str,
    target: &str,
    default_uid: Id,
    default_gid: Id,
    elevate: &str,
) -> String {
    let command = format!(
        "{} -o uid={},gid={} {} {}",
        invocation.command_line(),
        default_uid,
        default_gid,
        shell_quote(&format!(":{}", source)),
        shell_quote(target)
    );
    if elevate.is_empty() {
        command
    } else {
        format!("{} {}", elevate, command)
    }
}
