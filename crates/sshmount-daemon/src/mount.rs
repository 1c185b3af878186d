//! sshfs mount lifecycle
//!
//! [`SshfsMount::new`] runs the whole bootstrap synchronously, in order:
//!
//! 1. resolve the remote sshfs invocation
//! 2. create and chown the mount point
//! 3. query the session user's default uid/gid
//! 4. build the bridge server, moving the session into it
//! 5. spawn the mount worker running the blocking serve loop
//!
//! Any failure before step 5 returns an error and leaves nothing running.
//! A constructed mount is running until [`SshfsMount::stop`] or drop.

use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info, info_span, Span};

use sshmount_core::{MountError, MountRequest, MountTarget, ProbeConfig, SshfsInvocation};

use crate::bridge::{BridgeParams, BridgeServer, ShutdownHandle};
use crate::provision::{DefaultIds, TargetProvisioner};
use crate::resolver::SshfsResolver;

/// Lifecycle state of a constructed mount
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountState {
    Running,
    Stopped,
}

/// A running sshfs mount backed by a bridge server on its own thread
pub struct SshfsMount {
    request: MountRequest,
    invocation: SshfsInvocation,
    mount_target: MountTarget,
    default_ids: DefaultIds,
    shutdown: ShutdownHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl SshfsMount {
    /// Bootstrap the mount and start serving it with bridge server `B`
    pub fn new<B>(
        mut session: B::Session,
        request: MountRequest,
        probe: &ProbeConfig,
        bridge_config: B::Config,
    ) -> Result<Self, MountError>
    where
        B: BridgeServer,
    {
        let span = info_span!(
            "sshfs_mount",
            mount_source = %request.source,
            mount_target = %request.target
        );
        let _enter = span.enter();

        let invocation = SshfsResolver::new(probe.clone()).resolve(&mut session)?;

        let provisioner = TargetProvisioner::new(probe.clone());
        let mount_target = provisioner.provision(&mut session, &request.target)?;
        let default_ids = provisioner.default_ids(&mut session)?;

        let params = BridgeParams {
            session,
            source: request.source.clone(),
            target: request.target.clone(),
            uid_map: request.uid_map.clone(),
            gid_map: request.gid_map.clone(),
            default_uid: default_ids.uid,
            default_gid: default_ids.gid,
            invocation: invocation.clone(),
        };
        let mut server = B::new(params, bridge_config)?;
        let shutdown = server.shutdown_handle();

        let worker_span = span.clone();
        let worker = thread::Builder::new()
            .name("sshfs-mount".into())
            .spawn(move || {
                let _enter = worker_span.enter();
                info!("bridge connected");
                match server.serve() {
                    Ok(()) => info!("bridge stopped"),
                    Err(e) => error!(error = %e, "bridge stopped with error"),
                }
            })?;

        drop(_enter);
        Ok(Self {
            request,
            invocation,
            mount_target,
            default_ids,
            shutdown,
            worker: Mutex::new(Some(worker)),
            span,
        })
    }

    /// Stop the bridge server and wait for the worker to exit.
    ///
    /// Only the first call signals the bridge. Concurrent callers block until
    /// the worker has exited; calls after that return immediately.
    pub fn stop(&self) {
        // Held across the join so no caller returns while the worker runs
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return;
        };
        let _enter = self.span.enter();

        self.shutdown.request();
        if worker.join().is_err() {
            error!("mount worker panicked");
        }
        info!("mount stopped");
    }

    pub fn state(&self) -> MountState {
        if self.worker.lock().is_some() {
            MountState::Running
        } else {
            MountState::Stopped
        }
    }

    /// Whether the serve loop is still running. False once the worker exits on its own.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    pub fn source(&self) -> &str {
        &self.request.source
    }

    pub fn target(&self) -> &MountTarget {
        &self.mount_target
    }

    pub fn invocation(&self) -> &SshfsInvocation {
        &self.invocation
    }

    pub fn default_ids(&self) -> DefaultIds {
        self.default_ids
    }
}

impl Drop for SshfsMount {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SshfsMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshfsMount")
            .field("source", &self.request.source)
            .field("target", &self.mount_target)
            .field("invocation", &self.invocation.command_line())
            .field("state", &self.state())
            .finish()
    }
}
