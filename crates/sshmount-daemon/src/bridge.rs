//! Bridge server boundary
//!
//! The bridge server owns the remote session once setup is done and runs a
//! blocking serve loop on the mount worker thread. Stopping it is
//! cooperative:
//!
//! ```text
//! Controller thread              Mount worker
//! ─────────────────              ────────────
//!     │                               │ serve()
//!     │  ShutdownHandle::request()    │   └─ polls ShutdownListener
//!     ├──────────────────────────────►│
//!     │     (crossbeam bounded(1))    │ returns
//!     │                               │
//!     │◄─────────── join ─────────────┤
//! ```
//!
//! Requesting shutdown is idempotent and may happen from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use sshmount_core::{BridgeError, Id, IdMap, SshfsInvocation};

use crate::session::RemoteSession;

/// Everything a bridge server is built from. The session is moved in.
pub struct BridgeParams<S> {
    pub session: S,
    pub source: String,
    pub target: String,
    pub uid_map: IdMap,
    pub gid_map: IdMap,
    /// Owner reported for files without an explicit uid mapping
    pub default_uid: Id,
    /// Group reported for files without an explicit gid mapping
    pub default_gid: Id,
    pub invocation: SshfsInvocation,
}

/// Server bridging filesystem requests between this side and the remote sshfs
pub trait BridgeServer: Send + 'static {
    type Session: RemoteSession;
    /// Server-specific settings not derived from the remote host
    type Config;

    /// Build the server, taking ownership of the session
    fn new(params: BridgeParams<Self::Session>, config: Self::Config) -> Result<Self, BridgeError>
    where
        Self: Sized;

    /// Handle used to stop [`BridgeServer::serve`] from another thread
    fn shutdown_handle(&self) -> ShutdownHandle;

    /// Serve until shut down or the transport goes away (blocking)
    fn serve(&mut self) -> Result<(), BridgeError>;
}

/// Create a connected shutdown handle/listener pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownListener) {
    let (tx, rx) = bounded(1);
    let requested = Arc::new(AtomicBool::new(false));
    (
        ShutdownHandle {
            tx,
            requested: requested.clone(),
        },
        ShutdownListener { rx, requested },
    )
}

/// Requests a serve loop to stop
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Sender<()>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Request shutdown. Returns `true` only for the first request.
    pub fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                debug!("shutdown requested after serve loop exited");
            }
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Serve-loop side of the shutdown channel
#[derive(Debug)]
pub struct ShutdownListener {
    rx: Receiver<()>,
    requested: Arc<AtomicBool>,
}

impl ShutdownListener {
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for a shutdown request.
    ///
    /// Returns `true` once shutdown was requested or every handle is gone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => self.is_requested(),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("all shutdown handles dropped");
                true
            }
        }
    }
}
