//! sshmount daemon - remote sshfs bootstrap and mount lifecycle
//!
//! This crate provides:
//! - Remote command execution over an authenticated session
//! - Resolution of the remote sshfs executable and its options
//! - Mount point provisioning on the remote host
//! - The mount controller running the bridge server on its own thread
//!
//! # Architecture
//!
//! Setup is strictly sequential and blocking; only the serve loop runs in
//! parallel:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Caller thread (SshfsMount::new)             │
//! │  SshfsResolver ─► TargetProvisioner ─► default ids          │
//! │            all over the same RemoteSession                  │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ session moved into the bridge
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Mount worker thread                       │
//! │  BridgeServer::serve() until ShutdownHandle::request()      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session has exactly one owner at any time: the controller during
//! setup, the bridge server afterwards.

pub mod bridge;
pub mod mount;
pub mod process_bridge;
pub mod provision;
pub mod resolver;
pub mod session;
pub mod ssh;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{
    shutdown_channel, BridgeParams, BridgeServer, ShutdownHandle, ShutdownListener,
};
pub use mount::{MountState, SshfsMount};
pub use process_bridge::{ProcessBridge, ProcessBridgeConfig};
pub use provision::{DefaultIds, TargetProvisioner};
pub use resolver::SshfsResolver;
pub use session::{OutputMode, RemoteSession};
pub use ssh::ProcessSession;
