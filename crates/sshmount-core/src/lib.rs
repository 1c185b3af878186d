//! sshmount core - shared types, errors, and configuration
//!
//! This crate contains the foundational types used across all sshmount components.
//! It has no dependencies on ssh transports or process handling.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, Config, MountConfig, ProbeConfig, SshConfig};
pub use error::*;
pub use types::*;

/// Marker line printed by `sshfs -V` in front of the libfuse version
pub const FUSE_VERSION_MARKER: &str = "FUSE library version";

/// Line prefix carrying the private library path of the snap package
pub const LD_LIBRARY_PATH_KEY: &str = "LD_LIBRARY_PATH=";

/// Line prefix carrying the snap installation root
pub const SNAP_PATH_KEY: &str = "SNAP=";

/// libfuse version from which `-o nonempty` no longer exists
pub const NONEMPTY_REMOVED_IN: (u64, u64, u64) = (3, 0, 0);

/// Options every bridged sshfs runs with, in order
pub const FIXED_SSHFS_OPTIONS: &[&str] = &["slave", "transform_symlinks", "allow_other"];

/// Option only understood by libfuse 2.x
pub const LEGACY_NONEMPTY_OPTION: &str = "nonempty";
