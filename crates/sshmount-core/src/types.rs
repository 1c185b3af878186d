//! Core types shared by the resolver, provisioner, and bridge

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FIXED_SSHFS_OPTIONS, LEGACY_NONEMPTY_OPTION};

/// Numeric user or group id
pub type Id = u32;

/// Remote id -> local id, supplied by the caller at mount time
pub type IdMap = HashMap<Id, Id>;

/// Captured result of one remote command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One `REMOTE:LOCAL` entry of an id map, as written in config and on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdMapping {
    pub remote: Id,
    pub local: Id,
}

impl FromStr for IdMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (remote, local) = s
            .split_once(':')
            .ok_or_else(|| format!("expected REMOTE:LOCAL, got {:?}", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<Id>()
                .map_err(|e| format!("invalid id {:?}: {}", v, e))
        };
        Ok(Self {
            remote: parse(remote)?,
            local: parse(local)?,
        })
    }
}

impl TryFrom<String> for IdMapping {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IdMapping> for String {
    fn from(m: IdMapping) -> Self {
        m.to_string()
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.remote, self.local)
    }
}

/// Collect mapping entries into a lookup table; later entries win
pub fn id_map(entries: &[IdMapping]) -> IdMap {
    entries.iter().map(|m| (m.remote, m.local)).collect()
}

/// Where the remote sshfs executable was found
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SshfsExecutable {
    /// Self-contained snap package with a private libfuse
    Package {
        /// Full `LD_LIBRARY_PATH=...` line reported by the package
        ld_library_path: String,
        /// Installation root (`SNAP`)
        install_root: String,
    },
    /// Distribution package found on the search path
    System { path: String },
}

impl SshfsExecutable {
    /// Shell words that start the executable on the remote host
    pub fn command(&self) -> String {
        match self {
            SshfsExecutable::Package {
                ld_library_path,
                install_root,
            } => format!(
                "env {} {}",
                shell_word(ld_library_path),
                shell_word(&format!("{}/bin/sshfs", install_root))
            ),
            SshfsExecutable::System { path } => shell_word(path),
        }
    }
}

/// Fully resolved way to start the remote sshfs. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshfsInvocation {
    pub executable: SshfsExecutable,
    /// libfuse version reported by `sshfs -V`, if any
    pub fuse_version: Option<String>,
    /// `-o` options, in the order they are passed
    pub options: Vec<String>,
}

impl SshfsInvocation {
    /// Build the invocation, appending the fixed options and the legacy one when asked
    pub fn new(executable: SshfsExecutable, fuse_version: Option<String>, legacy: bool) -> Self {
        let mut options: Vec<String> = FIXED_SSHFS_OPTIONS.iter().map(|o| o.to_string()).collect();
        if legacy {
            options.push(LEGACY_NONEMPTY_OPTION.to_string());
        }
        Self {
            executable,
            fuse_version,
            options,
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Whether the libfuse 2.x compatibility option is present
    pub fn is_legacy(&self) -> bool {
        self.has_option(LEGACY_NONEMPTY_OPTION)
    }

    /// Complete command line, e.g. `/usr/bin/sshfs -o slave -o transform_symlinks -o allow_other`
    pub fn command_line(&self) -> String {
        let mut line = self.executable.command();
        for option in &self.options {
            line.push_str(" -o ");
            line.push_str(option);
        }
        line
    }
}

impl fmt::Display for SshfsInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Mount point on the remote host plus the ownership given to it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTarget {
    pub path: String,
    pub owner_user: String,
    pub owner_group: String,
}

/// What the caller asks to have mounted
#[derive(Clone, Debug, Default)]
pub struct MountRequest {
    /// Directory served from this side (descriptive to the bootstrap)
    pub source: String,
    /// Mount point on the remote host
    pub target: String,
    pub uid_map: IdMap,
    pub gid_map: IdMap,
}

/// Pass `value` through as one shell word, quoting only when it holds
/// characters the shell would interpret
pub fn shell_word(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));
    if plain {
        value.to_string()
    } else {
        shell_quote(value)
    }
}

/// Quote a value for a POSIX shell using single quotes
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_mapping_parse() {
        let m: IdMapping = "1000:501".parse().unwrap();
        assert_eq!(m, IdMapping { remote: 1000, local: 501 });
        assert_eq!(m.to_string(), "1000:501");

        assert!("1000".parse::<IdMapping>().is_err());
        assert!("a:1".parse::<IdMapping>().is_err());
        assert!("1:-2".parse::<IdMapping>().is_err());
    }

    #[test]
    fn test_id_map_last_entry_wins() {
        let entries = [
            IdMapping { remote: 1, local: 2 },
            IdMapping { remote: 1, local: 3 },
            IdMapping { remote: 4, local: 5 },
        ];
        let map = id_map(&entries);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], 3);
        assert_eq!(map[&4], 5);
    }

    #[test]
    fn test_package_command() {
        let exec = SshfsExecutable::Package {
            ld_library_path: "LD_LIBRARY_PATH=/snap/lib".into(),
            install_root: "/snap/multipass-sshfs/current".into(),
        };
        assert_eq!(
            exec.command(),
            "env LD_LIBRARY_PATH=/snap/lib /snap/multipass-sshfs/current/bin/sshfs"
        );
    }

    #[test]
    fn test_invocation_options() {
        let exec = SshfsExecutable::System {
            path: "/usr/bin/sshfs".into(),
        };

        let modern = SshfsInvocation::new(exec.clone(), Some("3.4.1".into()), false);
        assert_eq!(
            modern.command_line(),
            "/usr/bin/sshfs -o slave -o transform_symlinks -o allow_other"
        );
        assert!(!modern.is_legacy());

        let legacy = SshfsInvocation::new(exec, Some("2.9.9".into()), true);
        assert_eq!(
            legacy.command_line(),
            "/usr/bin/sshfs -o slave -o transform_symlinks -o allow_other -o nonempty"
        );
        assert!(legacy.is_legacy());
    }

    #[test]
    fn test_system_path_with_spaces_is_quoted() {
        let exec = SshfsExecutable::System {
            path: "/opt/my tools/sshfs".into(),
        };
        assert_eq!(exec.command(), "'/opt/my tools/sshfs'");

        let invocation = SshfsInvocation::new(exec, None, false);
        assert!(invocation
            .command_line()
            .starts_with("'/opt/my tools/sshfs' -o slave"));
    }

    #[test]
    fn test_package_root_with_metacharacters_is_quoted() {
        let exec = SshfsExecutable::Package {
            ld_library_path: "LD_LIBRARY_PATH=/snap/lib".into(),
            install_root: "/snap/x;rm -rf".into(),
        };
        assert_eq!(
            exec.command(),
            "env LD_LIBRARY_PATH=/snap/lib '/snap/x;rm -rf/bin/sshfs'"
        );
    }

    #[test]
    fn test_shell_word() {
        assert_eq!(shell_word("/usr/bin/sshfs"), "/usr/bin/sshfs");
        assert_eq!(shell_word("LD_LIBRARY_PATH=/a:/b"), "LD_LIBRARY_PATH=/a:/b");
        assert_eq!(shell_word("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_word(""), "''");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/home/ubuntu/mnt"), "'/home/ubuntu/mnt'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
