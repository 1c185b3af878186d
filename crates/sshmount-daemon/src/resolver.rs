//! Locating sshfs on the remote host
//!
//! Remote hosts carry sshfs in one of two ways: the self-contained
//! `multipass-sshfs` snap (with its own libfuse), or the distribution
//! package on the search path. The snap is always preferred.
//!
//! # Resolution
//!
//! ```text
//! snap env helper ──ok──► Package { LD_LIBRARY_PATH, SNAP }
//!       │ fails                                      │
//!       ▼                                            ▼
//! which sshfs ─────ok──► System { path } ───► `<exec> -V` ──► libfuse < 3.0.0 ?
//!       │ fails                                      │            │
//!       ▼                                            │            └─► -o nonempty
//! SshfsMissing                                       └─► -o slave -o transform_symlinks -o allow_other
//! ```
//!
//! Every probe is a fresh remote command; a failed probe leaves nothing
//! behind for the next one.

use semver::Version;
use tracing::{debug, warn};

use sshmount_core::{
    MountError, ProbeConfig, SshfsExecutable, SshfsInvocation, FUSE_VERSION_MARKER,
    LD_LIBRARY_PATH_KEY, NONEMPTY_REMOVED_IN, SNAP_PATH_KEY,
};

use crate::session::{OutputMode, RemoteSession};

const COMPONENT: &str = "resolver";

/// Resolves how to invoke sshfs on the remote host
#[derive(Clone, Debug, Default)]
pub struct SshfsResolver {
    probe: ProbeConfig,
}

impl SshfsResolver {
    pub fn new(probe: ProbeConfig) -> Self {
        Self { probe }
    }

    /// Probe the remote host and build the full sshfs invocation.
    ///
    /// Fails with [`MountError::SshfsMissing`] when neither the snap nor a
    /// system sshfs can be found, and with the command's own error when the
    /// found executable fails `-V`. A banner with no usable libfuse version
    /// just leaves the legacy option off.
    pub fn resolve<S>(&self, session: &mut S) -> Result<SshfsInvocation, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let executable = match self.probe_package(session) {
            Ok(executable) => executable,
            Err(e) => {
                debug!(
                    component = COMPONENT,
                    error = %e,
                    "'{}' snap package is not installed",
                    self.probe.snap_env_helper
                );
                self.probe_system(session).map_err(|e| {
                    warn!(
                        component = COMPONENT,
                        error = %e,
                        "unable to determine if 'sshfs' is installed"
                    );
                    MountError::SshfsMissing
                })?
            }
        };

        let fuse_version = self.query_fuse_version(session, &executable)?;
        let legacy = fuse_version.as_deref().map_or(false, needs_nonempty);

        let invocation = SshfsInvocation::new(executable, fuse_version, legacy);
        debug!(component = COMPONENT, invocation = %invocation, "resolved sshfs");
        Ok(invocation)
    }

    /// Ask the snap's env helper for its library path and install root
    fn probe_package<S>(&self, session: &mut S) -> Result<SshfsExecutable, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let command = self.probe.elevated(&self.probe.snap_env_helper);
        let env = session.run(&command, OutputMode::Combined)?;

        let unexpected = || MountError::UnexpectedOutput {
            command: command.clone(),
            output: env.clone(),
        };

        let ld_library_path = match_line(&env, LD_LIBRARY_PATH_KEY).ok_or_else(unexpected)?;
        let install_root = match_line(&env, SNAP_PATH_KEY)
            .map(|line| &line[SNAP_PATH_KEY.len()..])
            .filter(|root| !root.is_empty())
            .ok_or_else(unexpected)?;

        Ok(SshfsExecutable::Package {
            ld_library_path: ld_library_path.to_string(),
            install_root: install_root.to_string(),
        })
    }

    /// Look the executable up on the remote search path
    fn probe_system<S>(&self, session: &mut S) -> Result<SshfsExecutable, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let command = self
            .probe
            .elevated(&format!("which {}", self.probe.sshfs_name));
        let output = session.run(&command, OutputMode::StdoutOnly)?;

        let path = output.trim_end();
        if path.is_empty() {
            return Err(MountError::UnexpectedOutput { command, output });
        }

        Ok(SshfsExecutable::System {
            path: path.to_string(),
        })
    }

    /// libfuse version from `sshfs -V`, or `None` when the banner lacks one.
    ///
    /// A failing `-V` means the executable cannot run and aborts resolution.
    fn query_fuse_version<S>(
        &self,
        session: &mut S,
        executable: &SshfsExecutable,
    ) -> Result<Option<String>, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let command = self
            .probe
            .elevated(&format!("{} -V", executable.command()));
        let banner = session.run(&command, OutputMode::Combined)?;

        let version = parse_fuse_version(&banner);
        if version.is_none() {
            debug!(component = COMPONENT, "no FUSE library version in sshfs banner");
        }
        Ok(version)
    }
}

/// First line starting with `prefix`, without its line ending
fn match_line<'a>(output: &'a str, prefix: &str) -> Option<&'a str> {
    output
        .lines()
        .map(|line| line.trim())
        .find(|line| line.starts_with(prefix))
}

/// Extract the version token following the FUSE library marker.
///
/// Any run of colons and spaces after the marker is skipped; the token ends
/// at the next whitespace or colon.
pub fn parse_fuse_version(banner: &str) -> Option<String> {
    let line = banner.lines().find(|l| l.contains(FUSE_VERSION_MARKER))?;
    let (_, rest) = line.split_once(FUSE_VERSION_MARKER)?;

    let version: String = rest
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Parse a libfuse version, accepting `major` and `major.minor` forms too
pub fn parse_version(version: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(version) {
        return Some(v);
    }

    let padded = match version.matches('.').count() {
        0 => format!("{}.0.0", version),
        1 => format!("{}.0", version),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

/// Whether `-o nonempty` is still needed for this libfuse version.
///
/// Unparsable versions never need it.
pub fn needs_nonempty(version: &str) -> bool {
    let (major, minor, patch) = NONEMPTY_REMOVED_IN;
    match parse_version(version) {
        Some(v) => v < Version::new(major, minor, patch),
        None => {
            debug!(component = COMPONENT, version, "unparsable FUSE library version");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snap_host, ScriptedSession, SNAP_SSHFS};
    use sshmount_core::CommandOutput;
    use tracing_test::traced_test;

    fn system_host(banner: Option<&str>) -> ScriptedSession {
        ScriptedSession::new()
            .ok("sudo which sshfs", "/usr/bin/sshfs\n")
            .ok(
                "sudo /usr/bin/sshfs -V",
                banner.unwrap_or("SSHFS version 3.7.1\n"),
            )
    }

    #[test]
    fn test_legacy_threshold() {
        for v in ["2.9.9", "2.9.7-1ubuntu1", "1.0.0", "2.10", "2", "3.0.0-rc.1"] {
            assert!(needs_nonempty(v), "{} should need nonempty", v);
        }
        for v in ["3.0.0", "3.4.1", "3.10.3", "10.0.0", "3"] {
            assert!(!needs_nonempty(v), "{} should not need nonempty", v);
        }
    }

    #[test]
    fn test_semver_not_lexical() {
        // "10.0.0" sorts before "3.0.0" as a string
        assert!(!needs_nonempty("10.0.0"));
        assert!(needs_nonempty("2.10.0"));
    }

    #[test]
    fn test_unparsable_version_is_not_legacy() {
        for v in ["", "unknown", "2.9.9.1", "v2.9", "2..9"] {
            assert!(!needs_nonempty(v), "{:?} should not need nonempty", v);
        }
    }

    #[test]
    fn test_parse_fuse_version_colons() {
        let banners = [
            "FUSE library version 2.9.9",
            "FUSE library version: 2.9.9",
            "FUSE library version:: 2.9.9",
            "FUSE library version: 2.9.9: extra: tokens",
            "SSHFS version 2.10\nFUSE library version: 2.9.9\nusing FUSE kernel interface version 7.19",
        ];
        for banner in banners {
            assert_eq!(parse_fuse_version(banner).as_deref(), Some("2.9.9"), "{:?}", banner);
        }
    }

    #[test]
    fn test_match_line_requires_prefix_at_start() {
        let env = "MULTIPASS_SNAP=/wrong\n  SNAP=/snap/multipass-sshfs/current\nSNAP=/later\n";
        assert_eq!(
            match_line(env, SNAP_PATH_KEY),
            Some("SNAP=/snap/multipass-sshfs/current")
        );
        assert_eq!(match_line("X_LD_LIBRARY_PATH=/lib\n", LD_LIBRARY_PATH_KEY), None);
    }

    #[test]
    fn test_parse_fuse_version_absent() {
        assert_eq!(parse_fuse_version("SSHFS version 3.7.1"), None);
        assert_eq!(parse_fuse_version("FUSE library version:"), None);
        assert_eq!(parse_fuse_version(""), None);
    }

    #[test]
    fn test_snap_with_old_fuse_is_legacy() {
        let mut session = snap_host("2.9.9");

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert_eq!(
            invocation.executable,
            SshfsExecutable::Package {
                ld_library_path: "LD_LIBRARY_PATH=/snap/multipass-sshfs/current/lib".into(),
                install_root: "/snap/multipass-sshfs/current".into(),
            }
        );
        assert_eq!(invocation.fuse_version.as_deref(), Some("2.9.9"));
        assert!(invocation.is_legacy());
        assert_eq!(
            invocation.command_line(),
            format!(
                "{} -o slave -o transform_symlinks -o allow_other -o nonempty",
                SNAP_SSHFS
            )
        );
    }

    #[test]
    fn test_snap_with_new_fuse_is_not_legacy() {
        let mut session = snap_host("3.4.1");

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert!(!invocation.is_legacy());
        for option in ["slave", "transform_symlinks", "allow_other"] {
            assert!(invocation.has_option(option));
        }
    }

    #[test]
    fn test_snap_preferred_over_system() {
        let mut session = snap_host("3.4.1").ok("sudo which sshfs", "/usr/bin/sshfs\n");
        let log = session.log();

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert!(matches!(invocation.executable, SshfsExecutable::Package { .. }));
        assert!(!log.lock().iter().any(|c| c.contains("which")));
    }

    #[traced_test]
    #[test]
    fn test_system_fallback_without_banner() {
        let mut session = system_host(None);

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert_eq!(
            invocation.executable,
            SshfsExecutable::System {
                path: "/usr/bin/sshfs".into()
            }
        );
        assert_eq!(invocation.fuse_version, None);
        assert!(!invocation.is_legacy());
        assert!(logs_contain("snap package is not installed"));
    }

    #[test]
    fn test_system_fallback_with_banner() {
        let mut session = system_host(Some("SSHFS version 2.8\nFUSE library version: 2.9.4\n"));

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert!(invocation.is_legacy());
        assert_eq!(
            invocation.command_line(),
            "/usr/bin/sshfs -o slave -o transform_symlinks -o allow_other -o nonempty"
        );
    }

    #[test]
    fn test_failing_version_query_aborts() {
        let mut session = ScriptedSession::new()
            .ok("sudo which sshfs", "/usr/bin/sshfs\n")
            .reply(
                "sudo /usr/bin/sshfs -V",
                CommandOutput::failure(
                    1,
                    "sshfs: error while loading shared libraries: libfuse.so.2",
                ),
            );

        let err = SshfsResolver::default().resolve(&mut session).unwrap_err();

        match err {
            MountError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                assert_eq!(command, "sudo /usr/bin/sshfs -V");
                assert!(stderr.contains("libfuse.so.2"));
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_version_query_disconnect_aborts() {
        let mut session = snap_host("3.4.1").disconnect(&format!("sudo {} -V", SNAP_SSHFS));

        let err = SshfsResolver::default().resolve(&mut session).unwrap_err();
        assert!(matches!(err, MountError::CommandFailed { exit_code: None, .. }));
    }

    #[test]
    fn test_incomplete_snap_env_falls_back() {
        let mut session = system_host(None).ok("sudo multipass-sshfs.env", "SNAP=/snap/x\n");
        let log = session.log();

        let invocation = SshfsResolver::default().resolve(&mut session).unwrap();

        assert!(matches!(invocation.executable, SshfsExecutable::System { .. }));
        assert_eq!(
            log.lock().iter().filter(|c| *c == "sudo which sshfs").count(),
            1
        );
    }

    #[traced_test]
    #[test]
    fn test_both_probes_fail() {
        let mut session = ScriptedSession::new()
            .reply("sudo which sshfs", CommandOutput::failure(1, ""));
        let log = session.log();

        let err = SshfsResolver::default().resolve(&mut session).unwrap_err();

        assert!(err.is_sshfs_missing());
        assert_eq!(
            *log.lock(),
            vec!["sudo multipass-sshfs.env".to_string(), "sudo which sshfs".to_string()]
        );
        assert!(logs_contain("unable to determine if 'sshfs' is installed"));
    }

    #[test]
    fn test_empty_which_output_is_missing() {
        let mut session = ScriptedSession::new().ok("sudo which sshfs", "\n");

        let err = SshfsResolver::default().resolve(&mut session).unwrap_err();
        assert!(err.is_sshfs_missing());
    }

    #[test]
    fn test_custom_probe_config() {
        let probe = ProbeConfig {
            elevate: String::new(),
            snap_env_helper: "sshfs-snap.env".into(),
            sshfs_name: "sshfs3".into(),
        };
        let mut session = ScriptedSession::new()
            .ok("which sshfs3", "/opt/bin/sshfs3\n")
            .ok("/opt/bin/sshfs3 -V", "FUSE library version 3.10.3\n");
        let log = session.log();

        let invocation = SshfsResolver::new(probe).resolve(&mut session).unwrap();

        assert_eq!(invocation.fuse_version.as_deref(), Some("3.10.3"));
        assert!(!invocation.is_legacy());
        assert_eq!(log.lock()[0], "sshfs-snap.env");
    }
}
