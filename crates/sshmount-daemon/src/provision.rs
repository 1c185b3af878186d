//! Mount point preparation on the remote host

use tracing::debug;

use sshmount_core::{shell_quote, Id, MountError, MountTarget, ProbeConfig};

use crate::session::{OutputMode, RemoteSession};

const COMPONENT: &str = "provisioner";

/// Default numeric ownership of the session user
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultIds {
    pub uid: Id,
    pub gid: Id,
}

/// Creates the mount point and hands it to the session user
#[derive(Clone, Debug, Default)]
pub struct TargetProvisioner {
    probe: ProbeConfig,
}

impl TargetProvisioner {
    pub fn new(probe: ProbeConfig) -> Self {
        Self { probe }
    }

    /// Create `target` (and its parents) and chown it to the session's user and group
    pub fn provision<S>(&self, session: &mut S, target: &str) -> Result<MountTarget, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let quoted = shell_quote(target);

        session.run(
            &self.probe.elevated(&format!("mkdir -p {}", quoted)),
            OutputMode::Combined,
        )?;

        let owner_user = query_name(session, "id -nu")?;
        let owner_group = query_name(session, "id -ng")?;

        let owner = shell_quote(&format!("{}:{}", owner_user, owner_group));
        session.run(
            &self.probe.elevated(&format!("chown {} {}", owner, quoted)),
            OutputMode::Combined,
        )?;

        debug!(
            component = COMPONENT,
            mount_target = target,
            owner = %format!("{}:{}", owner_user, owner_group),
            "mount point ready"
        );

        Ok(MountTarget {
            path: target.to_string(),
            owner_user,
            owner_group,
        })
    }

    /// Numeric uid and gid of the session user
    pub fn default_ids<S>(&self, session: &mut S) -> Result<DefaultIds, MountError>
    where
        S: RemoteSession + ?Sized,
    {
        let uid = query_id(session, "id -u")?;
        let gid = query_id(session, "id -g")?;
        debug!(component = COMPONENT, uid, gid, "default ids");
        Ok(DefaultIds { uid, gid })
    }
}

fn query_name<S>(session: &mut S, command: &str) -> Result<String, MountError>
where
    S: RemoteSession + ?Sized,
{
    let output = session.run(command, OutputMode::StdoutOnly)?;
    let name = output.trim_end();
    if name.is_empty() {
        return Err(MountError::UnexpectedOutput {
            command: command.to_string(),
            output,
        });
    }
    Ok(name.to_string())
}

fn query_id<S>(session: &mut S, command: &str) -> Result<Id, MountError>
where
    S: RemoteSession + ?Sized,
{
    let output = session.run(command, OutputMode::StdoutOnly)?;
    output
        .trim()
        .parse()
        .map_err(|_| MountError::UnexpectedOutput {
            command: command.to_string(),
            output,
        })
}
