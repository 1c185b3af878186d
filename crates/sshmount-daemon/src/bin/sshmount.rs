//! sshmount CLI - expose a local directory inside a remote host over sshfs
//!
//! Usage:
//!   sshmount --host <host> probe                    Show how sshfs would be invoked
//!   sshmount --host <host> prepare <target>         Create and chown the mount point
//!   sshmount --host <host> mount <source> <target>  Mount until Ctrl+C
//!   sshmount config                                 Print a sample config file

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn, Level};

use sshmount_core::{
    id_map, Config, IdMapping, MountError, MountRequest, MountTarget, SshfsInvocation,
};
use sshmount_daemon::{
    DefaultIds, ProcessBridge, ProcessBridgeConfig, ProcessSession, SshfsMount, SshfsResolver,
    TargetProvisioner,
};

#[derive(Parser)]
#[command(name = "sshmount")]
#[command(about = "Mount local directories on remote hosts over sshfs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config directory)
    #[arg(short, long, global = true, env = "SSHMOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Remote host, overrides [ssh] host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Remote user, overrides [ssh] user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// ssh port, overrides [ssh] port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the remote sshfs invocation without changing anything
    Probe {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve sshfs, then create and chown the mount point
    Prepare {
        /// Mount point on the remote host
        target: String,
    },

    /// Mount a local directory on the remote host until interrupted
    Mount {
        /// Local directory to expose
        source: PathBuf,

        /// Mount point on the remote host
        target: String,

        /// uid mapping REMOTE:LOCAL (repeatable)
        #[arg(long = "uid-map")]
        uid_map: Vec<IdMapping>,

        /// gid mapping REMOTE:LOCAL (repeatable)
        #[arg(long = "gid-map")]
        gid_map: Vec<IdMapping>,
    },

    /// Print a sample configuration file
    Config,
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    host: &'a str,
    invocation: &'a SshfsInvocation,
    command_line: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    if cli.json_logs {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(host) = cli.host {
        config.ssh.host = host;
    }
    if let Some(user) = cli.user {
        config.ssh.user = Some(user);
    }
    if let Some(port) = cli.port {
        config.ssh.port = port;
    }

    match cli.command {
        Commands::Probe { json } => run_probe(&config, json),
        Commands::Prepare { target } => run_prepare(&config, &target),
        Commands::Mount {
            source,
            target,
            uid_map,
            gid_map,
        } => run_mount(&config, source, target, &uid_map, &gid_map),
        Commands::Config => {
            if let Some(path) = Config::default_path() {
                println!("# default location: {}", path.display());
            }
            print!("{}", Config::sample());
            Ok(())
        }
    }
}

fn run_probe(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::new(config.ssh.clone());
    let invocation = SshfsResolver::new(config.probe.clone())
        .resolve(&mut session)
        .map_err(|e| explain(config, e))?;

    if json {
        let report = ProbeReport {
            host: &config.ssh.host,
            invocation: &invocation,
            command_line: invocation.command_line(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("host:          {}", config.ssh.host);
        println!(
            "fuse version:  {}",
            invocation.fuse_version.as_deref().unwrap_or("unknown")
        );
        println!("legacy:        {}", invocation.is_legacy());
        println!("command line:  {}", invocation.command_line());
    }
    Ok(())
}

fn run_prepare(config: &Config, target: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ProcessSession::new(config.ssh.clone());
    SshfsResolver::new(config.probe.clone())
        .resolve(&mut session)
        .map_err(|e| explain(config, e))?;

    let provisioner = TargetProvisioner::new(config.probe.clone());
    let MountTarget {
        path,
        owner_user,
        owner_group,
    } = provisioner.provision(&mut session, target)?;
    let DefaultIds { uid, gid } = provisioner.default_ids(&mut session)?;

    println!("{} ready, owned by {}:{} ({}:{})", path, owner_user, owner_group, uid, gid);
    Ok(())
}

fn run_mount(
    config: &Config,
    source: PathBuf,
    target: String,
    uid_map: &[IdMapping],
    gid_map: &[IdMapping],
) -> Result<(), Box<dyn std::error::Error>> {
    let source = source.canonicalize()?;
    if !source.is_dir() {
        error!("Source must be a directory: {:?}", source);
        return Err("Not a directory".into());
    }

    let mut request = MountRequest {
        source: source.to_string_lossy().into_owned(),
        target,
        uid_map: config.mount.uid_map(),
        gid_map: config.mount.gid_map(),
    };
    request.uid_map.extend(id_map(uid_map));
    request.gid_map.extend(id_map(gid_map));

    info!("Mounting {:?} on {}:{}", source, config.ssh.host, request.target);

    let session = ProcessSession::new(config.ssh.clone());
    let mount = SshfsMount::new::<ProcessBridge>(
        session,
        request,
        &config.probe,
        ProcessBridgeConfig::from_config(config),
    )
    .map_err(|e| explain(config, e))?;

    info!("  sshfs: {}", mount.invocation());
    info!("  Press Ctrl+C to unmount");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    // Handle Ctrl+C, or the bridge going away on its own
    let exit = rt.block_on(wait_for_exit(
        tokio::signal::ctrl_c(),
        || mount.is_running(),
        Duration::from_millis(500),
    ));
    match exit {
        Exit::Interrupted => info!("Shutting down..."),
        Exit::BridgeExited => warn!("Bridge exited, unmounting"),
    }

    mount.stop();
    info!("Unmounted");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Interrupted,
    BridgeExited,
}

/// Wait for `signal`, checking `is_running` every `period`.
///
/// The signal future is created once so an interrupt that lands between
/// checks is not lost.
async fn wait_for_exit<F, R>(signal: F, is_running: R, period: Duration) -> Exit
where
    F: Future<Output = std::io::Result<()>>,
    R: Fn() -> bool,
{
    tokio::pin!(signal);
    let mut tick = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = &mut signal => return Exit::Interrupted,
            _ = tick.tick() => {
                if !is_running() {
                    return Exit::BridgeExited;
                }
            }
        }
    }
}

/// Log installation hints for the terminal "no sshfs" error
fn explain(config: &Config, e: MountError) -> MountError {
    if e.is_sshfs_missing() {
        error!("sshfs was not found on {}", config.ssh.host);
        error!("Install one of:");
        error!("  1. sudo snap install multipass-sshfs");
        error!("  2. sudo apt install sshfs");
    }
    e
}
