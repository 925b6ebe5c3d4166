use anyhow::{Context, Result};
use burrow_config::{
    AppConfigLayer, HostKeyMode, LoggingConfigLayer, OperationConfigLayer, SshDefaultsLayer,
};
use burrow_core::{Credentials, EndpointKey, PermissionRequest};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use zeroize::Zeroizing;

pub const PASSPHRASE_ENV: &str = "BURROW_KEY_PASSPHRASE";

#[derive(Parser, Debug)]
#[command(name = "burrow", version, about = "Remote file management over SSH/SFTP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Per-operation timeout in milliseconds, 0 disables it.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[arg(long, global = true, value_enum)]
    pub host_key_policy: Option<HostKeyArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HostKeyArg {
    Strict,
    AcceptNew,
    InsecureAcceptAny,
}

impl From<HostKeyArg> for HostKeyMode {
    fn from(arg: HostKeyArg) -> Self {
        match arg {
            HostKeyArg::Strict => HostKeyMode::Strict,
            HostKeyArg::AcceptNew => HostKeyMode::AcceptNew,
            HostKeyArg::InsecureAcceptAny => HostKeyMode::InsecureAcceptAny,
        }
    }
}

impl Cli {
    pub fn overrides(&self) -> AppConfigLayer {
        AppConfigLayer {
            ssh: self.host_key_policy.map(|p| SshDefaultsLayer {
                host_key_policy: Some(p.into()),
                ..Default::default()
            }),
            operations: self.timeout_ms.map(|ms| OperationConfigLayer {
                timeout_ms: Some(ms),
                ..Default::default()
            }),
            logging: self.log_level.clone().map(|level| LoggingConfigLayer {
                level: Some(level),
                ..Default::default()
            }),
        }
    }

    pub fn is_serve(&self) -> bool {
        matches!(self.command, Command::Serve)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// `[user@]host[:port]`
    pub target: String,

    /// Private key file (PEM or OpenSSH format).
    #[arg(long, conflicts_with = "agent")]
    pub key: Option<PathBuf>,

    /// Authenticate through the running ssh-agent (the default).
    #[arg(long)]
    pub agent: bool,
}

impl ConnectArgs {
    pub fn endpoint(&self, default_port: u16) -> Result<EndpointKey> {
        Ok(EndpointKey::parse(&self.target, default_port)?)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let Some(path) = &self.key else {
            return Ok(Credentials::Agent);
        };
        let key = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading key file {}", path.display()))?,
        );
        let credentials = Credentials::PrivateKey {
            key,
            passphrase: None,
        };
        Ok(match std::env::var(PASSPHRASE_ENV) {
            Ok(pass) if !pass.is_empty() => credentials.with_passphrase(pass),
            _ => credentials,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a remote directory.
    Ls {
        #[command(flatten)]
        conn: ConnectArgs,
        path: String,
    },
    Mkdir {
        #[command(flatten)]
        conn: ConnectArgs,
        parent: String,
        name: String,
    },
    /// Print a remote text file.
    Cat {
        #[command(flatten)]
        conn: ConnectArgs,
        path: String,
    },
    /// Replace a remote text file with the contents of `--from` or stdin.
    Write {
        #[command(flatten)]
        conn: ConnectArgs,
        path: String,
        #[arg(long)]
        from: Option<PathBuf>,
    },
    Upload {
        #[command(flatten)]
        conn: ConnectArgs,
        local: PathBuf,
        dest_dir: String,
        /// Remote file name, defaults to the local one.
        #[arg(long)]
        name: Option<String>,
    },
    Rename {
        #[command(flatten)]
        conn: ConnectArgs,
        old_path: String,
        new_path: String,
    },
    Rm {
        #[command(flatten)]
        conn: ConnectArgs,
        path: String,
        /// Remove a directory recursively.
        #[arg(long)]
        dir: bool,
    },
    Chmod {
        #[command(flatten)]
        conn: ConnectArgs,
        path: String,
        #[command(flatten)]
        bits: PermissionArgs,
    },
    Cp {
        #[command(flatten)]
        conn: ConnectArgs,
        source: String,
        destination: String,
    },
    Mv {
        #[command(flatten)]
        conn: ConnectArgs,
        source: String,
        destination: String,
    },
    /// Answer JSON-lines requests from stdin until EOF.
    Serve,
    Config {
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct PermissionArgs {
    #[arg(long)]
    pub read: bool,
    #[arg(long)]
    pub write: bool,
    #[arg(long)]
    pub execute: bool,
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long)]
    pub group: Option<String>,
}

impl From<PermissionArgs> for PermissionRequest {
    fn from(args: PermissionArgs) -> Self {
        PermissionRequest {
            read: args.read,
            write: args.write,
            execute: args.execute,
            owner: args.owner,
            group: args.group,
        }
    }
}
