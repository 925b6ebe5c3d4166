pub mod client;
pub mod config;
pub mod error;
pub mod known_hosts;
pub mod sftp;

pub use client::{ExecOutput, SshClient, SshSession};
pub use config::{AuthMethod, HostKeyPolicy, SshConnectConfig};
pub use error::SshError;
pub use known_hosts::{HostKeyStatus, KnownHosts};
pub use sftp::{DirReader, SftpClient, SftpEntry};
