use crate::command::RemoteCommand;
use crate::endpoint::{Credentials, EndpointKey};
use crate::listing::DirRecord;
use crate::transport::{CommandOutput, Connector, RemoteTransport, TransportResult};
use async_trait::async_trait;
use burrow_config::{HostKeyMode, SshDefaults};
use burrow_ssh::{
    AuthMethod, DirReader, HostKeyPolicy, SftpClient, SftpEntry, SshClient, SshConnectConfig,
    SshError, SshSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::OnceCell;

pub struct SshConnector {
    defaults: SshDefaults,
    buffer_size: usize,
}

impl SshConnector {
    pub fn new(defaults: SshDefaults, buffer_size: usize) -> Self {
        Self {
            defaults,
            buffer_size,
        }
    }

    fn connect_config(&self, endpoint: &EndpointKey, credentials: &Credentials) -> SshConnectConfig {
        let auth_method = match credentials {
            Credentials::PrivateKey { key, passphrase } => AuthMethod::KeyMaterial {
                private_key: key.clone(),
                passphrase: passphrase.clone(),
            },
            Credentials::Agent => AuthMethod::Agent,
        };
        let host_key_policy = match self.defaults.host_key_policy {
            HostKeyMode::Strict => HostKeyPolicy::Strict,
            HostKeyMode::AcceptNew => HostKeyPolicy::AcceptNew,
            HostKeyMode::InsecureAcceptAny => HostKeyPolicy::InsecureAcceptAny,
        };
        SshConnectConfig {
            host: endpoint.host.clone(),
            port: endpoint.port,
            username: endpoint.user.clone(),
            auth_method,
            host_key_policy,
            known_hosts_path: Some(
                self.defaults
                    .known_hosts_path
                    .clone()
                    .unwrap_or_else(default_known_hosts_path),
            ),
            keepalive_interval_secs: self.defaults.keepalive_interval_secs,
            connect_timeout_ms: self.defaults.connect_timeout_ms,
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> anyhow::Result<Arc<dyn RemoteTransport>> {
        let session = SshClient::connect(self.connect_config(endpoint, credentials)).await?;
        Ok(Arc::new(SshTransport::new(session, self.buffer_size)))
    }
}

pub struct SshTransport {
    session: SshSession,
    sftp: OnceCell<SftpClient>,
    lister: OnceCell<DirReader>,
    buffer_size: usize,
}

impl SshTransport {
    pub fn new(session: SshSession, buffer_size: usize) -> Self {
        Self {
            session,
            sftp: OnceCell::new(),
            lister: OnceCell::new(),
            buffer_size,
        }
    }

    async fn sftp(&self) -> Result<&SftpClient, SshError> {
        self.sftp.get_or_try_init(|| self.session.open_sftp()).await
    }

    async fn lister(&self) -> Result<&DirReader, SshError> {
        self.lister
            .get_or_try_init(|| self.session.open_dir_reader())
            .await
    }
}

fn to_record(entry: SftpEntry) -> DirRecord {
    DirRecord {
        filename: entry.name,
        longname: entry.longname,
        size: entry.size,
        mtime: entry.mtime,
        user: entry.user,
        group: entry.group,
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn read_dir(&self, path: &str) -> TransportResult<Vec<DirRecord>> {
        let entries = self.lister().await?.read_dir(path).await?;
        Ok(entries.into_iter().map(to_record).collect())
    }

    async fn create_dir(&self, path: &str) -> TransportResult<()> {
        Ok(self.sftp().await?.create_dir(path).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        Ok(self.sftp().await?.rename(from, to).await?)
    }

    async fn remove_file(&self, path: &str) -> TransportResult<()> {
        Ok(self.sftp().await?.remove_file(path).await?)
    }

    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> TransportResult<u64> {
        let sftp = self.sftp().await?;
        Ok(sftp.download(path, sink, self.buffer_size).await?)
    }

    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> TransportResult<u64> {
        let sftp = self.sftp().await?;
        Ok(sftp.upload(path, source, self.buffer_size).await?)
    }

    async fn exec(&self, command: &RemoteCommand) -> TransportResult<CommandOutput> {
        let out = self.session.exec(&command.render()).await?;
        Ok(CommandOutput {
            status: out.exit_status,
            signal: out.exit_signal,
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    async fn close(&self) -> TransportResult<()> {
        Ok(self.session.close().await?)
    }
}

fn default_known_hosts_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ssh").join("known_hosts");
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        return PathBuf::from(profile).join(".ssh").join("known_hosts");
    }
    PathBuf::from("known_hosts")
}
