use crate::config::{AuthMethod, HostKeyPolicy, SshConnectConfig};
use crate::error::SshError;
use crate::known_hosts::{HostKeyStatus, KnownHosts};
use crate::sftp::{DirReader, SftpClient};
use anyhow::Result;
use russh::client::{Config as ClientConfig, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{decode_secret_key, Algorithm};
use russh::{client, ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SshClient;

#[derive(Clone)]
pub struct SshSession {
    inner: Arc<Mutex<SessionInner>>,
}

struct SessionInner {
    handle: Handle<ClientHandler>,
    config: SshConnectConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl SshClient {
    pub async fn connect(cfg: SshConnectConfig) -> Result<SshSession> {
        let client_config = Arc::new(build_client_config(&cfg));
        let known_hosts = match cfg.known_hosts_path.clone() {
            Some(path) if cfg.host_key_policy != HostKeyPolicy::InsecureAcceptAny => {
                Some(Arc::new(Mutex::new(KnownHosts::load(path)?)))
            }
            _ => None,
        };
        let handler = ClientHandler {
            host: cfg.host.clone(),
            port: cfg.port,
            policy: cfg.host_key_policy,
            known_hosts,
        };

        let timeout = Duration::from_millis(cfg.connect_timeout_ms);
        let handle = tokio::time::timeout(timeout, async {
            let sock = tokio::net::TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;
            let mut handle = client::connect_stream(client_config, sock, handler).await?;
            authenticate(&mut handle, &cfg.username, &cfg.auth_method).await?;
            Ok::<_, anyhow::Error>(handle)
        })
        .await
        .map_err(|_| anyhow::anyhow!("handshake timed out after {}ms", cfg.connect_timeout_ms))??;

        Ok(SshSession {
            inner: Arc::new(Mutex::new(SessionInner {
                handle,
                config: cfg,
            })),
        })
    }
}

impl SshSession {
    pub async fn open_sftp(&self) -> Result<SftpClient, SshError> {
        let inner = self.inner.lock().await;
        let channel = inner.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        SftpClient::new(channel.into_stream()).await
    }

    pub async fn open_dir_reader(&self) -> Result<DirReader, SshError> {
        let inner = self.inner.lock().await;
        let channel = inner.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        DirReader::new(channel.into_stream()).await
    }

    pub async fn exec(&self, command: &str) -> Result<ExecOutput, SshError> {
        let mut channel = {
            let inner = self.inner.lock().await;
            inner.handle.channel_open_session().await?
        };
        debug!(command = %command, "exec");
        channel.exec(true, command).await?;
        let mut output = ExecOutput::default();
        // Exit status may arrive after EOF, so drain until the channel closes.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    output.exit_signal = Some(format!("{:?}", signal_name))
                }
                _ => {}
            }
        }
        Ok(output)
    }

    pub async fn close(&self) -> Result<(), SshError> {
        let inner = self.inner.lock().await;
        if inner.handle.is_closed() {
            return Ok(());
        }
        inner
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.handle.is_closed()
    }

    pub async fn target(&self) -> String {
        let inner = self.inner.lock().await;
        format!(
            "{}@{}:{}",
            inner.config.username, inner.config.host, inner.config.port
        )
    }
}

#[derive(Clone)]
struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<Arc<Mutex<KnownHosts>>>,
}

impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        let host = self.host.clone();
        let port = self.port;
        let policy = self.policy;
        let known_hosts = self.known_hosts.clone();
        let key = server_public_key.clone();
        async move {
            if policy == HostKeyPolicy::InsecureAcceptAny {
                warn!(host = %host, port, "accepting host key without verification");
                return Ok(true);
            }
            let Some(known_hosts) = known_hosts else {
                warn!(host = %host, port, "no known_hosts file configured, rejecting host key");
                return Ok(false);
            };
            let mut known_hosts = known_hosts.lock().await;
            match known_hosts.verify(&host, port, &key) {
                HostKeyStatus::Trusted => Ok(true),
                HostKeyStatus::Unknown if policy == HostKeyPolicy::AcceptNew => {
                    known_hosts.remember(&host, port, &key)?;
                    warn!(host = %host, port, "learned new host key");
                    Ok(true)
                }
                status => {
                    warn!(host = %host, port, ?status, "host key rejected");
                    Ok(false)
                }
            }
        }
    }
}

fn build_client_config(cfg: &SshConnectConfig) -> ClientConfig {
    ClientConfig {
        keepalive_interval: Some(Duration::from_secs(cfg.keepalive_interval_secs)),
        keepalive_max: 3,
        ..Default::default()
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    auth: &AuthMethod,
) -> Result<()> {
    match auth {
        AuthMethod::KeyMaterial {
            private_key,
            passphrase,
        } => {
            let key = decode_secret_key(private_key, passphrase.as_ref().map(|p| p.as_str()))
                .map_err(|e| anyhow::anyhow!("invalid private key: {}", e))?;
            let hash = if matches!(key.algorithm(), Algorithm::Rsa { .. }) {
                handle.best_supported_rsa_hash().await?.flatten()
            } else {
                None
            };
            let res = handle
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                .await?;
            ensure_auth(res)
        }
        AuthMethod::Agent => {
            if authenticate_with_agent(handle, username).await? {
                Ok(())
            } else {
                Err(anyhow::anyhow!("agent authentication failed"))
            }
        }
    }
}

fn ensure_auth(res: russh::client::AuthResult) -> Result<()> {
    match res {
        russh::client::AuthResult::Success => Ok(()),
        russh::client::AuthResult::Failure { .. } => Err(anyhow::anyhow!("authentication failed")),
    }
}

#[cfg(unix)]
async fn authenticate_with_agent(handle: &mut Handle<ClientHandler>, user: &str) -> Result<bool> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env().await?;
    for key in agent.request_identities().await? {
        let hash = if matches!(key.algorithm(), Algorithm::Rsa { .. }) {
            handle.best_supported_rsa_hash().await?.flatten()
        } else {
            None
        };
        let res = handle
            .authenticate_publickey_with(user, key, hash, &mut agent)
            .await?;
        if matches!(res, russh::client::AuthResult::Success) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(_handle: &mut Handle<ClientHandler>, _user: &str) -> Result<bool> {
    Err(anyhow::anyhow!("ssh agent authentication is only supported on unix"))
}
