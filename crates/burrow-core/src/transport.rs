use crate::command::RemoteCommand;
use crate::endpoint::{Credentials, EndpointKey};
use crate::error::FileOpError;
use crate::listing::DirRecord;
use async_trait::async_trait;
use burrow_ssh::SshError;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Remote(String),
    #[error("{0}")]
    Channel(String),
    #[error("{0}")]
    Local(#[source] std::io::Error),
}

impl TransportError {
    pub fn into_op_error(self, op: &'static str) -> FileOpError {
        match self {
            TransportError::Remote(detail) => FileOpError::Subprotocol { op, detail },
            TransportError::Channel(detail) => FileOpError::Transport { op, detail },
            TransportError::Local(err) => FileOpError::LocalResource(err),
        }
    }
}

impl From<SshError> for TransportError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::Status(detail) => TransportError::Remote(detail),
            SshError::Channel(detail) => TransportError::Channel(detail),
            SshError::Local(err) => TransportError::Local(err),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<u32>,
    pub signal: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn exited(status: u32) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Any nonzero status fails, even when stdout carries output.
    pub fn check(self) -> Result<CommandOutput, FileOpError> {
        match self.status {
            Some(0) => Ok(self),
            Some(code) => Err(FileOpError::CommandFailed {
                code,
                stderr: self.stderr.trim_end().to_string(),
            }),
            None => Err(FileOpError::CommandAborted {
                reason: self
                    .signal
                    .map(|s| format!("signal {}", s))
                    .unwrap_or_else(|| "channel closed".to_string()),
                stderr: self.stderr.trim_end().to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn read_dir(&self, path: &str) -> TransportResult<Vec<DirRecord>>;
    async fn create_dir(&self, path: &str) -> TransportResult<()>;
    async fn rename(&self, from: &str, to: &str) -> TransportResult<()>;
    async fn remove_file(&self, path: &str) -> TransportResult<()>;
    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> TransportResult<u64>;
    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> TransportResult<u64>;
    async fn exec(&self, command: &RemoteCommand) -> TransportResult<CommandOutput>;
    async fn close(&self) -> TransportResult<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> anyhow::Result<Arc<dyn RemoteTransport>>;
}
