use crate::endpoint::{Credentials, EndpointKey};
use crate::error::FileOpError;
use crate::listing::RemoteFileEntry;
use crate::operations::{
    ChangePermissions, CopyEntry, CreateDirectory, CreatedEntry, DeleteDirectory, DeleteFile,
    ListDirectory, MoveEntry, OpContext, Operation, PathPayload, PermissionChange,
    PermissionRequest, ReadFile, RenameEntry, RenamedEntry, TransferredEntry, UploadFile,
    UploadedFile, WriteFile,
};
use crate::registry::{Release, SessionRegistry};
use crate::result::OperationResult;
use crate::ssh::SshConnector;
use crate::staging::StagingArea;
use crate::transport::Connector;
use burrow_config::{AppConfig, OperationConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{info, info_span, warn, Instrument};

#[derive(Clone, Debug, Serialize)]
pub struct Disconnected {
    pub endpoint: String,
}

#[derive(Clone)]
pub struct FileManager {
    registry: Arc<SessionRegistry>,
    staging: StagingArea,
    settings: OperationConfig,
}

impl FileManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        settings: OperationConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(connector, connect_timeout)),
            staging: StagingArea::new(settings.staging_dir.clone()),
            settings,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let connector = SshConnector::new(cfg.ssh.clone(), cfg.operations.buffer_size);
        Self::new(
            Arc::new(connector),
            Duration::from_millis(cfg.ssh.connect_timeout_ms),
            cfg.operations.clone(),
        )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn op_timeout(&self) -> Option<Duration> {
        match self.settings.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub async fn run<O: Operation>(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        op: O,
    ) -> OperationResult<O::Output> {
        let span = info_span!("file_op", op = O::NAME, endpoint = %endpoint);
        async move {
            let started = Instant::now();
            let result = self.execute(endpoint, credentials, op).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => info!(elapsed_ms, "operation finished"),
                Err(err) => warn!(elapsed_ms, kind = ?err.kind(), error = %err, "operation failed"),
            }
            result.into()
        }
        .instrument(span)
        .await
    }

    async fn execute<O: Operation>(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        op: O,
    ) -> Result<O::Output, FileOpError> {
        let session = self.registry.acquire(endpoint, credentials).await?;
        let outcome = {
            let _turn = session.lock().await;
            if !session.is_live() {
                return Err(FileOpError::Transport {
                    op: O::NAME,
                    detail: "session was closed while the operation waited".to_string(),
                });
            }
            let ctx = OpContext {
                transport: session.transport(),
                staging: &self.staging,
                require_atomic_move: self.settings.require_atomic_move,
            };
            match self.op_timeout() {
                Some(limit) => tokio::time::timeout(limit, op.execute(&ctx))
                    .await
                    .unwrap_or_else(|_| {
                        Err(FileOpError::Timeout {
                            op: O::NAME,
                            after: limit,
                        })
                    }),
                None => op.execute(&ctx).await,
            }
        };
        if let Err(err) = &outcome {
            let broken = matches!(
                err,
                FileOpError::Transport { .. } | FileOpError::Timeout { .. }
            );
            if broken && self.settings.evict_on_failure {
                self.registry.evict(endpoint, &session).await;
            }
        }
        outcome
    }

    pub async fn list_directory(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
    ) -> OperationResult<Vec<RemoteFileEntry>> {
        let op = ListDirectory { path: path.into() };
        self.run(endpoint, credentials, op).await
    }

    pub async fn create_directory(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        parent: impl Into<String>,
        name: impl Into<String>,
    ) -> OperationResult<CreatedEntry> {
        let op = CreateDirectory {
            parent: parent.into(),
            name: name.into(),
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn read_file(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
    ) -> OperationResult<String> {
        let op = ReadFile { path: path.into() };
        self.run(endpoint, credentials, op).await
    }

    pub async fn write_file(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> OperationResult<PathPayload> {
        let op = WriteFile {
            path: path.into(),
            content: content.into(),
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn upload_file(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        dest_dir: impl Into<String>,
        file_name: impl Into<String>,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> OperationResult<UploadedFile> {
        let op = UploadFile {
            dest_dir: dest_dir.into(),
            file_name: file_name.into(),
            source,
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn rename(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
    ) -> OperationResult<RenamedEntry> {
        let op = RenameEntry {
            old_path: old_path.into(),
            new_path: new_path.into(),
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn delete_file(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
    ) -> OperationResult<PathPayload> {
        let op = DeleteFile { path: path.into() };
        self.run(endpoint, credentials, op).await
    }

    pub async fn delete_directory(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
    ) -> OperationResult<PathPayload> {
        let op = DeleteDirectory { path: path.into() };
        self.run(endpoint, credentials, op).await
    }

    pub async fn change_permissions(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        path: impl Into<String>,
        permissions: PermissionRequest,
    ) -> OperationResult<PermissionChange> {
        let op = ChangePermissions {
            path: path.into(),
            permissions,
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn copy(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> OperationResult<TransferredEntry> {
        let op = CopyEntry {
            source: source.into(),
            destination: destination.into(),
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn move_entry(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> OperationResult<TransferredEntry> {
        let op = MoveEntry {
            source: source.into(),
            destination: destination.into(),
        };
        self.run(endpoint, credentials, op).await
    }

    pub async fn disconnect(&self, endpoint: &EndpointKey) -> OperationResult<Disconnected> {
        match self.registry.release(endpoint).await {
            Release::Released => OperationResult::ok(Disconnected {
                endpoint: endpoint.to_string(),
            }),
            Release::NotFound => OperationResult::failed(&FileOpError::NotConnected {
                endpoint: endpoint.to_string(),
            }),
        }
    }

    pub async fn shutdown(&self) -> usize {
        self.registry.sweep().await
    }
}
