use anyhow::Result;
use burrow_core::{
    Credentials, EndpointKey, FileManager, FileOpError, OperationResult, PermissionRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use zeroize::Zeroizing;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub target: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(flatten)]
    pub op: RequestOp,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RequestOp {
    List { path: String },
    Mkdir { parent: String, name: String },
    Read { path: String },
    Write { path: String, content: String },
    Upload {
        dest_dir: String,
        file_name: String,
        local_path: String,
    },
    Rename { old_path: String, new_path: String },
    DeleteFile { path: String },
    DeleteDirectory { path: String },
    Chmod {
        path: String,
        permissions: PermissionRequest,
    },
    Copy {
        source_path: String,
        destination_path: String,
    },
    Move {
        source_path: String,
        destination_path: String,
    },
    Disconnect,
}

impl Request {
    fn take_credentials(&mut self) -> Credentials {
        let passphrase = self.passphrase.take().map(Zeroizing::new);
        match self.private_key.take() {
            Some(key) => Credentials::PrivateKey {
                key: Zeroizing::new(key),
                passphrase,
            },
            None => Credentials::Agent,
        }
    }
}

#[derive(Serialize)]
struct Response {
    id: Value,
    #[serde(flatten)]
    body: Value,
}

fn body<T: Serialize>(result: OperationResult<T>) -> Value {
    serde_json::to_value(&result).unwrap_or_else(|err| {
        serde_json::json!({ "success": false, "error": err.to_string(), "errorKind": "operation" })
    })
}

fn rejected(err: FileOpError) -> Value {
    body(OperationResult::<()>::failed(&err))
}

pub async fn handle_line(manager: &FileManager, line: &str, default_port: u16) -> String {
    let (id, body) = match serde_json::from_str::<Request>(line) {
        Ok(req) => (req.id.clone(), dispatch(manager, req, default_port).await),
        Err(err) => (
            Value::Null,
            rejected(FileOpError::Invalid(format!("unreadable request: {}", err))),
        ),
    };
    let response = Response { id, body };
    serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())
}

async fn dispatch(manager: &FileManager, mut req: Request, default_port: u16) -> Value {
    let creds = req.take_credentials();
    let endpoint = match EndpointKey::parse(&req.target, default_port) {
        Ok(endpoint) => endpoint,
        Err(err) => return rejected(err),
    };
    let m = manager;
    match req.op {
        RequestOp::List { path } => body(m.list_directory(&endpoint, &creds, path).await),
        RequestOp::Mkdir { parent, name } => {
            body(m.create_directory(&endpoint, &creds, parent, name).await)
        }
        RequestOp::Read { path } => body(m.read_file(&endpoint, &creds, path).await),
        RequestOp::Write { path, content } => {
            body(m.write_file(&endpoint, &creds, path, content).await)
        }
        RequestOp::Upload {
            dest_dir,
            file_name,
            local_path,
        } => {
            let mut file = match tokio::fs::File::open(&local_path).await {
                Ok(file) => file,
                Err(err) => return rejected(FileOpError::LocalResource(err)),
            };
            body(
                m.upload_file(&endpoint, &creds, dest_dir, file_name, &mut file)
                    .await,
            )
        }
        RequestOp::Rename { old_path, new_path } => {
            body(m.rename(&endpoint, &creds, old_path, new_path).await)
        }
        RequestOp::DeleteFile { path } => body(m.delete_file(&endpoint, &creds, path).await),
        RequestOp::DeleteDirectory { path } => {
            body(m.delete_directory(&endpoint, &creds, path).await)
        }
        RequestOp::Chmod { path, permissions } => {
            body(m.change_permissions(&endpoint, &creds, path, permissions).await)
        }
        RequestOp::Copy {
            source_path,
            destination_path,
        } => body(m.copy(&endpoint, &creds, source_path, destination_path).await),
        RequestOp::Move {
            source_path,
            destination_path,
        } => body(
            m.move_entry(&endpoint, &creds, source_path, destination_path)
                .await,
        ),
        RequestOp::Disconnect => body(m.disconnect(&endpoint).await),
    }
}

pub async fn run(manager: FileManager, default_port: u16) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    info!("serving requests on stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let manager = manager.clone();
                let tx = tx.clone();
                let span = info_span!("request", request_id = %Uuid::new_v4());
                tasks.spawn(
                    async move {
                        let response = handle_line(&manager, &line, default_port).await;
                        if tx.send(response).await.is_err() {
                            warn!("response dropped, output closed");
                        }
                    }
                    .instrument(span),
                );
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "request task failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                tasks.abort_all();
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            if !err.is_cancelled() {
                warn!(error = %err, "request task failed");
            }
        }
    }
    drop(tx);
    writer.await??;
    let closed = manager.shutdown().await;
    info!(closed, "serve loop finished");
    Ok(())
}
