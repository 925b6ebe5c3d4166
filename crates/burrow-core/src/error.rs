use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("could not connect to {endpoint}: {detail}")]
    Connect { endpoint: String, detail: String },
    #[error("Failed to {op}: {detail}")]
    Subprotocol { op: &'static str, detail: String },
    #[error("Command failed with code {code}: {stderr}")]
    CommandFailed { code: u32, stderr: String },
    #[error("Command terminated without exit status ({reason}): {stderr}")]
    CommandAborted { reason: String, stderr: String },
    #[error("malformed listing record: {0}")]
    MalformedResponse(String),
    #[error("local staging error: {0}")]
    LocalResource(#[source] std::io::Error),
    #[error("connection lost during {op}: {detail}")]
    Transport { op: &'static str, detail: String },
    #[error("{op} timed out after {}ms", .after.as_millis())]
    Timeout { op: &'static str, after: Duration },
    #[error("No active connection found for {endpoint}")]
    NotConnected { endpoint: String },
    #[error("invalid request: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Operation,
    NotConnected,
}

impl FileOpError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FileOpError::Connect { .. }
            | FileOpError::Transport { .. }
            | FileOpError::Timeout { .. } => FailureKind::Connection,
            FileOpError::NotConnected { .. } => FailureKind::NotConnected,
            _ => FailureKind::Operation,
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        self.kind() == FailureKind::Connection
    }
}
