use russh_sftp::client::error::Error as SftpProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("{0}")]
    Status(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("local io error: {0}")]
    Local(#[source] std::io::Error),
}

impl SshError {
    pub fn is_channel(&self) -> bool {
        matches!(self, SshError::Channel(_))
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Channel(err.to_string())
    }
}

impl From<SftpProtocolError> for SshError {
    fn from(err: SftpProtocolError) -> Self {
        match err {
            SftpProtocolError::Status(status) => {
                if status.error_message.trim().is_empty() {
                    SshError::Status(format!("{:?}", status.status_code))
                } else {
                    SshError::Status(status.error_message)
                }
            }
            other => SshError::Channel(other.to_string()),
        }
    }
}
