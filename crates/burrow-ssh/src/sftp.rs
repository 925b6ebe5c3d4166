use crate::error::SshError;
use russh_sftp::client::error::Error as SftpProtocolError;
use russh_sftp::client::fs::File;
use russh_sftp::client::{RawSftpSession, SftpSession};
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct SftpEntry {
    pub name: String,
    pub longname: String,
    pub size: Option<u64>,
    pub mtime: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub permissions: Option<u32>,
}

pub struct SftpClient {
    inner: SftpSession,
}

impl SftpClient {
    pub async fn new<S>(stream: S) -> Result<Self, SshError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inner = SftpSession::new(stream).await?;
        Ok(Self { inner })
    }

    pub async fn open_read(&self, path: &str) -> Result<File, SshError> {
        Ok(self.inner.open(path).await?)
    }

    pub async fn open_write(&self, path: &str, truncate: bool) -> Result<File, SshError> {
        let mut flags = OpenFlags::WRITE | OpenFlags::CREATE;
        if truncate {
            flags |= OpenFlags::TRUNCATE;
        }
        Ok(self.inner.open_with_flags(path, flags).await?)
    }

    pub async fn create_dir(&self, path: &str) -> Result<(), SshError> {
        self.inner.create_dir(path).await?;
        Ok(())
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), SshError> {
        self.inner.remove_file(path).await?;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), SshError> {
        self.inner.rename(from, to).await?;
        Ok(())
    }

    pub async fn download<W>(
        &self,
        path: &str,
        sink: &mut W,
        buffer_size: usize,
    ) -> Result<u64, SshError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut remote = self.open_read(path).await?;
        let mut buf = vec![0u8; buffer_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = remote.read(&mut buf).await.map_err(remote_io)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await.map_err(SshError::Local)?;
            total += n as u64;
        }
        sink.flush().await.map_err(SshError::Local)?;
        Ok(total)
    }

    pub async fn upload<R>(
        &self,
        path: &str,
        source: &mut R,
        buffer_size: usize,
    ) -> Result<u64, SshError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut remote = self.open_write(path, true).await?;
        let mut buf = vec![0u8; buffer_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = source.read(&mut buf).await.map_err(SshError::Local)?;
            if n == 0 {
                break;
            }
            remote.write_all(&buf[..n]).await.map_err(remote_io)?;
            total += n as u64;
        }
        remote.flush().await.map_err(remote_io)?;
        remote.shutdown().await.map_err(remote_io)?;
        Ok(total)
    }
}

// The high level session drops the long-format name, so listings go through
// the raw protocol on their own channel.
pub struct DirReader {
    raw: RawSftpSession,
}

impl DirReader {
    pub async fn new<S>(stream: S) -> Result<Self, SshError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let raw = RawSftpSession::new(stream);
        raw.init().await?;
        Ok(Self { raw })
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<SftpEntry>, SshError> {
        let handle = self.raw.opendir(path).await?.handle;
        let mut entries = Vec::new();
        let outcome = loop {
            match self.raw.readdir(handle.clone()).await {
                Ok(name) => entries.extend(name.files.into_iter().map(|file| {
                    entry_from_attrs(file.filename, file.longname, &file.attrs)
                })),
                Err(SftpProtocolError::Status(status)) if status.status_code == StatusCode::Eof => {
                    break Ok(());
                }
                Err(err) => break Err(SshError::from(err)),
            }
        };
        let closed = self.raw.close(handle).await;
        outcome?;
        closed?;
        Ok(entries)
    }
}

fn entry_from_attrs(name: String, longname: String, attrs: &FileAttributes) -> SftpEntry {
    SftpEntry {
        name,
        longname,
        size: attrs.size,
        mtime: attrs.mtime,
        user: attrs.user.clone().filter(|u| !u.is_empty()),
        group: attrs.group.clone().filter(|g| !g.is_empty()),
        permissions: attrs.permissions,
    }
}

fn remote_io(err: io::Error) -> SshError {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => SshError::Channel(err.to_string()),
        _ => SshError::Status(err.to_string()),
    }
}
