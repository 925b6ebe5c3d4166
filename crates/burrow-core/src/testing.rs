use crate::command::RemoteCommand;
use crate::endpoint::{Credentials, EndpointKey};
use crate::listing::DirRecord;
use crate::transport::{CommandOutput, Connector, RemoteTransport, TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Default)]
pub(crate) struct FakeTransport {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub listings: Mutex<HashMap<String, Vec<DirRecord>>>,
    pub dirs: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
    pub outputs: Mutex<VecDeque<CommandOutput>>,
    pub fail_channel: AtomicBool,
    pub stall: AtomicBool,
    pub exec_delay: Mutex<Option<Duration>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FakeTransport {
    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.files.lock().insert(path.to_string(), content.to_vec());
        self
    }

    pub fn with_listing(self, path: &str, records: Vec<DirRecord>) -> Self {
        self.listings.lock().insert(path.to_string(), records);
        self
    }

    pub fn script(&self, output: CommandOutput) {
        self.outputs.lock().push_back(output);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    async fn enter(&self) -> TransportResult<()> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_channel.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Channel("channel closed by peer".into()));
        }
        Ok(())
    }
}

fn no_such_file() -> TransportError {
    TransportError::Remote("No such file".into())
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn read_dir(&self, path: &str) -> TransportResult<Vec<DirRecord>> {
        self.enter().await?;
        self.listings.lock().get(path).cloned().ok_or_else(no_such_file)
    }

    async fn create_dir(&self, path: &str) -> TransportResult<()> {
        self.enter().await?;
        let mut dirs = self.dirs.lock();
        if dirs.iter().any(|d| d == path) {
            return Err(TransportError::Remote("Failure".into()));
        }
        dirs.push(path.to_string());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        self.enter().await?;
        let mut files = self.files.lock();
        let content = files.remove(from).ok_or_else(no_such_file)?;
        files.insert(to.to_string(), content);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> TransportResult<()> {
        self.enter().await?;
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(no_such_file)
    }

    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> TransportResult<u64> {
        self.enter().await?;
        let content = self.file(path).ok_or_else(no_such_file)?;
        sink.write_all(&content).await.map_err(TransportError::Local)?;
        sink.flush().await.map_err(TransportError::Local)?;
        Ok(content.len() as u64)
    }

    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> TransportResult<u64> {
        self.enter().await?;
        let mut content = Vec::new();
        source
            .read_to_end(&mut content)
            .await
            .map_err(TransportError::Local)?;
        let len = content.len() as u64;
        self.files.lock().insert(path.to_string(), content);
        Ok(len)
    }

    async fn exec(&self, command: &RemoteCommand) -> TransportResult<CommandOutput> {
        self.enter().await?;
        self.commands.lock().push(command.render());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        let delay = *self.exec_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self
            .outputs
            .lock()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::exited(0)))
    }

    async fn close(&self) -> TransportResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeConnector {
    pub transport: Arc<FakeTransport>,
    pub connects: AtomicUsize,
    delay: Duration,
    failures_left: AtomicUsize,
}

impl FakeConnector {
    pub fn new(transport: Arc<FakeTransport>) -> Self {
        Self {
            transport,
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _endpoint: &EndpointKey,
        _credentials: &Credentials,
    ) -> anyhow::Result<Arc<dyn RemoteTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("authentication failed");
        }
        let transport: Arc<dyn RemoteTransport> = self.transport.clone();
        Ok(transport)
    }
}
