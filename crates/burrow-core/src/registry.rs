use crate::endpoint::{Credentials, EndpointKey};
use crate::error::FileOpError;
use crate::transport::{Connector, RemoteTransport, TransportResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MutexGuard, OnceCell};
use tracing::{info, warn};

pub struct Session {
    endpoint: EndpointKey,
    transport: Arc<dyn RemoteTransport>,
    created_at: DateTime<Utc>,
    live: AtomicBool,
    op_lock: tokio::sync::Mutex<()>,
}

impl Session {
    fn new(endpoint: EndpointKey, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            endpoint,
            transport,
            created_at: Utc::now(),
            live: AtomicBool::new(true),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn endpoint(&self) -> &EndpointKey {
        &self.endpoint
    }

    pub fn transport(&self) -> &dyn RemoteTransport {
        self.transport.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    async fn close(&self) -> TransportResult<()> {
        if self.live.swap(false, Ordering::AcqRel) {
            self.transport.close().await
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    Released,
    NotFound,
}

type Slot = Arc<OnceCell<Arc<Session>>>;

/// Live sessions keyed by endpoint. Concurrent acquires of an absent key
/// share one connection attempt.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    slots: Mutex<HashMap<EndpointKey, Slot>>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, FileOpError> {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        match slot
            .get_or_try_init(|| self.connect(endpoint, credentials))
            .await
        {
            Ok(session) => {
                let session = session.clone();
                if !self.is_registered(endpoint, &slot) {
                    // Swept while connecting: nothing would ever close it.
                    close_logged(&session).await;
                    return Err(FileOpError::Connect {
                        endpoint: endpoint.to_string(),
                        detail: "session was closed while connecting".to_string(),
                    });
                }
                Ok(session)
            }
            Err(err) => {
                self.discard_failed(endpoint, &slot);
                Err(err)
            }
        }
    }

    async fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, FileOpError> {
        info!(endpoint = %endpoint, "opening session");
        let attempt =
            tokio::time::timeout(self.connect_timeout, self.connector.connect(endpoint, credentials))
                .await;
        let detail = match attempt {
            Ok(Ok(transport)) => {
                info!(endpoint = %endpoint, "session established");
                return Ok(Arc::new(Session::new(endpoint.clone(), transport)));
            }
            Ok(Err(err)) => format!("{:#}", err),
            Err(_) => format!("timed out after {}ms", self.connect_timeout.as_millis()),
        };
        warn!(endpoint = %endpoint, error = %detail, "session connect failed");
        Err(FileOpError::Connect {
            endpoint: endpoint.to_string(),
            detail,
        })
    }

    fn is_registered(&self, endpoint: &EndpointKey, slot: &Slot) -> bool {
        self.slots
            .lock()
            .get(endpoint)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }

    // Another waiter on the same cell retries on its own; only the last
    // holder of a still-empty slot removes it.
    fn discard_failed(&self, endpoint: &EndpointKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        let ours = slots
            .get(endpoint)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false);
        if ours && !slot.initialized() && Arc::strong_count(slot) == 2 {
            slots.remove(endpoint);
        }
    }

    pub fn get(&self, endpoint: &EndpointKey) -> Option<Arc<Session>> {
        self.slots.lock().get(endpoint).and_then(|s| s.get().cloned())
    }

    pub async fn release(&self, endpoint: &EndpointKey) -> Release {
        let session = {
            let mut slots = self.slots.lock();
            match slots.get(endpoint).and_then(|s| s.get().cloned()) {
                Some(session) => {
                    slots.remove(endpoint);
                    session
                }
                None => return Release::NotFound,
            }
        };
        close_logged(&session).await;
        Release::Released
    }

    pub async fn evict(&self, endpoint: &EndpointKey, session: &Arc<Session>) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            let matches = slots
                .get(endpoint)
                .and_then(|s| s.get())
                .map(|current| Arc::ptr_eq(current, session))
                .unwrap_or(false);
            if matches {
                slots.remove(endpoint);
            }
            matches
        };
        if removed {
            warn!(endpoint = %endpoint, "evicting session after transport failure");
            close_logged(session).await;
        }
        removed
    }

    pub async fn sweep(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut slots = self.slots.lock();
            slots.drain().filter_map(|(_, s)| s.get().cloned()).collect()
        };
        for session in &sessions {
            close_logged(session).await;
        }
        info!(closed = sessions.len(), "session sweep finished");
        sessions.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| s.initialized())
            .count()
    }
}

async fn close_logged(session: &Session) {
    match session.close().await {
        Ok(()) => info!(endpoint = %session.endpoint(), "session closed"),
        Err(err) => warn!(endpoint = %session.endpoint(), error = %err, "session close failed"),
    }
}
