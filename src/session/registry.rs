//! Active connections and which one is current
//!
//! Handles are only ever appended; the current session is an index into
//! that list. Each handle carries a FIFO command gate so commands against
//! one connection run strictly one after another.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ConnectError, ExecError};
use crate::models::{SessionDescriptor, SessionKey};
use crate::session::store::SessionStore;
use crate::transport::{ExecOutput, SshConnection, SshTransport};

pub struct SessionHandle {
    index: usize,
    connection: Arc<dyn SshConnection>,
    descriptor: SessionDescriptor,
    // tokio's Mutex hands out the lock in request order
    command_gate: Mutex<()>,
}

impl SessionHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    pub fn connection(&self) -> &Arc<dyn SshConnection> {
        &self.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Runs one command in this connection's queue. A non-zero exit status
    /// is an error.
    pub async fn run(&self, command: &str) -> Result<ExecOutput, ExecError> {
        let _turn = self.command_gate.lock().await;
        debug!("[{}] $ {}", self.descriptor, command);

        let output = self.connection.exec(command).await?;
        if output.code != 0 {
            return Err(ExecError::NonZeroExit {
                command: command.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("index", &self.index)
            .field("descriptor", &self.descriptor.to_string())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    handles: Vec<Arc<SessionHandle>>,
    current: Option<usize>,
}

pub struct SessionRegistry {
    transport: Arc<dyn SshTransport>,
    store: Arc<dyn SessionStore>,
    state: RwLock<RegistryState>,
    // one connect at a time per key
    connecting: parking_lot::Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn SshTransport>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            store,
            state: RwLock::new(RegistryState::default()),
            connecting: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Connects, reusing a live handle with the same (host, username, port).
    pub async fn connect(
        &self,
        descriptor: SessionDescriptor,
    ) -> Result<Arc<SessionHandle>, ConnectError> {
        let key = descriptor.key();
        let gate = self.connecting.lock().entry(key.clone()).or_default().clone();
        let _connecting = gate.lock().await;

        let candidates: Vec<Arc<SessionHandle>> = self
            .state
            .read()
            .handles
            .iter()
            .filter(|h| h.descriptor.key() == key)
            .cloned()
            .collect();

        for handle in candidates {
            if handle.is_connected().await {
                debug!("Reusing session {} for {}", handle.index, descriptor);
                self.state.write().current = Some(handle.index);
                return Ok(handle);
            }
        }

        let connection = self.transport.connect(&descriptor).await?;

        let handle = {
            let mut state = self.state.write();
            let handle = Arc::new(SessionHandle {
                index: state.handles.len(),
                connection,
                descriptor: descriptor.clone(),
                command_gate: Mutex::new(()),
            });
            state.handles.push(handle.clone());
            state.current = Some(handle.index);
            handle
        };
        info!("Session {} opened for {}", handle.index, descriptor);

        self.remember(&descriptor);
        Ok(handle)
    }

    /// Persists a descriptor unless one with the same key is already stored.
    fn remember(&self, descriptor: &SessionDescriptor) {
        let result = self.store.load().and_then(|mut sessions| {
            let key = descriptor.key();
            if sessions.iter().any(|s| s.key() == key) {
                return Ok(());
            }
            sessions.push(descriptor.clone());
            self.store.save(&sessions)
        });
        if let Err(e) = result {
            warn!("Failed to persist session {}: {:#}", descriptor, e);
        }
    }

    pub fn current(&self) -> Option<Arc<SessionHandle>> {
        let state = self.state.read();
        state.current.and_then(|i| state.handles.get(i).cloned())
    }

    /// The current handle, if its connection is still up.
    pub async fn connected(&self) -> Option<Arc<SessionHandle>> {
        let handle = self.current()?;
        if handle.is_connected().await {
            Some(handle)
        } else {
            None
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connected().await.is_some()
    }

    /// Makes an existing handle current.
    pub fn select(&self, index: usize) -> Option<Arc<SessionHandle>> {
        let mut state = self.state.write();
        let handle = state.handles.get(index).cloned()?;
        state.current = Some(index);
        Some(handle)
    }

    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.state.read().handles.clone()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn disconnect_all(&self) {
        let handles = {
            let mut state = self.state.write();
            state.current = None;
            state.handles.clone()
        };
        for handle in handles {
            handle.connection.close().await;
        }
        info!("All sessions closed");
    }
}
