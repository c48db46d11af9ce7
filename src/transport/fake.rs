//! In-memory collaborator for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ExecOutput, ProgressFn, SshConnection, SshTransport, TransferPair};
use crate::error::{ConnectError, TransportError};
use crate::models::SessionDescriptor;

/// Chunk size reported to step callbacks
pub const FAKE_CHUNK: u64 = 4;

#[derive(Default)]
pub struct FakeConnection {
    connected: AtomicBool,
    responses: Mutex<HashMap<String, ExecOutput>>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<TransferPair>>,
    directories: Mutex<Vec<(PathBuf, String)>>,
    downloads: Mutex<Vec<(PathBuf, String)>>,
    fail_transport: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        let connection = Self::default();
        connection.connected.store(true, Ordering::SeqCst);
        Arc::new(connection)
    }

    pub fn respond(&self, command: impl Into<String>, output: ExecOutput) {
        self.responses.lock().insert(command.into(), output);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn uploads(&self) -> Vec<TransferPair> {
        self.uploads.lock().clone()
    }

    pub fn directories(&self) -> Vec<(PathBuf, String)> {
        self.directories.lock().clone()
    }

    pub fn downloads(&self) -> Vec<(PathBuf, String)> {
        self.downloads.lock().clone()
    }

    fn check_transport(&self) -> Result<(), TransportError> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }
}

/// Reports `total` bytes in `FAKE_CHUNK` steps.
fn report(total: u64, step: &ProgressFn) {
    let mut transferred = 0;
    while transferred < total {
        let chunk = FAKE_CHUNK.min(total - transferred);
        transferred += chunk;
        step(transferred, chunk, total);
    }
}

#[async_trait]
impl SshConnection for FakeConnection {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError> {
        self.check_transport()?;
        self.commands.lock().push(command.to_string());
        Ok(self
            .responses
            .lock()
            .get(command)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_files(
        &self,
        pairs: &[TransferPair],
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        self.check_transport()?;
        self.uploads.lock().extend(pairs.iter().cloned());
        report(pairs.len() as u64 * 10, step);
        Ok(())
    }

    async fn put_directory(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        self.check_transport()?;
        self.directories
            .lock()
            .push((local.to_path_buf(), remote.to_string()));
        report(10, step);
        Ok(())
    }

    async fn get_file(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        self.check_transport()?;
        self.downloads
            .lock()
            .push((local.to_path_buf(), remote.to_string()));
        report(10, step);
        Ok(())
    }

    async fn close(&self) {
        self.set_connected(false);
    }
}

/// Hands out one fresh [`FakeConnection`] per successful connect.
#[derive(Default)]
pub struct FakeTransport {
    connects: AtomicUsize,
    refuse: AtomicBool,
    opened: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Most recently opened connection.
    pub fn last(&self) -> Option<Arc<FakeConnection>> {
        self.opened.lock().last().cloned()
    }
}

#[async_trait]
impl SshTransport for FakeTransport {
    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
    ) -> Result<Arc<dyn SshConnection>, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // a real handshake suspends here
        tokio::task::yield_now().await;
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Failed {
                target: descriptor.to_string(),
                reason: "Permission denied".to_string(),
            });
        }
        let connection = FakeConnection::new();
        self.opened.lock().push(connection.clone());
        Ok(connection as Arc<dyn SshConnection>)
    }
}
