//! Boundary to the SSH client doing the actual work
//!
//! The core never speaks the SSH protocol itself. It opens connections
//! through an [`SshTransport`] and issues commands and transfers through
//! the returned [`SshConnection`].

pub mod openssh;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConnectError, TransportError};
use crate::models::SessionDescriptor;

pub use openssh::OpenSshTransport;

/// Result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: 0,
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code,
        }
    }
}

/// A local file and where it should land remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPair {
    pub local: PathBuf,
    pub remote: String,
}

/// Step callback: `(transferred, chunk, total)` in bytes.
pub type ProgressFn = dyn Fn(u64, u64, u64) + Send + Sync;

#[async_trait]
pub trait SshConnection: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError>;

    async fn put_files(
        &self,
        pairs: &[TransferPair],
        step: &ProgressFn,
    ) -> Result<(), TransportError>;

    async fn put_directory(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError>;

    async fn get_file(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError>;

    async fn close(&self);
}

#[async_trait]
pub trait SshTransport: Send + Sync {
    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
    ) -> Result<Arc<dyn SshConnection>, ConnectError>;
}
