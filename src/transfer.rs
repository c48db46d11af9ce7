//! Uploads and downloads with normalized progress events

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::TransferError;
use crate::events::{emit, AppEvent, EventSender, ProcessStatus, TransferKind};
use crate::remote::path::join_remote_path;
use crate::session::{SessionHandle, SessionRegistry};
use crate::transport::TransferPair;

pub struct TransferCoordinator {
    registry: Arc<SessionRegistry>,
    events: EventSender,
    download_dir: PathBuf,
}

impl TransferCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, events: EventSender, download_dir: PathBuf) -> Self {
        Self {
            registry,
            events,
            download_dir,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn handle(&self) -> Result<Arc<SessionHandle>, TransferError> {
        self.registry
            .connected()
            .await
            .ok_or(TransferError::NotConnected)
    }

    /// Uploads `local_paths` into `dest_dir`. Directories go recursively,
    /// regular files in one batch. Nothing is rolled back on failure.
    pub async fn upload(&self, dest_dir: &str, local_paths: &[PathBuf]) -> Result<(), TransferError> {
        let handle = self.handle().await?;

        let mut directories = Vec::new();
        let mut files = Vec::new();
        for local in local_paths {
            let missing = || TransferError::MissingLocal(local.display().to_string());
            let metadata = tokio::fs::metadata(local).await.map_err(|_| missing())?;
            let name = local
                .file_name()
                .ok_or_else(missing)?
                .to_string_lossy()
                .to_string();
            let remote = join_remote_path(dest_dir, &name);
            if metadata.is_dir() {
                directories.push((local.clone(), remote));
            } else {
                files.push(TransferPair {
                    local: local.clone(),
                    remote,
                });
            }
        }

        let step = self.reporter(TransferKind::Upload);
        let result = async {
            for (local, remote) in &directories {
                handle
                    .connection()
                    .put_directory(local, remote, &step)
                    .await?;
            }
            if !files.is_empty() {
                handle.connection().put_files(&files, &step).await?;
            }
            Ok::<(), TransferError>(())
        }
        .await;

        self.finish(TransferKind::Upload, &result);
        if result.is_ok() {
            info!(
                "Uploaded {} file(s) and {} dir(s) to {}",
                files.len(),
                directories.len(),
                dest_dir
            );
        }
        result
    }

    /// Downloads `remote_dir/file_name` into the download directory and
    /// returns the local path. `file_name` must be a single path component.
    pub async fn download(&self, remote_dir: &str, file_name: &str) -> Result<PathBuf, TransferError> {
        if !is_plain_name(file_name) {
            return Err(TransferError::InvalidName(file_name.to_string()));
        }
        let handle = self.handle().await?;
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let local = self.download_dir.join(file_name);
        let remote = join_remote_path(remote_dir, file_name);
        let step = self.reporter(TransferKind::Download);
        let result = handle
            .connection()
            .get_file(&local, &remote, &step)
            .await
            .map_err(TransferError::from);

        self.finish(TransferKind::Download, &result);
        result?;
        info!("Downloaded {} to {}", remote, local.display());
        Ok(local)
    }

    /// Step callback publishing `process-status` events for `kind`.
    fn reporter(&self, kind: TransferKind) -> impl Fn(u64, u64, u64) + Send + Sync + 'static {
        let events = self.events.clone();
        move |transferred, _chunk, total| {
            emit(
                &events,
                AppEvent::ProcessStatus(ProcessStatus {
                    kind,
                    progress: percent(transferred, total),
                    finished: false,
                }),
            );
        }
    }

    fn finish<T>(&self, kind: TransferKind, result: &Result<T, TransferError>) {
        let progress = match result {
            Ok(_) => 100,
            Err(e) => {
                warn!("{:?} failed: {}", kind, e);
                0
            }
        };
        emit(
            &self.events,
            AppEvent::ProcessStatus(ProcessStatus {
                kind,
                progress,
                finished: true,
            }),
        );
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

pub fn percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (transferred as u128 * 100 / total as u128).min(100) as u8
}
