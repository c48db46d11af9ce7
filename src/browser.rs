//! Remote directory browsing on top of the executor and the cache
//!
//! Commands never touch the cache by themselves; this layer runs the
//! command and then applies the matching cache change. Connection-loss
//! failures drop the tracked path and ask the front end to go back to the
//! session list.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{DirectoryCache, DirectoryConfidence, RemoteFile};
use crate::error::ExecError;
use crate::events::{emit, AppEvent, EventSender, NavigationTarget};
use crate::remote::path::{join_remote_path, parent_remote_path};
use crate::remote::RemoteCommandExecutor;
use crate::session::SessionRegistry;

pub struct RemoteBrowser {
    executor: RemoteCommandExecutor,
    cache: Arc<DirectoryCache>,
    events: EventSender,
    current_path: RwLock<Option<String>>,
}

impl RemoteBrowser {
    pub fn new(
        registry: Arc<SessionRegistry>,
        cache: Arc<DirectoryCache>,
        events: EventSender,
    ) -> Self {
        Self {
            executor: RemoteCommandExecutor::new(registry),
            cache,
            events,
            current_path: RwLock::new(None),
        }
    }

    pub fn executor(&self) -> &RemoteCommandExecutor {
        &self.executor
    }

    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn current_path(&self) -> Option<String> {
        self.current_path.read().clone()
    }

    /// Stops tracking any directory.
    pub fn leave(&self) {
        *self.current_path.write() = None;
    }

    fn require_path(&self) -> Result<String, ExecError> {
        self.current_path().ok_or(ExecError::NoDirectory)
    }

    /// Drops the tracked path and sends the front end to the session list.
    pub fn return_to_sessions(&self) {
        self.leave();
        emit(
            &self.events,
            AppEvent::Navigate {
                target: NavigationTarget::SessionList,
            },
        );
    }

    /// Logs a failed operation; connection loss sends the user back to the
    /// session list.
    fn fail(&self, operation: &str, err: ExecError) -> ExecError {
        warn!("{} failed: {}", operation, err);
        if err.is_connection_loss() {
            self.return_to_sessions();
        }
        err
    }

    /// Lists `path`, merges it into the cache and makes it current.
    pub async fn open(&self, path: &str) -> Result<Vec<RemoteFile>, ExecError> {
        let names = self
            .executor
            .list(path)
            .await
            .map_err(|e| self.fail("open", e))?;
        self.cache.store(&names, path, false);
        *self.current_path.write() = Some(path.to_string());
        info!("Opened {}", path);
        emit(
            &self.events,
            AppEvent::Navigate {
                target: NavigationTarget::Directory {
                    path: path.to_string(),
                },
            },
        );
        Ok(self.cache.get(path).unwrap_or_default())
    }

    /// Opens the remote home directory.
    pub async fn open_home(&self) -> Result<Vec<RemoteFile>, ExecError> {
        let home = self
            .executor
            .home_directory()
            .await
            .map_err(|e| self.fail("home", e))?;
        self.open(&home).await
    }

    pub async fn enter(&self, name: &str) -> Result<Vec<RemoteFile>, ExecError> {
        let path = join_remote_path(&self.require_path()?, name);
        self.open(&path).await
    }

    pub async fn go_up(&self) -> Result<Vec<RemoteFile>, ExecError> {
        let path = parent_remote_path(&self.require_path()?);
        self.open(&path).await
    }

    /// Forced reload of the current directory.
    pub async fn refresh(&self) -> Result<Vec<RemoteFile>, ExecError> {
        let path = self.require_path()?;
        let names = self
            .executor
            .list(&path)
            .await
            .map_err(|e| self.fail("refresh", e))?;
        self.cache.store(&names, &path, true);
        emit(&self.events, AppEvent::DirectoryChanged { path: path.clone() });
        Ok(self.cache.get(&path).unwrap_or_default())
    }

    /// Current directory as cached, without a round-trip.
    pub fn entries(&self) -> Vec<RemoteFile> {
        self.current_path()
            .and_then(|path| self.cache.get(&path))
            .unwrap_or_default()
    }

    pub async fn load_info(&self, name: &str) -> Result<Option<RemoteFile>, ExecError> {
        let path = self.require_path()?;
        self.cache
            .load_info(&self.executor, &path, name, false)
            .await
            .map_err(|e| self.fail("stat", e))
    }

    /// Stat data for `name`, cached or not. Entries the listing skips, such
    /// as dotfiles, are stat'ed directly and left out of the cache.
    pub async fn inspect(&self, name: &str) -> Result<RemoteFile, ExecError> {
        if let Some(file) = self.load_info(name).await? {
            return Ok(file);
        }
        let path = self.require_path()?;
        let info = self
            .executor
            .stat(&path, name)
            .await
            .map_err(|e| self.fail("stat", e))?;
        let mut file = RemoteFile::new(name, path.as_str());
        file.apply_info(info);
        Ok(file)
    }

    /// Deletes `name` remotely, then drops it from the cache.
    pub async fn delete(&self, name: &str) -> Result<Option<RemoteFile>, ExecError> {
        let path = self.require_path()?;
        self.executor
            .remove(&path, name)
            .await
            .map_err(|e| self.fail("delete", e))?;
        info!("Deleted {}", join_remote_path(&path, name));
        Ok(self.cache.remove(&path, name))
    }

    pub async fn create_directory(&self, name: &str) -> Result<RemoteFile, ExecError> {
        let path = self.require_path()?;
        self.executor
            .mkdir(&path, name)
            .await
            .map_err(|e| self.fail("mkdir", e))?;

        let mut dir = RemoteFile::new(name, path.as_str());
        dir.directory = true;
        dir.confidence = DirectoryConfidence::Confirmed;
        self.cache.upsert(&path, dir.clone());
        Ok(dir)
    }

    /// Renames within the current directory. Stat data carries over.
    pub async fn rename(&self, name: &str, new_name: &str) -> Result<RemoteFile, ExecError> {
        let path = self.require_path()?;
        self.executor
            .rename(&path, name, new_name)
            .await
            .map_err(|e| self.fail("rename", e))?;

        let mut renamed = self
            .cache
            .remove(&path, name)
            .unwrap_or_else(|| RemoteFile::new(name, path.as_str()));
        renamed.exists = true;
        if renamed.confidence == DirectoryConfidence::Heuristic {
            renamed.directory = !new_name.contains('.');
        }
        renamed.name = new_name.to_string();
        self.cache.upsert(&path, renamed.clone());
        Ok(renamed)
    }

    /// Moves an entry of the current directory into `dst_path`.
    pub async fn move_entry(&self, name: &str, dst_path: &str) -> Result<(), ExecError> {
        let path = self.require_path()?;
        self.executor
            .move_entry(name, &path, dst_path)
            .await
            .map_err(|e| self.fail("move", e))?;

        if let Some(mut moved) = self.cache.remove(&path, name) {
            if self.cache.contains(dst_path) {
                moved.exists = true;
                self.cache.upsert(dst_path, moved);
            }
        }
        Ok(())
    }
}
