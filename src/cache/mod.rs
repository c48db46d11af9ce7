//! Client-side cache of remote directory listings
//!
//! Keyed by absolute remote path. Each key holds the entries of that
//! directory in listing order, unique by name, and every entry's `path`
//! equals its key. Readers get owned snapshots; all mutation goes through
//! the cache's own methods.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::ExecError;
use crate::remote::path::join_remote_path;
use crate::remote::{Permissions, RemoteCommandExecutor, RemoteFileInfo};

/// How `RemoteFile::directory` was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryConfidence {
    /// Guessed from the name: no `.` means directory
    Heuristic,
    /// Taken from the type flag of a successful stat
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    /// Parent directory, absolute
    pub path: String,
    pub directory: bool,
    pub confidence: DirectoryConfidence,
    pub file_size: u64,
    pub last_modified: String,
    pub owner: String,
    pub group: String,
    pub permissions: Option<Permissions>,
    pub loaded: bool,
    pub exists: bool,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            directory: !name.contains('.'),
            confidence: DirectoryConfidence::Heuristic,
            name,
            path: path.into(),
            file_size: 0,
            last_modified: String::new(),
            owner: String::new(),
            group: String::new(),
            permissions: None,
            loaded: false,
            exists: true,
        }
    }

    pub fn full_path(&self) -> String {
        join_remote_path(&self.path, &self.name)
    }

    pub fn apply_info(&mut self, info: RemoteFileInfo) {
        if let Some(directory) = info.permissions.is_directory() {
            self.directory = directory;
            self.confidence = DirectoryConfidence::Confirmed;
        }
        self.file_size = info.size;
        self.last_modified = info.last_modified;
        self.owner = info.owner;
        self.group = info.group;
        self.permissions = Some(info.permissions);
        self.loaded = true;
    }

    /// Stats this entry unless already loaded; `loaded` only flips on
    /// success. `self` is a snapshot, so the fetched info is returned for
    /// the caller to write back with [`DirectoryCache::set_info`].
    pub async fn load_info(
        &mut self,
        executor: &RemoteCommandExecutor,
        force: bool,
    ) -> Result<Option<RemoteFileInfo>, ExecError> {
        if self.loaded && !force {
            return Ok(None);
        }
        let info = executor.stat(&self.path, &self.name).await?;
        self.apply_info(info.clone());
        Ok(Some(info))
    }
}

/// `/home/u/` and `/home/u` share a key.
fn cache_key(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Default)]
pub struct DirectoryCache {
    entries: RwLock<HashMap<String, Vec<RemoteFile>>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a listing for `path`.
    ///
    /// A forced reload, or a path not cached yet, replaces the entry
    /// wholesale. Otherwise names not already present are appended and
    /// existing entries keep their stat data.
    pub fn store<I, S>(&self, names: I, path: &str, force_reload: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = cache_key(path);
        let mut entries = self.entries.write();

        if force_reload || !entries.contains_key(&key) {
            let mut files: Vec<RemoteFile> = Vec::new();
            for name in names {
                let name = name.as_ref();
                if !files.iter().any(|f| f.name == name) {
                    files.push(RemoteFile::new(name, key.as_str()));
                }
            }
            debug!("Cache replaced {} ({} entries)", key, files.len());
            entries.insert(key, files);
            return;
        }

        if let Some(files) = entries.get_mut(&key) {
            let mut added = 0;
            for name in names {
                let name = name.as_ref();
                if !files.iter().any(|f| f.name == name) {
                    files.push(RemoteFile::new(name, key.as_str()));
                    added += 1;
                }
            }
            debug!("Cache merged {} (+{} entries)", key, added);
        }
    }

    /// Snapshot of the entries under `path`.
    pub fn get(&self, path: &str) -> Option<Vec<RemoteFile>> {
        self.entries.read().get(&cache_key(path)).cloned()
    }

    pub fn names(&self, path: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .get(&cache_key(path))
            .map(|files| files.iter().map(|f| f.name.clone()).collect())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(&cache_key(path))
    }

    pub fn find(&self, path: &str, name: &str) -> Option<RemoteFile> {
        self.entries
            .read()
            .get(&cache_key(path))
            .and_then(|files| files.iter().find(|f| f.name == name).cloned())
    }

    /// Replaces the same-named entry or appends. Creates the path entry if
    /// needed.
    pub fn upsert(&self, path: &str, mut file: RemoteFile) {
        let key = cache_key(path);
        file.path = key.clone();
        let mut entries = self.entries.write();
        let files = entries.entry(key).or_default();
        match files.iter_mut().find(|f| f.name == file.name) {
            Some(existing) => *existing = file,
            None => files.push(file),
        }
    }

    /// Takes an entry out of the cache. The returned value has
    /// `exists == false`.
    pub fn remove(&self, path: &str, name: &str) -> Option<RemoteFile> {
        let mut entries = self.entries.write();
        let files = entries.get_mut(&cache_key(path))?;
        let idx = files.iter().position(|f| f.name == name)?;
        let mut removed = files.remove(idx);
        removed.exists = false;
        Some(removed)
    }

    pub fn set_info(&self, path: &str, name: &str, info: RemoteFileInfo) -> Option<RemoteFile> {
        let mut entries = self.entries.write();
        let file = entries
            .get_mut(&cache_key(path))?
            .iter_mut()
            .find(|f| f.name == name)?;
        file.apply_info(info);
        Some(file.clone())
    }

    /// Lazily stats one cached entry. Returns `Ok(None)` when the entry is
    /// not cached.
    pub async fn load_info(
        &self,
        executor: &RemoteCommandExecutor,
        path: &str,
        name: &str,
        force: bool,
    ) -> Result<Option<RemoteFile>, ExecError> {
        let Some(mut file) = self.find(path, name) else {
            return Ok(None);
        };
        match file.load_info(executor, force).await? {
            // evicted while the stat was in flight: hand back the local copy
            Some(info) => Ok(Some(self.set_info(path, name, info).unwrap_or(file))),
            None => Ok(Some(file)),
        }
    }

    /// Drops the entry for `path`.
    pub fn invalidate(&self, path: &str) -> bool {
        self.entries.write().remove(&cache_key(path)).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionDescriptor;
    use crate::remote::command;
    use crate::session::{MemorySessionStore, SessionRegistry};
    use crate::transport::fake::{FakeConnection, FakeTransport};
    use crate::transport::ExecOutput;
    use std::sync::Arc;

    fn info(mode: &str) -> RemoteFileInfo {
        RemoteFileInfo {
            permissions: Permissions::parse(mode).unwrap(),
            owner: "u".to_string(),
            group: "g".to_string(),
            size: 42,
            last_modified: "Jan 1 10:00".to_string(),
        }
    }

    async fn executor() -> (RemoteCommandExecutor, Arc<FakeConnection>) {
        let transport = FakeTransport::new();
        let registry = Arc::new(SessionRegistry::new(
            transport.clone(),
            Arc::new(MemorySessionStore::new()),
        ));
        registry
            .connect(SessionDescriptor::new("h", "u"))
            .await
            .unwrap();
        (RemoteCommandExecutor::new(registry), transport.last().unwrap())
    }

    #[test]
    fn test_no_dot_heuristic() {
        let cache = DirectoryCache::new();
        cache.store("a.txt\nb".lines(), "/home/u", false);

        let files = cache.get("/home/u").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.txt");
        assert!(!files[0].directory);
        assert_eq!(files[1].name, "b");
        assert!(files[1].directory);
        assert!(files
            .iter()
            .all(|f| f.confidence == DirectoryConfidence::Heuristic && f.path == "/home/u"));
    }

    #[test]
    fn test_merge_appends_and_keeps_loaded_state() {
        let cache = DirectoryCache::new();
        cache.store(["a", "b"], "/p", false);
        cache.set_info("/p", "a", info("drwxr-xr-x")).unwrap();

        cache.store(["a", "b", "c"], "/p", false);

        assert_eq!(cache.names("/p").unwrap(), vec!["a", "b", "c"]);
        let a = cache.find("/p", "a").unwrap();
        assert!(a.loaded);
        assert_eq!(a.file_size, 42);
        assert!(!cache.find("/p", "c").unwrap().loaded);
    }

    #[test]
    fn test_merge_does_not_drop_missing_names() {
        let cache = DirectoryCache::new();
        cache.store(["a", "b", "c"], "/p", false);
        cache.store(["a"], "/p", false);
        assert_eq!(cache.names("/p").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_forced_reload_replaces_wholesale() {
        let cache = DirectoryCache::new();
        cache.store(["a", "b"], "/p", false);
        cache.set_info("/p", "a", info("-rw-r--r--")).unwrap();

        cache.store(["a"], "/p", true);

        let files = cache.get("/p").unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].loaded);
        assert_eq!(files[0].permissions, None);
    }

    #[test]
    fn test_single_name_and_duplicate_names() {
        let cache = DirectoryCache::new();
        cache.store(std::iter::once("only"), "/p", false);
        assert_eq!(cache.names("/p").unwrap(), vec!["only"]);

        cache.store(["x", "x", "y"], "/q", false);
        assert_eq!(cache.names("/q").unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_paths_are_independent_and_trailing_slash_insensitive() {
        let cache = DirectoryCache::new();
        cache.store(["a"], "/one/", false);
        cache.store(["b"], "/two", false);
        assert_eq!(cache.names("/one").unwrap(), vec!["a"]);
        assert_eq!(cache.find("/one", "a").unwrap().path, "/one");
        assert!(cache.find("/two", "a").is_none());
        assert!(cache.get("/three").is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let cache = DirectoryCache::new();
        cache.store(["a"], "/p", false);
        let mut snapshot = cache.get("/p").unwrap();
        snapshot.clear();
        assert_eq!(cache.names("/p").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_remove_marks_not_existing() {
        let cache = DirectoryCache::new();
        cache.store(["a", "b"], "/p", false);
        let removed = cache.remove("/p", "a").unwrap();
        assert!(!removed.exists);
        assert_eq!(cache.names("/p").unwrap(), vec!["b"]);
        assert!(cache.remove("/p", "a").is_none());
    }

    #[test]
    fn test_upsert_replaces_or_appends() {
        let cache = DirectoryCache::new();
        cache.store(["a"], "/p", false);
        let mut file = RemoteFile::new("a", "/elsewhere");
        file.file_size = 7;
        cache.upsert("/p", file);
        cache.upsert("/p", RemoteFile::new("b", "/p"));
        cache.upsert("/new", RemoteFile::new("c", "/new"));

        let a = cache.find("/p", "a").unwrap();
        assert_eq!(a.file_size, 7);
        assert_eq!(a.path, "/p");
        assert_eq!(cache.names("/p").unwrap(), vec!["a", "b"]);
        assert!(cache.contains("/new"));
    }

    #[test]
    fn test_stat_confirms_directory_flag() {
        let cache = DirectoryCache::new();
        cache.store(["Makefile", "v1.2"], "/src", false);

        let makefile = cache.set_info("/src", "Makefile", info("-rw-r--r--")).unwrap();
        assert!(!makefile.directory);
        assert_eq!(makefile.confidence, DirectoryConfidence::Confirmed);

        let release = cache.set_info("/src", "v1.2", info("drwxr-xr-x")).unwrap();
        assert!(release.directory);

        // no type flag: heuristic stands
        cache.store(["README"], "/src", false);
        let readme = cache.set_info("/src", "README", info("rw-r--r--")).unwrap();
        assert!(readme.directory);
        assert_eq!(readme.confidence, DirectoryConfidence::Heuristic);
        assert!(readme.loaded);
    }

    #[test]
    fn test_stat_of_symlink_keeps_heuristic() {
        let cache = DirectoryCache::new();
        cache.store(["www", "current.log"], "/home/u", false);

        let www = cache.set_info("/home/u", "www", info("lrwxrwxrwx")).unwrap();
        assert!(www.directory);
        assert_eq!(www.confidence, DirectoryConfidence::Heuristic);
        assert!(www.loaded);

        let log = cache.set_info("/home/u", "current.log", info("lrwxrwxrwx")).unwrap();
        assert!(!log.directory);
        assert_eq!(log.confidence, DirectoryConfidence::Heuristic);
    }

    #[tokio::test]
    async fn test_load_info_is_lazy_unless_forced() {
        let (executor, connection) = executor().await;
        connection.respond(
            command::stat("/p", "a.txt"),
            ExecOutput::success("-rw-r--r-- 1 u g 10 Jan 1 10:00 a.txt\n"),
        );
        let cache = DirectoryCache::new();
        cache.store(["a.txt"], "/p", false);

        let file = cache.load_info(&executor, "/p", "a.txt", false).await.unwrap().unwrap();
        assert!(file.loaded);
        assert_eq!(file.file_size, 10);

        cache.load_info(&executor, "/p", "a.txt", false).await.unwrap();
        assert_eq!(connection.commands().len(), 1);

        cache.load_info(&executor, "/p", "a.txt", true).await.unwrap();
        assert_eq!(connection.commands().len(), 2);

        assert!(cache.load_info(&executor, "/p", "missing", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_stat_leaves_entry_unloaded() {
        let (executor, connection) = executor().await;
        connection.respond(
            command::stat("/p", "gone"),
            ExecOutput::failure(2, "ls: cannot access 'gone': No such file or directory"),
        );
        let cache = DirectoryCache::new();
        cache.store(["gone"], "/p", false);

        assert!(cache.load_info(&executor, "/p", "gone", false).await.is_err());
        assert!(!cache.find("/p", "gone").unwrap().loaded);

        let mut file = cache.find("/p", "gone").unwrap();
        assert!(file.load_info(&executor, false).await.is_err());
        assert!(!file.loaded);
    }

    #[tokio::test]
    async fn test_snapshot_load_info_writes_back_through_set_info() {
        let (executor, connection) = executor().await;
        connection.respond(
            command::stat("/p", "notes.md"),
            ExecOutput::success("-rw------- 1 u g 7 Mar 3 09:15 notes.md\n"),
        );
        let cache = DirectoryCache::new();
        cache.store(["notes.md"], "/p", false);

        let mut file = cache.find("/p", "notes.md").unwrap();
        let info = file.load_info(&executor, false).await.unwrap().unwrap();
        assert!(file.loaded);
        assert!(!cache.find("/p", "notes.md").unwrap().loaded);

        cache.set_info("/p", "notes.md", info);
        assert_eq!(cache.find("/p", "notes.md").unwrap(), file);

        // already loaded: no second round-trip
        assert!(file.load_info(&executor, false).await.unwrap().is_none());
        assert_eq!(connection.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_mode_string_is_format_error() {
        let (executor, connection) = executor().await;
        connection.respond(
            command::stat("/p", "odd"),
            ExecOutput::success("?rw-r--r-- 1 u g 10 Jan 1 10:00 odd\n"),
        );
        let cache = DirectoryCache::new();
        cache.store(["odd"], "/p", false);

        let err = cache.load_info(&executor, "/p", "odd", false).await.unwrap_err();
        assert!(matches!(err, ExecError::Format(_)));
    }
}
