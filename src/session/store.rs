use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::SessionDescriptor;

/// Persistence for known sessions, unique per (host, username, port).
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Vec<SessionDescriptor>>;
    fn save(&self, sessions: &[SessionDescriptor]) -> Result<()>;
    fn delete(&self, host: &str, username: &str, port: u16) -> Result<()>;

    /// Whether a descriptor with the same key is already stored.
    fn contains(&self, descriptor: &SessionDescriptor) -> Result<bool> {
        let key = descriptor.key();
        Ok(self.load()?.iter().any(|s| s.key() == key))
    }
}

/// Keeps the first descriptor for every key.
fn dedup(sessions: &[SessionDescriptor]) -> Vec<SessionDescriptor> {
    let mut unique: Vec<SessionDescriptor> = Vec::with_capacity(sessions.len());
    for session in sessions {
        if !unique.iter().any(|s| s.key() == session.key()) {
            unique.push(session.clone());
        }
    }
    unique
}

/// JSON array on disk.
#[derive(Debug)]
pub struct JsonSessionStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<SessionDescriptor>> {
        // If sessions file doesn't exist, return empty vector
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).context("Failed to read sessions file")?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).context("Failed to parse sessions file")
    }

    fn write(&self, sessions: &[SessionDescriptor]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create sessions directory")?;
        }
        let json =
            serde_json::to_string_pretty(&dedup(sessions)).context("Failed to serialize sessions")?;
        fs::write(&self.path, json).context("Failed to write sessions file")?;
        Ok(())
    }
}

impl SessionStore for JsonSessionStore {
    fn load(&self) -> Result<Vec<SessionDescriptor>> {
        let _guard = self.lock.lock();
        self.read()
    }

    fn save(&self, sessions: &[SessionDescriptor]) -> Result<()> {
        let _guard = self.lock.lock();
        self.write(sessions)
    }

    fn delete(&self, host: &str, username: &str, port: u16) -> Result<()> {
        let _guard = self.lock.lock();
        let mut sessions = self.read()?;
        let before = sessions.len();
        sessions.retain(|s| !s.matches(host, username, port));
        if sessions.len() != before {
            self.write(&sessions)?;
        }
        Ok(())
    }
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<Vec<SessionDescriptor>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Vec<SessionDescriptor>> {
        Ok(self.sessions.lock().clone())
    }

    fn save(&self, sessions: &[SessionDescriptor]) -> Result<()> {
        *self.sessions.lock() = dedup(sessions);
        Ok(())
    }

    fn delete(&self, host: &str, username: &str, port: u16) -> Result<()> {
        self.sessions
            .lock()
            .retain(|s| !s.matches(host, username, port));
        Ok(())
    }
}
