use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session file name in the per-server cache directory
const SESSION_FILE: &str = "session.json";

/// Holder of the session token. Reads come from memory; writes are mirrored
/// to whatever durable storage the implementation uses.
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Option<String>;

    /// Replace the held token, `None` clears it.
    fn set(&self, session_id: Option<String>) -> Result<()>;
}

/// Session store that never touches disk.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session_id: RwLock<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: RwLock::new(Some(session_id.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    fn set(&self, session_id: Option<String>) -> Result<()> {
        let mut guard = self
            .session_id
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        *guard = session_id;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Session store persisted as JSON in a cache directory.
pub struct FileSessionStore {
    cache_dir: PathBuf,
    data: RwLock<Option<SessionData>>,
}

impl FileSessionStore {
    /// Open the store, loading any session already saved in `cache_dir`.
    /// An unreadable file is treated as no session.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let data = match Self::load(&cache_dir) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                None
            }
        };
        debug!(has_session = data.is_some(), "Session loaded");
        Self {
            cache_dir,
            data: RwLock::new(data),
        }
    }

    fn load(cache_dir: &Path) -> Result<Option<SessionData>> {
        let path = cache_dir.join(SESSION_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }

    /// When the held session was first stored.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.data
            .read()
            .ok()
            .and_then(|d| d.as_ref().map(|d| d.created_at))
    }

    pub fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        self.data
            .read()
            .ok()
            .and_then(|d| d.as_ref().map(|d| d.session_id.clone()))
    }

    fn set(&self, session_id: Option<String>) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        match session_id {
            Some(session_id) => {
                // Keep the original timestamp when the server just echoes the same id.
                let created_at = match guard.as_ref() {
                    Some(existing) if existing.session_id == session_id => existing.created_at,
                    _ => Utc::now(),
                };
                let data = SessionData {
                    session_id,
                    created_at,
                };
                *guard = Some(data.clone());
                self.save(&data)
            }
            None => {
                *guard = None;
                self.remove()
            }
        }
    }
}
