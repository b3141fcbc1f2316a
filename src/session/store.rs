//! Cached session storage
//!
//! Mirrors the session's `token` and `role` so a restart can restore the
//! session without signing in again. The cached pair is only a hint; the
//! controller re-validates it against the backend.

use super::Role;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

const TOKEN_KEY: &str = "token";
const ROLE_KEY: &str = "role";

/// Token and role restored from storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedSession {
    pub token: String,
    pub role: Role,
}

pub trait SessionStore: Send + Sync {
    /// Returns the cached pair, or `None` if either key is missing or invalid
    fn load(&self) -> Option<CachedSession>;
    fn save(&self, cached: &CachedSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

impl<T: SessionStore + ?Sized> SessionStore for std::sync::Arc<T> {
    fn load(&self) -> Option<CachedSession> {
        (**self).load()
    }

    fn save(&self, cached: &CachedSession) -> Result<()> {
        (**self).save(cached)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

fn from_entries(entries: &HashMap<String, String>) -> Option<CachedSession> {
    let token = entries.get(TOKEN_KEY).filter(|t| !t.is_empty())?;
    let role = match entries.get(ROLE_KEY)?.parse::<Role>() {
        Ok(role) => role,
        Err(role) => {
            warn!("ignoring cached session with unrecognized role '{role}'");
            return None;
        }
    };

    Some(CachedSession {
        token: token.clone(),
        role,
    })
}

fn to_entries(cached: &CachedSession) -> HashMap<String, String> {
    HashMap::from([
        (TOKEN_KEY.to_string(), cached.token.clone()),
        (ROLE_KEY.to_string(), cached.role.to_string()),
    ])
}

/// Key/value store persisted as a JSON object in a single file
pub struct FileSessionStore {
    path: PathBuf,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(transparent)]
struct Entries(HashMap<String, String>);

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<Entries>> {
        if !self
            .path
            .try_exists()
            .context("failed to check if session cache exists")?
        {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&self.path).context("failed to read session cache")?;
        let entries = serde_json::from_str(&content).context("failed to parse session cache")?;

        Ok(Some(entries))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<CachedSession> {
        match self.read() {
            Ok(entries) => entries.and_then(|Entries(e)| from_entries(&e)),
            Err(e) => {
                warn!("discarding session cache {:?}: {e:#}", self.path);
                None
            }
        }
    }

    fn save(&self, cached: &CachedSession) -> Result<()> {
        debug!("saving session cache to {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("failed to create session cache directory")?;
        }

        let content = serde_json::to_string(&Entries(to_entries(cached)))
            .context("failed to serialize session cache")?;

        std::fs::write(&self.path, content).context("failed to write session cache")
    }

    fn clear(&self) -> Result<()> {
        debug!("clearing session cache {:?}", self.path);

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("failed to remove session cache"),
        }
    }
}

/// Process-local store, lost when the client exits
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn with_session(token: &str, role: &str) -> Self {
        Self {
            entries: Mutex::new(HashMap::from([
                (TOKEN_KEY.to_string(), token.to_string()),
                (ROLE_KEY.to_string(), role.to_string()),
            ])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<CachedSession> {
        let entries = self.entries.lock().ok()?;
        from_entries(&entries)
    }

    fn save(&self, cached: &CachedSession) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        *entries = to_entries(cached);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?
            .clear();
        Ok(())
    }
}
