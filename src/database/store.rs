//! Whole-snapshot persistence. Every load returns the complete set of
//! collections and every save overwrites all of them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::models::{Snapshot, ADMIN_DEFAULT_PASSWORD};
use crate::password::hash_password;

pub trait RecordStore: Send + Sync {
    /// Never fails on missing or unreadable state; those degrade to
    /// [`default_snapshot`].
    fn load(&self) -> Result<Snapshot>;

    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Empty collections and an admin record with the default password.
pub fn default_snapshot() -> Result<Snapshot> {
    Ok(Snapshot::with_admin(hash_password(ADMIN_DEFAULT_PASSWORD)?))
}

/// A single pretty-printed JSON document on disk.
pub struct FileStore {
    path: PathBuf,
    /// Served while the document is missing or unreadable. Built once so
    /// repeated loads do not rehash the admin password.
    fallback: OnceCell<Snapshot>,
}

impl FileStore {
    /// Creates the document with a default snapshot when it does not exist yet.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let store = FileStore {
            path: path.into(),
            fallback: OnceCell::new(),
        };
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !store.path.exists() {
            tracing::info!("Initializing record store at {}", store.path.display());
            store.save(&default_snapshot()?)?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fallback(&self) -> Result<Snapshot> {
        self.fallback.get_or_try_init(default_snapshot).cloned()
    }
}

impl RecordStore for FileStore {
    fn load(&self) -> Result<Snapshot> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return self.fallback();
            }
        };
        if data.trim().is_empty() {
            return self.fallback();
        }
        match serde_json::from_str(&data) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!("Discarding unreadable record store {}: {}", self.path.display(), e);
                self.fallback()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

/// Snapshot held in memory; nothing survives a restart.
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Result<Self> {
        Ok(Self::with_snapshot(default_snapshot()?))
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        MemoryStore {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<Snapshot> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(())
    }
}
