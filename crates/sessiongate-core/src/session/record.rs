use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;

/// A session as kept by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Durable storage for session records, queried by `session_id`.
///
/// Every call may fail; implementations must bound how long they block so a
/// stalled backend cannot hang request threads.
pub trait SessionRecordStore: Send + Sync {
    fn insert(&self, record: SessionRecord) -> Result<(), StoreError>;

    fn find_by_session_id(&self, session_id: &str) -> Result<Vec<SessionRecord>, StoreError>;

    /// Remove every record with this `session_id`, returning how many.
    fn remove(&self, session_id: &str) -> Result<usize, StoreError>;

    /// Remove every record matching `predicate`, returning how many.
    fn remove_where(&self, predicate: &dyn Fn(&SessionRecord) -> bool) -> Result<usize, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Session records kept in a single JSON file.
///
/// The file is the only copy: it is re-read under the store's lock on every
/// call and rewritten (temp file + rename) after every change, so several
/// handles on one path see each other's writes. Callers wait at most
/// `timeout` for the lock. The file I/O itself is not bounded, and
/// nothing serializes writers in different processes; a write racing
/// another process's write on the same path can be lost.
pub struct JsonFileRecordStore {
    path: PathBuf,
    timeout: Duration,
    guard: Mutex<()>,
}

impl JsonFileRecordStore {
    /// Open the store at `path`, failing early if an existing file is corrupt.
    pub fn open(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            timeout,
            guard: Mutex::new(()),
        };
        let count = store.load()?.len();
        debug!(path = %store.path.display(), count, "Opened session record store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.guard
            .try_lock_for(self.timeout)
            .ok_or(StoreError::Timeout(self.timeout.as_millis() as u64))
    }

    fn load(&self) -> Result<Vec<SessionRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, records: &[SessionRecord]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl SessionRecordStore for JsonFileRecordStore {
    fn insert(&self, record: SessionRecord) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut records = self.load()?;
        records.push(record);
        self.persist(&records)
    }

    fn find_by_session_id(&self, session_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let _guard = self.lock()?;
        let mut records = self.load()?;
        records.retain(|r| r.session_id == session_id);
        Ok(records)
    }

    fn remove(&self, session_id: &str) -> Result<usize, StoreError> {
        self.remove_where(&|r| r.session_id == session_id)
    }

    fn remove_where(&self, predicate: &dyn Fn(&SessionRecord) -> bool) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| !predicate(r));
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records)?;
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        Ok(self.load()?.len())
    }
}
