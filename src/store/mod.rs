//! Persisted run state: the previous snapshot and the notification ledger.
//!
//! The alert logic never touches the filesystem directly; it talks to a
//! `StateStore`. `JsonFileStore` is the production layout (pretty JSON, one
//! object per file, rotated snapshot history), `MemoryStore` backs tests.
//!
//! Load methods report a missing file as `Ok(None)` and an unreadable one as
//! `Err`; deciding to fail open is the caller's job. Save methods must
//! surface every failure.

pub mod rotation;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::alert::NotificationLedger;
use crate::model::{Snapshot, StoreError};

pub use rotation::{numbered_path, rotate_snapshots};

pub trait StateStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Persists `snapshot` as the new baseline, rotating older ones out.
    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;

    fn load_ledger(&self) -> Result<Option<NotificationLedger>, StoreError>;

    fn save_ledger(&mut self, ledger: &NotificationLedger) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// File-backed store: `snapshot_path` (+ `_1`..`_N` history) and `ledger_path`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    snapshot_path: PathBuf,
    ledger_path: PathBuf,
    history: usize,
}

impl JsonFileStore {
    pub fn new(snapshot_path: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>, history: usize) -> Self {
        JsonFileStore {
            snapshot_path: snapshot_path.into(),
            ledger_path: ledger_path.into(),
            history,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        read_json(&self.snapshot_path)
    }

    /// The new snapshot is written to a staging file first, so a failed
    /// write leaves the current baseline and its history untouched.
    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        ensure_parent(&self.snapshot_path)?;
        let staged = staging_path(&self.snapshot_path);
        let result = write_json(&staged, snapshot)
            .and_then(|()| {
                rotate_snapshots(&self.snapshot_path, self.history).map_err(|source| StoreError::Io {
                    path: self.snapshot_path.clone(),
                    source,
                })
            })
            .and_then(|()| {
                fs::rename(&staged, &self.snapshot_path).map_err(|source| StoreError::Io {
                    path: self.snapshot_path.clone(),
                    source,
                })
            });
        if result.is_err() {
            let _ = fs::remove_file(&staged);
        }
        result
    }

    fn load_ledger(&self) -> Result<Option<NotificationLedger>, StoreError> {
        read_json(&self.ledger_path)
    }

    fn save_ledger(&mut self, ledger: &NotificationLedger) -> Result<(), StoreError> {
        ensure_parent(&self.ledger_path)?;
        write_json(&self.ledger_path, ledger)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `alerts.json` -> `alerts.json.tmp`, next to the target.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory store. Keeps every saved snapshot, newest last, so tests can
/// inspect history.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub snapshots: Vec<Snapshot>,
    pub ledger: Option<NotificationLedger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        MemoryStore {
            snapshots: vec![snapshot],
            ledger: None,
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }
}

impl StateStore for MemoryStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.last().cloned())
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn load_ledger(&self) -> Result<Option<NotificationLedger>, StoreError> {
        Ok(self.ledger.clone())
    }

    fn save_ledger(&mut self, ledger: &NotificationLedger) -> Result<(), StoreError> {
        self.ledger = Some(ledger.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, SiteRecord};
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    fn snapshot(label: &str) -> Snapshot {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let record = SiteRecord {
            id: "a".to_string(),
            name: label.to_string(),
            latitude: 40.0,
            longitude: -3.0,
            raw_score: 1.5,
            level: Level::Low,
            details: Map::new(),
        };
        Snapshot::new(label, vec![record], now)
    }

    #[test]
    fn test_missing_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("a.json"), dir.path().join("l.json"), 5);
        assert!(store.load_snapshot().unwrap().is_none());
        assert!(store.load_ledger().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path, dir.path().join("l.json"), 5);
        assert!(matches!(store.load_snapshot(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_save_rotates_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        let mut store = JsonFileStore::new(&path, dir.path().join("l.json"), 5);

        store.save_snapshot(&snapshot("first")).unwrap();
        store.save_snapshot(&snapshot("second")).unwrap();

        assert_eq!(store.load_snapshot().unwrap().unwrap().source, "second");
        let rotated: Snapshot =
            serde_json::from_str(&fs::read_to_string(numbered_path(&path, 1)).unwrap()).unwrap();
        assert_eq!(rotated.source, "first");
    }

    #[test]
    fn test_save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/alerts.json");
        let mut store = JsonFileStore::new(&path, dir.path().join("nested/ledger.json"), 2);
        store.save_snapshot(&snapshot("x")).unwrap();
        store.save_ledger(&NotificationLedger::new()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail.
        let path = dir.path().join("alerts.json");
        fs::create_dir(&path).unwrap();
        let mut store = JsonFileStore::new(&path, dir.path().join("l.json"), 0);
        assert!(matches!(
            store.save_snapshot(&snapshot("x")),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_failed_write_keeps_previous_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        let mut store = JsonFileStore::new(&path, dir.path().join("l.json"), 5);
        store.save_snapshot(&snapshot("first")).unwrap();

        // A directory at the staging path makes the next write fail.
        fs::create_dir(staging_path(&path)).unwrap();
        assert!(matches!(
            store.save_snapshot(&snapshot("second")),
            Err(StoreError::Io { .. })
        ));

        assert_eq!(store.load_snapshot().unwrap().unwrap().source, "first");
        assert!(!numbered_path(&path, 1).exists());
    }

    #[test]
    fn test_successful_save_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        let mut store = JsonFileStore::new(&path, dir.path().join("l.json"), 0);
        store.save_snapshot(&snapshot("one")).unwrap();
        store.save_snapshot(&snapshot("two")).unwrap();
        assert_eq!(store.load_snapshot().unwrap().unwrap().source, "two");
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_memory_store_returns_latest() {
        let mut store = MemoryStore::new();
        assert!(store.load_snapshot().unwrap().is_none());
        store.save_snapshot(&snapshot("one")).unwrap();
        store.save_snapshot(&snapshot("two")).unwrap();
        assert_eq!(store.load_snapshot().unwrap().unwrap().source, "two");
        assert_eq!(store.snapshots.len(), 2);
    }
}
