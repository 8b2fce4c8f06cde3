use ciwatch_core::cursor::MonthCursor;
use ciwatch_core::entry::{composite_key, Entry};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data in {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("data file {path} is locked by another process")]
    Locked { path: String },
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Durable, append-only dataset of ingested entries.
///
/// The on-disk representation is a single JSON array; every write replaces
/// the whole file atomically (temp file + rename), so readers only ever see
/// a complete prior checkpoint. An advisory lock guards against a second
/// concurrent writer.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    _lock: File,
}

impl RecordStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| io_err(parent, err))?;
            }
        }
        let lock_path = lock_path_for(&path);
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|err| io_err(&lock_path, err))?;
        lock.try_lock_exclusive()
            .map_err(|_| StorageError::Locked {
                path: path.display().to_string(),
            })?;
        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full dataset; a missing file is an empty dataset.
    pub fn load(&self) -> Result<Vec<Entry>, StorageError> {
        load_entries(&self.path)
    }

    /// Checkpoints the full dataset, re-sorted newest-first.
    pub fn save(&self, entries: &mut Vec<Entry>) -> Result<(), StorageError> {
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let payload = serde_json::to_string_pretty(entries).map_err(|err| {
            StorageError::Malformed {
                path: self.path.display().to_string(),
                source: err,
            }
        })?;
        write_atomic(&self.path, &payload)
    }
}

/// Reads a dataset without taking the writer lock, for analysis passes.
pub fn load_entries(path: &Path) -> Result<Vec<Entry>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).map_err(|err| io_err(path, err))?;
    serde_json::from_str(&raw).map_err(|err| StorageError::Malformed {
        path: path.display().to_string(),
        source: err,
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorState {
    current_month: MonthCursor,
}

/// Single-record store tracking the month the backward walk has reached.
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` means no backfill has run yet: start from the present.
    pub fn load(&self) -> Result<Option<MonthCursor>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|err| io_err(&self.path, err))?;
        let state: CursorState =
            serde_json::from_str(&raw).map_err(|err| StorageError::Malformed {
                path: self.path.display().to_string(),
                source: err,
            })?;
        Ok(Some(state.current_month))
    }

    pub fn save(&self, cursor: MonthCursor) -> Result<(), StorageError> {
        let state = CursorState {
            current_month: cursor,
        };
        let payload =
            serde_json::to_string_pretty(&state).map_err(|err| StorageError::Malformed {
                path: self.path.display().to_string(),
                source: err,
            })?;
        write_atomic(&self.path, &payload)
    }
}

/// In-memory set of (run id, category) composite keys, rebuilt from the
/// record store at startup. Purely a cache: losing it costs refetches,
/// never correctness.
#[derive(Debug, Default)]
pub struct DedupIndex {
    keys: HashSet<String>,
}

impl DedupIndex {
    pub fn from_entries(entries: &[Entry]) -> Self {
        Self {
            keys: entries.iter().map(Entry::composite_key).collect(),
        }
    }

    pub fn contains(&self, run_id: u64, category: &str) -> bool {
        self.keys.contains(&composite_key(run_id, category))
    }

    pub fn insert(&mut self, run_id: u64, category: &str) -> bool {
        self.keys.insert(composite_key(run_id, category))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.lock", name.to_string_lossy())),
        None => path.with_extension("lock"),
    }
}

fn write_atomic(path: &Path, payload: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| io_err(parent, err))?;
        }
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    fs::write(&temp_path, payload).map_err(|err| io_err(&temp_path, err))?;
    fs::rename(&temp_path, path).map_err(|err| io_err(path, err))?;
    Ok(())
}
