//! Local key-value storage for session continuity.
//!
//! Each key is a JSON file `<root>/<key>.json`. Two keys are used: the
//! snapshot (`omichat_state`) and the last-used username
//! (`omichat_username`).
//!
//! Storage is best effort: unreadable or corrupt entries are logged and read
//! as absent, and the `save_*` helpers log write failures instead of
//! returning them. A storage problem never interrupts chatting.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use omichat_proto::snapshot::Snapshot;

/// Prefix applied to every storage key.
pub const KEY_PREFIX: &str = "omichat_";

/// Key holding the persisted [`Snapshot`].
pub const SNAPSHOT_KEY: &str = "state";

/// Key holding the last-used username.
pub const USERNAME_KEY: &str = "username";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage directory could not be created or accessed.
    #[error("storage directory {path} unavailable: {source}")]
    Unavailable {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A write failed.
    #[error("write to {path} failed: {source}")]
    WriteFailed {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A value could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Could not determine the user's data directory.
    #[error("could not determine data directory (no HOME or XDG_DATA_HOME)")]
    NoDataDir,
}

/// File-backed key-value storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens (creating if needed) storage rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the directory cannot be
    /// created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Unavailable {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Opens storage in the platform data directory (`<data_dir>/omichat`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoDataDir`] if no data directory is known, or
    /// [`StorageError::Unavailable`] if it cannot be created.
    pub fn open_default() -> Result<Self, StorageError> {
        let base = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        Self::open(base.join("omichat"))
    }

    /// Storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{KEY_PREFIX}{key}.json"))
    }

    /// Reads a value. Missing, unreadable and corrupt entries are `None`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "failed to read storage entry");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "ignoring corrupt storage entry");
                None
            }
        }
    }

    /// Writes a value, replacing any previous one.
    ///
    /// The value is written to a temporary file and renamed into place, so a
    /// crash mid-write leaves the previous value intact. Each write uses its
    /// own temporary file, so concurrent writers never interleave bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if serialization or the write fails.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        let path = self.path_for(key);
        let tmp = self
            .root
            .join(format!("{KEY_PREFIX}{key}.{}.tmp", Uuid::now_v7().simple()));
        std::fs::write(&tmp, bytes)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|source| {
                let _ = std::fs::remove_file(&tmp);
                StorageError::WriteFailed {
                    path: path.clone(),
                    source,
                }
            })
    }

    /// Deletes a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] if the file exists but cannot be
    /// removed.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::WriteFailed { path, source }),
        }
    }

    /// Loads the persisted snapshot, if any.
    #[must_use]
    pub fn load_snapshot(&self) -> Option<Snapshot> {
        self.get(SNAPSHOT_KEY)
    }

    /// Persists a snapshot, logging failures.
    pub fn save_snapshot(&self, snapshot: &Snapshot) {
        if let Err(e) = self.set(SNAPSHOT_KEY, snapshot) {
            tracing::warn!(err = %e, "failed to persist snapshot");
        }
    }

    /// Deletes the persisted snapshot, logging failures.
    pub fn clear_snapshot(&self) {
        if let Err(e) = self.remove(SNAPSHOT_KEY) {
            tracing::warn!(err = %e, "failed to clear snapshot");
        }
    }

    /// Loads the last-used username, if any.
    #[must_use]
    pub fn load_username(&self) -> Option<String> {
        self.get::<String>(USERNAME_KEY)
            .filter(|name| !name.trim().is_empty())
    }

    /// Persists the last-used username, logging failures.
    pub fn save_username(&self, username: &str) {
        if let Err(e) = self.set(USERNAME_KEY, username) {
            tracing::warn!(err = %e, "failed to persist username");
        }
    }

    /// The user to resume as: the snapshot's user if there is one, else the
    /// last-used username.
    #[must_use]
    pub fn resume_user(&self) -> Option<String> {
        self.load_snapshot()
            .map(|s| s.current_user)
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.load_username())
    }
}
