//! Persisted document UID hint.
//!
//! Remembering the uid of the vault document lets the next start fetch it
//! directly instead of listing the collection. The hint is an optimization
//! only: losing or corrupting it just means one extra round trip.

use crate::error::{Error, Result};
use crate::Uid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Version of the hint file format.
pub const HINT_FORMAT_VERSION: u32 = 1;

/// Storage for the last known document uid.
pub trait UidHintStore: Send + Sync {
    /// Read the stored uid, if any.
    fn load(&self) -> Result<Option<Uid>>;

    /// Remember `uid`.
    fn save(&self, uid: &str) -> Result<()>;

    /// Forget the stored uid (sign-out).
    fn clear(&self) -> Result<()>;
}

/// Hint store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    uid: Mutex<Option<Uid>>,
}

impl MemoryHintStore {
    /// Create an empty hint store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hint store that already holds `uid`.
    pub fn with_uid(uid: impl Into<Uid>) -> Self {
        Self {
            uid: Mutex::new(Some(uid.into())),
        }
    }
}

impl UidHintStore for MemoryHintStore {
    fn load(&self) -> Result<Option<Uid>> {
        Ok(self.uid.lock().clone())
    }

    fn save(&self, uid: &str) -> Result<()> {
        *self.uid.lock() = Some(uid.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.uid.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HintFile {
    format_version: u32,
    doc_uid: Uid,
}

/// Hint store backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct FileHintStore {
    path: PathBuf,
}

impl FileHintStore {
    /// Use the file at `path`. It is created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the hint file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UidHintStore for FileHintStore {
    fn load(&self) -> Result<Option<Uid>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<HintFile>(&bytes) {
            Ok(file) if file.format_version == HINT_FORMAT_VERSION => Ok(Some(file.doc_uid)),
            Ok(file) => {
                tracing::warn!(
                    path = %self.path.display(),
                    format_version = file.format_version,
                    "Ignoring hint file with unknown format version"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt hint file");
                Ok(None)
            }
        }
    }

    fn save(&self, uid: &str) -> Result<()> {
        if uid.is_empty() {
            return Err(Error::Hint("refusing to save an empty uid".into()));
        }

        let file = HintFile {
            format_version: HINT_FORMAT_VERSION,
            doc_uid: uid.to_string(),
        };
        let json = serde_json::to_vec(&file)?;

        // Write-then-rename so a crash never leaves a half-written hint.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
