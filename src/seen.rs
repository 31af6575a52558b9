// src/seen.rs
//! Durable set of item ids already surfaced as "new".
//!
//! Saves are whole-file overwrites (write temp, rename). The set only grows;
//! there is no remove.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("seen-set io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("seen-set decode at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("seen-set encode: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.ids.contains(item_id)
    }

    /// True when the id was not present before.
    pub fn insert(&mut self, item_id: impl Into<String>) -> bool {
        self.ids.insert(item_id.into())
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_superset(&self, other: &SeenSet) -> bool {
        self.ids.is_superset(&other.ids)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SeenSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut s = SeenSet::new();
        s.extend(iter);
        s
    }
}

/// On-disk shape. Ids are written sorted so diffs of the file stay readable.
#[derive(Debug, Serialize, Deserialize)]
struct SeenFile {
    version: u32,
    ids: Vec<String>,
}

#[async_trait]
pub trait SeenSetStore: Send + Sync {
    async fn load(&self) -> Result<SeenSet, PersistenceError>;
    async fn save(&self, set: &SeenSet) -> Result<(), PersistenceError>;
}

/// JSON file store. A missing file loads as an empty set.
#[derive(Debug, Clone)]
pub struct JsonFileSeenStore {
    path: PathBuf,
}

impl JsonFileSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SeenSetStore for JsonFileSeenStore {
    async fn load(&self) -> Result<SeenSet, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SeenSet::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let file: SeenFile =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
                path: self.path.clone(),
                source,
            })?;
        Ok(file.ids.into_iter().collect())
    }

    async fn save(&self, set: &SeenSet) -> Result<(), PersistenceError> {
        let mut ids: Vec<String> = set.iter().map(str::to_string).collect();
        ids.sort();
        let json = serde_json::to_vec_pretty(&SeenFile { version: 1, ids })
            .map_err(PersistenceError::Encode)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            // File handle is scoped: closed on every exit path.
            let mut f = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| self.io_err(e))?;
            f.write_all(&json).await.map_err(|e| self.io_err(e))?;
            f.sync_all().await.map_err(|e| self.io_err(e))?;
        }
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        tracing::debug!(target: "seen", path = %self.path.display(), count = set.len(), "seen-set saved");
        Ok(())
    }
}

/// Process-local store, for tests and for running without a state dir.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    inner: parking_lot::Mutex<SeenSet>,
}

impl MemorySeenStore {
    pub fn new(initial: SeenSet) -> Self {
        Self {
            inner: parking_lot::Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> SeenSet {
        self.inner.lock().clone()
    }
}

#[async_trait]
impl SeenSetStore for MemorySeenStore {
    async fn load(&self) -> Result<SeenSet, PersistenceError> {
        Ok(self.snapshot())
    }

    async fn save(&self, set: &SeenSet) -> Result<(), PersistenceError> {
        *self.inner.lock() = set.clone();
        Ok(())
    }
}
