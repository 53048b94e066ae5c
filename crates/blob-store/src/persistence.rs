//! Keyed binary persistence behind the blob store.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flipbook_common::error::{FlipbookError, FlipbookResult};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::record::{normalize_extension, FrameId, FrameRecord};

/// Abstract durable store for frame records.
#[async_trait::async_trait]
pub trait BlobPersistence: Send + Sync {
    /// Persist bytes under a fresh id.
    async fn insert(&self, bytes: Vec<u8>, extension: Option<String>) -> FlipbookResult<FrameId>;

    /// Fetch a record; `Ok(None)` when the id was never stored.
    async fn fetch(&self, id: FrameId) -> FlipbookResult<Option<FrameRecord>>;

    /// At most the first `max_bytes` of a record, for header parsing.
    async fn fetch_header(
        &self,
        id: FrameId,
        max_bytes: usize,
    ) -> FlipbookResult<Option<Vec<u8>>> {
        Ok(self.fetch(id).await?.map(|record| {
            let end = record.bytes.len().min(max_bytes);
            record.bytes[..end].to_vec()
        }))
    }

    /// Backend name.
    fn name(&self) -> &str;
}

/// In-process persistence for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    last_id: u64,
    records: BTreeMap<FrameId, FrameRecord>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobPersistence for MemoryPersistence {
    async fn insert(&self, bytes: Vec<u8>, extension: Option<String>) -> FlipbookResult<FrameId> {
        let mut inner = self.inner.lock().await;
        inner.last_id += 1;
        let id = FrameId(inner.last_id);
        inner.records.insert(
            id,
            FrameRecord {
                id,
                bytes: Arc::new(bytes),
                extension: extension.map(|e| normalize_extension(&e)),
            },
        );
        Ok(id)
    }

    async fn fetch(&self, id: FrameId) -> FlipbookResult<Option<FrameRecord>> {
        Ok(self.inner.lock().await.records.get(&id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// One file per record under a root directory.
///
/// Files are named `<id>.<ext>` (`<id>` alone when no extension was
/// given). The directory is scanned once on open to rebuild the id
/// counter and the id to extension index; lookups go through the index.
#[derive(Debug)]
pub struct FsPersistence {
    root: PathBuf,
    index: Mutex<FsIndex>,
}

#[derive(Debug, Default)]
struct FsIndex {
    last_id: u64,
    entries: HashMap<FrameId, Option<String>>,
}

impl FsPersistence {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> FlipbookResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            FlipbookError::store_write(format!(
                "Failed to create store directory {}: {e}",
                root.display()
            ))
        })?;

        let mut index = FsIndex::default();
        let mut entries = tokio::fs::read_dir(&root).await.map_err(|e| {
            FlipbookError::store_read(format!("Failed to list {}: {e}", root.display()))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FlipbookError::store_read(format!("Failed to list store: {e}")))?
        {
            if let Some((id, extension)) = parse_file_name(&entry.path()) {
                index.last_id = index.last_id.max(id.0);
                index.entries.insert(id, extension);
            }
        }

        tracing::debug!(
            root = %root.display(),
            last_id = index.last_id,
            frames = index.entries.len(),
            "Opened frame store"
        );
        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    fn file_path(&self, id: FrameId, extension: Option<&str>) -> PathBuf {
        match extension {
            Some(ext) => self.root.join(format!("{}.{ext}", id.0)),
            None => self.root.join(id.0.to_string()),
        }
    }

    /// Path and extension of a stored record.
    async fn locate(&self, id: FrameId) -> Option<(PathBuf, Option<String>)> {
        let index = self.index.lock().await;
        let extension = index.entries.get(&id)?.clone();
        Some((self.file_path(id, extension.as_deref()), extension))
    }

    /// Open a located record; a file removed behind the store's back is absent.
    async fn open_record(
        &self,
        id: FrameId,
        path: &Path,
    ) -> FlipbookResult<Option<tokio::fs::File>> {
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(%id, path = %path.display(), "Indexed frame file is gone");
                self.index.lock().await.entries.remove(&id);
                Ok(None)
            }
            Err(e) => Err(FlipbookError::store_read(format!(
                "Failed to open {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait::async_trait]
impl BlobPersistence for FsPersistence {
    async fn insert(&self, bytes: Vec<u8>, extension: Option<String>) -> FlipbookResult<FrameId> {
        let extension = extension
            .map(|e| normalize_extension(&e))
            .filter(|e| !e.is_empty());

        // Held across the write so ids are handed out in commit order.
        let mut index = self.index.lock().await;
        let id = FrameId(index.last_id + 1);
        let path = self.file_path(id, extension.as_deref());
        let temp_path = self.root.join(format!(".{}.tmp", id.0));

        tokio::fs::write(&temp_path, &bytes).await.map_err(|e| {
            FlipbookError::store_write(format!("Failed to write {}: {e}", temp_path.display()))
        })?;
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            FlipbookError::store_write(format!("Failed to commit {}: {e}", path.display()))
        })?;

        index.last_id = id.0;
        index.entries.insert(id, extension);
        tracing::debug!(%id, bytes = bytes.len(), path = %path.display(), "Stored frame");
        Ok(id)
    }

    async fn fetch(&self, id: FrameId) -> FlipbookResult<Option<FrameRecord>> {
        let Some((path, extension)) = self.locate(id).await else {
            return Ok(None);
        };
        let Some(mut file) = self.open_record(id, &path).await? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await.map_err(|e| {
            FlipbookError::store_read(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(Some(FrameRecord {
            id,
            bytes: Arc::new(bytes),
            extension,
        }))
    }

    async fn fetch_header(
        &self,
        id: FrameId,
        max_bytes: usize,
    ) -> FlipbookResult<Option<Vec<u8>>> {
        let Some((path, _)) = self.locate(id).await else {
            return Ok(None);
        };
        let Some(file) = self.open_record(id, &path).await? else {
            return Ok(None);
        };
        let mut header = Vec::with_capacity(max_bytes.min(64 * 1024));
        file.take(max_bytes as u64)
            .read_to_end(&mut header)
            .await
            .map_err(|e| {
                FlipbookError::store_read(format!("Failed to read {}: {e}", path.display()))
            })?;
        Ok(Some(header))
    }

    fn name(&self) -> &str {
        "fs"
    }
}

/// Split `<id>.<ext>` into its parts. Temp files and foreign names yield `None`.
fn parse_file_name(path: &Path) -> Option<(FrameId, Option<String>)> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let (stem, extension) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext.to_string())),
        None => (name, None),
    };
    let id = stem.parse::<u64>().ok()?;
    Some((FrameId(id), extension))
}
