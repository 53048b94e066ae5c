//! The frame blob store.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use flipbook_common::error::{FlipbookError, FlipbookResult};

use crate::cache::{FrameReference, ReferenceCache};
use crate::persistence::{BlobPersistence, FsPersistence, MemoryPersistence};
use crate::record::{Blob, FrameId};

/// Bytes read when probing a frame's header. Large JPEG metadata can push
/// the size marker past this, in which case the whole frame is read.
pub const HEADER_PROBE_BYTES: usize = 64 * 1024;

/// Frame bytes keyed by id, with a shared reference cache on top.
#[derive(Clone)]
pub struct BlobStore {
    persistence: Arc<dyn BlobPersistence>,
    cache: ReferenceCache,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("persistence", &self.persistence.name())
            .field("cached_references", &self.cache.len())
            .finish()
    }
}

impl BlobStore {
    /// Store over the given backend with a fresh cache.
    pub fn new(persistence: Arc<dyn BlobPersistence>) -> Self {
        Self::with_cache(persistence, ReferenceCache::new())
    }

    /// Store sharing an existing cache (e.g. one cache for the whole process).
    pub fn with_cache(persistence: Arc<dyn BlobPersistence>, cache: ReferenceCache) -> Self {
        Self { persistence, cache }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    /// Open a directory-backed store.
    pub async fn open_dir(root: impl Into<PathBuf>) -> FlipbookResult<Self> {
        Ok(Self::new(Arc::new(FsPersistence::open(root).await?)))
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Store bytes and return the freshly assigned id.
    pub async fn put(&self, bytes: Vec<u8>, extension: Option<&str>) -> FlipbookResult<FrameId> {
        self.persistence
            .insert(bytes, extension.map(str::to_string))
            .await
            .map_err(|e| match e {
                FlipbookError::StoreWriteFailed { .. } => e,
                other => FlipbookError::store_write(other.to_string()),
            })
    }

    /// Typed blob for `id`, or `None` when nothing is stored under it.
    pub async fn get_blob(&self, id: FrameId) -> FlipbookResult<Option<Blob>> {
        let record = self.persistence.fetch(id).await?;
        Ok(record.as_ref().map(Blob::from_record))
    }

    /// Cached displayable reference for `id`.
    ///
    /// The first call per id reads the blob and creates the reference;
    /// later calls return the same instance without touching storage.
    pub async fn get_blob_reference(
        &self,
        id: FrameId,
    ) -> FlipbookResult<Option<Arc<FrameReference>>> {
        if let Some(reference) = self.cache.get(id) {
            return Ok(Some(reference));
        }
        let Some(blob) = self.get_blob(id).await? else {
            return Ok(None);
        };
        let reference = self.cache.get_or_insert(id, blob);
        tracing::trace!(%id, url = %reference.url, "Created frame reference");
        Ok(Some(reference))
    }

    /// Pixel size read from the image header, without decoding pixels.
    ///
    /// Only the first [`HEADER_PROBE_BYTES`] are read unless the header
    /// runs past them. `None` when the frame is missing or its header is
    /// unreadable.
    pub async fn frame_dimensions(&self, id: FrameId) -> FlipbookResult<Option<(u32, u32)>> {
        let Some(header) = self.persistence.fetch_header(id, HEADER_PROBE_BYTES).await? else {
            return Ok(None);
        };
        if let Some(dims) = probe_dimensions(&header) {
            return Ok(Some(dims));
        }
        if header.len() < HEADER_PROBE_BYTES {
            return Ok(None);
        }

        tracing::debug!(%id, "Frame header exceeds probe window, reading whole frame");
        let Some(blob) = self.get_blob(id).await? else {
            return Ok(None);
        };
        Ok(probe_dimensions(&blob.bytes))
    }
}

/// Width and height from an encoded image header.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
