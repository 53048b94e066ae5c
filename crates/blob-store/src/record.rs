//! Stored frame records and typed blobs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Store-assigned frame identifier. Monotonic within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FrameId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Raw frame as persisted. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub id: FrameId,
    pub bytes: Arc<Vec<u8>>,
    /// Format tag such as `jpg`, `png` or `webp`.
    pub extension: Option<String>,
}

/// Frame bytes typed with a MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Arc<Vec<u8>>,
    pub mime: String,
}

impl Blob {
    pub fn from_record(record: &FrameRecord) -> Self {
        Self {
            bytes: Arc::clone(&record.bytes),
            mime: mime_for_extension(record.extension.as_deref()),
        }
    }

    /// MIME subtype, e.g. `jpeg` for `image/jpeg`.
    pub fn subtype(&self) -> &str {
        self.mime.split_once('/').map_or("", |(_, sub)| sub)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `image/<subtype>` for a format tag.
///
/// `jpg` maps to `jpeg`, other tags pass through, and a missing or empty
/// tag defaults to `jpeg`.
pub fn mime_for_extension(extension: Option<&str>) -> String {
    let subtype = match extension.map(str::trim) {
        None | Some("") | Some("jpg") => "jpeg",
        Some(ext) => ext,
    };
    format!("image/{subtype}")
}

/// Lowercased tag without a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_normalizes_jpg() {
        assert_eq!(mime_for_extension(Some("jpg")), "image/jpeg");
        assert_eq!(mime_for_extension(Some("jpeg")), "image/jpeg");
        assert_eq!(mime_for_extension(Some("png")), "image/png");
        assert_eq!(mime_for_extension(Some("webp")), "image/webp");
    }

    #[test]
    fn test_mime_defaults_to_jpeg() {
        assert_eq!(mime_for_extension(None), "image/jpeg");
        assert_eq!(mime_for_extension(Some("")), "image/jpeg");
    }

    #[test]
    fn test_blob_subtype() {
        let record = FrameRecord {
            id: FrameId(1),
            bytes: Arc::new(vec![1, 2, 3]),
            extension: Some("jpg".to_string()),
        };
        let blob = Blob::from_record(&record);
        assert_eq!(blob.subtype(), "jpeg");
        assert_eq!(blob.len(), 3);
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".PNG"), "png");
        assert_eq!(normalize_extension(" jpg "), "jpg");
    }
}
