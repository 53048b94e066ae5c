//! Scene and picture types.
//!
//! A scene is the ordered list of pictures that make up one animation
//! track. The export pipeline reads it but never mutates it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use flipbook_blob_store::FrameId;

/// One picture slot in a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    /// Stored frame holding this picture's bytes.
    pub id: FrameId,

    /// How many output slots this picture occupies when repeats are
    /// honored. Values below 1 are treated as 1.
    #[serde(default = "default_length")]
    pub length: u32,
}

fn default_length() -> u32 {
    1
}

impl Picture {
    pub fn new(id: FrameId) -> Self {
        Self { id, length: 1 }
    }

    pub fn with_length(id: FrameId, length: u32) -> Self {
        Self { id, length }
    }

    /// Repeat count clamped to at least one slot.
    pub fn repeat_count(&self) -> u32 {
        self.length.max(1)
    }
}

/// An animation track (`scene.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Human-readable title.
    #[serde(default)]
    pub title: String,

    /// Animation framerate used while shooting.
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Ordered pictures.
    #[serde(default)]
    pub pictures: Vec<Picture>,
}

fn default_framerate() -> u32 {
    12
}

impl Scene {
    pub fn new(title: impl Into<String>, framerate: u32) -> Self {
        Self {
            title: title.into(),
            framerate,
            pictures: vec![],
        }
    }

    /// Frame ids in scene order.
    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.pictures.iter().map(|p| p.id).collect()
    }

    /// Load a scene from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError { path, source: e })
    }

    /// Save the scene as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| ProjectError::IoError { path, source: e })
    }
}

/// Errors that can occur when working with scenes and export settings.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid export settings: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picture_length_defaults_to_one() {
        let picture: Picture = serde_json::from_str(r#"{"id":7}"#).unwrap();
        assert_eq!(picture.id, FrameId(7));
        assert_eq!(picture.length, 1);
    }

    #[test]
    fn test_zero_length_counts_as_one_slot() {
        assert_eq!(Picture::with_length(FrameId(1), 0).repeat_count(), 1);
        assert_eq!(Picture::with_length(FrameId(1), 4).repeat_count(), 4);
    }

    #[test]
    fn test_scene_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("scene.json");

        let mut scene = Scene::new("Walk cycle", 15);
        scene.pictures.push(Picture::new(FrameId(1)));
        scene.pictures.push(Picture::with_length(FrameId(2), 3));
        scene.save(&path).unwrap();

        let loaded = Scene::load(&path).unwrap();
        assert_eq!(loaded.title, "Walk cycle");
        assert_eq!(loaded.framerate, 15);
        assert_eq!(loaded.frame_ids(), vec![FrameId(1), FrameId(2)]);
        assert_eq!(loaded.pictures[1].length, 3);
    }

    #[test]
    fn test_load_missing_scene_reports_path() {
        let err = Scene::load("/nonexistent/flipbook/scene.json").unwrap_err();
        assert!(matches!(err, ProjectError::IoError { .. }));
        assert!(err.to_string().contains("scene.json"));
    }
}
