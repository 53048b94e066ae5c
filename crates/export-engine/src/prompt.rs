//! Output-path selection collaborator.

use std::path::PathBuf;

use flipbook_project_model::{ExportMode, VideoFormat};

/// What the user is asked to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Folder,
}

/// Display strings for the dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptLabels {
    pub export_frames: String,
    pub export_video: String,
    pub default_file_name: String,
    pub extension_name: String,
}

impl Default for PromptLabels {
    fn default() -> Self {
        Self {
            export_frames: "Export animation frames".to_string(),
            export_video: "Export as video".to_string(),
            default_file_name: "video".to_string(),
            extension_name: "Video file".to_string(),
        }
    }
}

/// Output-path request sent before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub kind: PathKind,
    pub format: VideoFormat,
    pub labels: PromptLabels,
}

impl PathRequest {
    /// Request for `mode`, or `None` when the mode needs no path (`send`).
    pub fn for_mode(mode: ExportMode, format: VideoFormat, labels: PromptLabels) -> Option<Self> {
        let kind = match mode {
            ExportMode::Video => PathKind::File,
            ExportMode::Frames => PathKind::Folder,
            ExportMode::Send | ExportMode::None => return None,
        };
        Some(Self {
            kind,
            format,
            labels,
        })
    }

    /// Suggested file name, e.g. `video.mp4`.
    pub fn default_file_name(&self) -> String {
        format!(
            "{}.{}",
            self.labels.default_file_name,
            self.format.extension()
        )
    }
}

/// Asks the user for an output location.
#[async_trait::async_trait]
pub trait PathPrompt: Send + Sync {
    /// Selected path, or `None` if the user cancelled.
    async fn select_path(&self, request: PathRequest) -> Option<PathBuf>;
}

/// Prompt that answers with a path decided up front (CLI flags, tests).
///
/// `None` behaves like a user cancelling the dialog.
#[derive(Debug, Clone, Default)]
pub struct FixedPathPrompt {
    path: Option<PathBuf>,
}

impl FixedPathPrompt {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

#[async_trait::async_trait]
impl PathPrompt for FixedPathPrompt {
    async fn select_path(&self, request: PathRequest) -> Option<PathBuf> {
        let path = self.path.clone()?;
        // A folder given for a file request gets the suggested file name.
        if request.kind == PathKind::File && path.is_dir() {
            return Some(path.join(request.default_file_name()));
        }
        Some(path)
    }
}
