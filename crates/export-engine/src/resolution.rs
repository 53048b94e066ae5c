//! Output resolution inference.
//!
//! The resolved size never exceeds any contributing frame's native
//! width or height, so nothing gets upscaled.

use flipbook_blob_store::{BlobStore, FrameId};
use flipbook_project_model::{
    resolution_choices, AspectRatio, ExportMode, Resolution, ResolutionChoice,
};

/// Largest usable size for frames of the given native sizes.
///
/// With an aspect ratio the height is the largest one whose derived
/// width fits every frame; without one the smallest native width and
/// height are used. Empty input (or a zero-sized result) yields `None`.
pub fn resolve_dimensions(
    dimensions: &[(u32, u32)],
    aspect_ratio: Option<AspectRatio>,
) -> Option<Resolution> {
    let min_width = dimensions.iter().map(|(w, _)| *w).min()?;
    let min_height = dimensions.iter().map(|(_, h)| *h).min()?;

    let resolution = match aspect_ratio {
        Some(ratio) => {
            let height = min_height.min(ratio.max_height_for_width(min_width));
            ratio.resolution_for_height(height)
        }
        None => Resolution::new(min_width, min_height),
    };

    (resolution.width > 0 && resolution.height > 0).then_some(resolution)
}

/// Reads frame sizes through the blob store and resolves over them.
#[derive(Debug, Clone)]
pub struct ResolutionResolver {
    store: BlobStore,
}

impl ResolutionResolver {
    pub fn new(store: BlobStore) -> Self {
        Self { store }
    }

    /// Best resolution over `frames`.
    ///
    /// Frames whose size can't be read are skipped; when none can be read
    /// the result is `None` and callers keep native sizes.
    pub async fn resolve(
        &self,
        frames: &[FrameId],
        aspect_ratio: Option<AspectRatio>,
    ) -> Option<Resolution> {
        let mut unique: Vec<FrameId> = frames.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut dimensions = Vec::with_capacity(unique.len());
        for id in unique {
            match self.store.frame_dimensions(id).await {
                Ok(Some(dims)) => dimensions.push(dims),
                Ok(None) => tracing::warn!(%id, "Frame dimensions unavailable, skipping"),
                Err(err) => {
                    tracing::warn!(%id, error = %err, "Failed to read frame for dimensions")
                }
            }
        }

        let resolved = resolve_dimensions(&dimensions, aspect_ratio);
        tracing::debug!(
            frames = frames.len(),
            measured = dimensions.len(),
            resolved = ?resolved,
            "Resolved best resolution"
        );
        resolved
    }

    /// Resolution choices for `frames`.
    ///
    /// The list is capped by the native best size, not the 16:9 one, so 4:3
    /// sources still offer their full height.
    pub async fn choices(&self, frames: &[FrameId]) -> Vec<ResolutionChoice> {
        resolution_choices(self.resolve(frames, None).await)
    }
}

/// Final export resolution for a request.
///
/// A numeric height always applies with the export ratio. "Original"
/// asks the resolver for every mode except `frames`, which keeps native
/// sizes. `best` is only awaited when it is actually needed.
pub async fn export_resolution<F>(
    choice: ResolutionChoice,
    mode: ExportMode,
    aspect_ratio: AspectRatio,
    best: F,
) -> Option<Resolution>
where
    F: std::future::Future<Output = Option<Resolution>>,
{
    match choice {
        ResolutionChoice::Height(height) => Some(aspect_ratio.resolution_for_height(height)),
        ResolutionChoice::Original if mode == ExportMode::Frames => None,
        ResolutionChoice::Original => best
            .await
            .map(|found| aspect_ratio.resolution_for_height(found.height)),
    }
}
