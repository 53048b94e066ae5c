//! Duplicate-frame expansion.
//!
//! Turns a scene's pictures into the ordered list of output slots the
//! encoder receives. The result is never shorter than the input.

use flipbook_blob_store::FrameId;
use flipbook_project_model::{ExportConfig, ExportMode, Picture};

/// Extension every frame is normalized to for `video` and `send`.
pub const UNIVERSAL_EXTENSION: &str = "jpg";

/// One output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedFrame {
    pub frame_id: FrameId,
    /// Forced output format; `None` keeps the stored format.
    pub target_extension: Option<String>,
}

/// Effective duplicate/format policy for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionPolicy {
    /// Honor per-picture repeat counts.
    pub copy_repeats: bool,
    /// Copies of the first and last frame added at each end.
    pub auto_padding: Option<u32>,
    pub force_extension: Option<String>,
}

impl ExpansionPolicy {
    /// Policy for `config` once the mode is negotiated.
    ///
    /// `send` always pads both ends with one second of frames
    /// (`framerate` copies) and always uses the universal format, whatever
    /// the form says.
    pub fn for_export(config: &ExportConfig, mode: ExportMode) -> Self {
        let auto_padding = match mode {
            ExportMode::Send => Some(config.framerate),
            _ if config.duplicate_frames_auto => Some(config.duplicate_frames_auto_number),
            _ => None,
        };
        let force_extension = match mode {
            ExportMode::Frames => config.frames_format.forced_extension().map(str::to_string),
            _ => Some(UNIVERSAL_EXTENSION.to_string()),
        };
        Self {
            copy_repeats: config.duplicate_frames_copy,
            auto_padding,
            force_extension,
        }
    }
}

/// Apply `policy` to `pictures`.
///
/// Boundary padding is applied first, then repeat counts, so padded
/// copies of a repeated picture are repeated as well.
pub fn expand_frames(pictures: &[Picture], policy: &ExpansionPolicy) -> Vec<ExpandedFrame> {
    let (Some(first), Some(last)) = (pictures.first(), pictures.last()) else {
        return vec![];
    };

    let padding = policy.auto_padding.unwrap_or(0) as usize;
    let mut padded: Vec<&Picture> = Vec::with_capacity(pictures.len() + padding * 2);
    padded.extend(std::iter::repeat(first).take(padding));
    padded.extend(pictures.iter());
    padded.extend(std::iter::repeat(last).take(padding));

    let slots: usize = if policy.copy_repeats {
        padded.iter().map(|p| p.repeat_count() as usize).sum()
    } else {
        padded.len()
    };

    let mut expanded = Vec::with_capacity(slots);
    for picture in padded {
        let count = if policy.copy_repeats {
            picture.repeat_count()
        } else {
            1
        };
        for _ in 0..count {
            expanded.push(ExpandedFrame {
                frame_id: picture.id,
                target_extension: policy.force_extension.clone(),
            });
        }
    }

    tracing::debug!(
        source = pictures.len(),
        expanded = expanded.len(),
        padding,
        copy_repeats = policy.copy_repeats,
        "Expanded frame list"
    );
    expanded
}
