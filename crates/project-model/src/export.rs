//! Export configuration types.
//!
//! `ExportConfig` is built fresh for every export invocation and fully
//! determines what the pipeline produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::scene::ProjectError;

/// Upper bound for both the animation and the output framerate.
pub const MAX_FRAMERATE: u32 = 240;

/// Smallest allowed count for automatic first/last frame duplication.
pub const MIN_AUTO_DUPLICATES: u32 = 2;

/// Deliverable shape of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Encoded video file.
    Video,
    /// Folder of numbered frame images.
    Frames,
    /// Payload handed to the background upload channel.
    Send,
    /// No capability allows an export.
    #[default]
    None,
}

impl ExportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportMode::Video => "video",
            ExportMode::Frames => "frames",
            ExportMode::Send => "send",
            ExportMode::None => "none",
        }
    }

    /// Capability that must be present for this mode to be selectable.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            ExportMode::Video => Some(Capability::ExportVideo),
            ExportMode::Frames => Some(Capability::ExportFrames),
            ExportMode::Send => Some(Capability::BackgroundSync),
            ExportMode::None => None,
        }
    }

    /// Whether an external encoding step follows frame preparation.
    pub fn has_encode_phase(self) -> bool {
        !matches!(self, ExportMode::Frames)
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportMode {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ExportMode::Video,
            ExportMode::Frames,
            ExportMode::Send,
            ExportMode::None,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ProjectError::ValidationError {
            message: format!("unknown export mode '{s}' (use video, frames, send)"),
        })
    }
}

/// Output video codec/container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    H264,
    Hevc,
    Prores,
    Vp8,
    Vp9,
}

impl VideoFormat {
    /// Preference order used when listing and falling back.
    pub const ALL: [VideoFormat; 5] = [
        VideoFormat::H264,
        VideoFormat::Hevc,
        VideoFormat::Prores,
        VideoFormat::Vp8,
        VideoFormat::Vp9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VideoFormat::H264 => "h264",
            VideoFormat::Hevc => "hevc",
            VideoFormat::Prores => "prores",
            VideoFormat::Vp8 => "vp8",
            VideoFormat::Vp9 => "vp9",
        }
    }

    /// Container extension of the produced file.
    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::H264 | VideoFormat::Hevc => "mp4",
            VideoFormat::Prores => "mov",
            VideoFormat::Vp8 | VideoFormat::Vp9 => "webm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VideoFormat::H264 => "H264 (Recommended)",
            VideoFormat::Hevc => "HEVC (.mp4)",
            VideoFormat::Prores => "ProRes (.mov)",
            VideoFormat::Vp8 => "VP8 (.webm)",
            VideoFormat::Vp9 => "VP9 (.webm)",
        }
    }

    pub fn capability(self) -> Capability {
        match self {
            VideoFormat::H264 => Capability::ExportVideoH264,
            VideoFormat::Hevc => Capability::ExportVideoHevc,
            VideoFormat::Prores => Capability::ExportVideoProres,
            VideoFormat::Vp8 => Capability::ExportVideoVp8,
            VideoFormat::Vp9 => Capability::ExportVideoVp9,
        }
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProjectError::ValidationError {
                message: format!("unknown video format '{s}' (use h264, hevc, prores, vp8, vp9)"),
            })
    }
}

/// Image format of exported frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramesFormat {
    /// Keep each frame's stored format.
    #[default]
    Original,
    Jpg,
    Png,
    Webp,
}

impl FramesFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FramesFormat::Original => "original",
            FramesFormat::Jpg => "jpg",
            FramesFormat::Png => "png",
            FramesFormat::Webp => "webp",
        }
    }

    /// Extension every frame is normalized to, or `None` to keep natives.
    pub fn forced_extension(self) -> Option<&'static str> {
        match self {
            FramesFormat::Original => None,
            other => Some(other.as_str()),
        }
    }
}

impl std::str::FromStr for FramesFormat {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(FramesFormat::Original),
            "jpg" | "jpeg" => Ok(FramesFormat::Jpg),
            "png" => Ok(FramesFormat::Png),
            "webp" => Ok(FramesFormat::Webp),
            _ => Err(ProjectError::ValidationError {
                message: format!("unknown frames format '{s}' (use original, jpg, png, webp)"),
            }),
        }
    }
}

/// Concrete output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Width:height ratio kept as integers so derived sizes are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// The fixed export ratio.
    pub const WIDESCREEN: AspectRatio = AspectRatio {
        width: 16,
        height: 9,
    };

    /// Width for a given height, rounded down.
    ///
    /// Saturates at `u32::MAX` rather than wrapping.
    pub fn width_for_height(self, height: u32) -> u32 {
        scale(height, self.width, self.height)
    }

    /// Largest height whose derived width fits in `width`.
    pub fn max_height_for_width(self, width: u32) -> u32 {
        scale(width, self.height, self.width)
    }

    /// Resolution with the given height and the derived width.
    pub fn resolution_for_height(self, height: u32) -> Resolution {
        Resolution::new(self.width_for_height(height), height)
    }
}

/// `value * num / den` in 64-bit, rounded down.
fn scale(value: u32, num: u32, den: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(num) / u64::from(den.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Requested output resolution.
///
/// Serialized as the string `"original"` or a numeric height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ResolutionValue", into = "ResolutionValue")]
pub enum ResolutionChoice {
    /// Derive from the source frames.
    #[default]
    Original,
    /// Fixed output height; width follows the export aspect ratio.
    Height(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ResolutionValue {
    Height(u32),
    Named(String),
}

impl TryFrom<ResolutionValue> for ResolutionChoice {
    type Error = String;

    fn try_from(value: ResolutionValue) -> Result<Self, Self::Error> {
        match value {
            ResolutionValue::Height(h) => Ok(ResolutionChoice::Height(h)),
            ResolutionValue::Named(name) => name.parse(),
        }
    }
}

impl From<ResolutionChoice> for ResolutionValue {
    fn from(choice: ResolutionChoice) -> Self {
        match choice {
            ResolutionChoice::Original => ResolutionValue::Named("original".to_string()),
            ResolutionChoice::Height(h) => ResolutionValue::Height(h),
        }
    }
}

impl std::str::FromStr for ResolutionChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("original") {
            return Ok(ResolutionChoice::Original);
        }
        s.trim_end_matches('p')
            .parse::<u32>()
            .map(ResolutionChoice::Height)
            .map_err(|_| format!("invalid resolution '{s}' (use 'original' or a height)"))
    }
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionChoice::Original => f.write_str("original"),
            ResolutionChoice::Height(h) => write!(f, "{h}p"),
        }
    }
}

/// Largest numeric height an export may request (8K).
pub const MAX_EXPORT_HEIGHT: u32 = 4320;

/// Standard heights offered besides "original".
pub const STANDARD_HEIGHTS: [u32; 7] = [2160, 1440, 1080, 720, 480, 360, 240];

/// Resolution choices for a scene whose best usable size is `best`.
///
/// Heights above the best height are left out since they would upscale.
pub fn resolution_choices(best: Option<Resolution>) -> Vec<ResolutionChoice> {
    let mut choices = vec![ResolutionChoice::Original];
    let heights = best.map(|b| b.height).into_iter().chain(STANDARD_HEIGHTS);
    for height in heights {
        if best.is_some_and(|b| height > b.height) {
            continue;
        }
        let choice = ResolutionChoice::Height(height);
        if !choices.contains(&choice) {
            choices.push(choice);
        }
    }
    choices
}

/// One export request's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Preferred deliverable; re-negotiated against capabilities.
    pub mode: ExportMode,

    /// Video codec for `video` and `send`.
    pub format: VideoFormat,

    /// Requested output resolution.
    pub resolution: ResolutionChoice,

    /// Image format for `frames`.
    pub frames_format: FramesFormat,

    /// Honor per-picture repeat counts.
    pub duplicate_frames_copy: bool,

    /// Pad the sequence with copies of the first and last frames.
    pub duplicate_frames_auto: bool,

    /// Copies added at each end when `duplicate_frames_auto` is set.
    pub duplicate_frames_auto_number: u32,

    /// Animation framerate.
    pub framerate: u32,

    /// Override the encoded video framerate.
    pub custom_output_framerate: bool,

    /// Encoded video framerate when overridden.
    pub custom_output_framerate_number: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            mode: ExportMode::None,
            format: VideoFormat::H264,
            resolution: ResolutionChoice::Original,
            frames_format: FramesFormat::Original,
            duplicate_frames_copy: true,
            duplicate_frames_auto: false,
            duplicate_frames_auto_number: MIN_AUTO_DUPLICATES,
            framerate: 12,
            custom_output_framerate: false,
            custom_output_framerate_number: 60,
        }
    }
}

impl ExportConfig {
    /// Check numeric ranges before an export starts.
    pub fn validate(&self) -> Result<(), ProjectError> {
        let invalid = |message: String| Err(ProjectError::ValidationError { message });

        if !(1..=MAX_FRAMERATE).contains(&self.framerate) {
            return invalid(format!(
                "framerate must be between 1 and {MAX_FRAMERATE}, got {}",
                self.framerate
            ));
        }
        if self.duplicate_frames_auto_number < MIN_AUTO_DUPLICATES {
            return invalid(format!(
                "duplicateFramesAutoNumber must be at least {MIN_AUTO_DUPLICATES}, got {}",
                self.duplicate_frames_auto_number
            ));
        }
        if !(1..=MAX_FRAMERATE).contains(&self.custom_output_framerate_number) {
            return invalid(format!(
                "customOutputFramerateNumber must be between 1 and {MAX_FRAMERATE}, got {}",
                self.custom_output_framerate_number
            ));
        }
        if let ResolutionChoice::Height(height) = self.resolution {
            if !(1..=MAX_EXPORT_HEIGHT).contains(&height) {
                return invalid(format!(
                    "requested resolution height must be between 1 and {MAX_EXPORT_HEIGHT}, got {height}"
                ));
            }
        }
        Ok(())
    }
}
