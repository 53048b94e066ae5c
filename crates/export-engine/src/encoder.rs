//! Encoder collaborator contract.
//!
//! The encoder is request/response: a successful return completes the
//! export. Progress travels out-of-band on the channel it is handed.

use std::path::PathBuf;
use std::sync::Arc;

use flipbook_blob_store::FrameId;
use flipbook_common::error::FlipbookResult;
use flipbook_project_model::{CapabilitySet, ExportMode, FramesFormat, Resolution, VideoFormat};
use serde::Serialize;
use tokio::sync::mpsc;

/// Video format of every `send` upload, whatever the user picked.
pub const SEND_FORMAT: VideoFormat = VideoFormat::H264;

/// A frame ready for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFrame {
    pub frame_id: FrameId,
    /// Format of `bytes`.
    pub extension: String,
    /// Shared between all slots that repeat the same frame.
    pub bytes: Arc<Vec<u8>>,
}

/// Everything the encoder needs for one dispatch.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub frames: Vec<PreparedFrame>,
    /// Selected file/folder; `None` for `send`.
    pub output_path: Option<PathBuf>,
    pub mode: ExportMode,
    pub format: VideoFormat,
    pub framerate: u32,
    pub frames_format: FramesFormat,
    pub custom_output_framerate: bool,
    pub custom_output_framerate_number: u32,
    pub resolution: Option<Resolution>,
    pub project_id: String,
    pub track_id: String,
    pub event_key: Option<String>,
    pub public_code: Option<String>,
}

impl EncodeRequest {
    /// Framerate of the produced video.
    pub fn output_framerate(&self) -> u32 {
        if self.custom_output_framerate {
            self.custom_output_framerate_number
        } else {
            self.framerate
        }
    }
}

/// One out-of-band progress event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeProgress {
    /// Fraction in `[0, 1]`.
    pub progress: f64,
}

/// What the encoder produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodeResponse {
    /// Written file or folder, if any.
    pub output_path: Option<PathBuf>,
    /// Files written (frames, video, manifest).
    pub files_written: usize,
}

/// Sending half handed to encoders for progress events.
pub type ProgressSender = mpsc::Sender<EncodeProgress>;

/// Trait for encoder backends (ffmpeg, test doubles, ...).
#[async_trait::async_trait]
pub trait Encoder: Send + Sync {
    /// Run one encode. Progress goes to `progress`; dropping it ends the stream.
    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSender,
    ) -> FlipbookResult<EncodeResponse>;

    /// Capability tags this backend can satisfy right now.
    async fn capabilities(&self) -> CapabilitySet;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Send a progress event without waiting when the channel is full.
///
/// A slow consumer only loses intermediate values; the orchestrator
/// treats the encoder stream as last-value-wins anyway.
pub fn report_progress(progress: &ProgressSender, value: f64) {
    let _ = progress.try_send(EncodeProgress {
        progress: value.clamp(0.0, 1.0),
    });
}
