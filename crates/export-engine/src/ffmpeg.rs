//! Ffmpeg-backed encoder.
//!
//! `frames` exports are written straight to the chosen folder. `video` and
//! `send` stage the prepared frames into a temp dir and run ffmpeg over
//! them, streaming `-progress pipe:1` output back as progress events. The
//! staging dir is a [`tempfile::TempDir`], so it is removed when the encode
//! finishes, fails or is dropped on cancel.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use flipbook_common::error::{FlipbookError, FlipbookResult};
use flipbook_project_model::{Capability, CapabilitySet, ExportMode, Resolution, VideoFormat};
use serde::Serialize;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::encoder::{
    report_progress, EncodeRequest, EncodeResponse, Encoder, PreparedFrame, ProgressSender,
    SEND_FORMAT,
};

/// Encoder that shells out to an ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    outbox_dir: PathBuf,
    staging_root: Option<PathBuf>,
    event_key: Option<String>,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>, outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            outbox_dir: outbox_dir.into(),
            staging_root: None,
            event_key: None,
        }
    }

    /// Enables `send`, which needs an event to upload into.
    pub fn with_event_key(mut self, event_key: Option<String>) -> Self {
        self.event_key = event_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Stage video frames under `root` instead of the system temp dir.
    pub fn with_staging_root(mut self, root: Option<PathBuf>) -> Self {
        self.staging_root = root;
        self
    }

    fn staging_dir(&self) -> FlipbookResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("flipbook-");
        let dir = match &self.staging_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn write_frames(
        &self,
        request: &EncodeRequest,
        progress: &ProgressSender,
    ) -> FlipbookResult<EncodeResponse> {
        let folder = request
            .output_path
            .clone()
            .ok_or_else(|| FlipbookError::encoder("Frames export needs an output folder"))?;
        tokio::fs::create_dir_all(&folder).await?;

        let total = request.frames.len();
        for (index, frame) in request.frames.iter().enumerate() {
            let path = folder.join(frame_file_name(index, &frame.extension));
            tokio::fs::write(&path, frame.bytes.as_slice())
                .await
                .map_err(|e| {
                    FlipbookError::encoder(format!("Failed to write {}: {e}", path.display()))
                })?;
            report_progress(progress, (index + 1) as f64 / total as f64);
        }
        report_progress(progress, 1.0);

        tracing::info!(folder = %folder.display(), frames = total, "Frames written");
        Ok(EncodeResponse {
            output_path: Some(folder),
            files_written: total,
        })
    }

    async fn render_video(
        &self,
        request: &EncodeRequest,
        format: VideoFormat,
        output: &Path,
        progress: &ProgressSender,
    ) -> FlipbookResult<()> {
        let extension = staging_extension(&request.frames)?;
        let staging = self.staging_dir()?;
        tracing::debug!(
            staging = %staging.path().display(),
            frames = request.frames.len(),
            "Staging frames"
        );
        for (index, frame) in request.frames.iter().enumerate() {
            tokio::fs::write(
                staging.path().join(frame_file_name(index, extension)),
                frame.bytes.as_slice(),
            )
            .await?;
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let plan = VideoPlan {
            input_pattern: staging.path().join(format!("frame-%06d.{extension}")),
            output: output.to_path_buf(),
            format,
            input_framerate: request.framerate.max(1),
            output_framerate: request
                .custom_output_framerate
                .then_some(request.custom_output_framerate_number),
            resolution: request.resolution,
        };
        let expected_frames = plan.expected_output_frames(request.frames.len());
        let result = self.run_ffmpeg(&plan.args(), expected_frames, progress).await;

        let path = staging.path().to_path_buf();
        match tokio::task::spawn_blocking(move || staging.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(path = %path.display(), error = %err, "Failed to remove staging dir");
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Staging cleanup task failed");
            }
        }
        result
    }

    async fn run_ffmpeg(
        &self,
        args: &[String],
        expected_frames: u64,
        progress: &ProgressSender,
    ) -> FlipbookResult<()> {
        tracing::debug!(binary = %self.binary, ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FlipbookError::encoder(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), expected_frames, "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlipbookError::encoder("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FlipbookError::encoder("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once its stderr pipe fills.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| FlipbookError::encoder(format!("Failed reading ffmpeg progress: {e}")))?
        {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            if state.update(key, value) {
                report_progress(progress, state.fraction(expected_frames));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FlipbookError::encoder(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(FlipbookError::encoder(format!(
                "ffmpeg failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }
        report_progress(progress, 1.0);
        Ok(())
    }

    async fn encoder_listing(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSender,
    ) -> FlipbookResult<EncodeResponse> {
        if request.frames.is_empty() {
            return Err(FlipbookError::encoder("No frames to encode"));
        }

        match request.mode {
            ExportMode::Frames => self.write_frames(&request, &progress).await,
            ExportMode::Video => {
                let output = request
                    .output_path
                    .clone()
                    .ok_or_else(|| FlipbookError::encoder("Video export needs an output file"))?;
                self.render_video(&request, request.format, &output, &progress)
                    .await?;
                tracing::info!(output = %output.display(), format = request.format.as_str(), "Video written");
                Ok(EncodeResponse {
                    output_path: Some(output),
                    files_written: 1,
                })
            }
            ExportMode::Send => {
                let code = request
                    .public_code
                    .clone()
                    .ok_or_else(|| FlipbookError::encoder("Send export needs a public code"))?;
                tokio::fs::create_dir_all(&self.outbox_dir).await?;
                let video_file = format!("{code}.{}", SEND_FORMAT.extension());
                let video = self.outbox_dir.join(&video_file);
                self.render_video(&request, SEND_FORMAT, &video, &progress)
                    .await?;

                let manifest = SendManifest {
                    project_id: &request.project_id,
                    track_id: &request.track_id,
                    event_key: request.event_key.as_deref().or(self.event_key.as_deref()),
                    public_code: &code,
                    framerate: request.output_framerate(),
                    video_file,
                    created_at: Utc::now().to_rfc3339(),
                };
                let manifest_path = self.outbox_dir.join(format!("{code}.json"));
                tokio::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?).await?;

                tracing::info!(code = %code, outbox = %self.outbox_dir.display(), "Queued upload");
                Ok(EncodeResponse {
                    output_path: Some(video),
                    files_written: 2,
                })
            }
            ExportMode::None => Err(FlipbookError::encoder("No export mode selected")),
        }
    }

    async fn capabilities(&self) -> CapabilitySet {
        let listing = self.encoder_listing().await;
        if listing.is_none() {
            tracing::warn!(binary = %self.binary, "ffmpeg not available; video export disabled");
        }
        capabilities_from_listing(listing.as_deref(), self.event_key.is_some())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Upload manifest written next to a queued `send` video.
#[derive(Debug, Serialize)]
struct SendManifest<'a> {
    project_id: &'a str,
    track_id: &'a str,
    event_key: Option<&'a str>,
    public_code: &'a str,
    framerate: u32,
    video_file: String,
    created_at: String,
}

/// Name of the ffmpeg encoder used for `format`.
pub fn encoder_name(format: VideoFormat) -> &'static str {
    match format {
        VideoFormat::H264 => "libx264",
        VideoFormat::Hevc => "libx265",
        VideoFormat::Prores => "prores_ks",
        VideoFormat::Vp8 => "libvpx",
        VideoFormat::Vp9 => "libvpx-vp9",
    }
}

fn codec_args(format: VideoFormat) -> Vec<String> {
    let args: &[&str] = match format {
        VideoFormat::H264 => &[
            "-preset",
            "medium",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ],
        VideoFormat::Hevc => &[
            "-preset",
            "medium",
            "-pix_fmt",
            "yuv420p",
            "-tag:v",
            "hvc1",
            "-movflags",
            "+faststart",
        ],
        VideoFormat::Prores => &["-profile:v", "3", "-pix_fmt", "yuv422p10le"],
        VideoFormat::Vp8 => &["-crf", "10", "-b:v", "4M", "-pix_fmt", "yuv420p"],
        VideoFormat::Vp9 => &["-crf", "32", "-b:v", "0", "-pix_fmt", "yuv420p"],
    };
    let mut out = vec!["-c:v".to_string(), encoder_name(format).to_string()];
    out.extend(args.iter().map(|s| s.to_string()));
    out
}

/// Capability set for an `ffmpeg -encoders` listing (`None` = no ffmpeg).
pub fn capabilities_from_listing(listing: Option<&str>, has_event_key: bool) -> CapabilitySet {
    let mut caps = CapabilitySet::default();
    caps.insert(Capability::ExportFrames);

    let Some(listing) = listing else {
        return caps;
    };
    let available: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    for format in VideoFormat::ALL {
        if available.contains(&encoder_name(format)) {
            caps.insert(format.capability());
        }
    }
    if VideoFormat::ALL
        .iter()
        .any(|f| caps.contains(f.capability()))
    {
        caps.insert(Capability::ExportVideo);
    }
    if has_event_key && caps.contains(SEND_FORMAT.capability()) {
        caps.insert(Capability::BackgroundSync);
    }
    caps
}

fn frame_file_name(index: usize, extension: &str) -> String {
    format!("frame-{:06}.{extension}", index + 1)
}

fn staging_extension(frames: &[PreparedFrame]) -> FlipbookResult<&str> {
    let first = frames
        .first()
        .map(|f| f.extension.as_str())
        .ok_or_else(|| FlipbookError::encoder("No frames to encode"))?;
    if frames.iter().any(|f| f.extension != first) {
        return Err(FlipbookError::encoder(
            "Video frames must share one format; export with a forced extension",
        ));
    }
    Ok(first)
}

struct VideoPlan {
    input_pattern: PathBuf,
    output: PathBuf,
    format: VideoFormat,
    input_framerate: u32,
    output_framerate: Option<u32>,
    resolution: Option<Resolution>,
}

impl VideoPlan {
    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-framerate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.input_framerate.to_string());
        args.push("-i".to_string());
        args.push(self.input_pattern.to_string_lossy().into_owned());

        args.push("-vf".to_string());
        args.push(match self.resolution {
            Some(r) => format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
                w = r.width,
                h = r.height
            ),
            // yuv420p needs even dimensions.
            None => "pad=ceil(iw/2)*2:ceil(ih/2)*2:color=black".to_string(),
        });

        if let Some(rate) = self.output_framerate.filter(|r| *r > 0) {
            args.push("-r".to_string());
            args.push(rate.to_string());
        }
        args.extend(codec_args(self.format));
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    fn expected_output_frames(&self, input_frames: usize) -> u64 {
        let input = input_frames as u64;
        match self.output_framerate.filter(|r| *r > 0) {
            Some(out) => (input * u64::from(out)).div_ceil(u64::from(self.input_framerate)),
            None => input,
        }
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    frame: u64,
    complete: bool,
}

impl ProgressState {
    /// Returns true at the end of each progress block.
    fn update(&mut self, key: &str, value: &str) -> bool {
        match key {
            "frame" => {
                if let Ok(frame) = value.trim().parse::<u64>() {
                    self.frame = frame;
                }
                false
            }
            "progress" => {
                self.complete = value.trim() == "end";
                true
            }
            _ => false,
        }
    }

    fn fraction(&self, expected_frames: u64) -> f64 {
        if self.complete {
            1.0
        } else if expected_frames == 0 {
            0.0
        } else {
            (self.frame as f64 / expected_frames as f64).clamp(0.0, 1.0)
        }
    }
}
