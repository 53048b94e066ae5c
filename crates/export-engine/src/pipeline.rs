//! Export orchestrator.
//!
//! One [`ExportPipeline::run`] call drives a single invocation through
//! `Idle → ModeSelected → ResolutionResolved → FramesExpanded →
//! Dispatched → Completed | Failed`. Stages are never revisited.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flipbook_blob_store::{BlobStore, FrameId};
use flipbook_common::error::{FlipbookError, FlipbookResult};
use flipbook_project_model::{
    AspectRatio, CapabilitySet, ExportConfig, ExportMode, Resolution, Scene, VideoFormat,
};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use crate::convert::{extension_for_blob, FrameConverter, ImageFrameConverter};
use crate::encoder::{EncodeRequest, EncodeResponse, Encoder, PreparedFrame, SEND_FORMAT};
use crate::expand::{expand_frames, ExpandedFrame, ExpansionPolicy};
use crate::negotiate::{negotiate_format, negotiate_mode};
use crate::progress::{ExportStage, ProgressCallback, ProgressPhase, ProgressTracker};
use crate::prompt::{PathPrompt, PathRequest, PromptLabels};
use crate::public_code::generate_public_code;
use crate::resolution::{export_resolution, ResolutionResolver};

/// Aspect ratio every export is sized to.
pub const EXPORT_ASPECT_RATIO: AspectRatio = AspectRatio::WIDESCREEN;

/// Tunables for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Give up on the encoder after this long.
    pub encode_timeout: Option<Duration>,
    /// Buffer size of the encoder progress channel.
    pub progress_channel_capacity: usize,
    pub labels: PromptLabels,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            encode_timeout: None,
            progress_channel_capacity: 64,
            labels: PromptLabels::default(),
        }
    }
}

/// Input for one export invocation.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub project_id: String,
    pub track_id: String,
    pub scene: Scene,
    pub config: ExportConfig,
    /// Upload target for `send`.
    pub event_key: Option<String>,
}

/// Summary of a finished export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub mode: ExportMode,
    pub format: VideoFormat,
    pub resolution: Option<Resolution>,
    /// Slots in the expanded frame list.
    pub frame_count: usize,
    pub output_path: Option<PathBuf>,
    pub files_written: usize,
    pub public_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How an invocation ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed(ExportReport),
    /// Aborted by the user; `stage` is the last stage reached.
    Cancelled { stage: ExportStage },
    /// The capability set allows no mode at all.
    NoCapableMode,
}

impl ExportOutcome {
    pub fn report(&self) -> Option<&ExportReport> {
        match self {
            ExportOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Shared cancel flag for an in-flight export.
///
/// Before dispatch the invocation stops at the next frame boundary. After
/// dispatch the encode future is dropped, which kills an ffmpeg child.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Drives exports against one blob store and encoder.
pub struct ExportPipeline {
    store: BlobStore,
    encoder: Arc<dyn Encoder>,
    prompt: Arc<dyn PathPrompt>,
    converter: Arc<dyn FrameConverter>,
    options: PipelineOptions,
}

impl std::fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("store", &self.store)
            .field("encoder", &self.encoder.name())
            .field("options", &self.options)
            .finish()
    }
}

impl ExportPipeline {
    pub fn new(store: BlobStore, encoder: Arc<dyn Encoder>, prompt: Arc<dyn PathPrompt>) -> Self {
        Self {
            store,
            encoder,
            prompt,
            converter: Arc::new(ImageFrameConverter::new()),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn FrameConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Run one export invocation.
    ///
    /// Storage, conversion, and encoder failures come back as errors after
    /// the stage has moved to `Failed`. Negotiation and resolution never
    /// fail; they fall back.
    pub async fn run(
        &self,
        request: ExportRequest,
        capabilities: &CapabilitySet,
        on_progress: Option<ProgressCallback>,
        cancel: Option<CancelHandle>,
    ) -> FlipbookResult<ExportOutcome> {
        let started_at = Utc::now();
        let cancel = cancel.unwrap_or_default();
        let ExportRequest {
            project_id,
            track_id,
            scene,
            config,
            event_key,
        } = request;

        config
            .validate()
            .map_err(|e| FlipbookError::invalid_config(e.to_string()))?;

        let mut run = RunState {
            tracker: ProgressTracker::new(config.mode),
            on_progress,
        };

        // Idle -> ModeSelected
        let mode = negotiate_mode(config.mode, capabilities);
        if mode == ExportMode::None {
            tracing::warn!(
                capabilities = ?capabilities.tags(),
                "No export mode is supported by the current capabilities"
            );
            return Ok(ExportOutcome::NoCapableMode);
        }
        // Uploads always go out in one format; the picker only applies to video.
        let format = match mode {
            ExportMode::Send => SEND_FORMAT,
            _ => negotiate_format(config.format, capabilities),
        };
        run.tracker.set_mode(mode);
        run.advance(ExportStage::ModeSelected);
        tracing::info!(
            project_id = %project_id,
            mode = %mode,
            format = format.as_str(),
            pictures = scene.pictures.len(),
            "Export mode selected"
        );
        if cancel.is_cancelled() {
            return Ok(run.cancelled());
        }

        // ModeSelected -> ResolutionResolved
        let resolver = ResolutionResolver::new(self.store.clone());
        let frame_ids = scene.frame_ids();
        let resolution = export_resolution(
            config.resolution,
            mode,
            EXPORT_ASPECT_RATIO,
            resolver.resolve(&frame_ids, Some(EXPORT_ASPECT_RATIO)),
        )
        .await;
        run.advance(ExportStage::ResolutionResolved);
        tracing::info!(
            requested = %config.resolution,
            resolved = ?resolution,
            "Export resolution resolved"
        );

        let output_path = match PathRequest::for_mode(mode, format, self.options.labels.clone()) {
            Some(path_request) => {
                let selected = tokio::select! {
                    path = self.prompt.select_path(path_request) => path,
                    _ = cancel.cancelled() => None,
                };
                match selected {
                    Some(path) => Some(path),
                    None => {
                        tracing::info!("Output path selection cancelled");
                        return Ok(run.cancelled());
                    }
                }
            }
            None => None,
        };

        // ResolutionResolved -> FramesExpanded
        let policy = ExpansionPolicy::for_export(&config, mode);
        let expanded = expand_frames(&scene.pictures, &policy);
        run.tracker.set_total_frames(expanded.len() as u64);
        run.advance(ExportStage::FramesExpanded);

        let prepared = match self
            .prepare_frames(&expanded, resolution, &mut run, &cancel)
            .await
        {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return Ok(run.cancelled()),
            Err(err) => return Err(run.fail(err)),
        };

        let public_code = (mode == ExportMode::Send).then(generate_public_code);
        let encode_request = EncodeRequest {
            frames: prepared,
            output_path,
            mode,
            format,
            framerate: config.framerate,
            frames_format: config.frames_format,
            custom_output_framerate: config.custom_output_framerate,
            custom_output_framerate_number: config.custom_output_framerate_number,
            resolution,
            project_id,
            track_id,
            event_key,
            public_code: public_code.clone(),
        };

        // FramesExpanded -> Dispatched
        run.advance(ExportStage::Dispatched);
        let response = match self.dispatch(encode_request, &mut run, &cancel).await {
            Ok(Some(response)) => response,
            Ok(None) => return Ok(run.cancelled()),
            Err(err) => return Err(run.fail(err)),
        };

        // Dispatched -> Completed
        run.tracker.frame_prepared(expanded.len() as u64);
        run.tracker.update(ProgressPhase::Encoding, 1.0);
        run.advance(ExportStage::Completed);

        let report = ExportReport {
            mode,
            format,
            resolution,
            frame_count: expanded.len(),
            output_path: response.output_path,
            files_written: response.files_written,
            public_code,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            mode = %report.mode,
            frames = report.frame_count,
            output = ?report.output_path,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Export completed"
        );
        Ok(ExportOutcome::Completed(report))
    }

    /// Convert each expanded slot, reporting after every one.
    ///
    /// Each distinct frame is converted once; repeated slots share bytes.
    /// Returns `None` when cancelled between frames.
    async fn prepare_frames(
        &self,
        expanded: &[ExpandedFrame],
        resolution: Option<Resolution>,
        run: &mut RunState,
        cancel: &CancelHandle,
    ) -> FlipbookResult<Option<Vec<PreparedFrame>>> {
        let mut converted: HashMap<FrameId, PreparedFrame> = HashMap::new();
        let mut prepared = Vec::with_capacity(expanded.len());
        for (index, slot) in expanded.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(prepared = index, "Frame preparation cancelled");
                return Ok(None);
            }

            let frame = match converted.get(&slot.frame_id) {
                Some(frame) => frame.clone(),
                None => {
                    let frame = self.prepare_one(slot, resolution).await?;
                    converted.insert(slot.frame_id, frame.clone());
                    frame
                }
            };
            prepared.push(frame);
            run.tracker.frame_prepared(index as u64 + 1);
            run.emit();
        }

        tracing::debug!(
            slots = prepared.len(),
            distinct = converted.len(),
            "Frames prepared"
        );
        Ok(Some(prepared))
    }

    async fn prepare_one(
        &self,
        slot: &ExpandedFrame,
        resolution: Option<Resolution>,
    ) -> FlipbookResult<PreparedFrame> {
        let blob = self
            .store
            .get_blob(slot.frame_id)
            .await?
            .ok_or(FlipbookError::FrameMissing { id: slot.frame_id.0 })?;
        let extension = slot
            .target_extension
            .clone()
            .unwrap_or_else(|| extension_for_blob(&blob));
        let bytes = self.converter.convert(&blob, &extension, resolution).await?;
        Ok(PreparedFrame {
            frame_id: slot.frame_id,
            extension,
            bytes,
        })
    }

    /// Await the encoder while folding its progress events in.
    ///
    /// Returns `None` when cancelled; the encode future is dropped.
    async fn dispatch(
        &self,
        request: EncodeRequest,
        run: &mut RunState,
        cancel: &CancelHandle,
    ) -> FlipbookResult<Option<EncodeResponse>> {
        let (tx, mut rx) = mpsc::channel(self.options.progress_channel_capacity.max(1));
        tracing::info!(
            encoder = self.encoder.name(),
            frames = request.frames.len(),
            mode = %request.mode,
            "Dispatching to encoder"
        );

        let encode = self.encoder.encode(request, tx);
        tokio::pin!(encode);

        let timeout = self.options.encode_timeout;
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Export cancelled after dispatch; stopping encoder");
                    return Ok(None);
                }
                Some(event) = rx.recv() => {
                    run.tracker.update(ProgressPhase::Encoding, event.progress);
                    run.emit();
                }
                result = &mut encode => break result,
                _ = &mut deadline => {
                    let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
                    tracing::error!(secs, "Encoder timed out");
                    return Err(FlipbookError::EncoderTimedOut { secs });
                }
            }
        };

        // Events sent just before the encoder returned.
        while let Ok(event) = rx.try_recv() {
            run.tracker.update(ProgressPhase::Encoding, event.progress);
            run.emit();
        }
        result.map(Some)
    }
}

/// Per-invocation progress state plus the caller's callback.
struct RunState {
    tracker: ProgressTracker,
    on_progress: Option<ProgressCallback>,
}

impl RunState {
    fn emit(&self) {
        if let Some(cb) = &self.on_progress {
            cb(self.tracker.snapshot());
        }
    }

    fn advance(&mut self, stage: ExportStage) {
        tracing::debug!(
            from = self.tracker.stage().as_str(),
            to = stage.as_str(),
            "Export stage transition"
        );
        self.tracker.set_stage(stage);
        self.emit();
    }

    fn cancelled(&self) -> ExportOutcome {
        let stage = self.tracker.stage();
        tracing::info!(stage = stage.as_str(), "Export cancelled");
        ExportOutcome::Cancelled { stage }
    }

    fn fail(&mut self, err: FlipbookError) -> FlipbookError {
        tracing::error!(
            stage = self.tracker.stage().as_str(),
            error = %err,
            "Export failed"
        );
        self.advance(ExportStage::Failed);
        err
    }
}
