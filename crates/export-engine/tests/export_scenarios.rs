//! End-to-end export runs against an in-memory store and fake collaborators.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flipbook_blob_store::{Blob, BlobStore, FrameId};
use flipbook_common::error::{FlipbookError, FlipbookResult};
use flipbook_export_engine::{
    is_valid_public_code, report_progress, CancelHandle, EncodeRequest, EncodeResponse, Encoder,
    ExportOutcome, ExportPipeline, ExportProgress, ExportRequest, ExportStage, FixedPathPrompt,
    FrameConverter, PathPrompt, PathRequest, PipelineOptions, ProgressPhase, ProgressSender,
    SEND_FORMAT,
};
use flipbook_project_model::{
    Capability, CapabilitySet, ExportConfig, ExportMode, FramesFormat, Picture, Resolution,
    ResolutionChoice, Scene, VideoFormat,
};
use tokio::sync::Notify;

enum Behavior {
    Succeed,
    Fail,
    Hang(Arc<Notify>),
}

struct RecordingEncoder {
    requests: Mutex<Vec<EncodeRequest>>,
    behavior: Behavior,
}

impl RecordingEncoder {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(vec![]),
            behavior,
        })
    }

    fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Encoder for RecordingEncoder {
    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSender,
    ) -> FlipbookResult<EncodeResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.behavior {
            Behavior::Succeed => {
                report_progress(&progress, 0.5);
                report_progress(&progress, 1.0);
                Ok(EncodeResponse {
                    output_path: request.output_path.clone(),
                    files_written: request.frames.len(),
                })
            }
            Behavior::Fail => Err(FlipbookError::encoder("codec exploded")),
            Behavior::Hang(started) => {
                report_progress(&progress, 0.25);
                started.notify_one();
                std::future::pending().await
            }
        }
    }

    async fn capabilities(&self) -> CapabilitySet {
        Capability::ALL.into_iter().collect()
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Passes bytes through and counts conversions.
#[derive(Default)]
struct CountingConverter {
    calls: AtomicUsize,
    sizes: Mutex<Vec<Option<Resolution>>>,
}

#[async_trait::async_trait]
impl FrameConverter for CountingConverter {
    async fn convert(
        &self,
        blob: &Blob,
        _extension: &str,
        resolution: Option<Resolution>,
    ) -> FlipbookResult<Arc<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(resolution);
        Ok(Arc::clone(&blob.bytes))
    }
}

/// Prompt that must never be shown.
struct UnreachablePrompt;

#[async_trait::async_trait]
impl PathPrompt for UnreachablePrompt {
    async fn select_path(&self, request: PathRequest) -> Option<PathBuf> {
        panic!("no prompt expected, got {:?}", request.kind)
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

async fn scene_with_frames(store: &BlobStore, count: usize, width: u32, height: u32) -> Scene {
    let mut scene = Scene::new("test", 12);
    for _ in 0..count {
        let id = store.put(png(width, height), Some("png")).await.unwrap();
        scene.pictures.push(Picture::new(id));
    }
    scene
}

fn caps(list: &[Capability]) -> CapabilitySet {
    list.iter().copied().collect()
}

fn request(scene: Scene, config: ExportConfig) -> ExportRequest {
    ExportRequest {
        project_id: "project-1".into(),
        track_id: "0".into(),
        scene,
        config,
        event_key: Some("event-42".into()),
    }
}

fn collector() -> (
    Arc<Mutex<Vec<ExportProgress>>>,
    Box<dyn Fn(ExportProgress) + Send + Sync>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, Box::new(move |p| sink.lock().unwrap().push(p)))
}

fn pipeline(
    store: &BlobStore,
    encoder: Arc<RecordingEncoder>,
    prompt: Arc<dyn PathPrompt>,
    converter: Arc<CountingConverter>,
) -> ExportPipeline {
    ExportPipeline::new(store.clone(), encoder, prompt).with_converter(converter)
}

#[tokio::test]
async fn test_video_original_resolution_from_frames() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 10, 64, 40).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let converter = Arc::new(CountingConverter::default());
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/out.mp4"))));
    let pipeline = pipeline(&store, encoder.clone(), prompt, converter.clone());

    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo, Capability::ExportVideoH264]),
            None,
            None,
        )
        .await
        .unwrap();

    let report = outcome.report().expect("completed");
    assert_eq!(report.mode, ExportMode::Video);
    assert_eq!(report.frame_count, 10);
    assert_eq!(report.resolution, Some(Resolution::new(64, 36)));
    assert_eq!(report.output_path, Some(PathBuf::from("/tmp/out.mp4")));
    assert!(report.public_code.is_none());

    let requests = encoder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].frames.len(), 10);
    assert!(requests[0].frames.iter().all(|f| f.extension == "jpg"));
    assert_eq!(requests[0].resolution, Some(Resolution::new(64, 36)));
    assert_eq!(converter.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_send_forces_padding_and_universal_format() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 3, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let converter = Arc::new(CountingConverter::default());
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(UnreachablePrompt),
        converter.clone(),
    );

    let config = ExportConfig {
        mode: ExportMode::Send,
        framerate: 12,
        duplicate_frames_auto: false,
        duplicate_frames_auto_number: 3,
        frames_format: FramesFormat::Png,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::BackgroundSync]),
            None,
            None,
        )
        .await
        .unwrap();

    let report = outcome.report().expect("completed");
    assert_eq!(report.mode, ExportMode::Send);
    assert_eq!(report.frame_count, 3 + 2 * 12);
    let code = report.public_code.clone().expect("send carries a code");
    assert!(is_valid_public_code(&code));

    let sent = &encoder.requests()[0];
    assert_eq!(sent.output_path, None);
    assert_eq!(sent.public_code.as_deref(), Some(code.as_str()));
    assert_eq!(sent.event_key.as_deref(), Some("event-42"));
    assert!(sent.frames.iter().all(|f| f.extension == "jpg"));
    // Three distinct frames, converted once each.
    assert_eq!(converter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_preferred_video_falls_back_to_send() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(UnreachablePrompt),
        Arc::new(CountingConverter::default()),
    );

    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::BackgroundSync]),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.report().map(|r| r.mode), Some(ExportMode::Send));
    assert_eq!(encoder.requests()[0].mode, ExportMode::Send);
}

#[tokio::test]
async fn test_send_ignores_preferred_video_format() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(UnreachablePrompt),
        Arc::new(CountingConverter::default()),
    );

    let config = ExportConfig {
        mode: ExportMode::Send,
        format: VideoFormat::Vp9,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[
                Capability::BackgroundSync,
                Capability::ExportVideoH264,
                Capability::ExportVideoVp9,
            ]),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(SEND_FORMAT, VideoFormat::H264);
    assert_eq!(outcome.report().map(|r| r.format), Some(SEND_FORMAT));
    assert_eq!(encoder.requests()[0].format, SEND_FORMAT);
}

#[tokio::test]
async fn test_numeric_resolution_uses_widescreen_width() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let converter = Arc::new(CountingConverter::default());
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/v.mp4"))));
    let pipeline = pipeline(&store, encoder.clone(), prompt, converter.clone());

    let config = ExportConfig {
        mode: ExportMode::Video,
        resolution: ResolutionChoice::Height(1080),
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            None,
            None,
        )
        .await
        .unwrap();

    let expected = Some(Resolution::new(1920, 1080));
    assert_eq!(outcome.report().and_then(|r| r.resolution), expected);
    assert_eq!(encoder.requests()[0].resolution, expected);
    assert!(converter
        .sizes
        .lock()
        .unwrap()
        .iter()
        .all(|size| *size == expected));
}

#[tokio::test]
async fn test_frames_original_keeps_native_size_and_extension() {
    let store = BlobStore::in_memory();
    let mut scene = scene_with_frames(&store, 2, 32, 18).await;
    scene.pictures[1].length = 3;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let converter = Arc::new(CountingConverter::default());
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/frames"))));
    let pipeline = pipeline(&store, encoder.clone(), prompt, converter.clone());

    let (seen, callback) = collector();
    let config = ExportConfig {
        mode: ExportMode::Frames,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportFrames]),
            Some(callback),
            None,
        )
        .await
        .unwrap();

    let report = outcome.report().expect("completed");
    assert_eq!(report.resolution, None);
    assert_eq!(report.frame_count, 4);

    let sent = &encoder.requests()[0];
    assert!(sent.frames.iter().all(|f| f.extension == "png"));
    assert!(Arc::ptr_eq(&sent.frames[1].bytes, &sent.frames[3].bytes));
    assert_eq!(converter.calls.load(Ordering::SeqCst), 2);

    // Frames mode progress is the frame phase alone.
    let seen = seen.lock().unwrap();
    let prepared: Vec<u64> = seen
        .iter()
        .filter(|p| p.stage == ExportStage::FramesExpanded)
        .map(|p| p.frames_prepared)
        .collect();
    assert_eq!(prepared, vec![0, 1, 2, 3, 4]);
    let at_last_frame = seen
        .iter()
        .rev()
        .find(|p| p.stage == ExportStage::FramesExpanded)
        .unwrap();
    assert_eq!(at_last_frame.progress, 1.0);
    assert_eq!(seen.last().map(|p| p.stage), Some(ExportStage::Completed));
}

#[tokio::test]
async fn test_progress_combines_both_phases() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 4, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/v.mp4"))));
    let pipeline = pipeline(
        &store,
        encoder,
        prompt,
        Arc::new(CountingConverter::default()),
    );

    let (seen, callback) = collector();
    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            Some(callback),
            None,
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let totals: Vec<f64> = seen.iter().map(|p| p.progress).collect();
    assert!(totals.windows(2).all(|w| w[0] <= w[1]), "{totals:?}");
    assert!(totals.iter().all(|t| (0.0..=1.0).contains(t)));
    assert!(totals.contains(&0.5));
    assert!(totals.contains(&0.75));
    assert_eq!(totals.last(), Some(&1.0));

    let phases: Vec<Option<ProgressPhase>> = seen.iter().map(|p| p.phase).collect();
    let first_encode = phases
        .iter()
        .position(|p| *p == Some(ProgressPhase::Encoding))
        .expect("encoder progress was reported");
    assert!(phases[..first_encode].contains(&Some(ProgressPhase::FramePreparation)));
    assert_eq!(phases.last(), Some(&Some(ProgressPhase::Encoding)));
}

#[tokio::test]
async fn test_prompt_cancel_never_dispatches() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let converter = Arc::new(CountingConverter::default());
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(FixedPathPrompt::cancelled()),
        converter.clone(),
    );

    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Cancelled {
            stage: ExportStage::ResolutionResolved
        }
    );
    assert!(encoder.requests().is_empty());
    assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_encoder_failure_propagates() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/v.mp4"))));
    let pipeline = pipeline(
        &store,
        RecordingEncoder::new(Behavior::Fail),
        prompt,
        Arc::new(CountingConverter::default()),
    );

    let (seen, callback) = collector();
    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let err = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            Some(callback),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FlipbookError::EncoderRequestFailed { .. }));
    assert_eq!(
        seen.lock().unwrap().last().map(|p| p.stage),
        Some(ExportStage::Failed)
    );
}

#[tokio::test]
async fn test_missing_frame_fails_preparation() {
    let store = BlobStore::in_memory();
    let mut scene = scene_with_frames(&store, 1, 32, 18).await;
    scene.pictures.push(Picture::new(FrameId(999)));
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/frames"))));
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        prompt,
        Arc::new(CountingConverter::default()),
    );

    let config = ExportConfig {
        mode: ExportMode::Frames,
        ..ExportConfig::default()
    };
    let err = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportFrames]),
            None,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FlipbookError::FrameMissing { id: 999 }));
    assert!(encoder.requests().is_empty());
}

#[tokio::test]
async fn test_no_capabilities_means_no_export() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 1, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(UnreachablePrompt),
        Arc::new(CountingConverter::default()),
    );

    let outcome = pipeline
        .run(
            request(scene, ExportConfig::default()),
            &CapabilitySet::default(),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome, ExportOutcome::NoCapableMode);
    assert!(encoder.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_after_dispatch_drops_encoder() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 2, 32, 18).await;
    let started = Arc::new(Notify::new());
    let encoder = RecordingEncoder::new(Behavior::Hang(Arc::clone(&started)));
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/v.mp4"))));
    let pipeline = pipeline(
        &store,
        encoder,
        prompt,
        Arc::new(CountingConverter::default()),
    );

    let cancel = CancelHandle::new();
    let canceller = {
        let cancel = cancel.clone();
        let started = Arc::clone(&started);
        tokio::spawn(async move {
            started.notified().await;
            cancel.cancel();
        })
    };

    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            None,
            Some(cancel),
        )
        .await
        .unwrap();

    canceller.await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Cancelled {
            stage: ExportStage::Dispatched
        }
    );
}

#[tokio::test]
async fn test_encode_timeout() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 1, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Hang(Arc::new(Notify::new())));
    let prompt = Arc::new(FixedPathPrompt::new(Some(PathBuf::from("/tmp/v.mp4"))));
    let pipeline = pipeline(
        &store,
        encoder,
        prompt,
        Arc::new(CountingConverter::default()),
    )
    .with_options(PipelineOptions {
        encode_timeout: Some(Duration::from_millis(50)),
        ..PipelineOptions::default()
    });

    let config = ExportConfig {
        mode: ExportMode::Video,
        format: VideoFormat::Vp9,
        ..ExportConfig::default()
    };
    let err = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            None,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FlipbookError::EncoderTimedOut { .. }));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let store = BlobStore::in_memory();
    let scene = scene_with_frames(&store, 1, 32, 18).await;
    let encoder = RecordingEncoder::new(Behavior::Succeed);
    let pipeline = pipeline(
        &store,
        encoder.clone(),
        Arc::new(UnreachablePrompt),
        Arc::new(CountingConverter::default()),
    );

    let cancel = CancelHandle::new();
    cancel.cancel();
    let config = ExportConfig {
        mode: ExportMode::Video,
        ..ExportConfig::default()
    };
    let outcome = pipeline
        .run(
            request(scene, config),
            &caps(&[Capability::ExportVideo]),
            None,
            Some(cancel),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Cancelled {
            stage: ExportStage::ModeSelected
        }
    );
    assert!(encoder.requests().is_empty());
}
