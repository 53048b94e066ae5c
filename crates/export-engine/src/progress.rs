//! Export progress reporting.
//!
//! Two producers feed one export's progress: the local frame-preparation
//! loop and the external encoder. [`combined_progress`] folds both into
//! the single `[0, 1]` value shown to users.

use flipbook_project_model::ExportMode;

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// States of one export invocation. Never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Idle,
    ModeSelected,
    ResolutionResolved,
    FramesExpanded,
    Dispatched,
    Completed,
    Failed,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Idle => "idle",
            ExportStage::ModeSelected => "mode_selected",
            ExportStage::ResolutionResolved => "resolution_resolved",
            ExportStage::FramesExpanded => "frames_expanded",
            ExportStage::Dispatched => "dispatched",
            ExportStage::Completed => "completed",
            ExportStage::Failed => "failed",
        }
    }
}

/// Which producer an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    FramePreparation,
    Encoding,
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Combined progress [0.0, 1.0].
    pub progress: f64,

    /// Frame-preparation fraction.
    pub frame_phase: f64,

    /// Encoder-reported fraction.
    pub encode_phase: f64,

    /// Producer of the latest update (`None` for stage transitions only).
    pub phase: Option<ProgressPhase>,

    /// Frames prepared so far.
    pub frames_prepared: u64,

    /// Total frames in the expanded list.
    pub total_frames: u64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Combine both phases into one value.
///
/// `frames` has no encoding step, so it is the frame phase alone. Every
/// other mode weighs the phases equally and caps each at its half, so a
/// runaway value in one phase can't exceed its share.
pub fn combined_progress(mode: ExportMode, frame_phase: f64, encode_phase: f64) -> f64 {
    let frame_phase = sanitize(frame_phase);
    let encode_phase = sanitize(encode_phase);
    if mode.has_encode_phase() {
        (frame_phase / 2.0).min(0.5) + (encode_phase / 2.0).min(0.5)
    } else {
        frame_phase.min(1.0)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Per-invocation progress state. Starts at `{0, 0}`.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    mode: ExportMode,
    frame_phase: f64,
    encode_phase: f64,
    frames_prepared: u64,
    total_frames: u64,
    stage: ExportStage,
    last_phase: Option<ProgressPhase>,
}

impl ProgressTracker {
    pub fn new(mode: ExportMode) -> Self {
        Self {
            mode,
            frame_phase: 0.0,
            encode_phase: 0.0,
            frames_prepared: 0,
            total_frames: 0,
            stage: ExportStage::Idle,
            last_phase: None,
        }
    }

    pub fn set_mode(&mut self, mode: ExportMode) {
        self.mode = mode;
    }

    pub fn set_stage(&mut self, stage: ExportStage) {
        self.stage = stage;
    }

    pub fn set_total_frames(&mut self, total: u64) {
        self.total_frames = total;
    }

    /// Record the count of prepared frames and fold it into the frame phase.
    pub fn frame_prepared(&mut self, prepared: u64) {
        self.frames_prepared = self.frames_prepared.max(prepared);
        let fraction = if self.total_frames == 0 {
            1.0
        } else {
            self.frames_prepared as f64 / self.total_frames as f64
        };
        self.update(ProgressPhase::FramePreparation, fraction);
    }

    /// Fold one producer's value in.
    ///
    /// The frame phase never moves backwards. Encoder values are taken as
    /// received, so the last one wins.
    pub fn update(&mut self, phase: ProgressPhase, value: f64) {
        let value = sanitize(value);
        match phase {
            ProgressPhase::FramePreparation => self.frame_phase = self.frame_phase.max(value),
            ProgressPhase::Encoding => self.encode_phase = value,
        }
        self.last_phase = Some(phase);
    }

    pub fn total(&self) -> f64 {
        combined_progress(self.mode, self.frame_phase, self.encode_phase)
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    pub fn snapshot(&self) -> ExportProgress {
        ExportProgress {
            progress: self.total(),
            frame_phase: self.frame_phase,
            encode_phase: self.encode_phase,
            phase: self.last_phase,
            frames_prepared: self.frames_prepared,
            total_frames: self.total_frames,
            stage: self.stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frames_mode_ignores_encoder() {
        assert_eq!(combined_progress(ExportMode::Frames, 0.25, 1.0), 0.25);
        assert_eq!(combined_progress(ExportMode::Frames, 3.0, 0.0), 1.0);
    }

    #[test]
    fn test_other_modes_split_evenly() {
        assert_eq!(combined_progress(ExportMode::Video, 0.0, 0.0), 0.0);
        assert_eq!(combined_progress(ExportMode::Video, 1.0, 0.0), 0.5);
        assert_eq!(combined_progress(ExportMode::Send, 1.0, 0.5), 0.75);
        assert_eq!(combined_progress(ExportMode::Video, 1.0, 1.0), 1.0);
        assert_eq!(combined_progress(ExportMode::Video, 9.0, 0.0), 0.5);
    }

    #[test]
    fn test_nan_counts_as_zero() {
        assert_eq!(combined_progress(ExportMode::Video, f64::NAN, 1.0), 0.5);
    }

    #[test]
    fn test_tracker_frame_phase_is_monotonic() {
        let mut tracker = ProgressTracker::new(ExportMode::Video);
        tracker.set_total_frames(4);
        tracker.frame_prepared(2);
        tracker.frame_prepared(1);
        assert_eq!(tracker.snapshot().frame_phase, 0.5);
        assert_eq!(tracker.total(), 0.25);
    }

    #[test]
    fn test_tracker_encode_last_value_wins() {
        let mut tracker = ProgressTracker::new(ExportMode::Video);
        assert_eq!(tracker.snapshot().phase, None);
        tracker.update(ProgressPhase::Encoding, 0.8);
        tracker.update(ProgressPhase::Encoding, 0.6);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.encode_phase, 0.6);
        assert_eq!(snapshot.phase, Some(ProgressPhase::Encoding));
        assert_eq!(tracker.total(), 0.3);
    }

    #[test]
    fn test_tracker_tags_the_latest_producer() {
        let mut tracker = ProgressTracker::new(ExportMode::Send);
        tracker.set_total_frames(2);
        tracker.frame_prepared(1);
        assert_eq!(tracker.snapshot().phase, Some(ProgressPhase::FramePreparation));

        tracker.update(ProgressPhase::Encoding, 0.5);
        tracker.update(ProgressPhase::FramePreparation, 0.1);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, Some(ProgressPhase::FramePreparation));
        assert_eq!(snapshot.frame_phase, 0.5);
        assert_eq!(snapshot.frames_prepared, 1);
    }

    #[test]
    fn test_empty_export_counts_as_prepared() {
        let mut tracker = ProgressTracker::new(ExportMode::Frames);
        tracker.frame_prepared(0);
        assert_eq!(tracker.total(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_combined_stays_in_unit_range(
            frame in -2.0f64..5.0,
            encode in -2.0f64..5.0,
            video in any::<bool>(),
        ) {
            let mode = if video { ExportMode::Video } else { ExportMode::Send };
            let total = combined_progress(mode, frame, encode);
            prop_assert!((0.0..=1.0).contains(&total));
        }

        #[test]
        fn prop_frames_mode_is_capped_frame_phase(frame in 0.0f64..5.0, encode in 0.0f64..5.0) {
            prop_assert_eq!(combined_progress(ExportMode::Frames, frame, encode), frame.min(1.0));
        }
    }
}
