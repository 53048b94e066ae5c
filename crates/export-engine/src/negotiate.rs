//! Capability-driven mode and format negotiation.
//!
//! Both are pure functions of the capability snapshot. Re-run them
//! whenever the snapshot changes; they never fail, they fall back.

use flipbook_project_model::{Capability, CapabilitySet, ExportMode, VideoFormat};

/// Mode fallback order.
const MODE_PRECEDENCE: [ExportMode; 3] = [ExportMode::Video, ExportMode::Frames, ExportMode::Send];

/// Whether `mode` can run with the given capabilities. `None` never can.
pub fn mode_supported(mode: ExportMode, capabilities: &CapabilitySet) -> bool {
    mode.required_capability()
        .is_some_and(|cap| capabilities.contains(cap))
}

/// Best mode available: video, then frames, then send, else none.
pub fn best_mode(capabilities: &CapabilitySet) -> ExportMode {
    MODE_PRECEDENCE
        .into_iter()
        .find(|mode| mode_supported(*mode, capabilities))
        .unwrap_or(ExportMode::None)
}

/// Keep `preferred` while it stays valid, otherwise re-select by precedence.
pub fn negotiate_mode(preferred: ExportMode, capabilities: &CapabilitySet) -> ExportMode {
    if mode_supported(preferred, capabilities) {
        return preferred;
    }
    let selected = best_mode(capabilities);
    if preferred != ExportMode::None {
        tracing::warn!(
            preferred = %preferred,
            selected = %selected,
            "Preferred export mode unavailable, re-selected"
        );
    }
    selected
}

/// Modes the user can pick from, in display order.
pub fn available_modes(capabilities: &CapabilitySet) -> Vec<ExportMode> {
    MODE_PRECEDENCE
        .into_iter()
        .filter(|mode| mode_supported(*mode, capabilities))
        .collect()
}

/// Video formats the encoder advertises, in preference order.
pub fn available_video_formats(capabilities: &CapabilitySet) -> Vec<VideoFormat> {
    VideoFormat::ALL
        .into_iter()
        .filter(|format| capabilities.contains(format.capability()))
        .collect()
}

/// Keep `preferred` if advertised, else the first advertised format.
///
/// When no format tag is advertised at all the preference is returned
/// unchanged and the encoder has the final word.
pub fn negotiate_format(preferred: VideoFormat, capabilities: &CapabilitySet) -> VideoFormat {
    if capabilities.contains(preferred.capability()) {
        return preferred;
    }
    match available_video_formats(capabilities).first() {
        Some(fallback) => {
            tracing::warn!(
                preferred = preferred.as_str(),
                selected = fallback.as_str(),
                "Preferred video format unavailable, re-selected"
            );
            *fallback
        }
        None => preferred,
    }
}

/// Whether any export at all is possible.
pub fn can_export(capabilities: &CapabilitySet) -> bool {
    capabilities.contains(Capability::ExportVideo)
        || capabilities.contains(Capability::ExportFrames)
        || capabilities.contains(Capability::BackgroundSync)
}
