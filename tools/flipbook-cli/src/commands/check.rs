//! Check export capabilities.

use flipbook_common::config::AppConfig;
use flipbook_export_engine::{
    available_modes, available_video_formats, can_export, Encoder, FfmpegEncoder,
};
use flipbook_project_model::Capability;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Flipbook Export Check");
    println!("{}", "=".repeat(50));

    let encoder = FfmpegEncoder::new(config.export.ffmpeg_binary.clone(), &config.outbox_dir)
        .with_event_key(config.event_key.clone());
    let capabilities = encoder.capabilities().await;

    for capability in Capability::ALL {
        let mark = if capabilities.contains(capability) {
            "[OK]  "
        } else {
            "[MISS]"
        };
        println!("{mark} {capability}");
    }

    println!();
    let modes: Vec<&str> = available_modes(&capabilities)
        .into_iter()
        .map(|m| m.as_str())
        .collect();
    let formats: Vec<&str> = available_video_formats(&capabilities)
        .into_iter()
        .map(|f| f.label())
        .collect();
    println!("Modes: {}", if modes.is_empty() { "none".to_string() } else { modes.join(", ") });
    println!("Video formats: {}", if formats.is_empty() { "none".to_string() } else { formats.join(", ") });
    println!("Store: {}", config.store_dir.display());
    println!("Outbox: {}", config.outbox_dir.display());

    println!();
    if !can_export(&capabilities) {
        println!("No export mode is available.");
    }
    if !capabilities.contains(Capability::ExportVideo) {
        println!("Install ffmpeg ({}) to enable video export.", config.export.ffmpeg_binary);
    }
    if config.event_key.is_none() {
        println!("Set `event_key` in the config file to enable send.");
    }
    Ok(())
}
