//! Export a scene.

use std::io::Write;
use std::sync::Arc;

use flipbook_blob_store::BlobStore;
use flipbook_common::config::AppConfig;
use flipbook_export_engine::{
    CancelHandle, Encoder, ExportOutcome, ExportPipeline, ExportProgress, ExportRequest,
    FfmpegEncoder, FixedPathPrompt, PipelineOptions, SEND_FORMAT,
};
use flipbook_project_model::{ExportConfig, ExportMode, FramesFormat, ResolutionChoice, Scene, VideoFormat};

use crate::ExportArgs;

pub async fn run(config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    println!("Exporting scene: {}", args.scene.display());

    let scene =
        Scene::load(&args.scene).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;
    let export_config = export_config(&args, &scene)?;
    export_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid export options: {e}"))?;

    let event_key = args.event_key.clone().or_else(|| config.event_key.clone());
    let store = BlobStore::open_dir(&config.store_dir).await?;
    let encoder = Arc::new(
        FfmpegEncoder::new(config.export.ffmpeg_binary.clone(), &config.outbox_dir)
            .with_event_key(event_key.clone())
            .with_staging_root(config.export.staging_dir.clone()),
    );
    let capabilities = encoder.capabilities().await;
    tracing::debug!(capabilities = ?capabilities.tags(), "Probed capabilities");

    let pipeline = ExportPipeline::new(
        store,
        encoder,
        Arc::new(FixedPathPrompt::new(args.output.clone())),
    )
    .with_options(PipelineOptions {
        encode_timeout: config.export.encode_timeout(),
        progress_channel_capacity: config.export.progress_channel_capacity,
        ..PipelineOptions::default()
    });

    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!("  Mode: {}", export_config.mode);
    let format = match export_config.mode {
        ExportMode::Send => SEND_FORMAT,
        _ => export_config.format,
    };
    println!("  Format: {}", format.label());
    println!("  Resolution: {}", export_config.resolution);

    let progress_cb: Box<dyn Fn(ExportProgress) + Send + Sync> = Box::new(|p| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames, {})  ",
            p.progress * 100.0,
            p.frames_prepared,
            p.total_frames,
            p.stage.as_str(),
        );
        let _ = std::io::stdout().flush();
    });

    let request = ExportRequest {
        project_id: args.project_id.clone(),
        track_id: args.track_id.clone(),
        scene,
        config: export_config,
        event_key,
    };

    match pipeline
        .run(request, &capabilities, Some(progress_cb), Some(cancel))
        .await
    {
        Ok(ExportOutcome::Completed(report)) => {
            println!();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Export complete ({})", report.mode);
                if let Some(path) = &report.output_path {
                    println!("  Output: {}", path.display());
                }
                if let Some(resolution) = report.resolution {
                    println!("  Resolution: {resolution}");
                }
                if let Some(code) = &report.public_code {
                    println!("  Public code: {code}");
                }
                println!("  Frames: {}", report.frame_count);
            }
        }
        Ok(ExportOutcome::Cancelled { stage }) => {
            println!("\nExport cancelled ({})", stage.as_str());
            if args.output.is_none() {
                println!("  Pass --output to choose where to write the export.");
            }
        }
        Ok(ExportOutcome::NoCapableMode) => {
            println!("\nNo export mode is available. Run `flipbook check` for details.");
        }
        Err(e) => {
            println!();
            return Err(anyhow::anyhow!("Export failed: {e}"));
        }
    }

    Ok(())
}

fn export_config(args: &ExportArgs, scene: &Scene) -> anyhow::Result<ExportConfig> {
    let mode: ExportMode = args.mode.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
    let format: VideoFormat = args.format.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
    let frames_format: FramesFormat = args
        .frames_format
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let resolution: ResolutionChoice = args
        .resolution
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let defaults = ExportConfig::default();
    Ok(ExportConfig {
        mode,
        format,
        resolution,
        frames_format,
        duplicate_frames_copy: !args.no_duplicate_copy,
        duplicate_frames_auto: args.duplicate_auto,
        duplicate_frames_auto_number: args.duplicate_auto_number,
        framerate: args.framerate.unwrap_or(scene.framerate),
        custom_output_framerate: args.output_framerate.is_some(),
        custom_output_framerate_number: args
            .output_framerate
            .unwrap_or(defaults.custom_output_framerate_number),
    })
}
