//! Show scene information.

use std::path::PathBuf;

use flipbook_blob_store::BlobStore;
use flipbook_common::config::AppConfig;
use flipbook_export_engine::{ResolutionResolver, EXPORT_ASPECT_RATIO};
use flipbook_project_model::Scene;

pub async fn run(config: &AppConfig, scene_path: PathBuf) -> anyhow::Result<()> {
    let scene =
        Scene::load(&scene_path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;
    let store = BlobStore::open_dir(&config.store_dir).await?;

    let slots: u64 = scene
        .pictures
        .iter()
        .map(|p| u64::from(p.repeat_count()))
        .sum();
    println!("Scene: {}", scene.title);
    println!("  Framerate: {}fps", scene.framerate);
    println!("  Pictures: {} ({} slots with repeats)", scene.pictures.len(), slots);

    let mut missing = 0usize;
    let mut empty = 0usize;
    let mut stored_bytes = 0usize;
    let mut ids = scene.frame_ids();
    ids.sort_unstable();
    ids.dedup();
    for id in &ids {
        match store.get_blob(*id).await? {
            Some(blob) if blob.is_empty() => empty += 1,
            Some(blob) => stored_bytes += blob.len(),
            None => missing += 1,
        }
    }
    println!("  Stored frames: {} ({} KiB)", ids.len() - missing, stored_bytes / 1024);
    if missing > 0 {
        println!("  [WARN] {missing} frame(s) referenced by the scene are missing");
    }
    if empty > 0 {
        println!("  [WARN] {empty} stored frame(s) are empty");
    }

    let resolver = ResolutionResolver::new(store);
    let best = resolver.resolve(&ids, Some(EXPORT_ASPECT_RATIO)).await;
    println!();
    match best {
        Some(best) => println!("Best resolution: {best}"),
        None => println!("Best resolution: unknown (native sizes will be kept)"),
    }
    let choices: Vec<String> = resolver
        .choices(&ids)
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Resolution choices: {}", choices.join(", "));
    Ok(())
}
