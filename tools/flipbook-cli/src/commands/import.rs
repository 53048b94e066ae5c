//! Store image files and append them to a scene.

use std::path::PathBuf;

use flipbook_blob_store::{probe_dimensions, BlobStore};
use flipbook_common::config::AppConfig;
use flipbook_project_model::{Picture, Scene};

pub async fn run(
    config: &AppConfig,
    scene_path: PathBuf,
    files: Vec<PathBuf>,
    length: u32,
    title: Option<String>,
) -> anyhow::Result<()> {
    let mut scene = if scene_path.exists() {
        Scene::load(&scene_path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?
    } else {
        let title = title.unwrap_or_else(|| {
            scene_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "scene".to_string())
        });
        Scene::new(title, 12)
    };

    let store = BlobStore::open_dir(&config.store_dir).await?;
    println!("Importing {} file(s) into {}", files.len(), scene_path.display());

    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", file.display()))?;
        let Some((width, height)) = probe_dimensions(&bytes) else {
            println!("  [SKIP] {} is not a readable image", file.display());
            continue;
        };
        let extension = file
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let id = store.put(bytes, extension.as_deref()).await?;
        scene.pictures.push(Picture::with_length(id, length));
        println!("  [OK] {} -> frame {id} ({width}x{height})", file.display());
    }

    scene
        .save(&scene_path)
        .map_err(|e| anyhow::anyhow!("Failed to save scene: {e}"))?;
    println!("Scene now has {} picture(s)", scene.pictures.len());
    Ok(())
}
