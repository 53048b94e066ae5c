//! Flipbook CLI — import frames, inspect scenes, and export animations.
//!
//! Usage:
//!   flipbook import <SCENE> <FILES>...   Store image files and append them to a scene
//!   flipbook export <SCENE>              Export a scene as video, frames, or upload
//!   flipbook info <SCENE>                Show scene information
//!   flipbook check                       Check export capabilities

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "flipbook",
    about = "Stop-motion frame store and export pipeline",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the frame store directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store image files and append them to a scene
    Import {
        /// Scene file (created if missing)
        scene: PathBuf,

        /// Image files, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Repeat count for each imported picture
        #[arg(long, default_value = "1")]
        length: u32,

        /// Title for a newly created scene
        #[arg(long)]
        title: Option<String>,
    },

    /// Export a scene
    Export(ExportArgs),

    /// Show scene information
    Info {
        /// Scene file
        scene: PathBuf,
    },

    /// Check export capabilities
    Check,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Scene file
    pub scene: PathBuf,

    /// Output file (video) or folder (frames); omit to cancel those modes
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preferred mode: video|frames|send
    #[arg(long, default_value = "video")]
    pub mode: String,

    /// Video format: h264|hevc|prores|vp8|vp9
    #[arg(long, default_value = "h264")]
    pub format: String,

    /// Resolution: original or a height such as 1080
    #[arg(long, default_value = "original")]
    pub resolution: String,

    /// Frames format: original|jpg|png|webp
    #[arg(long, default_value = "original")]
    pub frames_format: String,

    /// Ignore per-picture repeat counts
    #[arg(long)]
    pub no_duplicate_copy: bool,

    /// Pad the start and end with copies of the first and last frame
    #[arg(long)]
    pub duplicate_auto: bool,

    /// Copies added at each end with --duplicate-auto
    #[arg(long, default_value = "2")]
    pub duplicate_auto_number: u32,

    /// Animation framerate (defaults to the scene's)
    #[arg(long)]
    pub framerate: Option<u32>,

    /// Override the encoded video framerate
    #[arg(long)]
    pub output_framerate: Option<u32>,

    #[arg(long, default_value = "default")]
    pub project_id: String,

    #[arg(long, default_value = "0")]
    pub track_id: String,

    /// Event to upload into (send mode)
    #[arg(long)]
    pub event_key: Option<String>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = flipbook_common::config::AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    flipbook_common::logging::init_logging(&config.logging);
    if let Some(store_dir) = cli.store_dir {
        config.store_dir = store_dir;
    }

    match cli.command {
        Commands::Import {
            scene,
            files,
            length,
            title,
        } => commands::import::run(&config, scene, files, length, title).await,
        Commands::Export(args) => commands::export::run(&config, args).await,
        Commands::Info { scene } => commands::info::run(&config, scene).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
