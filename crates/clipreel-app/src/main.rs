//! ClipReel - record, review and export short clip reels
//!
//! Subcommands:
//! - `clipreel new <name> <clips..>` - Create a project from recorded clips
//! - `clipreel list` - List projects
//! - `clipreel info <id>` - Show a project and its timeline
//! - `clipreel play <id>` - Play a project headlessly
//! - `clipreel delete-segment <id> <segment>` - Remove one clip
//! - `clipreel export <id>` - Render a project to MP4
//! - `clipreel rename <id> <name>` - Rename a project

use anyhow::Result;
use clap::{Parser, Subcommand};
use clipreel_core::EngineConfig;
use std::path::PathBuf;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "clipreel")]
#[command(about = "Record, review and export short clip reels")]
#[command(version)]
struct Cli {
    /// Path to the engine config (defaults to $CLIPREEL_CONFIG or the data dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from clip files, in recording order
    New {
        name: String,

        /// Clip files
        #[arg(required = true)]
        clips: Vec<PathBuf>,

        /// Mark the clips as front-camera recordings
        #[arg(long)]
        front: bool,
    },

    /// List projects
    List,

    /// Show a project's segments and timeline
    Info { id: i64 },

    /// Play a project through the headless player
    Play {
        id: i64,

        /// Start at this many seconds into the timeline
        #[arg(long)]
        from: Option<f64>,
    },

    /// Delete one segment from a project
    DeleteSegment { id: i64, segment: i64 },

    /// Render a project to MP4 and deliver it to the library directory
    Export { id: i64 },

    /// Rename a project
    Rename { id: i64, name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };
    config.ensure_directories()?;
    clipreel_media::init();
    info!(projects = %config.projects_dir.display(), "ClipReel starting");

    let app = commands::App::open(config).await?;
    match cli.command {
        Commands::New { name, clips, front } => app.new_project(&name, clips, front).await?,
        Commands::List => app.list().await?,
        Commands::Info { id } => app.info(id).await?,
        Commands::Play { id, from } => app.play(id, from).await?,
        Commands::DeleteSegment { id, segment } => app.delete_segment(id, segment).await?,
        Commands::Export { id } => app.export(id).await?,
        Commands::Rename { id, name } => app.rename(id, &name).await?,
    }

    Ok(())
}
