//! Darkroom CLI - collection-scoped image filters with deduplicated artifacts.
//!
//! Darkroom stores uploaded originals, applies deterministic filter specs to
//! them, and keeps one artifact per (image, spec) no matter how many
//! collections ask for it.
//!
//! # Usage
//!
//! ```bash
//! # Create a collection and upload a directory into it
//! darkroom collection create holiday
//! darkroom upload ./photos/ --collection 1
//!
//! # Brighten and blur every image in it
//! darkroom apply --collection 1 --brightness 70 --blur 4
//!
//! # Download everything as a zip
//! darkroom export 1 -o ./out/
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Darkroom - deterministic image filters over shared collections.
#[derive(Parser, Debug)]
#[command(name = "darkroom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "DARKROOM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, list, inspect and delete collections
    Collection(cli::collection::CollectionArgs),

    /// Upload an image file or a directory of images into a collection
    Upload(cli::upload::UploadArgs),

    /// Add an existing image to another collection
    Attach(cli::collection::AttachArgs),

    /// Apply a filter spec to one image or a whole collection
    Apply(cli::apply::ApplyArgs),

    /// Download an original or a filtered artifact by storage key
    Download(cli::download::DownloadArgs),

    /// Export a collection's filtered images as a zip archive
    Export(cli::export::ExportArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(darkroom_core::Config::default_path);

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `darkroom config path`."
            );
            darkroom_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Darkroom v{}", darkroom_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Collection(args) => cli::collection::execute(args, config).await,
        Commands::Upload(args) => cli::upload::execute(args, config).await,
        Commands::Attach(args) => cli::collection::attach(args, config).await,
        Commands::Apply(args) => cli::apply::execute(args, config).await,
        Commands::Download(args) => cli::download::execute(args, config).await,
        Commands::Export(args) => cli::export::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, &config_path).await,
    }
}
