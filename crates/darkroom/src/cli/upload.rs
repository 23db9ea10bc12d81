//! The `darkroom upload` command.

use clap::Args;
use darkroom_core::pipeline::{DiscoveredFile, FileDiscovery};
use darkroom_core::{Config, Darkroom, SourceImage, UploadRequest};
use std::path::PathBuf;
use std::time::Instant;

use super::types::ReportFormatArg;

/// Arguments for the `upload` command.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Image file or directory to upload
    #[arg(required = true)]
    pub input: PathBuf,

    /// Collection that owns the uploaded images
    #[arg(short, long)]
    pub collection: i64,

    /// Media type to record instead of sniffing it from the bytes
    #[arg(long)]
    pub media_type: Option<String>,

    /// Report file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: ReportFormatArg,
}

/// Execute the upload command.
pub async fn execute(args: UploadArgs, config: Config) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }

    let files = FileDiscovery::new(&config.processing).discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No supported image files found at {:?}", args.input);
        return Ok(());
    }
    tracing::info!("Found {} image(s) to upload", files.len());

    let darkroom = super::open(config).await?;
    // Fail fast before reading any file
    darkroom.get_collection(args.collection).await?;

    let start = Instant::now();
    let progress = (files.len() > 1).then(|| create_progress_bar(files.len() as u64));

    let mut uploaded: Vec<SourceImage> = Vec::with_capacity(files.len());
    let mut failed = 0u64;
    let mut total_bytes = 0u64;
    for file in &files {
        if let Some(pb) = &progress {
            pb.set_message(file.file_name.clone());
        }
        match upload_one(&darkroom, file, &args).await {
            Ok(image) => {
                total_bytes += image.file_size;
                uploaded.push(image);
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("Failed to upload {:?}: {}", file.path, e);
            }
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }

    let mut writer = super::report_writer(args.output.as_deref(), args.format)?;
    writer.write_list(&uploaded)?;
    writer.flush()?;

    tracing::info!(
        "Uploaded {} image(s), {} failed, {:.1} MB in {:?}",
        uploaded.len(),
        failed,
        total_bytes as f64 / 1_000_000.0,
        start.elapsed()
    );
    if uploaded.is_empty() {
        anyhow::bail!("No images were uploaded");
    }
    Ok(())
}

async fn upload_one(
    darkroom: &Darkroom,
    file: &DiscoveredFile,
    args: &UploadArgs,
) -> anyhow::Result<SourceImage> {
    let bytes = tokio::fs::read(&file.path).await?;
    let image = darkroom
        .upload(UploadRequest {
            bytes,
            file_name: file.file_name.clone(),
            media_type: args.media_type.clone(),
            collection_id: args.collection,
        })
        .await?;
    tracing::debug!("{} -> image {} ({})", file.file_name, image.id, image.storage_key);
    Ok(image)
}

/// Create a progress bar for multi-file uploads.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}
