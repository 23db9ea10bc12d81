//! The `darkroom download` command.

use clap::Args;
use darkroom_core::store::CHUNK_SIZE;
use darkroom_core::{Config, Disposition};
use futures_util::TryStreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Arguments for the `download` command.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Storage key of an original or a filtered artifact
    pub key: String,

    /// Stream to stdout for display instead of saving a file
    #[arg(long)]
    pub preview: bool,

    /// Output file or directory (defaults to the stored file name)
    #[arg(short, long, conflicts_with = "preview")]
    pub output: Option<PathBuf>,
}

/// Execute the download command.
pub async fn execute(args: DownloadArgs, config: Config) -> anyhow::Result<()> {
    let darkroom = super::open(config).await?;
    let disposition = if args.preview {
        Disposition::Inline
    } else {
        Disposition::Attachment
    };
    let download = darkroom.download(&args.key, disposition).await?;
    tracing::debug!(
        "Downloading {} ({}, {} bytes, {})",
        download.file_name,
        download.media_type,
        download.size,
        download.disposition.as_str()
    );

    let mut chunks = Box::pin(download.reader.into_stream(CHUNK_SIZE));
    match download.disposition {
        Disposition::Inline => {
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = chunks.try_next().await? {
                stdout.write_all(&chunk).await?;
            }
            stdout.flush().await?;
        }
        Disposition::Attachment => {
            let path = super::resolve_output(args.output.as_deref(), &download.file_name);
            let mut file = tokio::fs::File::create(&path).await?;
            let mut written = 0u64;
            while let Some(chunk) = chunks.try_next().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            tracing::info!("Saved {} bytes to {}", written, path.display());
            println!("{}", path.display());
        }
    }
    Ok(())
}
