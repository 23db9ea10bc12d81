//! The `darkroom export` command.

use clap::Args;
use darkroom_core::Config;
use std::io::BufWriter;
use std::path::PathBuf;

/// Arguments for the `export` command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Collection to export
    pub collection: i64,

    /// Output file or directory (defaults to `collection_<id>_filtered_images.zip`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the export command.
pub async fn execute(args: ExportArgs, config: Config) -> anyhow::Result<()> {
    let darkroom = super::open(config).await?;
    let mut archive = darkroom.export_zip(args.collection).await?;

    if !archive.summary.skipped.is_empty() {
        tracing::warn!(
            "{} artifact(s) had no stored file and were left out: {:?}",
            archive.summary.skipped.len(),
            archive.summary.skipped
        );
    }

    let path = super::resolve_output(args.output.as_deref(), archive.file_name());
    let target = path.clone();
    let written = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
        let mut out = BufWriter::new(std::fs::File::create(&target)?);
        archive.write_to(&mut out)
    })
    .await??;

    tracing::info!("Wrote {} bytes to {}", written, path.display());
    println!("{}", path.display());
    Ok(())
}
