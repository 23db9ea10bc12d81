//! CLI command implementations.

pub mod apply;
pub mod collection;
pub mod config;
pub mod download;
pub mod export;
pub mod types;
pub mod upload;

use darkroom_core::{Config, Darkroom, ReportWriter};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use types::ReportFormatArg;

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<Config, darkroom_core::ConfigError> {
    if path.exists() {
        Config::load_from(path)
    } else {
        Ok(Config::default())
    }
}

/// Open the on-disk stores named by `config`.
pub async fn open(config: Config) -> anyhow::Result<Darkroom> {
    let darkroom = Darkroom::open(config).await?;
    Ok(darkroom)
}

/// Report writer to `output`, or stdout when `None`.
pub fn report_writer(
    output: Option<&Path>,
    format: ReportFormatArg,
) -> anyhow::Result<ReportWriter<Box<dyn Write>>> {
    let (sink, pretty): (Box<dyn Write>, bool) = match output {
        Some(path) => (Box::new(BufWriter::new(File::create(path)?)), false),
        None => (Box::new(std::io::stdout().lock()), true),
    };
    Ok(ReportWriter::new(sink, format.into(), pretty))
}

/// Print one value as pretty JSON to stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut writer = report_writer(None, ReportFormatArg::Json)?;
    writer.write(value)?;
    writer.flush()?;
    Ok(())
}

/// Resolve an output location: a directory gets `file_name` appended,
/// anything else is taken as the file path. `~` is expanded.
pub fn resolve_output(output: Option<&Path>, file_name: &str) -> PathBuf {
    let Some(output) = output else {
        return PathBuf::from(file_name);
    };
    let expanded = PathBuf::from(shellexpand::tilde(&output.to_string_lossy()).into_owned());
    if expanded.is_dir() {
        expanded.join(file_name)
    } else {
        expanded
    }
}
