//! CLI enum types shared by several commands.

use clap::ValueEnum;
use darkroom_core::{OutputFormat, ReportFormat};

/// Report formats for command results.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportFormatArg {
    /// Single JSON object or array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for ReportFormatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormatArg::Json => write!(f, "json"),
            ReportFormatArg::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Jsonl => ReportFormat::JsonLines,
        }
    }
}

/// Encoded format of filtered images.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum ImageFormatArg {
    #[default]
    Png,
    #[value(alias = "jpg")]
    Jpeg,
    Webp,
}

impl From<ImageFormatArg> for OutputFormat {
    fn from(arg: ImageFormatArg) -> Self {
        match arg {
            ImageFormatArg::Png => OutputFormat::Png,
            ImageFormatArg::Jpeg => OutputFormat::Jpeg,
            ImageFormatArg::Webp => OutputFormat::Webp,
        }
    }
}
