//! The `darkroom apply` command.

use clap::Args;
use darkroom_core::{BatchReport, Config, FilterParams, OutputFormat};
use std::path::PathBuf;
use std::time::Instant;

use super::types::{ImageFormatArg, ReportFormatArg};

/// Filter flags. Unset flags leave the step out of the spec.
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Brightness, 0-100 (50 is neutral)
    #[arg(long, allow_negative_numbers = true)]
    pub brightness: Option<i64>,

    /// Contrast, 0-100 (50 is neutral)
    #[arg(long, allow_negative_numbers = true)]
    pub contrast: Option<i64>,

    /// Saturation, 0-100 (50 is neutral, 0 is grayscale)
    #[arg(long, allow_negative_numbers = true)]
    pub saturation: Option<i64>,

    /// Gaussian blur strength, 0-50
    #[arg(long, allow_negative_numbers = true)]
    pub blur: Option<i64>,

    /// Sharpen with a 3x3 kernel
    #[arg(long)]
    pub sharpen: bool,

    /// Sepia tone
    #[arg(long)]
    pub vintage: bool,

    /// Overlay detected edges
    #[arg(long)]
    pub edge_detect: bool,

    /// Outline detected faces (needs `filters.face_model_path`)
    #[arg(long)]
    pub face_detect: bool,

    /// Encoded format of the filtered images
    #[arg(short, long, value_enum)]
    pub format: Option<ImageFormatArg>,
}

impl FilterArgs {
    /// Overlay the flags that were given on top of `base`.
    pub fn merge_into(&self, mut base: FilterParams) -> FilterParams {
        if self.brightness.is_some() {
            base.brightness = self.brightness;
        }
        if self.contrast.is_some() {
            base.contrast = self.contrast;
        }
        if self.saturation.is_some() {
            base.saturation = self.saturation;
        }
        if self.blur.is_some() {
            base.blur = self.blur;
        }
        if self.sharpen {
            base.sharpen = Some(true);
        }
        if self.vintage {
            base.vintage = Some(true);
        }
        if self.edge_detect {
            base.edge_detect = Some(true);
        }
        if self.face_detect {
            base.face_detect = Some(true);
        }
        if let Some(format) = self.format {
            base.output_format = Some(OutputFormat::from(format).as_str().to_string());
        }
        base
    }
}

/// Arguments for the `apply` command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Collection the results are linked into
    #[arg(short, long)]
    pub collection: i64,

    /// Apply to this image only instead of every member
    #[arg(short, long)]
    pub image: Option<i64>,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// JSON file with filter parameters; flags override its values
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Report file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "json")]
    pub report: ReportFormatArg,
}

/// Execute the apply command.
pub async fn execute(args: ApplyArgs, config: Config) -> anyhow::Result<()> {
    let params = build_params(&args)?;
    let darkroom = super::open(config).await?;
    let start = Instant::now();

    let mut writer = super::report_writer(args.output.as_deref(), args.report)?;
    match args.image {
        Some(image_id) => {
            let item = darkroom
                .apply_to_image(args.collection, image_id, params)
                .await?;
            writer.write(&item)?;
            writer.flush()?;
            if let Some(error) = &item.error {
                tracing::warn!("Image {} {}: {}", image_id, item.status, error);
            }
        }
        None => {
            let report = darkroom.apply_to_collection(args.collection, params).await?;
            writer.write_batch(&report)?;
            writer.flush()?;
            print_summary(&report, start.elapsed());
        }
    }
    Ok(())
}

fn build_params(args: &ApplyArgs) -> anyhow::Result<FilterParams> {
    let base = match &args.params {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid filter parameters in {:?}: {}", path, e))?
        }
        None => FilterParams::default(),
    };
    Ok(args.filters.merge_into(base))
}

/// Print a formatted summary table after a collection-wide apply.
fn print_summary(report: &BatchReport, elapsed: std::time::Duration) {
    let created = report.processed - report.skipped;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Created:      {:>8}", created);
    eprintln!("    Reused:       {:>8}", report.skipped);
    if report.failed > 0 {
        eprintln!("    Failed:       {:>8}", report.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", report.items.len());
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("  ====================================");
}
