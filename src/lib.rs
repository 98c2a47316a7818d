//! vocprep: square-canvas normalization and Pascal VOC auto-annotation.
//!
//! vocprep turns a folder-per-class collection of raw images into a detection
//! dataset: every image is padded (or, when portrait, detector-centered and
//! cropped) to a fixed square, run through an object detector, and either
//! annotated with a Pascal VOC XML file or rejected.
//!
//! # Modules
//!
//! - [`raster`]: Image loading, EXIF orientation and encoding
//! - [`canvas`]: Square canvas builder
//! - [`detect`]: Detector boundary and the YOLOv8 ONNX implementation
//! - [`voc`]: Pascal VOC XML writer and reader
//! - [`walker`]: Dataset walk and its report
//! - [`curate`]: Size filtering and shuffle/rename of raw images
//! - [`config`]: Run configuration
//! - [`error`]: Error types for vocprep operations

pub mod canvas;
pub mod config;
pub mod curate;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod raster;
pub mod voc;
pub mod walker;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

pub use error::VocprepError;

use crate::canvas::SquareCanvasBuilder;
use crate::config::{BorderColor, Device, PipelineConfig};
use crate::curate::{filter_by_size, shuffle, shuffle_and_rename, SizeBounds};
use crate::detect::{NullDetector, YoloDetector};
use crate::raster::load_raster;
use crate::walker::DatasetWalker;

/// The vocprep CLI application.
#[derive(Parser)]
#[command(name = "vocprep")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Square, detect and annotate every image of a class-per-folder dataset.
    Annotate(AnnotateArgs),
    /// Square a single image and print the output path.
    Square(SquareArgs),
    /// Delete images whose width or height falls outside a range.
    FilterSize(FilterSizeArgs),
    /// Shuffle the files of a folder and rename them to a numbered sequence.
    Shuffle(ShuffleArgs),
}

/// Report rendering for subcommands that print one.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Pipeline options shared by `annotate` and `square`.
///
/// Flags override values from `--config`, which override built-in defaults.
#[derive(clap::Args)]
struct PipelineArgs {
    /// YAML or JSON config file.
    #[arg(long, env = "VOCPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a YOLOv8 ONNX export.
    #[arg(long, env = "VOCPREP_MODEL")]
    model: Option<PathBuf>,

    /// Compute device for inference.
    #[arg(long, value_enum)]
    device: Option<Device>,

    /// Side length of the square output images.
    #[arg(long)]
    size: Option<u32>,

    /// Padding color ('#rrggbb', 'r,g,b', black, white or gray).
    #[arg(long)]
    border_color: Option<String>,

    /// Delete the source of images rejected for having no detections.
    #[arg(long)]
    delete_original: bool,

    /// Confidence threshold for the annotation pass.
    #[arg(long)]
    confidence: Option<f32>,

    /// Confidence threshold for centering portrait crops.
    #[arg(long)]
    centering_confidence: Option<f32>,

    /// Detector class index to annotate (COCO 0 = person).
    #[arg(long)]
    class_id: Option<u32>,
}

impl PipelineArgs {
    fn resolve(&self) -> Result<PipelineConfig, VocprepError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(size) = self.size {
            config.target_size = size;
        }
        if let Some(raw) = &self.border_color {
            config.border_color = raw.parse::<BorderColor>()?;
        }
        if self.delete_original {
            config.delete_original = true;
        }
        if let Some(confidence) = self.confidence {
            config.confidence = confidence;
        }
        if let Some(confidence) = self.centering_confidence {
            config.centering_confidence = confidence;
        }
        if let Some(class_id) = self.class_id {
            config.class_id = class_id;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the annotate subcommand.
#[derive(clap::Args)]
struct AnnotateArgs {
    /// Dataset root containing one folder per class.
    root: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

/// Arguments for the square subcommand.
#[derive(clap::Args)]
struct SquareArgs {
    /// Image to normalize.
    image: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Arguments for the filter-size subcommand.
#[derive(clap::Args)]
struct FilterSizeArgs {
    /// Directory to sweep (recursively).
    dir: PathBuf,

    /// Smallest accepted width and height.
    #[arg(long, default_value_t = curate::size_filter::DEFAULT_MIN_SIDE)]
    min: u32,

    /// Largest accepted width and height.
    #[arg(long, default_value_t = curate::size_filter::DEFAULT_MAX_SIDE)]
    max: u32,

    /// List what would be removed without deleting anything.
    #[arg(long)]
    dry_run: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

/// Arguments for the shuffle subcommand.
#[derive(clap::Args)]
struct ShuffleArgs {
    /// Folder whose files are renamed.
    dir: PathBuf,

    /// Name prefix (defaults to the folder name).
    #[arg(long)]
    prefix: Option<String>,

    /// Seed for a reproducible order.
    #[arg(long)]
    seed: Option<u64>,
}

/// Initialize logging once, honoring `RUST_LOG` when set.
pub fn init_logging(default_filter: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
}

/// Run the vocprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), VocprepError> {
    init_logging(LevelFilter::Info);
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Annotate(args)) => run_annotate(args),
        Some(Commands::Square(args)) => run_square(args),
        Some(Commands::FilterSize(args)) => run_filter_size(args),
        Some(Commands::Shuffle(args)) => run_shuffle(args),
        None => {
            println!("vocprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Square-canvas normalization and Pascal VOC auto-annotation.");
            println!();
            println!("Run 'vocprep --help' for usage information.");
            Ok(())
        }
    }
}

fn run_annotate(args: AnnotateArgs) -> Result<(), VocprepError> {
    let config = args.pipeline.resolve()?;
    // Load before touching any image so a bad model aborts the run cleanly.
    let detector = YoloDetector::load(&config)?;
    let walker = DatasetWalker::new(&config, &detector);
    let report = walker.walk(&args.root)?;

    print_report(&report, args.output)
}

fn run_square(args: SquareArgs) -> Result<(), VocprepError> {
    let config = args.pipeline.resolve()?;
    let raster = load_raster(&args.image)?;
    let builder = SquareCanvasBuilder::new(&config);

    let output = if raster.height() > raster.width() {
        let detector = YoloDetector::load(&config)?;
        builder.build_and_save(&raster, &detector)?
    } else {
        builder.build_and_save(&raster, &NullDetector)?
    };

    println!("{}", output.path.display());
    Ok(())
}

fn run_filter_size(args: FilterSizeArgs) -> Result<(), VocprepError> {
    let bounds = SizeBounds::new(args.min, args.max)?;
    let report = filter_by_size(&args.dir, bounds, args.dry_run)?;
    print_report(&report, args.output)
}

fn run_shuffle(args: ShuffleArgs) -> Result<(), VocprepError> {
    let prefix = args
        .prefix
        .unwrap_or_else(|| shuffle::default_prefix(&args.dir));
    let report = shuffle_and_rename(&args.dir, &prefix, args.seed)?;
    print!("{}", report);
    Ok(())
}

fn print_report<R>(report: &R, format: ReportFormat) -> Result<(), VocprepError>
where
    R: serde::Serialize + std::fmt::Display,
{
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        ReportFormat::Text => print!("{}", report),
    }
    Ok(())
}
