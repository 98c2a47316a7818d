//! Dataset walk: square, detect, annotate or reject every image.
//!
//! The input root holds one directory per class label. Each supported image
//! in those directories is processed independently; a failure on one image is
//! logged, recorded as skipped, and the walk moves on.

pub mod report;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::canvas::{is_square_output, square_output_path, SquareCanvasBuilder, SquareOutput};
use crate::config::PipelineConfig;
use crate::detect::{detect_boxes, Detector};
use crate::error::VocprepError;
use crate::raster::{is_supported_raster, load_raster, Raster};
use crate::voc::{annotation_path_for, write_voc_annotation, VocAnnotation};

pub use report::{ImageOutcome, ImageState, WalkReport};

/// Walks a class-per-folder dataset with one detector for the whole run.
pub struct DatasetWalker<'a> {
    config: &'a PipelineConfig,
    detector: &'a dyn Detector,
    builder: SquareCanvasBuilder,
}

impl<'a> DatasetWalker<'a> {
    pub fn new(config: &'a PipelineConfig, detector: &'a dyn Detector) -> Self {
        Self {
            config,
            detector,
            builder: SquareCanvasBuilder::new(config),
        }
    }

    /// Process every class folder under `root`.
    ///
    /// Only a missing or unreadable root is an error; per-image and per-folder
    /// problems end up in the report.
    pub fn walk(&self, root: &Path) -> Result<WalkReport, VocprepError> {
        let mut report = WalkReport::new(root);

        for (class_label, class_dir) in collect_class_folders(root)? {
            let images = match collect_class_images(&class_dir, self.config.target_size) {
                Ok(images) => images,
                Err(err) => {
                    warn!("Skipping class folder {}: {err}", class_dir.display());
                    continue;
                }
            };
            info!(
                "Processing {} image(s) in class '{}'",
                images.len(),
                class_label
            );

            let mut claimed = HashSet::new();
            for image_path in images {
                let xml_path = annotation_output_path(&image_path, self.config.target_size);
                if !claimed.insert(xml_path.clone()) {
                    report
                        .images
                        .push(annotation_collision(image_path, &class_label, &xml_path));
                    continue;
                }
                let outcome = self.process_image(&image_path, &class_label);
                report.images.push(outcome);
            }
            report.class_folders.push(class_label);
        }

        Ok(report)
    }

    /// Run one image through the pipeline and return its terminal record.
    pub fn process_image(&self, path: &Path, class_label: &str) -> ImageOutcome {
        let mut outcome = ImageOutcome::new(path.to_path_buf(), class_label);
        if let Err(err) = self.advance(&mut outcome) {
            warn!(
                "Skipping {} (failed while {}): {err}",
                path.display(),
                outcome.state
            );
            if let Some(processed) = outcome.image.take() {
                remove_best_effort(&processed);
            }
            outcome.annotation = None;
            outcome.objects = 0;
            outcome.state = ImageState::Skipped;
            outcome.message = Some(err.to_string());
        }
        debug_assert!(outcome.state.is_terminal());
        outcome
    }

    fn advance(&self, outcome: &mut ImageOutcome) -> Result<(), VocprepError> {
        let raster: Raster = load_raster(&outcome.source)?;
        let SquareOutput { path, canvas } = self.builder.build_and_save(&raster, self.detector)?;
        outcome.image = Some(path.clone());
        outcome.state = ImageState::Preprocessed;

        let boxes = detect_boxes(
            self.detector,
            &canvas.image,
            &self.config.annotation_query(),
        )?;

        if boxes.is_empty() {
            warn!(
                "No class {} detected in {}, rejecting it",
                self.config.class_id,
                outcome.source.display()
            );
            outcome.image = None;
            remove_best_effort(&path);
            if self.config.delete_original {
                outcome.original_deleted = remove_best_effort(&outcome.source);
            }
            outcome.state = ImageState::Rejected;
            return Ok(());
        }

        let (width, height) = canvas.image.dimensions();
        let annotation = VocAnnotation::for_image(
            &path,
            &outcome.class_label,
            width,
            height,
            u32::from(raster.depth()),
            &boxes,
        )?;
        let xml_path = annotation_path_for(&path);
        write_voc_annotation(&xml_path, &annotation)?;
        info!(
            "Saved annotation for {} -> {} ({} object(s))",
            path.display(),
            xml_path.display(),
            boxes.len()
        );

        outcome.annotation = Some(xml_path);
        outcome.objects = boxes.len();
        outcome.state = ImageState::Annotated;
        Ok(())
    }
}

/// List `(label, path)` for every directory directly under `root`, sorted by name.
///
/// Loose files in `root` are ignored.
pub fn collect_class_folders(root: &Path) -> Result<Vec<(String, PathBuf)>, VocprepError> {
    if !root.is_dir() {
        return Err(VocprepError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dataset root is not a directory: {}", root.display()),
        )));
    }

    let mut folders = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| {
            VocprepError::Io(std::io::Error::other(format!(
                "failed while listing {}: {source}",
                root.display()
            )))
        })?;
        if !entry.file_type().is_dir() {
            debug!("Ignoring non-directory {}", entry.path().display());
            continue;
        }
        let label = entry.file_name().to_string_lossy().into_owned();
        folders.push((label, entry.into_path()));
    }
    Ok(folders)
}

/// List supported images directly inside `dir`, sorted by name.
///
/// Files already produced for `target_size` are left out so a re-run does
/// not process its own outputs.
pub fn collect_class_images(dir: &Path, target_size: u32) -> Result<Vec<PathBuf>, VocprepError> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| {
            VocprepError::Io(std::io::Error::other(format!(
                "failed while listing {}: {source}",
                dir.display()
            )))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported_raster(path) {
            continue;
        }
        if is_square_output(path, target_size) {
            debug!("Ignoring previous output {}", path.display());
            continue;
        }
        images.push(entry.into_path());
    }
    Ok(images)
}

/// Annotation file a source image would end up with.
fn annotation_output_path(source: &Path, target_size: u32) -> PathBuf {
    annotation_path_for(&square_output_path(source, target_size))
}

/// Outcome for a file whose annotation path is already taken by an earlier
/// file of the same stem.
fn annotation_collision(source: PathBuf, class_label: &str, xml_path: &Path) -> ImageOutcome {
    warn!(
        "Skipping {}: {} is already written for another file with the same stem",
        source.display(),
        xml_path.display()
    );
    let mut outcome = ImageOutcome::new(source, class_label);
    outcome.state = ImageState::Skipped;
    outcome.message = Some(format!(
        "annotation {} already belongs to another image",
        xml_path.display()
    ));
    outcome
}

/// Delete a file, logging instead of failing. Returns true if it was removed.
fn remove_best_effort(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(err) => {
            warn!("Failed to remove {}: {err}", path.display());
            false
        }
    }
}
