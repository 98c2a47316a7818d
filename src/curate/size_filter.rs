//! Pixel-size filter for freshly crawled images.
//!
//! Dimensions are read from file headers only (no full decode), so large
//! crawls are cheap to sweep.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::VocprepError;
use crate::raster::is_supported_raster;

pub const DEFAULT_MIN_SIDE: u32 = 512;
pub const DEFAULT_MAX_SIDE: u32 = 1080;

/// Inclusive bounds applied to both width and height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SizeBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_SIDE,
            max: DEFAULT_MAX_SIDE,
        }
    }
}

impl SizeBounds {
    pub fn new(min: u32, max: u32) -> Result<Self, VocprepError> {
        if min > max {
            return Err(VocprepError::InvalidConfig(format!(
                "minimum side {min} is larger than maximum side {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, width: u32, height: u32) -> bool {
        (self.min..=self.max).contains(&width) && (self.min..=self.max).contains(&height)
    }
}

/// An image rejected by the filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilteredImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FilterReport {
    pub dry_run: bool,
    pub kept: usize,
    pub removed: Vec<FilteredImage>,
    /// Files whose headers could not be read; left in place.
    pub unreadable: Vec<PathBuf>,
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would remove" } else { "removed" };
        writeln!(
            f,
            "Kept {} image(s), {} {}, {} unreadable",
            self.kept,
            verb,
            self.removed.len(),
            self.unreadable.len()
        )?;
        for image in &self.removed {
            writeln!(
                f,
                "  - {} ({}x{})",
                image.path.display(),
                image.width,
                image.height
            )?;
        }
        Ok(())
    }
}

/// Remove every supported image under `dir` whose width or height is outside `bounds`.
///
/// With `dry_run`, nothing is deleted but the report lists what would be.
pub fn filter_by_size(
    dir: &Path,
    bounds: SizeBounds,
    dry_run: bool,
) -> Result<FilterReport, VocprepError> {
    let mut report = FilterReport {
        dry_run,
        ..Default::default()
    };

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| {
            VocprepError::Io(std::io::Error::other(format!(
                "failed while traversing {}: {source}",
                dir.display()
            )))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported_raster(path) {
            continue;
        }

        let (width, height) = match read_dimensions(path) {
            Ok(dims) => dims,
            Err(err) => {
                warn!("Cannot read size of {}: {err}", path.display());
                report.unreadable.push(path.to_path_buf());
                continue;
            }
        };

        if bounds.contains(width, height) {
            report.kept += 1;
            continue;
        }

        if dry_run {
            debug!("Would remove {} ({}x{})", path.display(), width, height);
        } else {
            fs::remove_file(path).map_err(VocprepError::Io)?;
            debug!("Removed {} ({}x{})", path.display(), width, height);
        }
        report.removed.push(FilteredImage {
            path: path.to_path_buf(),
            width,
            height,
        });
    }

    info!(
        "Size filter [{}, {}]: kept {}, {} {}",
        bounds.min,
        bounds.max,
        report.kept,
        if dry_run { "would remove" } else { "removed" },
        report.removed.len()
    );
    Ok(report)
}

fn read_dimensions(path: &Path) -> Result<(u32, u32), VocprepError> {
    let size = imagesize::size(path).map_err(|source| VocprepError::UnreadableImage {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    let width = u32::try_from(size.width).map_err(|_| VocprepError::UnreadableImage {
        path: path.to_path_buf(),
        message: format!("image width {} does not fit in u32", size.width),
    })?;
    let height = u32::try_from(size.height).map_err(|_| VocprepError::UnreadableImage {
        path: path.to_path_buf(),
        message: format!("image height {} does not fit in u32", size.height),
    })?;
    Ok((width, height))
}
