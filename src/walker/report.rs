//! Walk report types.
//!
//! Every image the walker touches ends in exactly one terminal state; the
//! report keeps one record per image plus convenience counts.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one image inside a walk.
///
/// `Pending -> Preprocessed -> {Annotated | Rejected}`; any failure ends in
/// `Skipped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    Pending,
    Preprocessed,
    Annotated,
    Rejected,
    Skipped,
}

impl ImageState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImageState::Annotated | ImageState::Rejected | ImageState::Skipped
        )
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageState::Pending => "pending",
            ImageState::Preprocessed => "preprocessed",
            ImageState::Annotated => "annotated",
            ImageState::Rejected => "rejected",
            ImageState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Final record for one source image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageOutcome {
    pub source: PathBuf,
    pub class_label: String,
    pub state: ImageState,
    /// Processed image, present only when annotated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<PathBuf>,
    pub objects: usize,
    /// Whether the source file was removed.
    pub original_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImageOutcome {
    pub(crate) fn new(source: PathBuf, class_label: &str) -> Self {
        Self {
            source,
            class_label: class_label.to_string(),
            state: ImageState::Pending,
            image: None,
            annotation: None,
            objects: 0,
            original_deleted: false,
            message: None,
        }
    }
}

/// Summary of a dataset walk.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WalkReport {
    pub root: PathBuf,
    pub class_folders: Vec<String>,
    pub images: Vec<ImageOutcome>,
}

impl WalkReport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn count(&self, state: ImageState) -> usize {
        self.images.iter().filter(|img| img.state == state).count()
    }

    pub fn annotated_count(&self) -> usize {
        self.count(ImageState::Annotated)
    }

    pub fn rejected_count(&self) -> usize {
        self.count(ImageState::Rejected)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ImageState::Skipped)
    }

    /// Total objects written across all annotations.
    pub fn object_count(&self) -> usize {
        self.images.iter().map(|img| img.objects).sum()
    }
}

impl fmt::Display for WalkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} image(s) in {} class folder(s) under {}",
            self.images.len(),
            self.class_folders.len(),
            self.root.display()
        )?;
        writeln!(
            f,
            "  annotated: {} ({} object(s))",
            self.annotated_count(),
            self.object_count()
        )?;
        writeln!(f, "  rejected: {}", self.rejected_count())?;
        writeln!(f, "  skipped: {}", self.skipped_count())?;

        let skipped: Vec<&ImageOutcome> = self
            .images
            .iter()
            .filter(|img| img.state == ImageState::Skipped)
            .collect();
        if !skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped ({}):", skipped.len())?;
            for outcome in skipped {
                writeln!(
                    f,
                    "  - {}: {}",
                    outcome.source.display(),
                    outcome.message.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        Ok(())
    }
}
