//! Shuffle the files of a folder and rename them `<prefix>_<n><ext>`.
//!
//! Renaming goes through unique temporary names first, so a new name can
//! never collide with a file that has not been moved yet.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::error::VocprepError;

/// One completed rename.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ShuffleReport {
    pub folder: PathBuf,
    pub prefix: String,
    pub renames: Vec<Rename>,
}

impl fmt::Display for ShuffleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.renames.is_empty() {
            writeln!(f, "No files found in {}", self.folder.display())
        } else {
            writeln!(
                f,
                "Renamed {} file(s) in '{}'.",
                self.renames.len(),
                self.folder.display()
            )
        }
    }
}

/// Default prefix: the folder's own name.
pub fn default_prefix(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Shuffle every regular file directly inside `folder` and number them from 1.
///
/// Extensions are kept as-is. With a `seed` the order is reproducible.
pub fn shuffle_and_rename(
    folder: &Path,
    prefix: &str,
    seed: Option<u64>,
) -> Result<ShuffleReport, VocprepError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder).map_err(VocprepError::Io)? {
        let entry = entry.map_err(VocprepError::Io)?;
        if entry.file_type().map_err(VocprepError::Io)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut report = ShuffleReport {
        folder: folder.to_path_buf(),
        prefix: prefix.to_string(),
        renames: Vec::with_capacity(files.len()),
    };
    if files.is_empty() {
        info!("No files found in {}", folder.display());
        return Ok(report);
    }

    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        files.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        files.shuffle(&mut rng);
    }

    let mut staged = Vec::with_capacity(files.len());
    for original in files {
        let ext = dotted_extension(&original);
        let temp = folder.join(format!("temp_{}{ext}", Uuid::new_v4().simple()));
        fs::rename(&original, &temp).map_err(VocprepError::Io)?;
        staged.push((original, temp, ext));
    }

    for (idx, (original, temp, ext)) in staged.into_iter().enumerate() {
        let target = folder.join(format!("{prefix}_{}{ext}", idx + 1));
        fs::rename(&temp, &target).map_err(VocprepError::Io)?;
        debug!("{} -> {}", original.display(), target.display());
        report.renames.push(Rename {
            from: original,
            to: target,
        });
    }

    info!(
        "Renamed {} file(s) in '{}'.",
        report.renames.len(),
        folder.display()
    );
    Ok(report)
}

fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_extension_keeps_case() {
        assert_eq!(dotted_extension(Path::new("a/b.JPG")), ".JPG");
        assert_eq!(dotted_extension(Path::new("a/b")), "");
    }

    #[test]
    fn default_prefix_is_folder_name() {
        assert_eq!(default_prefix(Path::new("data/with_helmet")), "with_helmet");
    }

    #[test]
    fn same_seed_gives_same_order() {
        let run = |seed| {
            let temp = tempfile::tempdir().expect("create temp dir");
            for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"] {
                fs::write(temp.path().join(name), name).expect("write file");
            }
            let report = shuffle_and_rename(temp.path(), "x", Some(seed)).expect("shuffle");
            report
                .renames
                .iter()
                .map(|r| r.from.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
