//! Size filtering and shuffle/rename over temporary folders.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use vocprep::curate::{filter_by_size, shuffle_and_rename, SizeBounds};

mod common;

use common::{write_garbage, write_image};

fn names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn filter_removes_images_outside_bounds_recursively() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_image(&temp.path().join("ok.png"), 20, 30);
    write_image(&temp.path().join("narrow.png"), 9, 30);
    write_image(&temp.path().join("nested/tall.jpg"), 20, 41);
    write_image(&temp.path().join("nested/edge.jpg"), 10, 40);
    fs::write(temp.path().join("notes.txt"), "keep me").expect("write file");

    let report = filter_by_size(temp.path(), SizeBounds::new(10, 40).unwrap(), false)
        .expect("filter");

    assert_eq!(report.kept, 2);
    let removed: BTreeSet<String> = report
        .removed
        .iter()
        .map(|img| img.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        removed,
        BTreeSet::from(["narrow.png".to_string(), "tall.jpg".to_string()])
    );
    assert!(!temp.path().join("narrow.png").exists());
    assert!(!temp.path().join("nested/tall.jpg").exists());
    assert!(temp.path().join("nested/edge.jpg").exists());
    assert!(temp.path().join("notes.txt").exists());
}

#[test]
fn filter_dry_run_deletes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_image(&temp.path().join("small.png"), 4, 4);

    let report = filter_by_size(temp.path(), SizeBounds::new(10, 40).unwrap(), true)
        .expect("filter");

    assert!(report.dry_run);
    assert_eq!(report.removed.len(), 1);
    assert!(temp.path().join("small.png").exists());
}

#[test]
fn filter_leaves_unreadable_files_in_place() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_garbage(&temp.path().join("broken.jpg"));

    let report = filter_by_size(temp.path(), SizeBounds::default(), false).expect("filter");

    assert_eq!(report.unreadable.len(), 1);
    assert!(report.removed.is_empty());
    assert!(temp.path().join("broken.jpg").exists());
}

#[test]
fn shuffle_renames_to_a_dense_sequence_keeping_extensions() {
    let temp = tempfile::tempdir().expect("create temp dir");
    for name in ["b.jpg", "a.PNG", "c.jpeg", "d", "e.jpg"] {
        fs::write(temp.path().join(name), name).expect("write file");
    }
    fs::create_dir(temp.path().join("subdir")).expect("create dir");

    let report = shuffle_and_rename(temp.path(), "helmet", Some(7)).expect("shuffle");
    assert_eq!(report.renames.len(), 5);

    let after = names(temp.path());
    assert!(after.contains("subdir"));
    let numbers: BTreeSet<u32> = after
        .iter()
        .filter(|name| *name != "subdir")
        .map(|name| {
            let stem = name.split('.').next().unwrap();
            stem.strip_prefix("helmet_")
                .expect("prefixed name")
                .parse()
                .expect("numeric suffix")
        })
        .collect();
    assert_eq!(numbers, (1..=5).collect());

    // Content follows each file to its new name, with its extension.
    for rename in &report.renames {
        let original = rename.from.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(
            fs::read_to_string(&rename.to).expect("read renamed"),
            original
        );
        assert_eq!(rename.from.extension(), rename.to.extension());
    }
}

#[test]
fn shuffle_of_empty_folder_is_a_no_op() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let report = shuffle_and_rename(temp.path(), "x", None).expect("shuffle");
    assert!(report.renames.is_empty());
}
