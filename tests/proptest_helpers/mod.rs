#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use vocprep::geometry::BoundingBox;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Raster dimensions small enough to process quickly.
pub fn arb_dims(max_side: u32) -> impl Strategy<Value = (u32, u32)> {
    (1..=max_side, 1..=max_side)
}

/// A box clamped to `width x height`, generated from possibly out-of-range corners.
pub fn arb_bbox(width: u32, height: u32) -> impl Strategy<Value = BoundingBox> {
    let w = i64::from(width);
    let h = i64::from(height);
    (-20..=w + 20, -20..=h + 20, -20..=w + 20, -20..=h + 20)
        .prop_map(move |(x1, y1, x2, y2)| BoundingBox::clamped(x1, y1, x2, y2, width, height))
}

/// Dimensions plus a non-empty list of boxes clamped to them.
pub fn arb_boxes_with_dims(
    max_side: u32,
    max_boxes: usize,
) -> impl Strategy<Value = ((u32, u32), Vec<BoundingBox>)> {
    arb_dims(max_side).prop_flat_map(move |(w, h)| {
        (
            Just((w, h)),
            proptest::collection::vec(arb_bbox(w, h), 1..=max_boxes),
        )
    })
}
