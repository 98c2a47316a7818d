//! Fuzz target for decoding raw YOLOv8 output tensors.
//!
//! The first byte picks the attribute row count; the rest is read as
//! little-endian f32 values, so NaN, infinities and negative sizes all show up.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vocprep::detect::fuzz_decode_predictions;

fuzz_target!(|data: &[u8]| {
    let Some((&rows, rest)) = data.split_first() else {
        return;
    };
    if rest.len() > 1024 * 1024 {
        return;
    }

    let values: Vec<f32> = rest
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let _ = fuzz_decode_predictions(&values, usize::from(rows % 16));
});
