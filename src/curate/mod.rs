//! Raw-image curation that happens before annotation.
//!
//! - [`size_filter`]: drop crawled images outside a pixel-size window.
//! - [`shuffle`]: randomize file order and rename to a dense numbered sequence.

pub mod shuffle;
pub mod size_filter;

pub use shuffle::{shuffle_and_rename, ShuffleReport};
pub use size_filter::{filter_by_size, FilterReport, SizeBounds};
