//! Pixel-space geometry shared by the canvas builder, detector and writer.
//!
//! Detectors report floating-point boxes; everything downstream of detection
//! works with [`BoundingBox`], which is integral and always clamped to the
//! raster it describes.

mod bbox;

pub use bbox::BoundingBox;
