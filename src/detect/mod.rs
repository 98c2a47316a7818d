//! Detector boundary.
//!
//! The pipeline only needs "given an image and a class filter, return boxes".
//! [`Detector`] is that capability; the production implementation is
//! [`YoloDetector`], and tests substitute their own stubs. A detector is built
//! once per run and passed by reference into everything that needs it.

mod yolo;

use image::RgbImage;
use serde::Serialize;

use crate::error::VocprepError;
use crate::geometry::BoundingBox;

pub use yolo::{Letterbox, YoloDetector, LETTERBOX_FILL};

#[cfg(feature = "fuzzing")]
pub use yolo::fuzz_decode_predictions;

/// Class filter and confidence threshold for one detector call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionQuery {
    pub class_id: u32,
    pub confidence: f32,
}

/// One raw detection in the pixel space of the image that was passed in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    pub score: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0) * (self.ymax - self.ymin).max(0.0)
    }

    /// Intersection over union with another detection.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.xmin.max(other.xmin);
        let y1 = self.ymin.max(other.ymin);
        let x2 = self.xmax.min(other.xmax);
        let y2 = self.ymax.min(other.ymax);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Floor and clamp to a `width x height` raster.
    pub fn to_bbox(&self, width: u32, height: u32) -> BoundingBox {
        BoundingBox::from_float(self.xmin, self.ymin, self.xmax, self.ymax, width, height)
    }
}

/// Object detector restricted to one class per call.
///
/// Returning an empty list is the normal "nothing found" result, not an error.
pub trait Detector {
    fn detect(
        &self,
        image: &RgbImage,
        query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError>;
}

impl<D: Detector + ?Sized> Detector for &D {
    fn detect(
        &self,
        image: &RgbImage,
        query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        (**self).detect(image, query)
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &self,
        image: &RgbImage,
        query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        (**self).detect(image, query)
    }
}

/// Detector that never finds anything.
///
/// Stands in when no model is needed, e.g. squaring an image that is not
/// taller than wide.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(
        &self,
        _image: &RgbImage,
        _query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        Ok(Vec::new())
    }
}

/// Run `detector` and clamp every result to `image`'s dimensions.
///
/// Detections of other classes and below the threshold are dropped here too,
/// so callers get the same guarantees from any implementation.
pub fn detect_boxes(
    detector: &dyn Detector,
    image: &RgbImage,
    query: &DetectionQuery,
) -> Result<Vec<BoundingBox>, VocprepError> {
    let (width, height) = image.dimensions();
    Ok(detector
        .detect(image, query)?
        .into_iter()
        .filter(|det| det.class_id == query.class_id && det.score >= query.confidence)
        .map(|det| det.to_bbox(width, height))
        .collect())
}

/// Greedy non-maximum suppression over score-sorted detections.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if kept
            .iter()
            .all(|existing| detection.iou(existing) <= iou_threshold)
        {
            kept.push(detection);
        }
    }
    kept
}
