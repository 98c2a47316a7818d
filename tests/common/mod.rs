#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use vocprep::detect::{Detection, DetectionQuery, Detector};
use vocprep::raster::{save_raster, RasterFormat};
use vocprep::VocprepError;

/// Write a solid-color image, picking the encoder from the extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let format = RasterFormat::from_path(path).expect("supported extension");
    let image = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    save_raster(&image, path, format).expect("write image");
}

/// Write bytes that carry an image extension but do not decode.
pub fn write_garbage(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, b"this is not an image").expect("write garbage");
}

pub fn person(ymin: f32, ymax: f32) -> Detection {
    Detection {
        class_id: 0,
        score: 0.9,
        xmin: 4.0,
        ymin,
        xmax: 20.0,
        ymax,
    }
}

/// Stub detector that answers every call with the same detections and
/// records the size of each image it was shown.
#[derive(Default)]
pub struct StubDetector {
    pub answer: Vec<Detection>,
    pub calls: RefCell<Vec<(u32, u32)>>,
}

impl StubDetector {
    pub fn finding(answer: Vec<Detection>) -> Self {
        Self {
            answer,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Detector for StubDetector {
    fn detect(
        &self,
        image: &RgbImage,
        _query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        self.calls.borrow_mut().push(image.dimensions());
        Ok(self.answer.clone())
    }
}

/// Stub detector that always fails.
pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(
        &self,
        _image: &RgbImage,
        _query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        Err(VocprepError::Detection {
            message: "stub failure".to_string(),
        })
    }
}
