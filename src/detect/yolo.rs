//! YOLOv8 ONNX detector running on tract.
//!
//! Expects a standard Ultralytics export: one `[1, 3, S, S]` float input in
//! RGB `[0, 1]`, and one `[1, 4 + nc, N]` output of `cx, cy, w, h` followed by
//! per-class scores (the transposed `[1, N, 4 + nc]` layout is accepted too).

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::{debug, info, warn};
use tract_onnx::prelude::tract_ndarray::{Array4, ArrayView2, Axis, Ix3};
use tract_onnx::prelude::*;

use super::{non_max_suppression, Detection, DetectionQuery, Detector};
use crate::config::{Device, PipelineConfig};
use crate::error::VocprepError;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Gray used by Ultralytics when letterboxing.
pub const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// YOLOv8 detector loaded once and reused for every call.
#[derive(Debug)]
pub struct YoloDetector {
    runnable: RunnableModel,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
}

impl YoloDetector {
    /// Load and optimize the model named by `config.model`.
    ///
    /// Fails with [`VocprepError::ModelLoad`] before any image is touched.
    pub fn load(config: &PipelineConfig) -> Result<Self, VocprepError> {
        let path = config.model.as_path();
        if !path.is_file() {
            return Err(VocprepError::ModelLoad {
                path: path.to_path_buf(),
                message: "model file not found".to_string(),
            });
        }

        if config.device == Device::Cuda {
            warn!("CUDA inference requested but tract runs on CPU only; falling back to CPU.");
        }

        let runnable = load_runnable_model(path, config.input_size)?;
        info!(
            "Loaded detector {} at {}x{}",
            path.display(),
            config.input_size,
            config.input_size
        );

        Ok(Self {
            runnable,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        })
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

impl Detector for YoloDetector {
    fn detect(
        &self,
        image: &RgbImage,
        query: &DetectionQuery,
    ) -> Result<Vec<Detection>, VocprepError> {
        let (letterboxed, letterbox) = letterbox(image, self.input_size);
        let input = image_to_tensor(&letterboxed);

        let outputs = self
            .runnable
            .run(tvec!(input.into()))
            .map_err(|e| VocprepError::Detection {
                message: format!("model execution failed: {e:#}"),
            })?;
        let output = outputs.first().ok_or_else(|| VocprepError::Detection {
            message: "model produced no outputs".to_string(),
        })?;

        let view = output
            .to_array_view::<f32>()
            .map_err(|e| VocprepError::Detection {
                message: format!("model output is not f32: {e:#}"),
            })?
            .into_dimensionality::<Ix3>()
            .map_err(|_| VocprepError::Detection {
                message: format!(
                    "expected a rank-3 model output, got shape {:?}",
                    output.shape()
                ),
            })?;

        let batch = view.index_axis(Axis(0), 0);
        // Attribute rows (4 + nc) are always fewer than anchor columns.
        let predictions = if batch.nrows() <= batch.ncols() {
            batch
        } else {
            batch.reversed_axes()
        };

        let candidates = decode_predictions(predictions, &letterbox, query)?;
        let mut detections = non_max_suppression(candidates, self.iou_threshold);
        detections.truncate(self.max_detections);
        debug!(
            "Detector kept {} box(es) for class {} at confidence {}",
            detections.len(),
            query.class_id,
            query.confidence
        );
        Ok(detections)
    }
}

fn load_runnable_model(path: &Path, input_size: u32) -> Result<RunnableModel, VocprepError> {
    let load_error = |stage: &str, e: TractError| VocprepError::ModelLoad {
        path: path.to_path_buf(),
        message: format!("{stage}: {e:#}"),
    };
    let side = input_size as usize;

    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| load_error("unable to parse ONNX graph", e))?
        .with_input_fact(0, f32::fact([1, 3, side, side]).into())
        .map_err(|e| load_error("unable to set input shape", e))?
        .into_optimized()
        .map_err(|e| load_error("unable to optimize graph", e))?
        .into_runnable()
        .map_err(|e| load_error("unable to make graph runnable", e))
}

/// Mapping between a source image and its letterboxed model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    /// Compute the uniform scale and centering offsets for a square input.
    pub fn for_size(source_width: u32, source_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / source_width as f32)
            .min(input_size as f32 / source_height as f32);
        let scaled_w = scaled_extent(source_width, scale, input_size);
        let scaled_h = scaled_extent(source_height, scale, input_size);
        Self {
            scale,
            pad_x: ((input_size - scaled_w) / 2) as f32,
            pad_y: ((input_size - scaled_h) / 2) as f32,
            source_width,
            source_height,
        }
    }

    /// Map a model-space x coordinate back to the source image, clipped.
    pub fn unmap_x(&self, x: f32) -> f32 {
        ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32)
    }

    /// Map a model-space y coordinate back to the source image, clipped.
    pub fn unmap_y(&self, y: f32) -> f32 {
        ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32)
    }
}

fn scaled_extent(extent: u32, scale: f32, limit: u32) -> u32 {
    ((extent as f32 * scale).round() as u32).clamp(1, limit)
}

fn letterbox(image: &RgbImage, input_size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::for_size(width, height, input_size);
    let scaled_w = scaled_extent(width, letterbox.scale, input_size);
    let scaled_h = scaled_extent(height, letterbox.scale, input_size);

    let mut canvas = RgbImage::from_pixel(input_size, input_size, LETTERBOX_FILL);
    let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.pad_x as u32),
        i64::from(letterbox.pad_y as u32),
    );
    (canvas, letterbox)
}

fn image_to_tensor(image: &RgbImage) -> Tensor {
    let (width, height) = image.dimensions();
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    )
    .into()
}

/// Turn a `(4 + nc) x N` prediction matrix into detections for one class.
pub(crate) fn decode_predictions(
    predictions: ArrayView2<'_, f32>,
    letterbox: &Letterbox,
    query: &DetectionQuery,
) -> Result<Vec<Detection>, VocprepError> {
    let attributes = predictions.nrows();
    if attributes < 5 {
        return Err(VocprepError::Detection {
            message: format!("model output has {attributes} attribute rows; expected 4 + classes"),
        });
    }
    let class_count = attributes - 4;
    let class_row = query.class_id as usize;
    if class_row >= class_count {
        return Err(VocprepError::Detection {
            message: format!(
                "class id {} is out of range for a model with {} classes",
                query.class_id, class_count
            ),
        });
    }

    let scores = predictions.row(4 + class_row);
    let mut detections = Vec::new();
    for (anchor, &score) in scores.iter().enumerate() {
        if !score.is_finite() || score < query.confidence {
            continue;
        }
        let cx = predictions[(0, anchor)];
        let cy = predictions[(1, anchor)];
        let w = predictions[(2, anchor)];
        let h = predictions[(3, anchor)];
        if !(w > 0.0 && h > 0.0) {
            continue;
        }

        detections.push(Detection {
            class_id: query.class_id,
            score,
            xmin: letterbox.unmap_x(cx - w / 2.0),
            ymin: letterbox.unmap_y(cy - h / 2.0),
            xmax: letterbox.unmap_x(cx + w / 2.0),
            ymax: letterbox.unmap_y(cy + h / 2.0),
        });
    }
    Ok(detections)
}

/// Fuzz-only entrypoint: decode a flat `(4 + nc) x N` buffer for class 0.
#[cfg(feature = "fuzzing")]
pub fn fuzz_decode_predictions(values: &[f32], attributes: usize) -> Result<(), VocprepError> {
    if attributes == 0 || values.len() % attributes != 0 {
        return Ok(());
    }
    let predictions = ArrayView2::from_shape((attributes, values.len() / attributes), values)
        .map_err(|e| VocprepError::Detection {
            message: format!("bad fuzz shape: {e}"),
        })?;
    let letterbox = Letterbox::for_size(64, 48, 64);
    let query = DetectionQuery {
        class_id: 0,
        confidence: 0.25,
    };
    let detections = decode_predictions(predictions, &letterbox, &query)?;
    let _ = non_max_suppression(detections, 0.45);
    Ok(())
}
