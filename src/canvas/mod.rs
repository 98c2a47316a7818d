//! Square canvas normalization.
//!
//! Every image is brought to a `target_size x target_size` canvas. Content is
//! padded with the border color rather than cropped, except for portrait
//! images: those are first widened by half their deficit, then cropped
//! vertically around the detected objects (or the geometric middle when
//! nothing is found).

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;
use serde::Serialize;

use crate::config::{BorderColor, PipelineConfig};
use crate::detect::{detect_boxes, DetectionQuery, Detector};
use crate::error::VocprepError;
use crate::geometry::BoundingBox;
use crate::raster::{save_raster, Raster};

/// Filter used for the final resize.
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Border widths, in pixels, added around an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Padding {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Padding {
    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Square crop window anchored at `(x, y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

/// Horizontal padding applied to each side of a portrait image before detection.
pub fn tall_side_padding(width: u32, height: u32) -> u32 {
    height.saturating_sub(width) / 4
}

/// Vertical center of the union of `boxes`, or `height / 2` when empty.
pub fn vertical_center(boxes: &[BoundingBox], height: u32) -> u32 {
    let top = boxes.iter().map(|bbox| bbox.ymin).min();
    let bottom = boxes.iter().map(|bbox| bbox.ymax).max();
    match (top, bottom) {
        (Some(top), Some(bottom)) => (top + bottom) / 2,
        _ => height / 2,
    }
}

/// Pick the square window of a portrait image (`width <= height`).
///
/// The window spans the full width and is centered on the boxes' vertical
/// center, shifted as needed to stay inside `[0, height]`.
pub fn plan_tall_crop(width: u32, height: u32, boxes: &[BoundingBox]) -> CropWindow {
    let size = width.min(height);
    let center = i64::from(vertical_center(boxes, height));
    let max_top = i64::from(height - size);
    let top = (center - i64::from(size / 2)).clamp(0, max_top);
    CropWindow {
        x: 0,
        // Bounded by `height - size`.
        y: top as u32,
        size,
    }
}

/// Padding that makes a `width x height` image square.
///
/// The shorter axis is padded; an odd remainder goes on the trailing side.
pub fn plan_square_padding(width: u32, height: u32) -> Padding {
    let diff = width.abs_diff(height);
    let leading = diff / 2;
    let trailing = diff - leading;
    if width < height {
        Padding {
            left: leading,
            right: trailing,
            ..Padding::default()
        }
    } else {
        Padding {
            top: leading,
            bottom: trailing,
            ..Padding::default()
        }
    }
}

/// Copy `image` onto a larger canvas filled with `color`.
pub fn pad_raster(image: &RgbImage, padding: Padding, color: BorderColor) -> RgbImage {
    let width = image.width() + padding.left + padding.right;
    let height = image.height() + padding.top + padding.bottom;
    let mut canvas = RgbImage::from_pixel(width, height, color.to_rgb());
    imageops::replace(
        &mut canvas,
        image,
        i64::from(padding.left),
        i64::from(padding.top),
    );
    canvas
}

/// Cut `window` out of `image`.
pub fn crop_raster(image: &RgbImage, window: CropWindow) -> RgbImage {
    imageops::crop_imm(image, window.x, window.y, window.size, window.size).to_image()
}

/// Path of the processed copy: `<stem>_sq<SIZE>.<ext>` beside `source`.
pub fn square_output_path(source: &Path, size: u32) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{stem}_sq{size}.{}", ext.to_string_lossy()),
        None => format!("{stem}_sq{size}"),
    };
    source.with_file_name(file_name)
}

/// Returns true if `path` looks like an output of [`square_output_path`].
pub fn is_square_output(path: &Path, size: u32) -> bool {
    let suffix = format!("_sq{size}");
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(&suffix))
}

/// What the builder did to reach the square canvas.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CanvasTrace {
    /// Side padding added before the portrait crop.
    pub side_padding: u32,
    /// Boxes found while centering the portrait crop.
    pub centering_boxes: usize,
    pub tall_crop: Option<CropWindow>,
    pub square_padding: Option<Padding>,
    /// Source-side length before the final resize, if one happened.
    pub resized_from: Option<u32>,
}

/// A square image and the steps that produced it.
#[derive(Clone, Debug)]
pub struct SquareCanvas {
    pub image: RgbImage,
    pub trace: CanvasTrace,
}

/// A square canvas written to disk.
#[derive(Clone, Debug)]
pub struct SquareOutput {
    pub path: PathBuf,
    pub canvas: SquareCanvas,
}

/// Builds fixed-size square canvases.
#[derive(Clone, Debug)]
pub struct SquareCanvasBuilder {
    pub target_size: u32,
    pub border_color: BorderColor,
    pub centering_query: DetectionQuery,
}

impl SquareCanvasBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            target_size: config.target_size,
            border_color: config.border_color,
            centering_query: config.centering_query(),
        }
    }

    /// Normalize an upright image to the target square.
    ///
    /// `detector` is only consulted for images taller than wide.
    pub fn build(
        &self,
        image: &RgbImage,
        detector: &dyn Detector,
    ) -> Result<SquareCanvas, VocprepError> {
        let mut trace = CanvasTrace::default();
        let (width, height) = image.dimensions();
        let mut current = image.clone();

        if height > width {
            let side = tall_side_padding(width, height);
            if side > 0 {
                current = pad_raster(
                    &current,
                    Padding {
                        left: side,
                        right: side,
                        ..Padding::default()
                    },
                    self.border_color,
                );
            }
            let boxes = detect_boxes(detector, &current, &self.centering_query)?;
            let window = plan_tall_crop(current.width(), current.height(), &boxes);
            debug!(
                "Portrait {}x{}: side padding {}, {} centering box(es), crop at y={} size {}",
                width,
                height,
                side,
                boxes.len(),
                window.y,
                window.size
            );
            current = crop_raster(&current, window);
            trace.side_padding = side;
            trace.centering_boxes = boxes.len();
            trace.tall_crop = Some(window);
        }

        let (width, height) = current.dimensions();
        if width != height {
            let padding = plan_square_padding(width, height);
            current = pad_raster(&current, padding, self.border_color);
            trace.square_padding = Some(padding);
        }

        let side = current.width();
        if side != self.target_size {
            current = imageops::resize(&current, self.target_size, self.target_size, RESIZE_FILTER);
            trace.resized_from = Some(side);
        }

        Ok(SquareCanvas {
            image: current,
            trace,
        })
    }

    /// Build the canvas for `raster` and save it beside the source file.
    pub fn build_and_save(
        &self,
        raster: &Raster,
        detector: &dyn Detector,
    ) -> Result<SquareOutput, VocprepError> {
        let canvas = self.build(&raster.image, detector)?;
        let path = square_output_path(&raster.path, self.target_size);
        save_raster(&canvas.image, &path, raster.format)?;
        debug!("Saved {} -> {}", raster.path.display(), path.display());
        Ok(SquareOutput { path, canvas })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use image::Rgb;

    use crate::detect::Detection;
    use crate::raster::RasterFormat;

    /// Records every call and returns a fixed answer.
    struct Recording {
        answer: Vec<Detection>,
        calls: RefCell<Vec<(u32, u32)>>,
    }

    impl Recording {
        fn new(answer: Vec<Detection>) -> Self {
            Self {
                answer,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Detector for Recording {
        fn detect(
            &self,
            image: &RgbImage,
            _query: &DetectionQuery,
        ) -> Result<Vec<Detection>, VocprepError> {
            self.calls.borrow_mut().push(image.dimensions());
            Ok(self.answer.clone())
        }
    }

    fn person(ymin: f32, ymax: f32) -> Detection {
        Detection {
            class_id: 0,
            score: 0.9,
            xmin: 10.0,
            ymin,
            xmax: 50.0,
            ymax,
        }
    }

    fn builder(target_size: u32) -> SquareCanvasBuilder {
        SquareCanvasBuilder::new(&PipelineConfig {
            target_size,
            ..Default::default()
        })
    }

    #[test]
    fn tall_crop_centers_on_detections() {
        let boxes = [BoundingBox::clamped(0, 100, 10, 200, 400, 500)];
        let window = plan_tall_crop(400, 500, &boxes);
        assert_eq!(
            window,
            CropWindow {
                x: 0,
                y: 0,
                size: 400
            }
        );
    }

    #[test]
    fn tall_crop_falls_back_to_middle() {
        let window = plan_tall_crop(100, 400, &[]);
        assert_eq!(window.y, 150);
        assert_eq!(window.size, 100);
    }

    #[test]
    fn tall_crop_clamps_to_bottom_edge() {
        let boxes = [BoundingBox::clamped(0, 380, 10, 400, 100, 400)];
        let window = plan_tall_crop(100, 400, &boxes);
        assert_eq!(window.y, 300);
    }

    #[test]
    fn vertical_center_spans_union_of_boxes() {
        let boxes = [
            BoundingBox::clamped(0, 40, 1, 60, 100, 300),
            BoundingBox::clamped(0, 100, 1, 241, 100, 300),
        ];
        assert_eq!(vertical_center(&boxes, 300), 140);
    }

    #[test]
    fn square_padding_puts_odd_pixel_on_trailing_side() {
        assert_eq!(
            plan_square_padding(10, 15),
            Padding {
                left: 2,
                right: 3,
                top: 0,
                bottom: 0
            }
        );
        assert_eq!(
            plan_square_padding(21, 10),
            Padding {
                left: 0,
                right: 0,
                top: 5,
                bottom: 6
            }
        );
        assert!(plan_square_padding(8, 8).is_zero());
    }

    #[test]
    fn pad_raster_fills_border_and_keeps_content() {
        let image = RgbImage::from_pixel(2, 2, Rgb([9, 9, 9]));
        let padded = pad_raster(
            &image,
            Padding {
                left: 1,
                right: 0,
                top: 0,
                bottom: 2,
            },
            BorderColor([255, 0, 0]),
        );
        assert_eq!(padded.dimensions(), (3, 4));
        assert_eq!(padded.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(padded.get_pixel(1, 0), &Rgb([9, 9, 9]));
        assert_eq!(padded.get_pixel(2, 1), &Rgb([9, 9, 9]));
        assert_eq!(padded.get_pixel(2, 3), &Rgb([255, 0, 0]));
    }

    #[test]
    fn portrait_scenario_crops_top_window() {
        let detector = Recording::new(vec![person(100.0, 200.0)]);
        let canvas = builder(512)
            .build(&RgbImage::new(300, 500), &detector)
            .expect("build");

        assert_eq!(canvas.image.dimensions(), (512, 512));
        assert_eq!(canvas.trace.side_padding, 50);
        assert_eq!(
            canvas.trace.tall_crop,
            Some(CropWindow {
                x: 0,
                y: 0,
                size: 400
            })
        );
        assert_eq!(canvas.trace.square_padding, None);
        assert_eq!(canvas.trace.resized_from, Some(400));
        assert_eq!(detector.calls.borrow().as_slice(), &[(400, 500)]);
    }

    #[test]
    fn portrait_without_detections_uses_middle() {
        let detector = Recording::new(vec![]);
        let canvas = builder(64)
            .build(&RgbImage::new(100, 420), &detector)
            .expect("build");

        // side padding 80 -> width 260, window centered on 210.
        assert_eq!(
            canvas.trace.tall_crop,
            Some(CropWindow {
                x: 0,
                y: 80,
                size: 260
            })
        );
        assert_eq!(canvas.image.dimensions(), (64, 64));
    }

    #[test]
    fn landscape_never_calls_detector() {
        let detector = Recording::new(vec![person(0.0, 10.0)]);
        let canvas = builder(32)
            .build(&RgbImage::new(90, 41), &detector)
            .expect("build");

        assert!(detector.calls.borrow().is_empty());
        assert_eq!(canvas.trace.tall_crop, None);
        assert_eq!(
            canvas.trace.square_padding,
            Some(Padding {
                left: 0,
                right: 0,
                top: 24,
                bottom: 25
            })
        );
        assert_eq!(canvas.image.dimensions(), (32, 32));
    }

    #[test]
    fn square_input_is_only_resized() {
        let detector = Recording::new(vec![]);
        let canvas = builder(16)
            .build(&RgbImage::new(40, 40), &detector)
            .expect("build");

        assert_eq!(
            canvas.trace,
            CanvasTrace {
                resized_from: Some(40),
                ..CanvasTrace::default()
            }
        );
        assert!(detector.calls.borrow().is_empty());
    }

    #[test]
    fn target_size_square_is_left_untouched() {
        let mut image = RgbImage::new(16, 16);
        image.put_pixel(3, 7, Rgb([1, 2, 3]));
        let canvas = builder(16)
            .build(&image, &Recording::new(vec![]))
            .expect("build");

        assert_eq!(canvas.trace, CanvasTrace::default());
        assert_eq!(canvas.image, image);
    }

    #[test]
    fn output_path_encodes_size() {
        assert_eq!(
            square_output_path(Path::new("data/dog/img_1.JPG"), 512),
            PathBuf::from("data/dog/img_1_sq512.JPG")
        );
        assert!(is_square_output(Path::new("data/dog/img_1_sq512.JPG"), 512));
        assert!(!is_square_output(Path::new("data/dog/img_1_sq512.JPG"), 256));
        assert!(!is_square_output(Path::new("data/dog/img_1.JPG"), 512));
    }

    #[test]
    fn build_and_save_writes_beside_source() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let source = temp.path().join("cat.png");
        let raster = Raster::from_image(&source, RasterFormat::Png, RgbImage::new(30, 20));

        let output = builder(24)
            .build_and_save(&raster, &Recording::new(vec![]))
            .expect("build and save");
        assert_eq!(output.path, temp.path().join("cat_sq24.png"));
        let reloaded = image::open(&output.path).expect("reopen");
        assert_eq!((reloaded.width(), reloaded.height()), (24, 24));
    }
}
