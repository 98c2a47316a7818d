//! Run configuration for the annotation pipeline.
//!
//! A [`PipelineConfig`] is assembled once per run: defaults, then an optional
//! YAML or JSON file, then command-line overrides. It is never mutated while
//! images are being processed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detect::DetectionQuery;
use crate::error::VocprepError;

/// COCO class index for "person", the class the original dataset targets.
pub const DEFAULT_CLASS_ID: u32 = 0;
pub const DEFAULT_TARGET_SIZE: u32 = 512;
pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;
pub const DEFAULT_MODEL: &str = "yolov8x.onnx";

/// Compute device requested for inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

/// Solid RGB fill used for padding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BorderColor(pub [u8; 3]);

impl BorderColor {
    pub const BLACK: BorderColor = BorderColor([0, 0, 0]);

    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb(self.0)
    }
}

impl FromStr for BorderColor {
    type Err = VocprepError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "black" => return Ok(BorderColor([0, 0, 0])),
            "white" => return Ok(BorderColor([255, 255, 255])),
            "gray" | "grey" => return Ok(BorderColor([128, 128, 128])),
            _ => {}
        }

        if let Some(hex) = trimmed.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(VocprepError::InvalidColor(raw.to_string()));
            }
            let mut rgb = [0u8; 3];
            for (idx, channel) in rgb.iter_mut().enumerate() {
                *channel = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16)
                    .map_err(|_| VocprepError::InvalidColor(raw.to_string()))?;
            }
            return Ok(BorderColor(rgb));
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(VocprepError::InvalidColor(raw.to_string()));
        }
        let mut rgb = [0u8; 3];
        for (channel, part) in rgb.iter_mut().zip(parts) {
            *channel = part
                .parse::<u8>()
                .map_err(|_| VocprepError::InvalidColor(raw.to_string()))?;
        }
        Ok(BorderColor(rgb))
    }
}

impl TryFrom<String> for BorderColor {
    type Error = VocprepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BorderColor> for String {
    fn from(color: BorderColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for BorderColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// Static parameters for one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Path to the YOLOv8 ONNX export.
    pub model: PathBuf,
    pub device: Device,
    /// Side length of the square output images.
    pub target_size: u32,
    pub border_color: BorderColor,
    /// Remove the source image when it is rejected for having no detections.
    pub delete_original: bool,
    /// Confidence threshold for the final annotation pass.
    pub confidence: f32,
    /// Confidence threshold for the detection that centers tall-image crops.
    pub centering_confidence: f32,
    /// Detector class index to annotate.
    pub class_id: u32,
    /// Square model input resolution.
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from(DEFAULT_MODEL),
            device: Device::Cpu,
            target_size: DEFAULT_TARGET_SIZE,
            border_color: BorderColor::BLACK,
            delete_original: false,
            confidence: DEFAULT_CONFIDENCE,
            centering_confidence: DEFAULT_CONFIDENCE,
            class_id: DEFAULT_CLASS_ID,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl PipelineConfig {
    /// Load a config file, choosing YAML or JSON by extension.
    ///
    /// Ranges are not checked here; call [`PipelineConfig::validate`] once
    /// command-line overrides have been applied.
    pub fn from_file(path: &Path) -> Result<Self, VocprepError> {
        let data = fs::read_to_string(path).map_err(VocprepError::Io)?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config: PipelineConfig = match ext.as_str() {
            "json" => serde_json::from_str(&data).map_err(|source| VocprepError::ConfigParse {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&data).map_err(|source| VocprepError::ConfigParse {
                    path: path.to_path_buf(),
                    message: source.to_string(),
                })?
            }
            other => {
                return Err(VocprepError::ConfigParse {
                    path: path.to_path_buf(),
                    message: format!("unsupported config extension '{other}' (use .yaml, .yml or .json)"),
                })
            }
        };

        Ok(config)
    }

    /// Check ranges that the pipeline relies on.
    pub fn validate(&self) -> Result<(), VocprepError> {
        if self.target_size == 0 {
            return Err(VocprepError::InvalidConfig(
                "target_size must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("confidence", self.confidence),
            ("centering_confidence", self.centering_confidence),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(VocprepError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(VocprepError::InvalidConfig(format!(
                "iou_threshold must be in [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(VocprepError::InvalidConfig(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if self.max_detections == 0 {
            return Err(VocprepError::InvalidConfig(
                "max_detections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Query used for the final annotation pass.
    pub fn annotation_query(&self) -> DetectionQuery {
        DetectionQuery {
            class_id: self.class_id,
            confidence: self.confidence,
        }
    }

    /// Query used while choosing the crop window of tall images.
    pub fn centering_query(&self) -> DetectionQuery {
        DetectionQuery {
            class_id: self.class_id,
            confidence: self.centering_confidence,
        }
    }
}
