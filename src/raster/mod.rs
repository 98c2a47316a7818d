//! Raster loading, orientation normalization and encoding.
//!
//! Only the formats in [`RasterFormat`] are accepted. Anything that fails to
//! decode surfaces as [`VocprepError::UnreadableImage`] so a dataset walk can
//! skip the file and keep going.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Pixel, Rgb, RgbImage};
use log::{debug, warn};

use crate::error::VocprepError;

/// JPEG quality used when re-encoding processed images.
pub const JPEG_QUALITY: u8 = 95;

/// Raster formats accepted as pipeline input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    /// Look up a format from a file extension, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(RasterFormat::Jpeg),
            "png" => Some(RasterFormat::Png),
            _ => None,
        }
    }

    /// Look up a format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
            RasterFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Returns true if `path` has an extension from the input allow-list.
pub fn is_supported_raster(path: &Path) -> bool {
    RasterFormat::from_path(path).is_some()
}

/// A decoded, upright RGB image together with where it came from.
#[derive(Clone, Debug)]
pub struct Raster {
    pub path: PathBuf,
    pub format: RasterFormat,
    pub image: RgbImage,
    /// EXIF orientation that was applied while loading.
    pub orientation: Orientation,
}

impl Raster {
    /// Wrap an in-memory image; used for tests and for re-running the builder.
    pub fn from_image(path: impl Into<PathBuf>, format: RasterFormat, image: RgbImage) -> Self {
        Self {
            path: path.into(),
            format,
            image,
            orientation: Orientation::NoTransforms,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channel count of the pixel buffer.
    #[inline]
    pub fn depth(&self) -> u8 {
        <Rgb<u8> as Pixel>::CHANNEL_COUNT
    }
}

/// Decode an image from disk and rotate/flip it upright.
///
/// Grayscale and alpha images are flattened to RGB.
pub fn load_raster(path: &Path) -> Result<Raster, VocprepError> {
    let format = RasterFormat::from_path(path)
        .ok_or_else(|| VocprepError::UnsupportedFormat(path.display().to_string()))?;

    let unreadable = |message: String| VocprepError::UnreadableImage {
        path: path.to_path_buf(),
        message,
    };

    let reader = ImageReader::open(path)
        .map_err(|source| unreadable(source.to_string()))?
        .with_guessed_format()
        .map_err(|source| unreadable(source.to_string()))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|source| unreadable(source.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let image = DynamicImage::from_decoder(decoder).map_err(|source| unreadable(source.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(unreadable("image has zero width or height".to_string()));
    }

    let image = normalize_orientation(image, orientation);
    debug!(
        "Loaded {} ({}x{}, orientation {:?})",
        path.display(),
        image.width(),
        image.height(),
        orientation
    );

    Ok(Raster {
        path: path.to_path_buf(),
        format,
        image: image.into_rgb8(),
        orientation,
    })
}

/// Apply stored camera orientation so pixels match the intended view.
pub fn normalize_orientation(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    if orientation != Orientation::NoTransforms {
        image.apply_orientation(orientation);
    }
    image
}

/// Encode `image` to `path` in the given format.
///
/// A failed write never leaves a truncated file behind.
pub fn save_raster(image: &RgbImage, path: &Path, format: RasterFormat) -> Result<(), VocprepError> {
    let result = encode_to_file(image, path, format);
    if result.is_err() {
        discard_partial_file(path);
    }
    result
}

fn encode_to_file(image: &RgbImage, path: &Path, format: RasterFormat) -> Result<(), VocprepError> {
    let write_error = |message: String| VocprepError::ImageWrite {
        path: path.to_path_buf(),
        message,
    };

    let file = File::create(path).map_err(VocprepError::Io)?;
    let mut writer = BufWriter::new(file);
    match format {
        RasterFormat::Jpeg => image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))
            .map_err(|source| write_error(source.to_string()))?,
        RasterFormat::Png => image
            .write_with_encoder(PngEncoder::new(&mut writer))
            .map_err(|source| write_error(source.to_string()))?,
    }
    writer.flush().map_err(VocprepError::Io)
}

/// Remove whatever a failed write left at `path`.
pub(crate) fn discard_partial_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove partial file {}: {err}", path.display()),
    }
}
