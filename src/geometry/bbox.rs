//! Integer bounding boxes clamped to a raster.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in integer pixel coordinates (xmin, ymin, xmax, ymax).
///
/// Unlike raw detector output, a `BoundingBox` is only built through
/// [`BoundingBox::clamped`] or [`BoundingBox::from_float`], so every instance
/// satisfies `0 <= xmin <= xmax <= width` and `0 <= ymin <= ymax <= height`
/// for the raster it was clamped against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl BoundingBox {
    /// Clamps signed coordinates to `[0, width] x [0, height]`.
    ///
    /// If a max coordinate ends up below its min after clamping, it is raised
    /// to the min so the box degenerates to zero extent instead of inverting.
    pub fn clamped(xmin: i64, ymin: i64, xmax: i64, ymax: i64, width: u32, height: u32) -> Self {
        let xmin = clamp_axis(xmin, width);
        let ymin = clamp_axis(ymin, height);
        let xmax = clamp_axis(xmax, width).max(xmin);
        let ymax = clamp_axis(ymax, height).max(ymin);
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Floors floating-point detector coordinates and clamps them.
    ///
    /// NaN is treated as zero; infinities saturate to the raster edges.
    pub fn from_float(xmin: f32, ymin: f32, xmax: f32, ymax: f32, width: u32, height: u32) -> Self {
        Self::clamped(
            floor_to_i64(xmin),
            floor_to_i64(ymin),
            floor_to_i64(xmax),
            floor_to_i64(ymax),
            width,
            height,
        )
    }

    /// Returns the box width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.xmax - self.xmin
    }

    /// Returns the box height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.ymax - self.ymin
    }

    /// Returns the area in square pixels.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Returns true if the box fits inside a `width x height` raster.
    #[inline]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.xmin <= self.xmax && self.ymin <= self.ymax && self.xmax <= width && self.ymax <= height
    }
}

fn clamp_axis(value: i64, limit: u32) -> u32 {
    // Bounded by `limit`, so the narrowing cast cannot truncate.
    value.clamp(0, i64::from(limit)) as u32
}

fn floor_to_i64(value: f32) -> i64 {
    if value.is_nan() {
        0
    } else {
        // Saturating cast: infinities become i64::MIN / i64::MAX.
        value.floor() as i64
    }
}
