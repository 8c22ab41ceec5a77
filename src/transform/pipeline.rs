//! The transform pipeline: raw samples in, display-ready image out.
//!
//! ```text
//! ArrayD<f64> ──► log(1+x)? ──► percentile clip ──► u8 ──► resize? ──► PNG/base64 | image
//! ```

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::ArrayViewD;

use super::encoder::{encode_png_base64, to_dynamic_image, ImageLayout};
use super::normalize::{log_scale, percentile_bounds, rescale_to_u8};
use crate::error::TransformError;

/// Edge length of the square canvas used when resizing.
pub const RESIZE_EDGE: u32 = 200;

/// Default percentile pair: the full sample range.
pub const DEFAULT_PERCENTILES: (f64, f64) = (0.0, 100.0);

/// Representation of an exported image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// PNG wrapped in a base64 data URI.
    #[default]
    Base64,
    /// Decoded in-memory image.
    Image,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(ExportFormat::Base64),
            "image" | "pillow" => Ok(ExportFormat::Image),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Base64 => f.write_str("base64"),
            ExportFormat::Image => f.write_str("image"),
        }
    }
}

/// An image produced by [`transform`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExportedImage {
    Base64(String),
    Image(DynamicImage),
}

impl ExportedImage {
    pub fn as_base64(&self) -> Option<&str> {
        match self {
            ExportedImage::Base64(s) => Some(s),
            ExportedImage::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&DynamicImage> {
        match self {
            ExportedImage::Base64(_) => None,
            ExportedImage::Image(image) => Some(image),
        }
    }
}

/// Parameters of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Apply `log(1 + x)` before normalization.
    pub apply_log: bool,
    /// Resample to a `RESIZE_EDGE` square.
    pub resize: bool,
    pub export: ExportFormat,
    /// Low and high percentile mapped to black and white.
    pub percentiles: (f64, f64),
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            apply_log: false,
            resize: true,
            export: ExportFormat::Base64,
            percentiles: DEFAULT_PERCENTILES,
        }
    }
}

/// Turn a 2-D (or channel-first 3-D) array into an exported image.
///
/// Deterministic and free of side effects.
///
/// # Errors
///
/// - `UnsupportedShape` if the array is not `(h, w)` or `(1|3|4, h, w)`
/// - `InvalidPercentiles` if the percentile pair is not `0 <= low < high <= 100`
/// - `EmptyImage` if no sample is finite
/// - `Encode` if PNG encoding fails
pub fn transform(
    image: ArrayViewD<'_, f64>,
    params: &TransformParams,
) -> Result<ExportedImage, TransformError> {
    let layout = ImageLayout::from_shape(image.shape())?;

    let mut samples = image.to_owned();
    if params.apply_log {
        log_scale(&mut samples);
    }

    let (low, high) = params.percentiles;
    let (lo, hi) = percentile_bounds(samples.view(), low, high)?;
    let pixels = rescale_to_u8(samples.view(), lo, hi);

    let mut img = to_dynamic_image(pixels, layout)?;
    if params.resize {
        img = img.resize_exact(RESIZE_EDGE, RESIZE_EDGE, FilterType::Triangle);
    }

    match params.export {
        ExportFormat::Base64 => Ok(ExportedImage::Base64(encode_png_base64(&img)?)),
        ExportFormat::Image => Ok(ExportedImage::Image(img)),
    }
}
