//! Image assembly and PNG export.
//!
//! # Design Decisions
//!
//! - **PNG only**: exported images are lossless so that normalized samples
//!   survive the round trip to a viewer unchanged.
//!
//! - **Data URI**: the text export is a `data:image/png;base64,` string,
//!   which carries its own media type and can be embedded in JSON or HTML
//!   as-is.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::error::TransformError;

/// Prefix of every base64 export.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Pixel layout of an array accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

impl ImageLayout {
    /// Interpret an array shape as an image.
    ///
    /// `(height, width)` is grayscale; `(channels, height, width)` with 1, 3
    /// or 4 channels is gray, RGB or RGBA.
    pub fn from_shape(shape: &[usize]) -> Result<Self, TransformError> {
        let unsupported = || TransformError::UnsupportedShape {
            shape: shape.to_vec(),
        };
        let (channels, height, width) = match *shape {
            [height, width] => (1, height, width),
            [channels @ (1 | 3 | 4), height, width] => (channels, height, width),
            _ => return Err(unsupported()),
        };
        if height == 0 || width == 0 {
            return Err(unsupported());
        }
        Ok(Self {
            width: u32::try_from(width).map_err(|_| unsupported())?,
            height: u32::try_from(height).map_err(|_| unsupported())?,
            channels,
        })
    }

    fn plane(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Build an image from 8-bit samples in channel-first, row-major order.
pub fn to_dynamic_image(
    pixels: Vec<u8>,
    layout: ImageLayout,
) -> Result<DynamicImage, TransformError> {
    let plane = layout.plane();
    if pixels.len() != plane * layout.channels {
        return Err(TransformError::Encode {
            message: format!(
                "{} samples do not fill a {}x{}x{} image",
                pixels.len(),
                layout.channels,
                layout.height,
                layout.width
            ),
        });
    }

    let buffer_error = || TransformError::Encode {
        message: "pixel buffer does not match image dimensions".to_string(),
    };
    let (width, height) = (layout.width, layout.height);

    let image = match layout.channels {
        1 => DynamicImage::ImageLuma8(
            GrayImage::from_raw(width, height, pixels).ok_or_else(buffer_error)?,
        ),
        3 => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, interleave(&pixels, 3, plane))
                .ok_or_else(buffer_error)?,
        ),
        4 => DynamicImage::ImageRgba8(
            RgbaImage::from_raw(width, height, interleave(&pixels, 4, plane))
                .ok_or_else(buffer_error)?,
        ),
        channels => {
            return Err(TransformError::UnsupportedShape {
                shape: vec![channels, height as usize, width as usize],
            })
        }
    };
    Ok(image)
}

/// Channel-first planes to channel-last pixels.
fn interleave(planar: &[u8], channels: usize, plane: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(planar.len());
    for i in 0..plane {
        for c in 0..channels {
            out.push(planar[c * plane + i]);
        }
    }
    out
}

/// Encode `image` as PNG and wrap it in a base64 data URI.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String, TransformError> {
    let mut output = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut output))
        .map_err(|e| TransformError::Encode {
            message: e.to_string(),
        })?;

    Ok(format!(
        "{}{}",
        PNG_DATA_URI_PREFIX,
        BASE64_STANDARD.encode(&output)
    ))
}
