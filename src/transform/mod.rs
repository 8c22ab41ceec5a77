//! Image transform pipeline.
//!
//! Pure functions that turn raw array samples into images fit for display
//! or export. Nothing here touches the network or holds state.
//!
//! # Components
//!
//! - [`transform`]: runs the whole pipeline for one image
//! - [`TransformParams`]: log scaling, resizing, percentiles and export format
//! - [`ExportedImage`]: base64 PNG data URI or in-memory image
//! - [`normalize`]: log scaling, percentile bounds, 8-bit rescaling
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use tiled_explorer::transform::{transform, TransformParams};
//!
//! let image = Array2::from_shape_fn((64, 64), |(y, x)| (x * y) as f64).into_dyn();
//! let exported = transform(image.view(), &TransformParams::default()).unwrap();
//! assert!(exported.as_base64().unwrap().starts_with("data:image/png;base64,"));
//! ```

mod encoder;
pub mod normalize;
mod pipeline;

pub use encoder::{encode_png_base64, to_dynamic_image, ImageLayout, PNG_DATA_URI_PREFIX};
pub use pipeline::{
    transform, ExportFormat, ExportedImage, TransformParams, DEFAULT_PERCENTILES, RESIZE_EDGE,
};
