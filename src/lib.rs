//! # tiled-explorer
//!
//! Browse and read image datasets held in a Tiled hierarchical array store.
//!
//! A dataset is one remote array holding a 2-D image, a stack of 2-D images
//! or a stack of multi-channel images. Datasets are found by browsing a root
//! path, indexed as one flat collection, and read back as display-ready
//! images or as raw samples.
//!
//! ## Features
//!
//! - **Discovery**: check every child of a root for a sub-path, or expand and
//!   size an explicit selection
//! - **Flat indexing**: address images across many datasets with one index
//! - **Concurrent reads**: per-index slice reads and per-image transforms run
//!   in parallel, results come back in request order
//! - **Transform pipeline**: log scaling, percentile clipping, resizing and
//!   PNG/base64 export
//!
//! ## Architecture
//!
//! - [`client`] - Array store clients (Tiled over HTTP, in-memory)
//! - [`transform`] - Image transform pipeline
//! - [`dataset`] - Dataset records, collections and Tiled-backed datasets
//! - [`service`] - Multi-dataset operations against one root
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust
//! use ndarray::{Array, IxDyn};
//! use tiled_explorer::{MemoryStore, ReadRequest, ReadResponse, TiledDataset};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tiled_explorer::DatasetError> {
//! let stack = Array::from_shape_fn(IxDyn(&[5, 64, 64]), |ix| (ix[1] + ix[2]) as f64);
//! let store = MemoryStore::new().with_array("scan/raw", stack);
//!
//! let dataset = TiledDataset::new("scan/raw", 5);
//! let response = dataset
//!     .read_with_client(&store, &ReadRequest::new(vec![2, 0]))
//!     .await?;
//!
//! assert_eq!(response.uris(), ["memory://scan/raw?slice=2", "memory://scan/raw?slice=0"]);
//! if let ReadResponse::Images { images, .. } = response {
//!     assert!(images[0].as_base64().unwrap().starts_with("data:image/png;base64,"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod service;
pub mod transform;

// Re-export commonly used types
pub use client::{
    ArrayNodeClient, AxisSelection, ClientFactory, MemoryStore, Node, TiledHttpClient,
};
pub use config::{BrowseConfig, Cli, Command, ConnectionConfig, LocateConfig, ReadConfig};
pub use dataset::{
    BrowseOptions, BrowseResult, Dataset, DatasetCollection, Export, ReadRequest, ReadResponse,
    TiledDataset,
};
pub use error::{ClientError, DatasetError, TransformError};
pub use service::{DatasetService, FlatItem, ItemData};
pub use transform::{transform, ExportFormat, ExportedImage, TransformParams};
