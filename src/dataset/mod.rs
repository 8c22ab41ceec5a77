//! Datasets, collections of datasets and the Tiled-backed dataset.
//!
//! A [`Dataset`] is one remote array plus the running image count of the
//! collection it belongs to. [`DatasetCollection`] maps flat indexes over
//! all datasets back to `(dataset, local index)`, and [`TiledDataset`]
//! knows how to browse and read datasets through an array store client.

mod collection;
mod record;
mod tiled;

pub use collection::{DatasetCollection, DatasetGroups};
pub use record::Dataset;
pub use tiled::{
    local_count_for_shape, slice_uris, BrowseOptions, BrowseResult, Export, Indexes, ReadRequest,
    ReadResponse, TiledDataset, DOWNSAMPLE_STRIDE, SLICE_PARAM,
};
