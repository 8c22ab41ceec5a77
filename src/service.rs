//! Dataset service: browse, size and read across a collection.
//!
//! The service binds a [`ClientFactory`] to one root address and
//! credential, and is the entry point for everything that works with more
//! than one dataset at a time.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         DatasetService                           │
//! │                                                                  │
//! │  browse()         → BrowseResult (uris, cumulative counts)       │
//! │  size_datasets()  → collection with placeholder counts resolved  │
//! │  read_flat()                                                     │
//! │    1. group flat indexes by dataset                              │
//! │    2. one TiledDataset read per dataset (concurrent)             │
//! │    3. reassemble items in request order                          │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//!                                 ▼
//!                   ClientFactory::connect(root, api_key)
//! ```

use std::sync::Arc;

use futures::future::try_join_all;
use ndarray::{ArrayD, Axis};
use tracing::debug;

use crate::client::{ArrayNodeClient, ClientFactory};
use crate::dataset::{
    BrowseOptions, BrowseResult, DatasetCollection, ReadRequest, ReadResponse, TiledDataset,
};
use crate::error::DatasetError;
use crate::transform::ExportedImage;

// =============================================================================
// Flat Read Items
// =============================================================================

/// Data of one item of a flat read.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemData {
    /// Only the address was requested.
    UriOnly,
    /// The untransformed image.
    Raw(ArrayD<f64>),
    /// The exported image.
    Image(ExportedImage),
}

/// One image of a flat read, in the position it was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatItem {
    /// Index across the whole collection.
    pub flat_index: usize,
    /// Path of the owning dataset.
    pub dataset: String,
    /// Index within the owning dataset.
    pub local_index: usize,
    /// Address of the image.
    pub uri: String,
    pub data: ItemData,
}

// =============================================================================
// Dataset Service
// =============================================================================

/// Entry point for multi-dataset operations against one root.
#[derive(Debug, Clone)]
pub struct DatasetService {
    factory: ClientFactory,
    root_uri: String,
    api_key: Option<String>,
}

impl DatasetService {
    pub fn new(
        factory: ClientFactory,
        root_uri: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            factory,
            root_uri: root_uri.into(),
            api_key,
        }
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    fn client(&self) -> Result<Arc<dyn ArrayNodeClient>, DatasetError> {
        Ok(self
            .factory
            .connect(&self.root_uri, self.api_key.as_deref())?)
    }

    /// Find datasets below the root.
    pub async fn browse(&self, options: &BrowseOptions) -> Result<BrowseResult, DatasetError> {
        TiledDataset::browse_with_client(self.client()?, options).await
    }

    /// Browse and size every dataset found, even in discovery mode.
    pub async fn browse_sized(
        &self,
        options: &BrowseOptions,
    ) -> Result<DatasetCollection, DatasetError> {
        let mut collection = self.browse(options).await?.into_collection()?;
        if !options.is_explicit() {
            self.size_datasets(&mut collection).await?;
        }
        Ok(collection)
    }

    /// Replace the counts of `collection` with the current sizes of its
    /// datasets.
    ///
    /// Discovery reports every dataset with a count of 0; this resolves
    /// those placeholders. Sizing is all or nothing: on error the
    /// collection is left untouched.
    pub async fn size_datasets(
        &self,
        collection: &mut DatasetCollection,
    ) -> Result<(), DatasetError> {
        let client = self.client()?;
        let uris: Vec<String> = collection.datasets().iter().map(|d| d.uri.clone()).collect();
        let counts = TiledDataset::cumulative_counts(client.as_ref(), &uris).await?;

        debug!(
            datasets = uris.len(),
            total = counts.last().copied().unwrap_or(0),
            "Sized datasets"
        );
        *collection = DatasetCollection::from_browse(uris, counts)?;
        Ok(())
    }

    /// Read one dataset.
    pub async fn read(
        &self,
        dataset: &TiledDataset,
        request: &ReadRequest,
    ) -> Result<ReadResponse, DatasetError> {
        dataset
            .read_with_client(self.client()?.as_ref(), request)
            .await
    }

    /// Read images by flat index across `collection`.
    ///
    /// The indexes of `request` are ignored; everything else applies to
    /// every dataset read. Items come back in the order of `flat_indexes`,
    /// duplicates included. Each dataset is read once, with its distinct
    /// local indexes in first-appearance order.
    pub async fn read_flat(
        &self,
        collection: &DatasetCollection,
        flat_indexes: &[usize],
        request: &ReadRequest,
    ) -> Result<Vec<FlatItem>, DatasetError> {
        let groups = collection.group(flat_indexes)?;
        let client = self.client()?;

        let plans: Vec<(usize, Vec<usize>)> = groups
            .into_iter()
            .map(|(position, locals)| (position, distinct(locals)))
            .collect();

        debug!(
            requested = flat_indexes.len(),
            datasets = plans.len(),
            "Reading flat indexes"
        );

        let responses = try_join_all(plans.iter().map(|(position, locals)| {
            let client = Arc::clone(&client);
            let dataset = TiledDataset::from(collection.datasets()[*position].clone());
            let request = ReadRequest {
                indexes: locals.clone(),
                ..request.clone()
            };
            async move { dataset.read_with_client(client.as_ref(), &request).await }
        }))
        .await?;

        flat_indexes
            .iter()
            .map(|&flat_index| {
                let (position, local_index) = collection.locate(flat_index)?;
                let slot = plans
                    .iter()
                    .position(|(p, _)| *p == position)
                    .ok_or(DatasetError::IndexOutOfRange {
                        index: flat_index,
                        count: collection.total_count(),
                    })?;
                let entry = plans[slot]
                    .1
                    .iter()
                    .position(|&l| l == local_index)
                    .unwrap_or(0);
                let dataset = collection.datasets()[position].uri.clone();
                Ok(item(flat_index, dataset, local_index, &responses[slot], entry))
            })
            .collect()
    }
}

/// Distinct values in first-appearance order.
fn distinct(values: Vec<usize>) -> Vec<usize> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

/// Pick entry `entry` out of a dataset response.
///
/// Responses holding a single entry (one 2-D image, or a single shared
/// address) serve every local index.
fn item(
    flat_index: usize,
    dataset: String,
    local_index: usize,
    response: &ReadResponse,
    entry: usize,
) -> FlatItem {
    let pick = |len: usize| if entry < len { entry } else { 0 };
    let uris = response.uris();
    let uri = uris.get(pick(uris.len())).cloned().unwrap_or_default();

    let data = match response {
        ReadResponse::Uris(_) => ItemData::UriOnly,
        ReadResponse::Raw { block, .. } => {
            let k = pick(block.len_of(Axis(0)));
            ItemData::Raw(block.index_axis(Axis(0), k).to_owned())
        }
        ReadResponse::Images { images, .. } => ItemData::Image(images[pick(images.len())].clone()),
    };

    FlatItem {
        flat_index,
        dataset,
        local_index,
        uri,
        data,
    }
}
