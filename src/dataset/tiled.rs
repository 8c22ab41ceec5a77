//! Datasets backed by a Tiled array store.
//!
//! [`TiledDataset`] adds two things on top of a plain [`Dataset`]:
//!
//! - **browse**: find the datasets under a root, either by expanding an
//!   explicit selection (sized eagerly) or by probing every child of the
//!   root for a sub-path (sized lazily, counts reported as 0)
//! - **read**: resolve local indexes to slice URIs, fetch the slices,
//!   and run each image through the transform pipeline
//!
//! ```text
//!            lookup once          one read per index         one blocking task per image
//! indexes ──► shape, uri ──► uris ──► [i, :, ::s, ::s] ──► stack ──► squeeze ──► transform ──► images
//!                             │                               │
//!                         just_uri                           raw
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use ndarray::{stack, ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::debug;

use super::collection::DatasetCollection;
use super::record::Dataset;
use crate::client::{join_path, ArrayNodeClient, AxisSelection, ClientFactory, Node};
use crate::error::{ClientError, DatasetError};
use crate::transform::{
    transform, ExportFormat, ExportedImage, TransformParams, DEFAULT_PERCENTILES,
};

/// Stride applied to both spatial axes when downsampling.
pub const DOWNSAMPLE_STRIDE: usize = 10;

/// Query parameter carrying the slice position in a dataset URI.
pub const SLICE_PARAM: &str = "slice=";

// =============================================================================
// Browse Types
// =============================================================================

/// What to browse below a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseOptions {
    /// Sub-path looked for below every child of the root in discovery mode.
    pub sub_uri_template: String,
    /// Explicitly selected paths. `[""]` (the default) or an empty list
    /// selects discovery mode.
    pub selected_sub_uris: Vec<String>,
}

impl BrowseOptions {
    /// Discovery of every child of the root holding `sub_uri_template`.
    pub fn discover(sub_uri_template: impl Into<String>) -> Self {
        Self {
            sub_uri_template: sub_uri_template.into(),
            ..Self::default()
        }
    }

    /// Expansion and sizing of the given paths.
    pub fn select<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sub_uri_template: String::new(),
            selected_sub_uris: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether an explicit selection was given.
    pub fn is_explicit(&self) -> bool {
        !(self.selected_sub_uris.is_empty()
            || (self.selected_sub_uris.len() == 1 && self.selected_sub_uris[0].is_empty()))
    }
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            sub_uri_template: String::new(),
            selected_sub_uris: vec![String::new()],
        }
    }
}

/// Datasets found by a browse, with their cumulative counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseResult {
    pub uris: Vec<String>,
    pub cumulative_counts: Vec<usize>,
}

impl BrowseResult {
    pub fn into_collection(self) -> Result<DatasetCollection, DatasetError> {
        DatasetCollection::from_browse(self.uris, self.cumulative_counts)
    }
}

// =============================================================================
// Read Types
// =============================================================================

/// One index or a list of indexes local to a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Indexes(pub Vec<usize>);

impl From<usize> for Indexes {
    fn from(index: usize) -> Self {
        Indexes(vec![index])
    }
}

impl From<Vec<usize>> for Indexes {
    fn from(indexes: Vec<usize>) -> Self {
        Indexes(indexes)
    }
}

impl From<&[usize]> for Indexes {
    fn from(indexes: &[usize]) -> Self {
        Indexes(indexes.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Indexes {
    fn from(indexes: [usize; N]) -> Self {
        Indexes(indexes.to_vec())
    }
}

/// How read results are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Export {
    /// PNG base64 data URIs.
    #[default]
    Base64,
    /// In-memory images.
    Image,
    /// The sliced block, untransformed.
    Raw,
}

impl Export {
    /// Pipeline format for this export, `None` for raw.
    pub fn format(self) -> Option<ExportFormat> {
        match self {
            Export::Base64 => Some(ExportFormat::Base64),
            Export::Image => Some(ExportFormat::Image),
            Export::Raw => None,
        }
    }
}

impl FromStr for Export {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("raw") {
            return Ok(Export::Raw);
        }
        match s.parse::<ExportFormat>()? {
            ExportFormat::Base64 => Ok(Export::Base64),
            ExportFormat::Image => Ok(Export::Image),
        }
    }
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format() {
            Some(format) => write!(f, "{}", format),
            None => f.write_str("raw"),
        }
    }
}

/// Parameters of a dataset read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub indexes: Vec<usize>,
    pub export: Export,
    /// Resize exported images to the pipeline canvas.
    pub resize: bool,
    /// Apply `log(1 + x)` before normalization.
    pub apply_log: bool,
    /// Take every `DOWNSAMPLE_STRIDE`-th pixel on both spatial axes.
    pub downsample: bool,
    /// Return addresses only, without fetching data.
    pub just_uri: bool,
    pub percentiles: (f64, f64),
}

impl ReadRequest {
    pub fn new(indexes: impl Into<Indexes>) -> Self {
        Self {
            indexes: indexes.into().0,
            export: Export::Base64,
            resize: true,
            apply_log: false,
            downsample: false,
            just_uri: false,
            percentiles: DEFAULT_PERCENTILES,
        }
    }

    pub fn with_export(mut self, export: Export) -> Self {
        self.export = export;
        self
    }

    pub fn with_resize(mut self, resize: bool) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_log(mut self, apply_log: bool) -> Self {
        self.apply_log = apply_log;
        self
    }

    pub fn with_downsample(mut self, downsample: bool) -> Self {
        self.downsample = downsample;
        self
    }

    pub fn with_percentiles(mut self, low: f64, high: f64) -> Self {
        self.percentiles = (low, high);
        self
    }

    pub fn uris_only(mut self) -> Self {
        self.just_uri = true;
        self
    }

    fn stride(&self) -> usize {
        if self.downsample {
            DOWNSAMPLE_STRIDE
        } else {
            1
        }
    }

    fn transform_params(&self, export: ExportFormat) -> TransformParams {
        TransformParams {
            apply_log: self.apply_log,
            resize: self.resize,
            export,
            percentiles: self.percentiles,
        }
    }
}

/// Result of a dataset read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResponse {
    /// Addresses only (`just_uri`).
    Uris(Vec<String>),
    /// Untransformed block with the batch along axis 0.
    Raw { block: ArrayD<f64>, uris: Vec<String> },
    /// One exported image per block entry, in request order.
    Images {
        images: Vec<ExportedImage>,
        uris: Vec<String>,
    },
}

impl ReadResponse {
    pub fn uris(&self) -> &[String] {
        match self {
            ReadResponse::Uris(uris)
            | ReadResponse::Raw { uris, .. }
            | ReadResponse::Images { uris, .. } => uris,
        }
    }
}

// =============================================================================
// TiledDataset
// =============================================================================

/// A [`Dataset`] whose images live on a Tiled server.
///
/// Carries no state beyond the dataset record; the client is resolved per
/// call from a [`ClientFactory`], a root address and an optional API key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TiledDataset {
    dataset: Dataset,
}

impl TiledDataset {
    pub fn new(uri: impl Into<String>, cumulative_data_count: usize) -> Self {
        Self {
            dataset: Dataset::new(uri, cumulative_data_count),
        }
    }

    pub fn uri(&self) -> &str {
        &self.dataset.uri
    }

    pub fn cumulative_data_count(&self) -> usize {
        self.dataset.cumulative_data_count
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn to_record(&self) -> serde_json::Value {
        self.dataset.to_record()
    }

    pub fn from_record(record: &serde_json::Value) -> Result<Self, DatasetError> {
        Dataset::from_record(record).map(Self::from)
    }

    /// Slice position encoded in a dataset URI; 0 when there is none.
    pub fn uri_index(uri: &str) -> Result<usize, DatasetError> {
        match uri.rsplit_once(SLICE_PARAM) {
            None => Ok(0),
            Some((_, index)) => index
                .parse()
                .map_err(|_| DatasetError::InvalidUri(uri.to_string())),
        }
    }

    // -------------------------------------------------------------------------
    // Browse
    // -------------------------------------------------------------------------

    /// Find datasets below `root_uri`.
    pub async fn browse(
        factory: &ClientFactory,
        root_uri: &str,
        api_key: Option<&str>,
        options: &BrowseOptions,
    ) -> Result<BrowseResult, DatasetError> {
        let client = factory.connect(root_uri, api_key)?;
        Self::browse_with_client(client, options).await
    }

    /// [`browse`](Self::browse) against an already resolved client.
    pub async fn browse_with_client(
        client: Arc<dyn ArrayNodeClient>,
        options: &BrowseOptions,
    ) -> Result<BrowseResult, DatasetError> {
        if options.is_explicit() {
            browse_selected(client.as_ref(), &options.selected_sub_uris).await
        } else {
            discover(client, &options.sub_uri_template).await
        }
    }

    /// Cumulative counts of `paths`, sized concurrently.
    ///
    /// Any failed lookup fails the whole call.
    pub async fn cumulative_counts(
        client: &dyn ArrayNodeClient,
        paths: &[String],
    ) -> Result<Vec<usize>, DatasetError> {
        let sizes = try_join_all(paths.iter().map(|path| node_size(client, path))).await?;
        Ok(prefix_sums(&sizes))
    }

    /// Number of images in this dataset.
    pub async fn local_count(&self, client: &dyn ArrayNodeClient) -> Result<usize, DatasetError> {
        node_size(client, self.uri()).await
    }

    // -------------------------------------------------------------------------
    // Read
    // -------------------------------------------------------------------------

    /// Read images at local `request.indexes` of this dataset.
    pub async fn read(
        &self,
        factory: &ClientFactory,
        root_uri: &str,
        api_key: Option<&str>,
        request: &ReadRequest,
    ) -> Result<ReadResponse, DatasetError> {
        let client = factory.connect(root_uri, api_key)?;
        self.read_with_client(client.as_ref(), request).await
    }

    /// [`read`](Self::read) against an already resolved client.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` / `NotAnArray` if the dataset node cannot be read
    /// - `ShapeMismatch` if the array is not 2-, 3- or 4-dimensional
    /// - `Client` with whatever the store reports for a bad index
    /// - `Transform` for the first image, in request order, that fails
    pub async fn read_with_client(
        &self,
        client: &dyn ArrayNodeClient,
        request: &ReadRequest,
    ) -> Result<ReadResponse, DatasetError> {
        let (shape, node_uri) = match client
            .lookup(self.uri())
            .await
            .map_err(|e| DatasetError::from_lookup(self.uri(), e))?
        {
            Node::Leaf { shape, uri } => (shape, uri),
            Node::Branch { .. } => {
                return Err(DatasetError::NotAnArray {
                    path: self.uri().to_string(),
                })
            }
        };

        let uris = slice_uris(&node_uri, &shape, &request.indexes);
        if request.just_uri {
            return Ok(ReadResponse::Uris(uris));
        }

        debug!(
            dataset = self.uri(),
            shape = ?shape,
            count = request.indexes.len(),
            downsample = request.downsample,
            "Reading slices"
        );
        let block = read_block(
            client,
            self.uri(),
            &shape,
            &request.indexes,
            request.stride(),
        )
        .await?;

        let format = match request.export.format() {
            Some(format) => format,
            None => return Ok(ReadResponse::Raw { block, uris }),
        };

        let params = request.transform_params(format);
        let images = transform_batch(squeeze_channel(block), params).await?;
        Ok(ReadResponse::Images { images, uris })
    }
}

impl From<Dataset> for TiledDataset {
    fn from(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Images held by an array of `shape`: 1 for a single 2-D image, otherwise
/// the extent of the leading axis.
pub fn local_count_for_shape(shape: &[usize]) -> usize {
    match shape {
        [] | [_, _] => 1,
        [leading, ..] => *leading,
    }
}

/// Addresses of the requested indexes of a node.
///
/// A stack of more than one image gets one `?slice=` URI per index; any
/// other node has a single address shared by all indexes.
pub fn slice_uris(node_uri: &str, shape: &[usize], indexes: &[usize]) -> Vec<String> {
    if shape.len() > 2 && shape[0] > 1 {
        indexes
            .iter()
            .map(|index| format!("{}?{}{}", node_uri, SLICE_PARAM, index))
            .collect()
    } else {
        vec![node_uri.to_string()]
    }
}

fn prefix_sums(sizes: &[usize]) -> Vec<usize> {
    sizes
        .iter()
        .scan(0, |running, size| {
            *running += size;
            Some(*running)
        })
        .collect()
}

async fn node_size(client: &dyn ArrayNodeClient, path: &str) -> Result<usize, DatasetError> {
    match client
        .lookup(path)
        .await
        .map_err(|e| DatasetError::from_lookup(path, e))?
    {
        Node::Leaf { shape, .. } => Ok(local_count_for_shape(&shape)),
        Node::Branch { .. } => Err(DatasetError::NotAnArray {
            path: path.to_string(),
        }),
    }
}

/// Explicit selection: keep leaves, expand branches one level, then size.
///
/// Leaves are counted from their first lookup; only expanded children are
/// looked up again.
async fn browse_selected(
    client: &dyn ArrayNodeClient,
    selected: &[String],
) -> Result<BrowseResult, DatasetError> {
    let resolved = try_join_all(selected.iter().map(|path| async move {
        match client
            .lookup(path)
            .await
            .map_err(|e| DatasetError::from_lookup(path, e))?
        {
            Node::Leaf { shape, .. } => {
                Ok::<_, DatasetError>(vec![(path.clone(), Some(local_count_for_shape(&shape)))])
            }
            Node::Branch { children } => Ok(children
                .iter()
                .map(|child| (format!("{}/{}", path.trim_end_matches('/'), child), None))
                .collect()),
        }
    }))
    .await?;
    let entries: Vec<(String, Option<usize>)> = resolved.into_iter().flatten().collect();

    debug!(selected = selected.len(), expanded = entries.len(), "Sizing selected nodes");
    let sizes = try_join_all(entries.iter().map(|(uri, known)| async move {
        match known {
            Some(count) => Ok(*count),
            None => node_size(client, uri).await,
        }
    }))
    .await?;

    Ok(BrowseResult {
        uris: entries.into_iter().map(|(uri, _)| uri).collect(),
        cumulative_counts: prefix_sums(&sizes),
    })
}

/// Discovery: check `/<child>/<template>` for every child of the root.
///
/// Paths that hold nothing are dropped; any other failure aborts the
/// browse. Results arrive in completion order.
async fn discover(
    client: Arc<dyn ArrayNodeClient>,
    template: &str,
) -> Result<BrowseResult, DatasetError> {
    let children = client
        .list_children("")
        .await
        .map_err(|e| DatasetError::from_lookup("/", e))?;

    let mut checks = JoinSet::new();
    for child in children {
        let client = Arc::clone(&client);
        let path = join_path(&child, template);
        checks.spawn(async move {
            match client.exists(&path).await {
                Ok(_) => Ok(Some(path)),
                Err(e) if e.is_absent() => {
                    debug!(path = %path, error = %e, "Not a dataset");
                    Ok(None)
                }
                Err(e) => Err::<_, ClientError>(e),
            }
        });
    }

    let mut uris = Vec::new();
    while let Some(joined) = checks.join_next().await {
        if let Some(uri) = joined?? {
            uris.push(uri);
        }
    }

    debug!(found = uris.len(), template = template, "Discovery finished");
    let cumulative_counts = vec![0; uris.len()];
    Ok(BrowseResult {
        uris,
        cumulative_counts,
    })
}

/// Selection of image `index` along the leading axis of a 3-D or 4-D array.
fn image_selection(rank: usize, index: usize, stride: usize) -> Vec<AxisSelection> {
    let mut selection = vec![AxisSelection::Index(index)];
    if rank == 4 {
        selection.push(AxisSelection::FULL);
    }
    selection.extend([AxisSelection::Strided(stride), AxisSelection::Strided(stride)]);
    selection
}

/// Fetch the requested images as one block with the batch on axis 0.
async fn read_block(
    client: &dyn ArrayNodeClient,
    path: &str,
    shape: &[usize],
    indexes: &[usize],
    stride: usize,
) -> Result<ArrayD<f64>, DatasetError> {
    let lift = |e: ClientError| DatasetError::from_lookup(path, e);

    match shape.len() {
        2 => {
            let image = client
                .read(path, &[AxisSelection::Strided(stride); 2])
                .await
                .map_err(lift)?;
            Ok(image.insert_axis(Axis(0)))
        }
        rank @ (3 | 4) => {
            let images = try_join_all(indexes.iter().map(|&index| {
                let selection = image_selection(rank, index, stride);
                async move { client.read(path, &selection).await.map_err(lift) }
            }))
            .await?;

            if images.is_empty() {
                let mut empty = vec![0];
                empty.extend(shape[1..rank - 2].iter().copied());
                empty.extend(shape[rank - 2..].iter().map(|len| len.div_ceil(stride)));
                return Ok(ArrayD::zeros(IxDyn(&empty)));
            }

            let views: Vec<ArrayViewD<'_, f64>> = images.iter().map(|image| image.view()).collect();
            stack(Axis(0), &views).map_err(|_| DatasetError::ShapeMismatch {
                shape: shape.to_vec(),
            })
        }
        _ => Err(DatasetError::ShapeMismatch {
            shape: shape.to_vec(),
        }),
    }
}

/// Drop a singleton channel axis right after the batch axis.
fn squeeze_channel(block: ArrayD<f64>) -> ArrayD<f64> {
    if block.ndim() == 4 && block.shape()[1] == 1 {
        block.index_axis_move(Axis(1), 0)
    } else {
        block
    }
}

/// Run every image of `block` through the pipeline on its own blocking
/// task and gather the results in block order.
async fn transform_batch(
    block: ArrayD<f64>,
    params: TransformParams,
) -> Result<Vec<ExportedImage>, DatasetError> {
    let handles: Vec<_> = block
        .outer_iter()
        .map(|image| {
            let image = image.to_owned();
            tokio::task::spawn_blocking(move || transform(image.view(), &params))
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(position, joined)| -> Result<ExportedImage, DatasetError> {
            joined?.map_err(|source| DatasetError::Transform { position, source })
        })
        .collect()
}
