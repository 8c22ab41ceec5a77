use thiserror::Error;

/// Errors reported by an array store client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No node exists at the requested path
    #[error("Node not found: {0}")]
    NotFound(String),

    /// The credential does not grant access to the node
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The node exists but is not of the expected kind (array vs. container)
    #[error("Type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    /// Selection index exceeds the extent of an axis
    #[error("Index {index} out of range for axis {axis} with length {len}")]
    IndexOutOfRange { axis: usize, index: usize, len: usize },

    /// Selection does not fit the array it is applied to
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success HTTP status not covered by a more specific variant
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Root address could not be parsed
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl ClientError {
    /// Whether this error means the checked path simply does not hold a
    /// readable node, as opposed to the store being unreachable.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound(_)
                | ClientError::PermissionDenied(_)
                | ClientError::TypeMismatch { .. }
        )
    }
}

/// Errors from the image transform pipeline.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Percentile pair outside `0 <= low < high <= 100`
    #[error("Invalid percentiles ({low}, {high}): expected 0 <= low < high <= 100")]
    InvalidPercentiles { low: f64, high: f64 },

    /// Image holds no finite sample to normalize against
    #[error("Image has no finite samples")]
    EmptyImage,

    /// Array cannot be interpreted as a grayscale, RGB or RGBA image
    #[error("Unsupported image shape {shape:?}")]
    UnsupportedShape { shape: Vec<usize> },

    /// Image codec failure
    #[error("Encode error: {message}")]
    Encode { message: String },
}

/// Errors raised while browsing or reading datasets.
#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    /// Remote lookup of a dataset node failed
    #[error("Dataset node not found: {path}")]
    NodeNotFound { path: String },

    /// A node that must hold array data is a container
    #[error("Node is not an array: {path}")]
    NotAnArray { path: String },

    /// Flat or local index outside the addressable range
    #[error("Index {index} out of range (count is {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Array rank other than 2, 3 or 4
    #[error("Unexpected array shape {shape:?}: expected 2, 3 or 4 dimensions")]
    ShapeMismatch { shape: Vec<usize> },

    /// Transform of one image in a batch failed
    #[error("Transform failed for image {position}: {source}")]
    Transform {
        position: usize,
        #[source]
        source: TransformError,
    },

    /// Slice URI carries a non-numeric index
    #[error("Invalid dataset URI: {0}")]
    InvalidUri(String),

    /// Dataset record is missing a field or holds a value of the wrong type
    #[error("Invalid dataset record: {0}")]
    InvalidRecord(String),

    /// Cumulative counts do not line up with the dataset list
    #[error("Invalid cumulative counts: {0}")]
    InvalidCounts(String),

    /// Error from the array store client
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// A worker task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl DatasetError {
    /// Lift a client error raised while resolving `path`, keeping lookup
    /// failures distinguishable from other client errors.
    pub fn from_lookup(path: &str, err: ClientError) -> Self {
        match err {
            ClientError::NotFound(_) => DatasetError::NodeNotFound {
                path: path.to_string(),
            },
            other => DatasetError::Client(other),
        }
    }
}

impl From<tokio::task::JoinError> for DatasetError {
    fn from(err: tokio::task::JoinError) -> Self {
        DatasetError::Task(err.to_string())
    }
}
