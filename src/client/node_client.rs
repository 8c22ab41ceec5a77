use async_trait::async_trait;
use ndarray::ArrayD;

use crate::error::ClientError;

/// A node of the remote hierarchy, resolved once per lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Array node holding data.
    Leaf {
        /// Extent of each axis, leading axis first.
        shape: Vec<usize>,
        /// Address of the node as reported by the store.
        uri: String,
    },
    /// Container node holding other nodes.
    Branch {
        /// Names of the immediate children, in store order.
        children: Vec<String>,
    },
}

impl Node {
    /// Shape of a leaf node, `None` for a branch.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Node::Leaf { shape, .. } => Some(shape),
            Node::Branch { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Selection applied to one axis of an array read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelection {
    /// Pick a single position; the axis is dropped from the result.
    Index(usize),
    /// Keep the whole axis, taking every `n`-th element starting at 0.
    Strided(usize),
}

impl AxisSelection {
    /// The whole axis.
    pub const FULL: AxisSelection = AxisSelection::Strided(1);
}

/// Client for a remote hierarchical array store.
///
/// Paths are `/`-separated and relative to the root the client was opened
/// on; leading and trailing separators are ignored. Implementations must be
/// safe for concurrent read-only use, since browse and read fan out over a
/// shared `Arc<dyn ArrayNodeClient>`.
#[async_trait]
pub trait ArrayNodeClient: Send + Sync {
    /// Resolve the node at `path`.
    async fn lookup(&self, path: &str) -> Result<Node, ClientError>;

    /// Check that a node exists at `path`, without listing its children.
    ///
    /// Fails with the same errors as [`lookup`](Self::lookup). The default
    /// resolves the node in full; stores where listing a container costs
    /// extra requests override it.
    async fn exists(&self, path: &str) -> Result<(), ClientError> {
        self.lookup(path).await.map(|_| ())
    }

    /// Names of the immediate children of the container at `path`.
    ///
    /// Returns `ClientError::TypeMismatch` if `path` is an array.
    async fn list_children(&self, path: &str) -> Result<Vec<String>, ClientError>;

    /// Read the array at `path` with one selection per axis.
    ///
    /// `selection` must have exactly one entry per axis of the array.
    /// Indexed axes are dropped from the result.
    async fn read(&self, path: &str, selection: &[AxisSelection])
        -> Result<ArrayD<f64>, ClientError>;
}

/// Normalize a node path to `a/b/c` form, without surrounding separators or
/// empty segments.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join two node paths as `/<parent>/<child>`, dropping empty segments.
pub fn join_path(parent: &str, child: &str) -> String {
    let joined = normalize_path(&format!("{}/{}", parent, child));
    format!("/{}", joined)
}
