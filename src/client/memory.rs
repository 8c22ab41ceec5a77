use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ndarray::ArrayD;

use super::node_client::{normalize_path, ArrayNodeClient, AxisSelection, Node};
use super::selection::apply_selection;
use crate::error::ClientError;

/// URI scheme used for node addresses of an in-memory store.
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
enum MemoryNode {
    Array(Arc<ArrayD<f64>>),
    Container(Vec<String>),
}

/// In-process array store.
///
/// Holds a tree of containers and arrays with the same lookup and slicing
/// semantics as a remote store. Used as a fixture in tests and as a pinned
/// client when no server is available. Intermediate containers are created
/// on insert; children are listed in insertion order.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    nodes: HashMap<String, MemoryNode>,
}

impl MemoryStore {
    /// Create an empty store holding only the root container.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(String::new(), MemoryNode::Container(Vec::new()));
        Self { nodes }
    }

    /// Builder form of [`insert_array`](Self::insert_array).
    pub fn with_array(mut self, path: &str, array: ArrayD<f64>) -> Self {
        self.insert_array(path, array);
        self
    }

    /// Builder form of [`insert_container`](Self::insert_container).
    pub fn with_container(mut self, path: &str) -> Self {
        self.insert_container(path);
        self
    }

    /// Insert an array at `path`, replacing whatever was there.
    pub fn insert_array(&mut self, path: &str, array: ArrayD<f64>) {
        let path = normalize_path(path);
        self.link_parents(&path);
        self.nodes.insert(path, MemoryNode::Array(Arc::new(array)));
    }

    /// Insert an empty container at `path` unless one already exists.
    pub fn insert_container(&mut self, path: &str) {
        let path = normalize_path(path);
        if matches!(self.nodes.get(&path), Some(MemoryNode::Container(_))) {
            return;
        }
        self.link_parents(&path);
        self.nodes.insert(path, MemoryNode::Container(Vec::new()));
    }

    /// Make sure every ancestor of `path` is a container listing its child.
    fn link_parents(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        let (parent, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), path.to_string()),
        };
        self.insert_container(&parent);
        if let Some(MemoryNode::Container(children)) = self.nodes.get_mut(&parent) {
            if !children.contains(&name) {
                children.push(name);
            }
        }
    }

    fn get(&self, path: &str) -> Result<(String, &MemoryNode), ClientError> {
        let path = normalize_path(path);
        match self.nodes.get(&path) {
            Some(node) => Ok((path, node)),
            None => Err(ClientError::NotFound(format!("/{}", path))),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArrayNodeClient for MemoryStore {
    async fn lookup(&self, path: &str) -> Result<Node, ClientError> {
        let (path, node) = self.get(path)?;
        Ok(match node {
            MemoryNode::Array(array) => Node::Leaf {
                shape: array.shape().to_vec(),
                uri: format!("{}{}", MEMORY_SCHEME, path),
            },
            MemoryNode::Container(children) => Node::Branch {
                children: children.clone(),
            },
        })
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, ClientError> {
        match self.get(path)? {
            (_, MemoryNode::Container(children)) => Ok(children.clone()),
            (path, MemoryNode::Array(_)) => Err(ClientError::TypeMismatch {
                path: format!("/{}", path),
                expected: "container",
            }),
        }
    }

    async fn read(
        &self,
        path: &str,
        selection: &[AxisSelection],
    ) -> Result<ArrayD<f64>, ClientError> {
        match self.get(path)? {
            (_, MemoryNode::Array(array)) => apply_selection(array, selection),
            (path, MemoryNode::Container(_)) => Err(ClientError::TypeMismatch {
                path: format!("/{}", path),
                expected: "array",
            }),
        }
    }
}
