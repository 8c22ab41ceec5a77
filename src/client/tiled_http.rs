use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use ndarray::{ArrayD, IxDyn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::node_client::{normalize_path, ArrayNodeClient, AxisSelection, Node};
use super::selection::{selected_shape, slice_expression};
use crate::error::ClientError;

/// Path prefix of the Tiled REST API.
pub const API_PREFIX: &str = "/api/v1";

/// Number of children requested per search page.
pub const DEFAULT_PAGE_LIMIT: usize = 300;

/// Array structures remembered per client.
pub const DEFAULT_STRUCTURE_CACHE_ENTRIES: usize = 1024;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeResource {
    attributes: NodeAttributes,
    #[serde(default)]
    links: NodeLinks,
}

#[derive(Debug, Deserialize)]
struct NodeAttributes {
    structure_family: String,
    #[serde(default)]
    structure: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeLinks {
    #[serde(rename = "self", default)]
    self_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildResource {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ArrayStructure {
    shape: Vec<usize>,
    data_type: DataType,
}

/// Element type of an array node, in NumPy's `(kind, itemsize, endianness)`
/// terms.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataType {
    pub endianness: String,
    pub kind: String,
    pub itemsize: usize,
}

impl DataType {
    fn is_big_endian(&self) -> bool {
        self.endianness == "big"
    }
}

/// Metadata of a resolved node.
enum NodeMetadata {
    Array {
        structure: ArrayStructure,
        uri: String,
    },
    Container,
}

// =============================================================================
// Client
// =============================================================================

/// Client for a Tiled server's REST API.
///
/// A root address such as `http://host:8000/api/v1/metadata/beamline/scans`
/// is split into the server base (`http://host:8000/`) and a root node path
/// (`beamline/scans`); every path handed to the client is resolved below
/// that root. An address without `/api/v1` is taken as a bare server base.
///
/// Array structures (shape and element type) seen by `lookup` are kept in
/// an LRU cache shared between clones, so reading a node that was just
/// resolved costs one data request and no extra metadata request.
#[derive(Clone)]
pub struct TiledHttpClient {
    http: reqwest::Client,
    base: Url,
    root: String,
    api_key: Option<String>,
    page_limit: usize,
    structures: Arc<Mutex<LruCache<String, ArrayStructure>>>,
}

impl TiledHttpClient {
    /// Open a client on `root_uri` with an optional API key.
    pub fn new(root_uri: &str, api_key: Option<&str>) -> Result<Self, ClientError> {
        Self::with_timeout(root_uri, api_key, None)
    }

    /// Open a client whose requests give up after `timeout`.
    pub fn with_timeout(
        root_uri: &str,
        api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Self::with_http_client(http, root_uri, api_key)
    }

    /// Open a client reusing an existing reqwest client (and its pool).
    pub fn with_http_client(
        http: reqwest::Client,
        root_uri: &str,
        api_key: Option<&str>,
    ) -> Result<Self, ClientError> {
        let (base, root) = parse_root_uri(root_uri)?;
        Ok(Self {
            http,
            base,
            root,
            api_key: api_key.map(str::to_string),
            page_limit: DEFAULT_PAGE_LIMIT,
            structures: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_STRUCTURE_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            ))),
        })
    }

    /// Set the number of children fetched per search page.
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Server base address, always ending in `/`.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Node path every request is resolved under.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Build `<base>api/v1/<route>/<root>/<path>` with each segment escaped.
    fn endpoint(&self, route: &str, path: &str) -> Result<Url, ClientError> {
        let full = normalize_path(&format!("{}/{}", self.root, path));
        let encoded = full
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let relative = format!("{}/{}/{}", API_PREFIX.trim_start_matches('/'), route, encoded);
        self.base
            .join(&relative)
            .map_err(|e| ClientError::InvalidUri(format!("{}: {}", relative, e)))
    }

    async fn get(&self, url: Url, accept: &str, path: &str) -> Result<Bytes, ClientError> {
        debug!(url = %url, "GET");

        let mut request = self.http.get(url).header(ACCEPT, accept);
        if let Some(ref key) = self.api_key {
            request = request.header(AUTHORIZATION, format!("Apikey {}", key));
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, path, body));
        }

        response.bytes().await.map_err(transport_error)
    }

    async fn metadata(&self, path: &str) -> Result<NodeMetadata, ClientError> {
        let url = self.endpoint("metadata", path)?;
        let body = self.get(url.clone(), "application/json", path).await?;
        let envelope: Envelope<NodeResource> = serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("metadata for {}: {}", path, e)))?;
        let resource = envelope.data;

        match resource.attributes.structure_family.as_str() {
            "array" => {
                let structure = resource.attributes.structure.ok_or_else(|| {
                    ClientError::InvalidResponse(format!("array {} has no structure", path))
                })?;
                let structure: ArrayStructure = serde_json::from_value(structure).map_err(|e| {
                    ClientError::InvalidResponse(format!("array structure of {}: {}", path, e))
                })?;
                let uri = resource
                    .links
                    .self_link
                    .unwrap_or_else(|| url.to_string());
                self.structures
                    .lock()
                    .await
                    .put(normalize_path(path), structure.clone());
                Ok(NodeMetadata::Array { structure, uri })
            }
            "container" => {
                self.structures.lock().await.pop(&normalize_path(path));
                Ok(NodeMetadata::Container)
            }
            // Tables, sparse arrays and the like are neither.
            _ => Err(ClientError::TypeMismatch {
                path: format!("/{}", normalize_path(path)),
                expected: "array or container",
            }),
        }
    }

    /// Structure of the array at `path`, from the cache when it was
    /// resolved before.
    async fn array_structure(&self, path: &str) -> Result<ArrayStructure, ClientError> {
        if let Some(structure) = self.structures.lock().await.get(&normalize_path(path)) {
            return Ok(structure.clone());
        }
        match self.metadata(path).await? {
            NodeMetadata::Array { structure, .. } => Ok(structure),
            NodeMetadata::Container => Err(ClientError::TypeMismatch {
                path: format!("/{}", normalize_path(path)),
                expected: "array",
            }),
        }
    }
}

#[async_trait]
impl ArrayNodeClient for TiledHttpClient {
    async fn lookup(&self, path: &str) -> Result<Node, ClientError> {
        match self.metadata(path).await? {
            NodeMetadata::Array { structure, uri } => Ok(Node::Leaf {
                shape: structure.shape,
                uri,
            }),
            NodeMetadata::Container => Ok(Node::Branch {
                children: self.list_children(path).await?,
            }),
        }
    }

    async fn exists(&self, path: &str) -> Result<(), ClientError> {
        self.metadata(path).await.map(|_| ())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let mut children = Vec::new();
        let mut offset = 0;

        loop {
            let mut url = self.endpoint("search", path)?;
            url.query_pairs_mut()
                .append_pair("page[offset]", &offset.to_string())
                .append_pair("page[limit]", &self.page_limit.to_string());

            let body = self.get(url, "application/json", path).await?;
            let page: Envelope<Vec<ChildResource>> = serde_json::from_slice(&body)
                .map_err(|e| ClientError::InvalidResponse(format!("search of {}: {}", path, e)))?;

            let received = page.data.len();
            children.extend(page.data.into_iter().map(|child| child.id));
            offset += received;

            let has_next = page.links.and_then(|links| links.next).is_some();
            if !has_next || received == 0 {
                break;
            }
        }

        Ok(children)
    }

    async fn read(
        &self,
        path: &str,
        selection: &[AxisSelection],
    ) -> Result<ArrayD<f64>, ClientError> {
        let structure = self.array_structure(path).await?;
        let out_shape = selected_shape(&structure.shape, selection)?;

        let mut url = self.endpoint("array/full", path)?;
        url.query_pairs_mut()
            .append_pair("slice", &slice_expression(selection));
        let body = self.get(url, "application/octet-stream", path).await?;

        let expected: usize = out_shape.iter().product();
        let samples = decode_samples(&body, &structure.data_type)?;
        if samples.len() != expected {
            return Err(ClientError::InvalidResponse(format!(
                "expected {} samples for shape {:?}, got {}",
                expected,
                out_shape,
                samples.len()
            )));
        }

        ArrayD::from_shape_vec(IxDyn(&out_shape), samples)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Split a root address into the server base and the root node path.
pub fn parse_root_uri(root_uri: &str) -> Result<(Url, String), ClientError> {
    let url = Url::parse(root_uri)
        .map_err(|e| ClientError::InvalidUri(format!("{}: {}", root_uri, e)))?;

    let path = url.path().to_string();
    let (base_path, node_path) = match path.find(API_PREFIX) {
        Some(pos) => {
            let rest = path[pos + API_PREFIX.len()..].trim_start_matches('/');
            // Skip the route segment (metadata, search, array/full, ...).
            let node = match rest.split_once('/') {
                Some(("array", rest)) => rest.split_once('/').map(|(_, node)| node).unwrap_or(""),
                Some((_, node)) => node,
                None => "",
            };
            (path[..pos].to_string(), node.to_string())
        }
        None => (path.clone(), String::new()),
    };

    let node_path = urlencoding::decode(&node_path)
        .map_err(|e| ClientError::InvalidUri(format!("{}: {}", root_uri, e)))?;

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.set_path(&format!("{}/", base_path.trim_end_matches('/')));

    Ok((base, normalize_path(&node_path)))
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::InvalidResponse(err.to_string())
    } else {
        ClientError::Connection(err.to_string())
    }
}

fn status_error(status: StatusCode, path: &str, body: String) -> ClientError {
    let path = format!("/{}", normalize_path(path));
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(path),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::PermissionDenied(path),
        _ => ClientError::Http {
            status: status.as_u16(),
            message: if body.is_empty() {
                path
            } else {
                format!("{}: {}", path, body)
            },
        },
    }
}

macro_rules! decode_as {
    ($bytes:expr, $ty:ty, $big:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(chunk);
                let value = if $big {
                    <$ty>::from_be_bytes(raw)
                } else {
                    <$ty>::from_le_bytes(raw)
                };
                value as f64
            })
            .collect::<Vec<f64>>()
    }};
}

/// Decode a C-ordered buffer of `data_type` elements into `f64` samples.
pub fn decode_samples(bytes: &[u8], data_type: &DataType) -> Result<Vec<f64>, ClientError> {
    if data_type.itemsize == 0 || bytes.len() % data_type.itemsize != 0 {
        return Err(ClientError::InvalidResponse(format!(
            "buffer of {} bytes is not a whole number of {}-byte items",
            bytes.len(),
            data_type.itemsize
        )));
    }

    let big = data_type.is_big_endian();
    let samples = match (data_type.kind.as_str(), data_type.itemsize) {
        ("b", 1) => bytes.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
        ("u", 1) => bytes.iter().map(|&b| f64::from(b)).collect(),
        ("u", 2) => decode_as!(bytes, u16, big),
        ("u", 4) => decode_as!(bytes, u32, big),
        ("u", 8) => decode_as!(bytes, u64, big),
        ("i", 1) => bytes.iter().map(|&b| f64::from(b as i8)).collect(),
        ("i", 2) => decode_as!(bytes, i16, big),
        ("i", 4) => decode_as!(bytes, i32, big),
        ("i", 8) => decode_as!(bytes, i64, big),
        ("f", 4) => decode_as!(bytes, f32, big),
        ("f", 8) => decode_as!(bytes, f64, big),
        (kind, itemsize) => {
            return Err(ClientError::InvalidResponse(format!(
                "unsupported data type kind={} itemsize={}",
                kind, itemsize
            )))
        }
    };
    Ok(samples)
}
