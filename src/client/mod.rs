//! Array store clients.
//!
//! Everything above this module talks to the remote hierarchy through the
//! [`ArrayNodeClient`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TiledDataset / DatasetService     │
//! └────────────────────┬────────────────────┘
//!                      │  ClientFactory::connect(root, api_key)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        Arc<dyn ArrayNodeClient>         │
//! │  lookup · list_children · read          │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ TiledHttpClient │    │    MemoryStore      │
//! │ (REST /api/v1)  │    │ (fixtures, pinned)  │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod factory;
mod memory;
mod node_client;
pub mod selection;
mod tiled_http;

pub use factory::ClientFactory;
pub use memory::{MemoryStore, MEMORY_SCHEME};
pub use node_client::{join_path, normalize_path, ArrayNodeClient, AxisSelection, Node};
pub use tiled_http::{
    decode_samples, parse_root_uri, DataType, TiledHttpClient, API_PREFIX, DEFAULT_PAGE_LIMIT,
};
