use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::node_client::ArrayNodeClient;
use super::tiled_http::TiledHttpClient;
use crate::error::ClientError;

/// Decides which client serves a root address and credential.
///
/// Bound once at startup and handed to whatever browses or reads. A pinned
/// client always wins over the address and credential of a call, which lets
/// single-tenant deployments and tests supply one pre-authenticated client
/// without any process-wide state.
#[derive(Clone)]
pub enum ClientFactory {
    /// Open a [`TiledHttpClient`] per call.
    Http {
        /// Optional per-request timeout.
        timeout: Option<Duration>,
    },
    /// Always return this client.
    Pinned(Arc<dyn ArrayNodeClient>),
}

impl ClientFactory {
    /// Factory that opens HTTP clients with no timeout.
    pub fn http() -> Self {
        ClientFactory::Http { timeout: None }
    }

    /// Factory that opens HTTP clients with a per-request timeout.
    pub fn http_with_timeout(timeout: Duration) -> Self {
        ClientFactory::Http {
            timeout: Some(timeout),
        }
    }

    /// Factory that always returns `client`.
    pub fn pinned(client: impl ArrayNodeClient + 'static) -> Self {
        ClientFactory::Pinned(Arc::new(client))
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, ClientFactory::Pinned(_))
    }

    /// Resolve the client for `root_uri` and `api_key`.
    pub fn connect(
        &self,
        root_uri: &str,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn ArrayNodeClient>, ClientError> {
        match self {
            ClientFactory::Pinned(client) => Ok(Arc::clone(client)),
            ClientFactory::Http { timeout } => Ok(Arc::new(TiledHttpClient::with_timeout(
                root_uri, api_key, *timeout,
            )?)),
        }
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::http()
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientFactory::Http { timeout } => {
                f.debug_struct("Http").field("timeout", timeout).finish()
            }
            ClientFactory::Pinned(_) => f.write_str("Pinned"),
        }
    }
}
