//! Browse tests: discovery, explicit selection and sizing.

use tiled_explorer::client::{ClientFactory, MemoryStore};
use tiled_explorer::dataset::{BrowseOptions, TiledDataset};
use tiled_explorer::error::{ClientError, DatasetError};
use tiled_explorer::DatasetService;

use super::test_utils::{discovery_store, layout_store, ramp, shared, CountingClient, FailingClient};

fn sorted(mut uris: Vec<String>) -> Vec<String> {
    uris.sort();
    uris
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_keeps_children_with_sub_path() {
    let result = TiledDataset::browse_with_client(
        shared(discovery_store()),
        &BrowseOptions::discover("raw"),
    )
    .await
    .unwrap();

    assert_eq!(sorted(result.uris), vec!["/A/raw", "/C/raw"]);
    assert_eq!(result.cumulative_counts, vec![0, 0]);
}

#[tokio::test]
async fn test_discovery_through_factory() {
    let factory = ClientFactory::pinned(discovery_store());
    let result = TiledDataset::browse(
        &factory,
        "http://ignored:8000/api/v1/metadata",
        Some("ignored"),
        &BrowseOptions::discover("processed"),
    )
    .await
    .unwrap();

    assert_eq!(result.uris, vec!["/B/processed"]);
}

#[tokio::test]
async fn test_discovery_drops_forbidden_children() {
    let client = FailingClient::new(discovery_store())
        .failing("A/raw", ClientError::PermissionDenied("/A/raw".into()));

    let result = TiledDataset::browse_with_client(shared(client), &BrowseOptions::discover("raw"))
        .await
        .unwrap();
    assert_eq!(result.uris, vec!["/C/raw"]);
}

#[tokio::test]
async fn test_discovery_propagates_connection_errors() {
    let client = FailingClient::new(discovery_store())
        .failing("C/raw", ClientError::Connection("connection reset".into()));

    let err = TiledDataset::browse_with_client(shared(client), &BrowseOptions::discover("raw"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::Client(ClientError::Connection(_))));
}

#[tokio::test]
async fn test_discovery_of_empty_root() {
    let result =
        TiledDataset::browse_with_client(shared(MemoryStore::new()), &BrowseOptions::default())
            .await
            .unwrap();
    assert!(result.uris.is_empty());
    assert!(result.cumulative_counts.is_empty());
}

#[tokio::test]
async fn test_discovery_with_empty_template_lists_children() {
    let result =
        TiledDataset::browse_with_client(shared(discovery_store()), &BrowseOptions::default())
            .await
            .unwrap();
    assert_eq!(sorted(result.uris), vec!["/A", "/B", "/C"]);
}

#[tokio::test]
async fn test_discovery_checks_existence_without_listing_children() {
    let client = CountingClient::new(discovery_store());
    let result = TiledDataset::browse_with_client(
        shared(client.clone()),
        &BrowseOptions::discover(""),
    )
    .await
    .unwrap();

    assert_eq!(sorted(result.uris), vec!["/A", "/B", "/C"]);
    assert_eq!(client.list_count(), 1);
    assert_eq!(client.exists_count(), 3);
    assert_eq!(client.lookup_count(), 0);
}

// =============================================================================
// Explicit Selection
// =============================================================================

#[tokio::test]
async fn test_selection_sizes_leaves_in_order() {
    let result = TiledDataset::browse_with_client(
        shared(layout_store()),
        &BrowseOptions::select(["/stack", "/single", "/color"]),
    )
    .await
    .unwrap();

    assert_eq!(result.uris, vec!["/stack", "/single", "/color"]);
    assert_eq!(result.cumulative_counts, vec![5, 6, 8]);
}

#[tokio::test]
async fn test_selection_expands_containers() {
    let result = TiledDataset::browse_with_client(
        shared(layout_store()),
        &BrowseOptions::select(["/group", "/single"]),
    )
    .await
    .unwrap();

    assert_eq!(result.uris, vec!["/group/x", "/group/y", "/single"]);
    assert_eq!(result.cumulative_counts, vec![4, 10, 11]);
}

#[tokio::test]
async fn test_selection_counts_are_monotonic() {
    let store = MemoryStore::new()
        .with_array("empty", ramp(&[0, 4, 4], 0.0))
        .with_array("one", ramp(&[1, 4, 4], 0.0))
        .with_array("many", ramp(&[7, 4, 4], 0.0));
    let result = TiledDataset::browse_with_client(
        shared(store),
        &BrowseOptions::select(["many", "empty", "one"]),
    )
    .await
    .unwrap();

    assert_eq!(result.cumulative_counts, vec![7, 7, 8]);
    assert!(result.cumulative_counts.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_selection_missing_node() {
    let err = TiledDataset::browse_with_client(
        shared(layout_store()),
        &BrowseOptions::select(["/stack", "/nope"]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DatasetError::NodeNotFound { ref path } if path == "/nope"));
}

#[tokio::test]
async fn test_selection_nested_container_is_not_an_array() {
    let store = MemoryStore::new().with_array("outer/inner/data", ramp(&[2, 4, 4], 0.0));
    let err =
        TiledDataset::browse_with_client(shared(store), &BrowseOptions::select(["/outer"]))
            .await
            .unwrap_err();
    assert!(matches!(err, DatasetError::NotAnArray { ref path } if path == "/outer/inner"));
}

#[tokio::test]
async fn test_selected_leaves_are_looked_up_once() {
    let client = CountingClient::new(layout_store());
    let result = TiledDataset::browse_with_client(
        shared(client.clone()),
        &BrowseOptions::select(["/stack", "/color"]),
    )
    .await
    .unwrap();

    assert_eq!(result.cumulative_counts, vec![5, 7]);
    assert_eq!(client.lookup_count(), 2);
    assert_eq!(client.read_count(), 0);
}

#[tokio::test]
async fn test_expanded_children_are_sized_once() {
    let client = CountingClient::new(layout_store());
    let result = TiledDataset::browse_with_client(
        shared(client.clone()),
        &BrowseOptions::select(["/group", "/stack"]),
    )
    .await
    .unwrap();

    assert_eq!(result.uris, vec!["/group/x", "/group/y", "/stack"]);
    assert_eq!(result.cumulative_counts, vec![4, 10, 15]);
    // Two selected paths, then the two expanded children.
    assert_eq!(client.lookup_count(), 4);
}

// =============================================================================
// Service Sizing
// =============================================================================

#[tokio::test]
async fn test_service_sizes_discovered_datasets() {
    let service = DatasetService::new(ClientFactory::pinned(discovery_store()), "memory://", None);

    let mut collection = service
        .browse(&BrowseOptions::discover("raw"))
        .await
        .unwrap()
        .into_collection()
        .unwrap();
    assert_eq!(collection.total_count(), 0);

    service.size_datasets(&mut collection).await.unwrap();
    assert_eq!(collection.total_count(), 8);
    for (position, dataset) in collection.datasets().iter().enumerate() {
        let expected = if dataset.uri == "/A/raw" { 5 } else { 3 };
        assert_eq!(collection.local_count(position), Some(expected));
    }
}
