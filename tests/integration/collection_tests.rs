//! Collection tests: flat-index translation, records and flat reads.

use serde_json::json;

use tiled_explorer::client::ClientFactory;
use tiled_explorer::dataset::{BrowseOptions, Dataset, DatasetCollection, Export, ReadRequest};
use tiled_explorer::error::DatasetError;
use tiled_explorer::service::{DatasetService, ItemData};

use super::test_utils::{layout_store, CountingClient};

fn collection_of(locals: &[usize]) -> DatasetCollection {
    let mut collection = DatasetCollection::new();
    for (i, &n) in locals.iter().enumerate() {
        collection.append(format!("/d{}", i), n);
    }
    collection
}

// =============================================================================
// Flat Index Translation
// =============================================================================

#[test]
fn test_locate_whole_range() {
    let locals = [4, 0, 1, 6];
    let collection = collection_of(&locals);

    let mut expected = Vec::new();
    for (position, &n) in locals.iter().enumerate() {
        for local in 0..n {
            expected.push((position, local));
        }
    }

    let located: Vec<(usize, usize)> = (0..collection.total_count())
        .map(|flat| collection.locate(flat).unwrap())
        .collect();
    assert_eq!(located, expected);
    assert!(matches!(
        collection.locate(11),
        Err(DatasetError::IndexOutOfRange { index: 11, count: 11 })
    ));
}

#[test]
fn test_records_from_json_file_contents() {
    let text = r#"[
        {"uri": "/A/raw", "cumulative_data_count": 5},
        {"uri": "/C/raw", "cumulative_data_count": 8}
    ]"#;
    let records: Vec<serde_json::Value> = serde_json::from_str(text).unwrap();
    let collection = DatasetCollection::from_records(&records).unwrap();

    assert_eq!(collection.datasets()[1], Dataset::new("/C/raw", 8));
    assert_eq!(collection.locate(6).unwrap(), (1, 1));
    assert_eq!(collection.to_records(), records);
}

#[test]
fn test_records_reject_decreasing_counts() {
    let records = vec![
        json!({"uri": "/a", "cumulative_data_count": 5}),
        json!({"uri": "/b", "cumulative_data_count": 2}),
    ];
    assert!(matches!(
        DatasetCollection::from_records(&records),
        Err(DatasetError::InvalidCounts(_))
    ));
}

#[test]
fn test_records_reject_malformed() {
    let records = vec![json!({"path": "/a"})];
    assert!(matches!(
        DatasetCollection::from_records(&records),
        Err(DatasetError::InvalidRecord(_))
    ));
}

// =============================================================================
// Flat Reads
// =============================================================================

#[tokio::test]
async fn test_read_flat_uris_resolve_each_dataset_once() {
    let client = CountingClient::new(layout_store());
    let service = DatasetService::new(ClientFactory::pinned(client.clone()), "memory://", None);

    let collection = service
        .browse_sized(&BrowseOptions::select(["/group"]))
        .await
        .unwrap();
    assert_eq!(collection.cumulative_counts(), vec![4, 10]);

    let lookups_before = client.lookup_count();
    let request = ReadRequest::new(Vec::<usize>::new()).uris_only();
    let items = service
        .read_flat(&collection, &[9, 0, 4, 9, 3], &request)
        .await
        .unwrap();

    let uris: Vec<&str> = items.iter().map(|item| item.uri.as_str()).collect();
    assert_eq!(
        uris,
        vec![
            "memory://group/y?slice=5",
            "memory://group/x?slice=0",
            "memory://group/y?slice=0",
            "memory://group/y?slice=5",
            "memory://group/x?slice=3",
        ]
    );
    assert!(items.iter().all(|item| item.data == ItemData::UriOnly));
    assert_eq!(client.lookup_count() - lookups_before, 2);
    assert_eq!(client.read_count(), 0);
}

#[tokio::test]
async fn test_read_flat_raw_values() {
    let service = DatasetService::new(ClientFactory::pinned(layout_store()), "memory://", None);
    let collection = service
        .browse_sized(&BrowseOptions::select(["/group/x", "/group/y"]))
        .await
        .unwrap();

    let request = ReadRequest::new(Vec::<usize>::new()).with_export(Export::Raw);
    let items = service
        .read_flat(&collection, &[4, 1], &request)
        .await
        .unwrap();

    assert_eq!((items[0].dataset.as_str(), items[0].local_index), ("/group/y", 0));
    match &items[0].data {
        // group/y starts at 100
        ItemData::Raw(image) => assert_eq!(image[[0, 0]], 100.0),
        other => panic!("expected raw data, got {:?}", other),
    }
    match &items[1].data {
        ItemData::Raw(image) => assert_eq!(image[[0, 1]], 65.0),
        other => panic!("expected raw data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_read_flat_images() {
    let service = DatasetService::new(ClientFactory::pinned(layout_store()), "memory://", None);
    let collection = service
        .browse_sized(&BrowseOptions::select(["/stack", "/single"]))
        .await
        .unwrap();

    let items = service
        .read_flat(&collection, &[5, 2], &ReadRequest::new(Vec::<usize>::new()))
        .await
        .unwrap();

    assert_eq!(items[0].uri, "memory://single");
    assert_eq!(items[1].uri, "memory://stack?slice=2");
    assert_ne!(items[0].data, items[1].data);
    for item in &items {
        match &item.data {
            ItemData::Image(image) => assert!(image.as_base64().is_some()),
            other => panic!("expected image, got {:?}", other),
        }
    }
}
