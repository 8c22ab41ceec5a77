//! Read tests: slice addressing, raw export, image export and error paths.

use image::GenericImageView;
use ndarray::{s, Axis};

use tiled_explorer::client::ClientFactory;
use tiled_explorer::dataset::{Export, ReadRequest, ReadResponse, TiledDataset};
use tiled_explorer::error::{ClientError, DatasetError, TransformError};
use tiled_explorer::transform::{ExportedImage, PNG_DATA_URI_PREFIX, RESIZE_EDGE};

use super::test_utils::{layout_store, patterned, ramp, CountingClient, FailingClient};

fn raw_block(response: ReadResponse) -> ndarray::ArrayD<f64> {
    match response {
        ReadResponse::Raw { block, .. } => block,
        other => panic!("expected raw block, got {:?}", other),
    }
}

fn images(response: ReadResponse) -> Vec<ExportedImage> {
    match response {
        ReadResponse::Images { images, .. } => images,
        other => panic!("expected images, got {:?}", other),
    }
}

// =============================================================================
// Addressing
// =============================================================================

#[tokio::test]
async fn test_uris_follow_request_order() {
    let store = layout_store();
    let dataset = TiledDataset::new("stack", 5);

    let response = dataset
        .read_with_client(&store, &ReadRequest::new(vec![2, 0, 4]).uris_only())
        .await
        .unwrap();

    assert_eq!(
        response,
        ReadResponse::Uris(vec![
            "memory://stack?slice=2".to_string(),
            "memory://stack?slice=0".to_string(),
            "memory://stack?slice=4".to_string(),
        ])
    );
    let indexes: Vec<usize> = response
        .uris()
        .iter()
        .map(|uri| TiledDataset::uri_index(uri).unwrap())
        .collect();
    assert_eq!(indexes, vec![2, 0, 4]);
}

#[tokio::test]
async fn test_just_uri_fetches_no_data() {
    let client = CountingClient::new(layout_store());
    let dataset = TiledDataset::new("stack", 5);

    dataset
        .read_with_client(&client, &ReadRequest::new(vec![0, 1]).uris_only())
        .await
        .unwrap();
    assert_eq!(client.lookup_count(), 1);
    assert_eq!(client.read_count(), 0);
}

#[tokio::test]
async fn test_single_image_has_one_address() {
    let store = layout_store();
    let dataset = TiledDataset::new("single", 1);

    let response = dataset
        .read_with_client(&store, &ReadRequest::new(0).uris_only())
        .await
        .unwrap();
    assert_eq!(response.uris(), ["memory://single"]);
    assert_eq!(TiledDataset::uri_index(&response.uris()[0]).unwrap(), 0);
}

// =============================================================================
// Raw Export
// =============================================================================

#[tokio::test]
async fn test_raw_equals_source_slices() {
    let source = patterned(&[5, 16, 12]);
    let store = layout_store();
    let dataset = TiledDataset::new("stack", 5);

    let request = ReadRequest::new(vec![2, 0, 4]).with_export(Export::Raw);
    let block = raw_block(dataset.read_with_client(&store, &request).await.unwrap());

    assert_eq!(block.shape(), &[3, 16, 12]);
    for (k, &index) in [2usize, 0, 4].iter().enumerate() {
        assert_eq!(block.index_axis(Axis(0), k), source.index_axis(Axis(0), index));
    }
}

#[tokio::test]
async fn test_raw_downsampled() {
    let source = patterned(&[5, 16, 12]);
    let store = layout_store();
    let dataset = TiledDataset::new("stack", 5);

    let request = ReadRequest::new(3)
        .with_export(Export::Raw)
        .with_downsample(true);
    let block = raw_block(dataset.read_with_client(&store, &request).await.unwrap());

    assert_eq!(block.shape(), &[1, 2, 2]);
    let expected = source.slice(s![3, ..;10, ..;10]);
    assert_eq!(block.index_axis(Axis(0), 0), expected.into_dyn());
}

#[tokio::test]
async fn test_raw_4d_keeps_channel_axis() {
    let store = layout_store();
    let dataset = TiledDataset::new("mono4d", 3);

    let request = ReadRequest::new(vec![1, 2]).with_export(Export::Raw);
    let block = raw_block(dataset.read_with_client(&store, &request).await.unwrap());
    assert_eq!(block.shape(), &[2, 1, 20, 30]);
}

#[tokio::test]
async fn test_raw_2d_is_one_image() {
    let source = ramp(&[16, 12], 0.0);
    let store = layout_store();
    let dataset = TiledDataset::new("single", 1);

    let request = ReadRequest::new(vec![0, 0]).with_export(Export::Raw);
    let block = raw_block(dataset.read_with_client(&store, &request).await.unwrap());
    assert_eq!(block.shape(), &[1, 16, 12]);
    assert_eq!(block.index_axis(Axis(0), 0), source.view());
}

// =============================================================================
// Image Export
// =============================================================================

#[tokio::test]
async fn test_base64_images_in_request_order() {
    let store = layout_store();
    let dataset = TiledDataset::new("stack", 5);

    let forward = images(
        dataset
            .read_with_client(&store, &ReadRequest::new(vec![1, 3]))
            .await
            .unwrap(),
    );
    let reverse = images(
        dataset
            .read_with_client(&store, &ReadRequest::new(vec![3, 1]))
            .await
            .unwrap(),
    );

    assert_eq!(forward.len(), 2);
    for image in &forward {
        assert!(image.as_base64().unwrap().starts_with(PNG_DATA_URI_PREFIX));
    }
    assert_ne!(forward[0], forward[1]);
    assert_eq!(forward[0], reverse[1]);
    assert_eq!(forward[1], reverse[0]);
}

#[tokio::test]
async fn test_image_export_sizes() {
    let store = layout_store();
    let dataset = TiledDataset::new("stack", 5);

    let resized = images(
        dataset
            .read_with_client(&store, &ReadRequest::new(0).with_export(Export::Image))
            .await
            .unwrap(),
    );
    assert_eq!(
        resized[0].as_image().unwrap().dimensions(),
        (RESIZE_EDGE, RESIZE_EDGE)
    );

    let native = images(
        dataset
            .read_with_client(
                &store,
                &ReadRequest::new(0)
                    .with_export(Export::Image)
                    .with_resize(false),
            )
            .await
            .unwrap(),
    );
    assert_eq!(native[0].as_image().unwrap().dimensions(), (12, 16));
}

#[tokio::test]
async fn test_4d_single_channel_is_squeezed_to_gray() {
    let store = layout_store();
    let dataset = TiledDataset::new("mono4d", 3);

    let request = ReadRequest::new(vec![0, 2])
        .with_export(Export::Image)
        .with_resize(false);
    let out = images(dataset.read_with_client(&store, &request).await.unwrap());

    assert_eq!(out.len(), 2);
    let gray = out[0].as_image().unwrap();
    assert!(gray.as_luma8().is_some());
    assert_eq!(gray.dimensions(), (30, 20));
}

#[tokio::test]
async fn test_4d_color_images() {
    let store = layout_store();
    let dataset = TiledDataset::new("color", 2);

    let request = ReadRequest::new(1)
        .with_export(Export::Image)
        .with_resize(false)
        .with_downsample(true);
    let out = images(dataset.read_with_client(&store, &request).await.unwrap());

    let rgb = out[0].as_image().unwrap();
    assert!(rgb.as_rgb8().is_some());
    assert_eq!(rgb.dimensions(), (3, 2));
}

#[tokio::test]
async fn test_4d_color_images_in_request_order() {
    let store = layout_store();
    let dataset = TiledDataset::new("color", 2);
    let request = |indexes: Vec<usize>| {
        ReadRequest::new(indexes)
            .with_export(Export::Image)
            .with_resize(false)
    };

    let forward = images(
        dataset
            .read_with_client(&store, &request(vec![0, 1]))
            .await
            .unwrap(),
    );
    let reverse = images(
        dataset
            .read_with_client(&store, &request(vec![1, 0]))
            .await
            .unwrap(),
    );

    let pixels = |image: &ExportedImage| image.as_image().unwrap().to_rgb8().into_raw();
    assert_ne!(pixels(&forward[0]), pixels(&forward[1]));
    assert_eq!(pixels(&forward[0]), pixels(&reverse[1]));
    assert_eq!(pixels(&forward[1]), pixels(&reverse[0]));
}

#[tokio::test]
async fn test_2d_dataset_yields_one_image() {
    let store = layout_store();
    let dataset = TiledDataset::new("single", 1);

    let response = dataset
        .read_with_client(&store, &ReadRequest::new(vec![0, 0, 0]))
        .await
        .unwrap();
    assert_eq!(response.uris().len(), 1);
    assert_eq!(images(response).len(), 1);
}

#[tokio::test]
async fn test_read_through_factory() {
    let factory = ClientFactory::pinned(layout_store());
    let dataset = TiledDataset::new("stack", 5);

    let response = dataset
        .read(&factory, "http://ignored", None, &ReadRequest::new(4))
        .await
        .unwrap();
    assert_eq!(response.uris(), ["memory://stack?slice=4"]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_dataset() {
    let store = layout_store();
    let err = TiledDataset::new("nope", 0)
        .read_with_client(&store, &ReadRequest::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::NodeNotFound { ref path } if path == "nope"));
}

#[tokio::test]
async fn test_container_is_not_an_array() {
    let store = layout_store();
    let err = TiledDataset::new("group", 0)
        .read_with_client(&store, &ReadRequest::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::NotAnArray { .. }));
}

#[tokio::test]
async fn test_index_out_of_range_reported_by_store() {
    let store = layout_store();
    let err = TiledDataset::new("stack", 5)
        .read_with_client(&store, &ReadRequest::new(vec![1, 5]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatasetError::Client(ClientError::IndexOutOfRange { index: 5, len: 5, .. })
    ));
}

#[tokio::test]
async fn test_invalid_percentiles_fail_first_image() {
    let store = layout_store();
    let request = ReadRequest::new(vec![0, 1]).with_percentiles(60.0, 40.0);
    let err = TiledDataset::new("stack", 5)
        .read_with_client(&store, &request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatasetError::Transform {
            position: 0,
            source: TransformError::InvalidPercentiles { .. }
        }
    ));
}

#[tokio::test]
async fn test_read_failure_propagates() {
    let client = FailingClient::new(layout_store())
        .failing("stack", ClientError::Http { status: 500, message: "boom".into() });
    let err = TiledDataset::new("stack", 5)
        .read_with_client(&client, &ReadRequest::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::Client(ClientError::Http { status: 500, .. })));
}
