//! tiled-explorer - Browse and read image datasets on a Tiled server.
//!
//! Every command prints one JSON document to stdout; logs go to stderr.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ndarray::ArrayD;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiled_explorer::{
    config::{BrowseConfig, Cli, Command, ConnectionConfig, LocateConfig, ReadConfig},
    ClientFactory, DatasetCollection, DatasetService, ReadResponse, TiledDataset,
    TiledHttpClient,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Browse(config) => run_browse(&cli.connection, config).await,
        Command::Read(config) => run_read(&cli.connection, config).await,
        Command::Locate(config) => run_locate(config).await,
    };

    let output =
        result.and_then(|value| serde_json::to_string_pretty(&value).map_err(|e| e.to_string()));
    match output {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiled_explorer=debug"
    } else {
        "tiled_explorer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Bind the client factory once, pinning a single client when a static
/// server is configured.
fn build_service(config: &ConnectionConfig) -> Result<DatasetService, String> {
    match &config.static_tiled_uri {
        Some(static_uri) => {
            info!("Using static Tiled server {}", static_uri);
            let client = TiledHttpClient::with_timeout(
                static_uri,
                config.static_api_key.as_deref(),
                config.timeout(),
            )
            .map_err(|e| e.to_string())?;
            Ok(DatasetService::new(
                ClientFactory::Pinned(Arc::new(client)),
                static_uri.clone(),
                config.static_api_key.clone(),
            ))
        }
        None => {
            debug!("Using Tiled server {}", config.tiled_uri);
            let factory = match config.timeout() {
                Some(timeout) => ClientFactory::http_with_timeout(timeout),
                None => ClientFactory::http(),
            };
            Ok(DatasetService::new(
                factory,
                config.tiled_uri.clone(),
                config.api_key.clone(),
            ))
        }
    }
}

// =============================================================================
// Browse Command
// =============================================================================

async fn run_browse(connection: &ConnectionConfig, config: BrowseConfig) -> Result<Value, String> {
    let service = build_service(connection)?;
    let options = config.options();

    let collection = if config.size {
        service
            .browse_sized(&options)
            .await
            .map_err(|e| e.to_string())?
    } else {
        service
            .browse(&options)
            .await
            .and_then(|result| result.into_collection())
            .map_err(|e| e.to_string())?
    };

    info!(
        "Found {} dataset(s), {} image(s)",
        collection.len(),
        collection.total_count()
    );
    Ok(json!({
        "uris": collection.datasets().iter().map(|d| d.uri.as_str()).collect::<Vec<_>>(),
        "cumulative_counts": collection.cumulative_counts(),
    }))
}

// =============================================================================
// Read Command
// =============================================================================

async fn run_read(connection: &ConnectionConfig, config: ReadConfig) -> Result<Value, String> {
    let service = build_service(connection)?;
    let dataset = TiledDataset::new(config.dataset.clone(), 0);
    let response = service
        .read(&dataset, &config.request())
        .await
        .map_err(|e| e.to_string())?;

    Ok(match response {
        ReadResponse::Uris(uris) => json!({ "uris": uris }),
        ReadResponse::Raw { block, uris } => raw_output(&block, &uris)?,
        ReadResponse::Images { images, uris } => json!({
            "uris": uris,
            "images": images
                .iter()
                .filter_map(|image| image.as_base64())
                .collect::<Vec<_>>(),
        }),
    })
}

/// JSON form of a raw block. JSON has no NaN or infinity, so a block
/// holding either is an error rather than a list with `null` in it.
fn raw_output(block: &ArrayD<f64>, uris: &[String]) -> Result<Value, String> {
    if let Some((offset, value)) = block.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(format!(
            "Raw data holds {} at flat offset {}, which JSON cannot represent",
            value, offset
        ));
    }
    Ok(json!({
        "uris": uris,
        "shape": block.shape(),
        "data": block.iter().copied().collect::<Vec<f64>>(),
    }))
}

// =============================================================================
// Locate Command
// =============================================================================

async fn run_locate(config: LocateConfig) -> Result<Value, String> {
    let text = tokio::fs::read_to_string(&config.records)
        .await
        .map_err(|e| format!("Failed to read {}: {}", config.records.display(), e))?;
    let records: Vec<Value> = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    let collection = DatasetCollection::from_records(&records).map_err(|e| e.to_string())?;

    let (position, local_index) = collection.locate(config.index).map_err(|e| e.to_string())?;
    let dataset = collection.datasets()[position].uri.clone();

    Ok(json!({
        "flat_index": config.index,
        "position": position,
        "dataset": dataset,
        "local_index": local_index,
    }))
}
