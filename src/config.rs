//! Command-line configuration for tiled-explorer.
//!
//! Options are read from command-line arguments with environment fallbacks.
//!
//! # Environment Variables
//!
//! - `DEFAULT_TILED_URI` - Root address of the Tiled catalog
//! - `TILED_API_KEY` - API key sent with every request
//! - `STATIC_TILED_URI` - Root address of a fixed server; when set, one client
//!   is built at startup and used for every call
//! - `STATIC_TILED_API_KEY` - API key for the fixed server
//! - `TILED_TIMEOUT_SECS` - Per-request timeout in seconds
//! - `DEFAULT_TILED_SUB_URI` - Sub-path looked for under every child when browsing

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::dataset::{BrowseOptions, Export, ReadRequest};

// =============================================================================
// Default Values
// =============================================================================

/// Default root address of the Tiled catalog.
pub const DEFAULT_TILED_URI: &str = "http://localhost:8000/api/v1/metadata";

/// Default percentile pair, as accepted by `--percentiles`.
pub const DEFAULT_PERCENTILES_ARG: &str = "0,100";

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiled-explorer - Browse and read image datasets on a Tiled server.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiled-explorer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List datasets below the root.
    Browse(BrowseConfig),
    /// Read images from one dataset.
    Read(ReadConfig),
    /// Translate a flat index using saved dataset records.
    Locate(LocateConfig),
}

/// Where to connect and how to authenticate.
#[derive(Args, Debug, Clone)]
pub struct ConnectionConfig {
    /// Root address of the Tiled catalog.
    #[arg(long, default_value = DEFAULT_TILED_URI, env = "DEFAULT_TILED_URI")]
    pub tiled_uri: String,

    /// API key for the Tiled catalog.
    #[arg(long, env = "TILED_API_KEY")]
    pub api_key: Option<String>,

    /// Root address of a fixed Tiled server.
    ///
    /// Overrides `--tiled-uri` and `--api-key` for every call.
    #[arg(long, env = "STATIC_TILED_URI")]
    pub static_tiled_uri: Option<String>,

    /// API key for the fixed Tiled server.
    #[arg(long, env = "STATIC_TILED_API_KEY")]
    pub static_api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "TILED_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tiled_uri.trim().is_empty() {
            return Err("Tiled URI is required. Set --tiled-uri or DEFAULT_TILED_URI".to_string());
        }
        if let Some(uri) = &self.static_tiled_uri {
            if uri.trim().is_empty() {
                return Err("STATIC_TILED_URI is set but empty".to_string());
            }
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Whether a fixed server overrides the per-call root.
    pub fn is_static(&self) -> bool {
        self.static_tiled_uri.is_some()
    }
}

#[derive(Args, Debug, Clone)]
pub struct BrowseConfig {
    /// Sub-path looked for below every child of the root.
    #[arg(long, default_value = "", env = "DEFAULT_TILED_SUB_URI")]
    pub sub_uri_template: String,

    /// Paths to expand and size instead of probing (repeatable).
    #[arg(long = "select")]
    pub selected: Vec<String>,

    /// Resolve the placeholder counts reported by discovery.
    #[arg(long, default_value_t = false)]
    pub size: bool,
}

impl BrowseConfig {
    pub fn options(&self) -> BrowseOptions {
        if self.selected.is_empty() {
            BrowseOptions::discover(self.sub_uri_template.clone())
        } else {
            BrowseOptions {
                sub_uri_template: self.sub_uri_template.clone(),
                selected_sub_uris: self.selected.clone(),
            }
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReadConfig {
    /// Path of the dataset below the root.
    #[arg(long)]
    pub dataset: String,

    /// Local index to read (repeatable).
    #[arg(long = "index", required = true)]
    pub indexes: Vec<usize>,

    /// Output representation: base64 or raw.
    #[arg(long, default_value = "base64")]
    pub export: Export,

    /// Keep the source size instead of resizing.
    #[arg(long, default_value_t = false)]
    pub no_resize: bool,

    /// Apply log(1 + x) before normalization.
    #[arg(long, default_value_t = false)]
    pub log: bool,

    /// Take every 10th pixel on both spatial axes.
    #[arg(long, default_value_t = false)]
    pub downsample: bool,

    /// Print addresses only.
    #[arg(long, default_value_t = false)]
    pub just_uri: bool,

    /// Low and high percentile, as LOW,HIGH.
    #[arg(long, default_value = DEFAULT_PERCENTILES_ARG, value_parser = parse_percentiles)]
    pub percentiles: (f64, f64),
}

impl ReadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.export == Export::Image {
            return Err("export must be base64 or raw on the command line".to_string());
        }
        let (low, high) = self.percentiles;
        if !(0.0 <= low && low < high && high <= 100.0) {
            return Err(format!(
                "percentiles must satisfy 0 <= low < high <= 100, got {},{}",
                low, high
            ));
        }
        Ok(())
    }

    pub fn request(&self) -> ReadRequest {
        let request = ReadRequest::new(self.indexes.clone())
            .with_export(self.export)
            .with_resize(!self.no_resize)
            .with_log(self.log)
            .with_downsample(self.downsample)
            .with_percentiles(self.percentiles.0, self.percentiles.1);
        if self.just_uri {
            request.uris_only()
        } else {
            request
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LocateConfig {
    /// JSON file holding a list of dataset records.
    #[arg(long)]
    pub records: PathBuf,

    /// Flat index to translate.
    #[arg(long)]
    pub index: usize,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;
        match &self.command {
            Command::Read(config) => config.validate(),
            Command::Browse(_) | Command::Locate(_) => Ok(()),
        }
    }
}

/// Parse a `LOW,HIGH` percentile pair.
pub fn parse_percentiles(s: &str) -> Result<(f64, f64), String> {
    let (low, high) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LOW,HIGH, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid percentile '{}': {}", v.trim(), e))
    };
    Ok((parse(low)?, parse(high)?))
}

// =============================================================================
// Tests
// =============================================================================
