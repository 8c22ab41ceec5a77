use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// One contiguous remote array resource and its place in a collection.
///
/// Serialized as a flat `{ "uri", "cumulative_data_count" }` record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    /// Node path of the array, relative to the collection root.
    pub uri: String,
    /// Images contributed by this dataset and every one before it.
    pub cumulative_data_count: usize,
}

impl Dataset {
    pub fn new(uri: impl Into<String>, cumulative_data_count: usize) -> Self {
        Self {
            uri: uri.into(),
            cumulative_data_count,
        }
    }

    /// Serialize into a key-value record.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "uri": self.uri,
            "cumulative_data_count": self.cumulative_data_count,
        })
    }

    /// Rebuild a dataset from a record produced by [`to_record`](Self::to_record).
    pub fn from_record(record: &serde_json::Value) -> Result<Self, DatasetError> {
        Dataset::deserialize(record).map_err(|e| DatasetError::InvalidRecord(e.to_string()))
    }
}
