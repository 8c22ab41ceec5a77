//! Ordered dataset collection and flat-index translation.
//!
//! A collection concatenates the images of its datasets in order. Each
//! dataset stores the running total of images up to and including itself,
//! so translating a flat index is a binary search over those totals:
//!
//! ```text
//! local counts        [ 3 ][ 1 ][   5   ]
//! cumulative counts     3    4      9
//! flat index          0 1 2 3 4 5 6 7 8
//! (position, local)   0,0 .. 0,2 1,0 2,0 .. 2,4
//! ```
//!
//! Every mutation recomputes the prefix sums in full.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::record::Dataset;
use crate::error::DatasetError;

/// Datasets grouped out of a list of flat indexes: `(position, locals)`.
pub type DatasetGroups = Vec<(usize, Vec<usize>)>;

/// Ordered datasets with monotonic cumulative counts.
///
/// Serializes as a plain list of dataset records; deserializing checks the
/// counts the same way [`from_datasets`](Self::from_datasets) does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Dataset>", into = "Vec<Dataset>")]
pub struct DatasetCollection {
    datasets: Vec<Dataset>,
}

impl TryFrom<Vec<Dataset>> for DatasetCollection {
    type Error = DatasetError;

    fn try_from(datasets: Vec<Dataset>) -> Result<Self, Self::Error> {
        Self::from_datasets(datasets)
    }
}

impl From<DatasetCollection> for Vec<Dataset> {
    fn from(collection: DatasetCollection) -> Self {
        collection.datasets
    }
}

impl DatasetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing datasets, checking that their counts never decrease.
    pub fn from_datasets(datasets: Vec<Dataset>) -> Result<Self, DatasetError> {
        for pair in datasets.windows(2) {
            if pair[1].cumulative_data_count < pair[0].cumulative_data_count {
                return Err(DatasetError::InvalidCounts(format!(
                    "{} ({}) follows {} ({})",
                    pair[1].uri,
                    pair[1].cumulative_data_count,
                    pair[0].uri,
                    pair[0].cumulative_data_count
                )));
            }
        }
        Ok(Self { datasets })
    }

    /// Build a collection from the two parallel lists a browse returns.
    pub fn from_browse(
        uris: Vec<String>,
        cumulative_counts: Vec<usize>,
    ) -> Result<Self, DatasetError> {
        if uris.len() != cumulative_counts.len() {
            return Err(DatasetError::InvalidCounts(format!(
                "{} uris but {} counts",
                uris.len(),
                cumulative_counts.len()
            )));
        }
        Self::from_datasets(
            uris.into_iter()
                .zip(cumulative_counts)
                .map(|(uri, count)| Dataset::new(uri, count))
                .collect(),
        )
    }

    /// Rebuild a collection from serialized dataset records.
    pub fn from_records(records: &[serde_json::Value]) -> Result<Self, DatasetError> {
        let datasets = records
            .iter()
            .map(Dataset::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_datasets(datasets)
    }

    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.datasets.iter().map(Dataset::to_record).collect()
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn get(&self, position: usize) -> Option<&Dataset> {
        self.datasets.get(position)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Number of addressable images across the whole collection.
    pub fn total_count(&self) -> usize {
        self.datasets
            .last()
            .map(|d| d.cumulative_data_count)
            .unwrap_or(0)
    }

    pub fn cumulative_counts(&self) -> Vec<usize> {
        self.datasets
            .iter()
            .map(|d| d.cumulative_data_count)
            .collect()
    }

    /// Images contributed by the dataset at `position` alone.
    pub fn local_count(&self, position: usize) -> Option<usize> {
        let current = self.datasets.get(position)?.cumulative_data_count;
        Some(current - self.previous_cumulative(position))
    }

    fn previous_cumulative(&self, position: usize) -> usize {
        match position {
            0 => 0,
            p => self.datasets[p - 1].cumulative_data_count,
        }
    }

    fn local_counts(&self) -> Vec<usize> {
        (0..self.datasets.len())
            .map(|p| self.datasets[p].cumulative_data_count - self.previous_cumulative(p))
            .collect()
    }

    fn recount(&mut self, locals: &[usize]) {
        let mut running = 0;
        for (dataset, local) in self.datasets.iter_mut().zip(locals) {
            running += local;
            dataset.cumulative_data_count = running;
        }
    }

    /// Append a dataset holding `local_count` images.
    pub fn append(&mut self, uri: impl Into<String>, local_count: usize) -> &Dataset {
        let cumulative = self.total_count() + local_count;
        self.datasets.push(Dataset::new(uri, cumulative));
        &self.datasets[self.datasets.len() - 1]
    }

    /// Remove the dataset at `position`, renumbering the ones after it.
    pub fn remove(&mut self, position: usize) -> Option<Dataset> {
        if position >= self.datasets.len() {
            return None;
        }
        let mut locals = self.local_counts();
        locals.remove(position);
        let removed = self.datasets.remove(position);
        self.recount(&locals);
        Some(removed)
    }

    /// Record the now-known size of the dataset at `position`.
    pub fn set_local_count(
        &mut self,
        position: usize,
        local_count: usize,
    ) -> Result<(), DatasetError> {
        if position >= self.datasets.len() {
            return Err(DatasetError::IndexOutOfRange {
                index: position,
                count: self.datasets.len(),
            });
        }
        let mut locals = self.local_counts();
        locals[position] = local_count;
        self.recount(&locals);
        Ok(())
    }

    /// Translate a flat index into `(position, local index)`.
    ///
    /// The owning dataset is the first whose cumulative count exceeds
    /// `flat_index`; datasets holding no images are never selected.
    pub fn locate(&self, flat_index: usize) -> Result<(usize, usize), DatasetError> {
        let position = self
            .datasets
            .partition_point(|d| d.cumulative_data_count <= flat_index);
        if position == self.datasets.len() {
            return Err(DatasetError::IndexOutOfRange {
                index: flat_index,
                count: self.total_count(),
            });
        }
        Ok((position, flat_index - self.previous_cumulative(position)))
    }

    /// Group flat indexes by owning dataset.
    ///
    /// Datasets appear in the order their first index appears; local indexes
    /// keep request order within each group.
    pub fn group(&self, flat_indexes: &[usize]) -> Result<DatasetGroups, DatasetError> {
        let mut groups: DatasetGroups = Vec::new();
        let mut slot: HashMap<usize, usize> = HashMap::new();

        for &flat in flat_indexes {
            let (position, local) = self.locate(flat)?;
            let entry = *slot.entry(position).or_insert_with(|| {
                groups.push((position, Vec::new()));
                groups.len() - 1
            });
            groups[entry].1.push(local);
        }
        Ok(groups)
    }
}
