use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use genome::{Contig, ContigId, VariantSet};

use crate::address::{Level, SnpAddress};
use crate::error::StoreError;

pub type SampleId = u32;
pub type ClusterId = u32;

/// One row of the samples table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id           : SampleId,
    pub name         : String,
    pub date_added   : DateTime<Utc>,
    /// Withdrawn from clustering entirely; kept for archival only.
    pub ignore_sample: bool,
    /// Known outlier: a cluster member, but excluded from every statistic.
    pub ignore_zscore: bool,
}

/// One row of the sample_clusters table: the address plus the per-level mean
/// distance of this sample to the other non-outlier members of its cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub address: SnpAddress,
    pub means  : [Option<f64>; 7],
}

/// One row of the cluster_stats table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub nof_members       : u32,
    pub nof_pairwise_dists: u64,
    pub mean_pwise_dist   : Option<f64>,
    pub stddev            : Option<f64>,
}

impl StatsRow {
    #[must_use]
    pub fn singleton() -> Self {
        Self { nof_members: 1, nof_pairwise_dists: 0, mean_pwise_dist: None, stddev: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRow {
    pub level        : Level,
    pub source       : ClusterId,
    pub target       : ClusterId,
    pub time_of_merge: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub sample_id : SampleId,
    pub old       : SnpAddress,
    pub new       : SnpAddress,
    pub renamed_at: DateTime<Utc>,
}

/// Whether cluster membership queries should report known outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    ExcludeOutliers,
    IncludeOutliers,
}

/// The logical tables of the store. All mutation happens through a
/// [`crate::Transaction`]; reads are available on shared references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) contigs        : Vec<Contig>,
    pub(crate) samples        : BTreeMap<SampleId, SampleRow>,
    pub(crate) variants       : BTreeMap<SampleId, BTreeMap<ContigId, VariantSet>>,
    pub(crate) sample_clusters: BTreeMap<SampleId, ClusterRow>,
    pub(crate) cluster_stats  : BTreeMap<Level, BTreeMap<ClusterId, StatsRow>>,
    pub(crate) merge_log      : Vec<MergeRow>,
    pub(crate) sample_history : Vec<HistoryRow>,
    pub(crate) next_sample_id : SampleId,
    pub(crate) reference      : Option<SampleId>,
}

impl Tables {
    #[must_use]
    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    #[must_use]
    pub fn contig_by_name(&self, name: &str) -> Option<&Contig> {
        self.contigs.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn contig(&self, id: ContigId) -> Option<&Contig> {
        self.contigs.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.reference.is_some()
    }

    #[must_use]
    pub fn reference_id(&self) -> Option<SampleId> {
        self.reference
    }

    pub fn sample(&self, id: SampleId) -> Result<&SampleRow, StoreError> {
        self.samples.get(&id).ok_or(StoreError::UnknownSampleId(id))
    }

    pub fn sample_by_name(&self, name: &str) -> Result<&SampleRow, StoreError> {
        self.samples
            .values()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::UnknownSample(name.to_string()))
    }

    pub fn samples(&self) -> impl Iterator<Item = &SampleRow> {
        self.samples.values()
    }

    /// The samples relevant for clustering: already clustered, and not
    /// flagged ignore_sample.
    #[must_use]
    pub fn relevant_samples(&self) -> Vec<SampleId> {
        self.sample_clusters
            .keys()
            .filter(|id| self.samples.get(id).is_some_and(|s| !s.ignore_sample))
            .copied()
            .collect()
    }

    pub(crate) fn assert_name_free(&self, name: &str) -> Result<(), StoreError> {
        if self.samples.values().any(|s| s.name == name) {
            return Err(StoreError::DuplicateSample(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn next_sample_id(&mut self) -> SampleId {
        self.next_sample_id += 1;
        self.next_sample_id
    }
}
