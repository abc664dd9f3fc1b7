use ahash::AHashMap;
use log::debug;

use crate::address::{Level, SnpAddress};
use crate::error::StoreError;
use crate::tables::{ClusterId, ClusterRow, MemberFilter, SampleId, StatsRow, Tables};

/// ClusterIndex operations: the sample → address mapping, its inverse, and
/// the per-cluster statistic rows.
impl Tables {
    pub fn lookup(&self, id: SampleId) -> Result<SnpAddress, StoreError> {
        self.cluster_row(id).map(|row| row.address)
    }

    pub fn cluster_row(&self, id: SampleId) -> Result<&ClusterRow, StoreError> {
        self.sample_clusters.get(&id).ok_or(StoreError::NotClustered(id))
    }

    #[must_use]
    pub fn is_clustered(&self, id: SampleId) -> bool {
        self.sample_clusters.contains_key(&id)
    }

    /// Members of one cluster at one level. ignore_sample rows are never
    /// reported; whether ignore_zscore members appear is up to the filter.
    #[must_use]
    pub fn members(&self, level: Level, cluster: ClusterId, filter: MemberFilter) -> Vec<SampleId> {
        self.sample_clusters
            .iter()
            .filter(|(_, row)| row.address.level(level) == cluster)
            .filter(|(id, _)| {
                self.samples.get(id).is_some_and(|s| {
                    !s.ignore_sample
                        && (filter == MemberFilter::IncludeOutliers || !s.ignore_zscore)
                })
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Register the clustering of a sample: its address plus the per-level
    /// mean distances to the other members.
    pub fn insert_sample_clusters(
        &mut self,
        id     : SampleId,
        address: SnpAddress,
        means  : [Option<f64>; 7],
    ) -> Result<(), StoreError> {
        if let Some(existing) = self.sample_clusters.get(&id) {
            return Err(StoreError::AlreadyClustered {
                sample : id,
                address: existing.address.to_string(),
            });
        }
        self.sample(id)?;
        self.sample_clusters.insert(id, ClusterRow { address, means });
        Ok(())
    }

    pub fn set_address(&mut self, id: SampleId, address: SnpAddress) -> Result<(), StoreError> {
        self.sample_clusters
            .get_mut(&id)
            .map(|row| row.address = address)
            .ok_or(StoreError::NotClustered(id))
    }

    pub fn level_mean(&self, id: SampleId, level: Level) -> Result<Option<f64>, StoreError> {
        self.cluster_row(id).map(|row| row.means[level.index()])
    }

    pub fn set_level_mean(
        &mut self,
        id   : SampleId,
        level: Level,
        mean : Option<f64>,
    ) -> Result<(), StoreError> {
        self.sample_clusters
            .get_mut(&id)
            .map(|row| row.means[level.index()] = mean)
            .ok_or(StoreError::NotClustered(id))
    }

    /// Null out every per-level mean of a sample (known-outlier demotion).
    pub fn clear_level_means(&mut self, id: SampleId) -> Result<(), StoreError> {
        self.sample_clusters
            .get_mut(&id)
            .map(|row| row.means = [None; 7])
            .ok_or(StoreError::NotClustered(id))
    }

    /// Atomically move every sample with `from` at `level` to `to`.
    /// Returns the number of renamed samples.
    pub fn rename_cluster(&mut self, level: Level, from: ClusterId, to: ClusterId) -> usize {
        let mut renamed = 0;
        for row in self.sample_clusters.values_mut() {
            if row.address.level(level) == from {
                row.address.set_level(level, to);
                renamed += 1;
            }
        }
        debug!("Renamed {renamed} samples from {level} cluster {from} to {to}");
        renamed
    }

    /// Every cluster id in use at a level, ascending. Ignored samples do not
    /// keep a cluster alive.
    #[must_use]
    pub fn cluster_ids(&self, level: Level) -> Vec<ClusterId> {
        let mut ids: Vec<ClusterId> = self
            .sample_clusters
            .iter()
            .filter(|(id, _)| self.samples.get(id).is_some_and(|s| !s.ignore_sample))
            .map(|(_, row)| row.address.level(level))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// A fresh cluster id at this level: max(existing) + 1.
    #[must_use]
    pub fn alloc_new_id(&self, level: Level) -> ClusterId {
        self.sample_clusters
            .values()
            .map(|row| row.address.level(level))
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn stats(&self, level: Level, cluster: ClusterId) -> Result<&StatsRow, StoreError> {
        self.stats_opt(level, cluster).ok_or(StoreError::MissingStats { level, cluster })
    }

    #[must_use]
    pub fn stats_opt(&self, level: Level, cluster: ClusterId) -> Option<&StatsRow> {
        self.cluster_stats.get(&level).and_then(|per_level| per_level.get(&cluster))
    }

    pub fn put_stats(&mut self, level: Level, cluster: ClusterId, row: StatsRow) {
        self.cluster_stats.entry(level).or_default().insert(cluster, row);
    }

    pub fn delete_stats(&mut self, level: Level, cluster: ClusterId) {
        if let Some(per_level) = self.cluster_stats.get_mut(&level) {
            per_level.remove(&cluster);
        }
    }

    pub fn delete_sample_clusters(&mut self, id: SampleId) -> Result<(), StoreError> {
        self.sample_clusters.remove(&id).map(|_| ()).ok_or(StoreError::NotClustered(id))
    }

    /// Verify level monotonicity across the whole index: samples sharing a
    /// cluster at a narrow level must share it at every wider level.
    pub fn check_address_monotonicity(&self) -> Result<(), StoreError> {
        for (narrow_index, narrow) in Level::ALL.into_iter().enumerate() {
            for wide in &Level::ALL[narrow_index + 1..] {
                let mut seen: AHashMap<ClusterId, ClusterId> = AHashMap::new();
                for row in self.sample_clusters.values() {
                    let narrow_id = row.address.level(narrow);
                    let wide_id = row.address.level(*wide);
                    match seen.get(&narrow_id) {
                        None => { seen.insert(narrow_id, wide_id); }
                        Some(&first) if first != wide_id => {
                            return Err(StoreError::AddressMonotonicity {
                                narrow,
                                wide   : *wide,
                                cluster: narrow_id,
                                first,
                                second : wide_id,
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().expect("valid timestamp")
    }

    /// A store with a reference plus `n` clustered samples, all in the
    /// reference cluster at every level.
    fn populated(n: u32) -> (Tables, Vec<SampleId>) {
        let mut tables = Tables::default();
        tables
            .put_reference("ref", &[("chr".to_string(), 1000)], &BTreeMap::new(), now())
            .expect("empty store accepts a reference");
        let mut ids = Vec::new();
        for i in 0..n {
            let id = tables.put_sample(&format!("s{i}"), BTreeMap::new(), now()).expect("fresh name");
            tables
                .insert_sample_clusters(id, SnpAddress::REFERENCE, [None; 7])
                .expect("not yet clustered");
            ids.push(id);
        }
        (tables, ids)
    }

    #[test]
    fn members_excludes_ignored_samples() -> Result<(), StoreError> {
        let (mut tables, ids) = populated(3);
        tables.set_ignore_sample(ids[0], true)?;
        tables.set_ignore_zscore(ids[1], true)?;

        let strict = tables.members(Level::T0, 1, MemberFilter::ExcludeOutliers);
        assert!(!strict.contains(&ids[0]));
        assert!(!strict.contains(&ids[1]));
        assert!(strict.contains(&ids[2]));

        let lenient = tables.members(Level::T0, 1, MemberFilter::IncludeOutliers);
        assert!(!lenient.contains(&ids[0]));
        assert!(lenient.contains(&ids[1]));
        Ok(())
    }

    #[test]
    fn rename_moves_every_member_and_counts() -> Result<(), StoreError> {
        let (mut tables, ids) = populated(3);
        tables.set_address(ids[2], SnpAddress::REFERENCE.with_level(Level::T50, 4))?;

        let renamed = tables.rename_cluster(Level::T50, 1, 9);
        assert_eq!(renamed, 3); // reference + two samples still on cluster 1
        assert_eq!(tables.lookup(ids[0])?.level(Level::T50), 9);
        assert_eq!(tables.lookup(ids[2])?.level(Level::T50), 4);
        Ok(())
    }

    #[test]
    fn alloc_new_id_is_max_plus_one() -> Result<(), StoreError> {
        let (mut tables, ids) = populated(2);
        assert_eq!(tables.alloc_new_id(Level::T10), 2);
        tables.set_address(ids[1], SnpAddress::REFERENCE.with_level(Level::T10, 7))?;
        assert_eq!(tables.alloc_new_id(Level::T10), 8);
        Ok(())
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let (mut tables, ids) = populated(1);
        let result = tables.insert_sample_clusters(ids[0], SnpAddress::REFERENCE, [None; 7]);
        assert!(matches!(result, Err(StoreError::AlreadyClustered { .. })));
    }

    #[test]
    fn monotonicity_check_catches_violations() -> Result<(), StoreError> {
        let (mut tables, ids) = populated(2);
        tables.check_address_monotonicity()?;

        // ids[0] and ids[1] share t0 cluster 1 but now disagree at t250.
        tables.set_address(ids[1], SnpAddress::REFERENCE.with_level(Level::T250, 2))?;
        let result = tables.check_address_monotonicity();
        assert!(matches!(result, Err(StoreError::AddressMonotonicity { .. })));
        Ok(())
    }
}
