use std::fmt;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{info, warn};

use distance::CancelToken;
use store::{ClusterId, Level, MemberFilter, SampleId, Tables};

use crate::error::ClusterError;
use crate::registrar::ProposedAddress;
use crate::stats::ClusterStats;

/// One pending cluster merge at one level: two or more clusters that must
/// collapse into a single id before a new sample can be admitted.
#[derive(Debug)]
pub struct ClusterMerge {
    pub level        : Level,
    pub sources      : Vec<ClusterId>,
    pub final_name   : Option<ClusterId>,
    pub final_members: Vec<SampleId>,
    pub stats        : Option<ClusterStats>,
    member_means     : Vec<(SampleId, f64)>,
}

impl fmt::Display for ClusterMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level: {}, clusters: {:?}, final name: {}, nof final members: {}",
            self.level,
            self.sources,
            self.final_name.map_or_else(|| "tbd".to_string(), |n| n.to_string()),
            if self.final_members.is_empty() {
                "tbd".to_string()
            } else {
                self.final_members.len().to_string()
            },
        )
    }
}

/// Check whether assigning the proposed address requires any merges: at each
/// level the candidate joins, every sample within the level's threshold must
/// already sit in one single cluster.
pub fn check_merging_needed(
    tables   : &Tables,
    distances: &[(SampleId, u32)],
    proposed : &ProposedAddress,
) -> Result<Vec<ClusterMerge>, ClusterError> {
    let mut merges = Vec::new();

    for (index, level) in Level::ALL.into_iter().enumerate() {
        if proposed[index].is_none() {
            // a new cluster is created at this level, there is naught to merge
            continue;
        }
        let in_reach = distances.iter().filter(|(_, d)| *d <= level.threshold());
        let clusters: Vec<ClusterId> = in_reach
            .map(|(id, _)| tables.lookup(*id).map(|address| address.level(level)))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sorted_unstable()
            .dedup()
            .collect();
        // more than one cluster in reach means the new sample would bridge
        // them, so they have to become one before admission
        if clusters.len() > 1 {
            merges.push(ClusterMerge::new(level, clusters));
        }
    }

    Ok(merges)
}

impl ClusterMerge {
    #[must_use]
    pub fn new(level: Level, sources: Vec<ClusterId>) -> Self {
        Self {
            level,
            sources,
            final_name   : None,
            final_members: Vec::new(),
            stats        : None,
            member_means : Vec::new(),
        }
    }

    /// The prepared mean-to-others of one merged member.
    #[must_use]
    pub fn member_mean(&self, sample: SampleId) -> Option<f64> {
        self.member_means.iter().find(|(m, _)| *m == sample).map(|(_, mean)| *mean)
    }

    /// Resolve the merge target, the merged member list, the merged stats
    /// object and the per-member means, without touching the tables.
    ///
    /// The target is the cluster with the most non-outlier members, ties
    /// going to the smallest id. When the target is bigger than a singleton
    /// its stored moments are reused and each other cluster's members are
    /// added one at a time against the growing member set; an all-singleton
    /// merge instead computes the full pairwise list over the union of all
    /// members.
    pub fn prepare(&mut self, tables: &Tables, token: &CancelToken) -> Result<(), ClusterError> {
        let mut members: Vec<(ClusterId, Vec<SampleId>)> = self
            .sources
            .iter()
            .map(|&c| (c, tables.members(self.level, c, MemberFilter::ExcludeOutliers)))
            .collect();
        members.sort_by_key(|(c, mems)| (std::cmp::Reverse(mems.len()), *c));

        let (target, target_members) = members[0].clone();
        self.final_name = Some(target);

        let target_row = tables.stats(self.level, target)?;
        if target_row.nof_members > 1 {
            let mut stats = ClusterStats::from_row(target_row);
            let mut current = target_members;
            for (_, other_members) in &members[1..] {
                for &new_member in other_members {
                    let dists = distance::one_to_many(tables, new_member, &current, token)?;
                    let values: Vec<u32> = dists.iter().map(|(_, d)| *d).collect();
                    stats.add_member(&values)?;
                    current.push(new_member);
                }
            }
            self.stats = Some(stats);
            self.final_members = current;
        } else {
            // the biggest cluster is a singleton: build the stats over all
            // pairwise distances within the union of every member
            let union: Vec<SampleId> =
                members.iter().flat_map(|(_, mems)| mems.iter().copied()).collect();
            let dists = distance::all_pair_dists(tables, &union, token)?;
            self.stats = Some(ClusterStats::from_distances(union.len() as u32, &dists)?);
            self.final_members = union;
        }

        self.calculate_per_member_means(tables, token)
    }

    /// The mean distance of every member of the merged cluster to all other
    /// members, recomputed from scratch.
    fn calculate_per_member_means(
        &mut self,
        tables: &Tables,
        token : &CancelToken,
    ) -> Result<(), ClusterError> {
        info!(
            "Calculating mean distance of all members of merging cluster {} on level {}",
            self.final_name.unwrap_or_default(),
            self.level
        );
        self.member_means.clear();
        for &member in &self.final_members {
            let others: Vec<SampleId> =
                self.final_members.iter().copied().filter(|&m| m != member).collect();
            let dists = distance::one_to_many(tables, member, &others, token)?;
            let mean =
                dists.iter().map(|(_, d)| f64::from(*d)).sum::<f64>() / dists.len().max(1) as f64;
            self.member_means.push((member, mean));
        }
        Ok(())
    }

    /// Write the merge into the tables: stats for the target, deletion of
    /// the source stats rows, merge-log and history entries, the rename
    /// itself, and the recomputed per-member means.
    pub fn apply(&self, tables: &mut Tables, now: DateTime<Utc>) -> Result<(), ClusterError> {
        let target = self.final_name.ok_or_else(|| ClusterError::DataInconsistency {
            level  : self.level,
            cluster: self.sources.first().copied().unwrap_or_default(),
            detail : "merge applied before prepare".to_string(),
        })?;
        let stats = self.stats.as_ref().ok_or_else(|| ClusterError::DataInconsistency {
            level  : self.level,
            cluster: target,
            detail : "merge applied without stats".to_string(),
        })?;

        tables.put_stats(self.level, target, stats.to_row());

        let sources: Vec<ClusterId> =
            self.sources.iter().copied().filter(|&c| c != target).collect();
        warn!(
            "The clusters {:?} on level {} have been MERGED into cluster {} and have been DELETED",
            sources, self.level, target
        );
        for &source in &sources {
            tables.delete_stats(self.level, source);
            tables.push_merge(self.level, source, target, now);

            // history first, while the old addresses are still in place
            let renamed = tables.members(self.level, source, MemberFilter::IncludeOutliers);
            for sample in renamed {
                let old = tables.lookup(sample)?;
                tables.push_history(sample, old, old.with_level(self.level, target), now);
            }
            tables.rename_cluster(self.level, source, target);
        }

        for &(member, mean) in &self.member_means {
            tables.set_level_mean(member, self.level, Some(mean))?;
        }
        Ok(())
    }
}
