use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use distance::DistanceMemo;
use store::{ClusterId, Level, MemberFilter, SampleId, SnpAddress, StatsRow, Tables};

use crate::error::ClusterError;
use crate::integrity::{self, BrokenPair};
use crate::stats::ClusterStats;

/// How a sample leaves the clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    /// Delete the sample outright: clustering footprint, variants, sample row.
    HardDelete,
    /// Keep sample and variants, withdraw the clustering footprint.
    Ignore,
    /// Keep the address, withdraw every statistical contribution.
    KnownOutlier,
}

/// What a removal did, for reporting.
#[derive(Debug, Default)]
pub struct RemovalOutcome {
    /// New clusters allocated per level because the removal split a cluster.
    pub splits: Vec<(Level, usize)>,
}

/// Remove a sample from the clustering.
///
/// Removal is not a trivial thing to do: cluster stats and the stats of
/// other samples need updating, and the integrity of every cluster the
/// sample is in must be checked for splits. This may compute a lot of
/// distances; they are cached in a memo owned by this operation.
pub fn remove(
    tables: &mut Tables,
    sample: SampleId,
    mode  : RemovalMode,
    now   : DateTime<Utc>,
) -> Result<RemovalOutcome, ClusterError> {
    let row = tables.sample(sample)?;
    let already_ignored = row.ignore_sample;
    let is_outlier = row.ignore_zscore;

    if already_ignored {
        info!("This sample is already ignored.");
        return match mode {
            RemovalMode::Ignore => Ok(RemovalOutcome::default()),
            RemovalMode::KnownOutlier => Err(ClusterError::OutlierNotClustered),
            RemovalMode::HardDelete => {
                tables.drop_sample(sample)?;
                Ok(RemovalOutcome::default())
            }
        };
    }

    let Ok(address) = tables.lookup(sample) else {
        info!("Sample has never been clustered.");
        return match mode {
            RemovalMode::Ignore => {
                tables.set_ignore_sample(sample, true)?;
                info!("Sample is now ignored.");
                Ok(RemovalOutcome::default())
            }
            RemovalMode::KnownOutlier => Err(ClusterError::OutlierNotClustered),
            RemovalMode::HardDelete => {
                tables.drop_sample(sample)?;
                Ok(RemovalOutcome::default())
            }
        };
    };

    // distances computed during this removal are kept for its whole duration
    let mut memo = DistanceMemo::new();

    let outcome = match mode {
        RemovalMode::KnownOutlier => {
            if is_outlier {
                info!("This sample is already a known outlier, so there is nothing to do.");
                return Ok(RemovalOutcome::default());
            }
            make_known_outlier(tables, sample, address, &mut memo, now)?
        }
        RemovalMode::Ignore | RemovalMode::HardDelete => {
            let outcome =
                update_clustering(tables, sample, address, &mut memo, is_outlier, now)?;
            info!("Removing the sample from the sample_clusters and sample_history tables.");
            tables.delete_sample_clusters(sample)?;
            tables.delete_history_for(sample);
            if mode == RemovalMode::Ignore {
                tables.set_ignore_sample(sample, true)?;
                tables.set_ignore_zscore(sample, false)?;
                info!("Sample is now ignored.");
            } else {
                tables.drop_sample(sample)?;
            }
            outcome
        }
    };

    Ok(outcome)
}

/// Withdraw a sample's clustering footprint: check every level for splits,
/// then update the cluster and member statistics level by level.
fn update_clustering(
    tables     : &mut Tables,
    sample     : SampleId,
    address    : SnpAddress,
    memo       : &mut DistanceMemo,
    was_outlier: bool,
    now        : DateTime<Utc>,
) -> Result<RemovalOutcome, ClusterError> {
    info!("Checking if any clusters need splitting after sample removal.");
    let splits = integrity::check_cluster_integrity(tables, sample, address, memo)?;
    info!("Clusters that need splitting after sample removal: {splits:?}");

    let mut outcome = RemovalOutcome::default();
    if !was_outlier || !splits.is_empty() {
        for level in Level::ALL {
            let new_clusters = update_level_post_removal(
                tables,
                sample,
                address.level(level),
                level,
                memo,
                splits.get(&level).map(Vec::as_slice),
                was_outlier,
                now,
            )?;
            if new_clusters > 0 {
                outcome.splits.push((level, new_clusters));
            }
        }
    } else {
        info!("No stats update required for this sample.");
    }

    Ok(outcome)
}

/// Update one level's cluster stats and member means for the removal,
/// splitting the cluster when the integrity check found broken pairs.
/// Returns the number of newly allocated clusters.
#[allow(clippy::too_many_arguments)]
fn update_level_post_removal(
    tables     : &mut Tables,
    sample     : SampleId,
    cluster    : ClusterId,
    level      : Level,
    memo       : &mut DistanceMemo,
    split      : Option<&[BrokenPair]>,
    was_outlier: bool,
    now        : DateTime<Utc>,
) -> Result<usize, ClusterError> {
    info!("Updating stats for cluster {cluster} on level {level}.");

    let Some(row) = tables.stats_opt(level, cluster).cloned() else {
        if was_outlier {
            info!(
                "Sample is a known outlier and the only member of {level} cluster {cluster}. \
                 No stats to update."
            );
            return Ok(0);
        }
        return Err(store::StoreError::MissingStats { level, cluster }.into());
    };

    // the last counted member leaves: the cluster is gone
    if row.nof_members <= 1 && split.is_none() {
        debug!("This is the last member of cluster {cluster} on level {level}. Deleting cluster stats.");
        tables.delete_stats(level, cluster);
        return Ok(0);
    }

    let mut stats = ClusterStats::from_row(&row);
    let mut members: Vec<SampleId> = tables
        .members(level, cluster, MemberFilter::ExcludeOutliers)
        .into_iter()
        .filter(|&m| m != sample)
        .collect();
    let original_others = members.len();

    // reverse the removee's own contribution, unless it never counted
    let mut removed: Vec<SampleId> = Vec::new();
    if !was_outlier {
        let dists = member_distances(tables, memo, sample, &members)?;
        if stats.members() as usize != dists.len() + 1 {
            return Err(ClusterError::DataInconsistency {
                level,
                cluster,
                detail: format!(
                    "stats count {} does not cover {} remaining members",
                    stats.members(),
                    members.len()
                ),
            });
        }
        stats.remove_member(&dists)?;
        removed.push(sample);
    }

    let mut new_clusters = 0;
    if let Some(broken) = split {
        info!("Cluster {cluster} needs to be split.");
        let groups = integrity::split_components(tables, memo, broken, &members, level)?;
        debug!("It will be split into these subclusters: {groups:?}");

        // the largest subcluster keeps the name; every other group leaves
        // the retained stats object and moves into a fresh cluster
        for group in &groups[1..] {
            for &departing in group {
                let position = members.iter().position(|&m| m == departing).ok_or_else(|| {
                    ClusterError::DataInconsistency {
                        level,
                        cluster,
                        detail: format!("departing sample {departing} is not a member"),
                    }
                })?;
                members.remove(position);
                let dists = member_distances(tables, memo, departing, &members)?;
                stats.remove_member(&dists)?;
                removed.push(departing);
            }

            let pair_dists = memo.all_pair_dists(tables, group)?;
            let group_stats = ClusterStats::from_distances(group.len() as u32, &pair_dists)?;
            let fresh = tables.alloc_new_id(level);
            tables.put_stats(level, fresh, group_stats.to_row());
            new_clusters += 1;

            for &moved in group {
                let old = tables.lookup(moved)?;
                tables.push_history(moved, old, old.with_level(level, fresh), now);
                tables.set_address(moved, old.with_level(level, fresh))?;
            }
            for &moved in group {
                let others: Vec<SampleId> =
                    group.iter().copied().filter(|&m| m != moved).collect();
                let mean = memo.mean_to(tables, moved, &others)?;
                tables.set_level_mean(moved, level, mean)?;
            }
            warn!(
                "Cluster {cluster} on level {level} was SPLIT: {} samples moved to new cluster {fresh}",
                group.len()
            );
        }
    }

    tables.put_stats(level, cluster, stats.to_row());

    // the retained members lose one distance per removed sample; the
    // divisor shrinks with every distance taken out
    for &member in &members {
        let mut mean = tables.level_mean(member, level)?;
        let mut count = (original_others - 1) as f64; // the member's peers, pre-removal
        if !was_outlier {
            count += 1.0; // the removee itself was one of them
        }
        for &gone in &removed {
            let x = f64::from(memo.get(tables, member, gone)?);
            mean = match mean {
                Some(m) if count > 1.0 => Some((m * count - x) / (count - 1.0)),
                _ => None,
            };
            count -= 1.0;
        }
        tables.set_level_mean(member, level, mean)?;
    }

    Ok(new_clusters)
}

/// Turn a fully clustered sample into a known outlier: the address stays,
/// the statistical contribution is reversed at every level, and the sample's
/// own means are nulled. Splits are still performed when the outlier was the
/// only bridge holding a cluster together.
fn make_known_outlier(
    tables : &mut Tables,
    sample : SampleId,
    address: SnpAddress,
    memo   : &mut DistanceMemo,
    now    : DateTime<Utc>,
) -> Result<RemovalOutcome, ClusterError> {
    let splits = integrity::check_cluster_integrity(tables, sample, address, memo)?;

    for level in Level::ALL {
        let cluster = address.level(level);
        let row = tables.stats(level, cluster)?.clone();

        if row.nof_members <= 1 {
            debug!(
                "This is the last counted member of cluster {cluster} on level {level}. \
                 Cluster now has 0 counted members."
            );
            tables.put_stats(level, cluster, StatsRow {
                nof_members       : 0,
                nof_pairwise_dists: 0,
                mean_pwise_dist   : None,
                stddev            : None,
            });
            continue;
        }

        let members: Vec<SampleId> = tables
            .members(level, cluster, MemberFilter::ExcludeOutliers)
            .into_iter()
            .filter(|&m| m != sample)
            .collect();
        let dists = member_distances(tables, memo, sample, &members)?;
        let mut stats = ClusterStats::from_row(&row);
        if stats.members() as usize != dists.len() + 1 {
            return Err(ClusterError::DataInconsistency {
                level,
                cluster,
                detail: format!(
                    "stats count {} does not cover {} remaining members",
                    stats.members(),
                    members.len()
                ),
            });
        }
        stats.remove_member(&dists)?;
        tables.put_stats(level, cluster, stats.to_row());
    }

    // known outliers keep no mean distances to the members around them
    tables.clear_level_means(sample)?;
    tables.set_ignore_zscore(sample, true)?;

    // with the flag in place the split machinery sees the outlier as
    // uncounted and only moves the departed components
    let mut outcome = RemovalOutcome::default();
    for (&level, broken) in &splits {
        let new_clusters = update_level_post_removal(
            tables,
            sample,
            address.level(level),
            level,
            memo,
            Some(broken.as_slice()),
            true,
            now,
        )?;
        if new_clusters > 0 {
            outcome.splits.push((level, new_clusters));
        }
    }

    Ok(outcome)
}

/// Distances from one sample to each member, in member order.
fn member_distances(
    tables : &Tables,
    memo   : &mut DistanceMemo,
    sample : SampleId,
    members: &[SampleId],
) -> Result<Vec<u32>, ClusterError> {
    let mut dists = Vec::with_capacity(members.len());
    for &member in members {
        dists.push(memo.get(tables, sample, member)?);
    }
    Ok(dists)
}
