use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use ahash::AHashMap;

use distance::CancelToken;
use store::{ClusterId, Level, MemberFilter, SampleId, SnpAddress, StatsRow, Tables};

use crate::error::{ClusterError, ZscoreReport};
use crate::merge::{self, ClusterMerge};
use crate::stats::ClusterStats;

/// A SNP address in the making: `None` slots stand for "new cluster at this
/// level" and are materialised on registration.
pub type ProposedAddress = [Option<ClusterId>; 7];

/// Render a proposed address the way final addresses print, widest first.
#[must_use]
pub fn proposed_to_string(proposed: &ProposedAddress) -> String {
    let text: Vec<String> = proposed
        .iter()
        .rev()
        .map(|slot| slot.map_or_else(|| "new".to_string(), |c| c.to_string()))
        .collect();
    text.join(".")
}

/// The immediate neighbourhood of a candidate sample.
#[derive(Debug, Clone)]
pub struct Neighbourhood {
    pub closest_sample  : SampleId,
    pub closest_distance: u32,
    pub closest_address : SnpAddress,
    /// Narrowest threshold containing the closest distance; `None` beyond 250.
    pub nearest_level   : Option<Level>,
}

/// The closest non-ignored neighbour, from the sorted distance list.
pub fn closest_neighbourhood(
    tables   : &Tables,
    distances: &[(SampleId, u32)],
) -> Result<Option<Neighbourhood>, ClusterError> {
    let Some(&(closest_sample, closest_distance)) = distances.first() else {
        return Ok(None);
    };
    Ok(Some(Neighbourhood {
        closest_sample,
        closest_distance,
        closest_address: tables.lookup(closest_sample)?,
        nearest_level  : Level::smallest_containing(closest_distance),
    }))
}

/// Derive the proposed address: a copy of the closest neighbour's address,
/// with every level too narrow to contain the closest link marked new.
#[must_use]
pub fn propose_address(nbhood: &Neighbourhood) -> ProposedAddress {
    let mut proposed = [None; 7];
    for level in Level::ALL {
        if nbhood.closest_distance <= level.threshold() {
            proposed[level.index()] = Some(nbhood.closest_address.level(level));
        }
    }
    proposed
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionOptions {
    /// Skip the z-score admissibility check; the sample is then flagged
    /// ignore_zscore on registration.
    pub skip_zscore: bool,
    /// Admit even when the assignment requires merging clusters.
    pub force_merge: bool,
    /// Actually write the registration; otherwise the run is a dry run.
    pub register   : bool,
}

/// What an admission did (or would do, for a dry run).
#[derive(Debug)]
pub struct Admission {
    pub proposed  : ProposedAddress,
    pub address   : Option<SnpAddress>,
    pub nof_merges: usize,
}

/// Admit one sample: compute its distances, derive the address, detect and
/// perform merges, check admissibility, and register.
///
/// The sample must already be in the variant store and not yet clustered.
/// All table writes happen on the caller's transaction; on any error the
/// transaction is abandoned and nothing becomes visible.
pub fn admit(
    tables: &mut Tables,
    sample: SampleId,
    opts  : AdmissionOptions,
    token : &CancelToken,
    now   : DateTime<Utc>,
) -> Result<Admission, ClusterError> {
    let row = tables.sample(sample)?;
    if row.ignore_sample {
        return Err(ClusterError::SampleIgnored(sample));
    }
    if let Ok(address) = tables.lookup(sample) {
        return Err(store::StoreError::AlreadyClustered {
            sample,
            address: address.to_string(),
        }
        .into());
    }

    info!("Calculating distances to all other samples now. Patience!");
    let distances = distance::relevant(tables, sample, token)?;
    debug!("Distances calculated: {distances:?}");

    let Some(nbhood) = closest_neighbourhood(tables, &distances)? else {
        // nothing to compare against: a fresh singleton at every level
        if !opts.register {
            info!("Sample NOT registered in the store (dry run)");
            return Ok(Admission { proposed: [None; 7], address: None, nof_merges: 0 });
        }
        let address = register_sample(tables, sample, &distances, &[None; 7], opts.skip_zscore)?;
        if opts.skip_zscore {
            tables.set_ignore_zscore(sample, true)?;
        }
        info!("No neighbours found; sample {sample} starts cluster {address}");
        return Ok(Admission { proposed: [None; 7], address: Some(address), nof_merges: 0 });
    };
    debug!("Sample neighbourhood: {nbhood:?}");

    let mut proposed = propose_address(&nbhood);
    info!("Proposed SNP address for this sample: {}", proposed_to_string(&proposed));

    let mut merges = merge::check_merging_needed(tables, &distances, &proposed)?;
    if !merges.is_empty() {
        info!(
            "Merges required to make this assignment: {}",
            merges.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
        );
        if !opts.force_merge {
            return Err(ClusterError::MergeRequired(merges.len()));
        }
        for pending in &mut merges {
            warn!(
                "Merge required at level {} between clusters {:?}. The z-score will be checked \
                 against the cluster resulting from this merge!",
                pending.level, pending.sources
            );
            pending.prepare(tables, token)?;
        }
    }

    if opts.skip_zscore {
        info!("User disabled z-score checks for this assignment");
    } else {
        check_admissibility(tables, &distances, &proposed, &merges)?;
        info!("All z-score checks passed for this assignment");
    }

    if !opts.register {
        info!("Sample NOT registered in the store (dry run)");
        return Ok(Admission { proposed, address: None, nof_merges: merges.len() });
    }

    // the merged cluster may keep either source name, so point the proposed
    // address at the survivor before registering
    for pending in &merges {
        pending.apply(tables, now)?;
        proposed[pending.level.index()] = pending.final_name;
    }

    let address = register_sample(tables, sample, &distances, &proposed, opts.skip_zscore)?;
    if opts.skip_zscore {
        // never let an unchecked sample distort future statistics
        tables.set_ignore_zscore(sample, true)?;
    }
    info!("Sample {sample} was registered with SNP address: {address}");
    Ok(Admission { proposed, address: Some(address), nof_merges: merges.len() })
}

/// The z-score admissibility check.
///
/// For every level joining an existing cluster (after any pending merges),
/// the candidate's mean distance to the members and each member's updated
/// mean-to-others are compared against the cluster's post-addition moments:
/// z = (candidate − cluster_mean) / stddev, rejecting at ≤ −1.75 for the
/// cluster-wide check and ≤ −1.0 per member. Clusters smaller than two
/// members and zero post-addition spread skip the check.
pub fn check_admissibility(
    tables   : &Tables,
    distances: &[(SampleId, u32)],
    proposed : &ProposedAddress,
    merges   : &[ClusterMerge],
) -> Result<(), ClusterError> {
    let by_id: AHashMap<SampleId, u32> = distances.iter().copied().collect();
    let mut report = ZscoreReport::default();

    for level in Level::ALL {
        let Some(cluster) = proposed[level.index()] else {
            info!("New cluster at {level} level, no z-score check required");
            continue;
        };

        let pending = merges.iter().find(|m| m.level == level);
        let (stats, members) = match pending {
            Some(pending) => {
                let stats = pending.stats.clone().ok_or_else(|| {
                    ClusterError::DataInconsistency {
                        level,
                        cluster,
                        detail: "pending merge was not prepared".to_string(),
                    }
                })?;
                (stats, pending.final_members.clone())
            }
            None => {
                let row = tables.stats(level, cluster)?;
                if row.nof_members < 2 {
                    info!("Cluster {cluster} at level {level} has fewer than two members. Skipping z-score check.");
                    continue;
                }
                (ClusterStats::from_row(row), tables.members(level, cluster, MemberFilter::ExcludeOutliers))
            }
        };
        if members.len() < 2 {
            continue;
        }

        let dists_to_members: Vec<u32> = members
            .iter()
            .map(|m| {
                by_id.get(m).copied().ok_or_else(|| ClusterError::DataInconsistency {
                    level,
                    cluster,
                    detail: format!("no distance to member {m}"),
                })
            })
            .collect::<Result<_, _>>()?;
        let avg =
            dists_to_members.iter().map(|&d| f64::from(d)).sum::<f64>() / members.len() as f64;

        let mut after = stats;
        after.add_member(&dists_to_members)?;
        let (Some(mean_after), Some(sd_after)) = (after.mean(), after.stddev()) else {
            continue;
        };
        if sd_after <= 0.0 {
            continue;
        }

        let z = (avg - mean_after) / sd_after;
        debug!("z-score of new sample to cluster {cluster} on level {level}: {z}");
        if z <= -1.75 {
            report
                .0
                .push(format!("z-score of new sample to cluster {cluster} on level {level}: {z}"));
        }

        let k = members.len() as f64;
        for (member, d_new) in members.iter().zip(&dists_to_members) {
            // a pending merge supersedes the stored per-member means
            let old = match pending {
                Some(pending) => pending.member_mean(*member),
                None => tables.level_mean(*member, level)?,
            }
            .unwrap_or(0.0);
            let updated = (old * (k - 1.0) + f64::from(*d_new)) / k;
            let z = (updated - mean_after) / sd_after;
            if z <= -1.0 {
                report.0.push(format!(
                    "z-score of sample {member} to cluster {cluster} on level {level} incl new member: {z}"
                ));
            }
        }
    }

    if report.0.is_empty() {
        Ok(())
    } else {
        Err(ClusterError::StatisticalReject(report))
    }
}

/// Write the registration: materialise new cluster ids, update cluster and
/// per-member statistics, and insert the sample's cluster row.
///
/// An `as_outlier` registration (z-score check bypassed) records the address
/// but contributes nothing to any statistic: cluster stats and member means
/// stay untouched, the sample's own means stay null, and fresh clusters
/// start with zero counted members.
pub fn register_sample(
    tables    : &mut Tables,
    sample    : SampleId,
    distances : &[(SampleId, u32)],
    proposed  : &ProposedAddress,
    as_outlier: bool,
) -> Result<SnpAddress, ClusterError> {
    let by_id: AHashMap<SampleId, u32> = distances.iter().copied().collect();
    let mut final_levels = [0; 7];
    let mut means = [None; 7];

    for level in Level::ALL {
        let index = level.index();
        match proposed[index] {
            None => {
                let fresh = tables.alloc_new_id(level);
                let row = if as_outlier {
                    StatsRow {
                        nof_members       : 0,
                        nof_pairwise_dists: 0,
                        mean_pwise_dist   : None,
                        stddev            : None,
                    }
                } else {
                    StatsRow::singleton()
                };
                tables.put_stats(level, fresh, row);
                final_levels[index] = fresh;
            }
            Some(cluster) => {
                final_levels[index] = cluster;
                if as_outlier {
                    continue;
                }
                let row = tables.stats(level, cluster)?;
                let members = tables.members(level, cluster, MemberFilter::ExcludeOutliers);
                let dists: Vec<u32> = members
                    .iter()
                    .map(|m| {
                        by_id.get(m).copied().ok_or_else(|| ClusterError::DataInconsistency {
                            level,
                            cluster,
                            detail: format!("no distance to member {m}"),
                        })
                    })
                    .collect::<Result<_, _>>()?;

                let mut stats = if row.nof_members > 1 {
                    ClusterStats::from_row(row)
                } else {
                    ClusterStats::from_distances(row.nof_members, &[])?
                };
                stats.add_member(&dists)?;
                tables.put_stats(level, cluster, stats.to_row());

                means[index] = (!dists.is_empty())
                    .then(|| dists.iter().map(|&d| f64::from(d)).sum::<f64>() / dists.len() as f64);

                // every current member gains one distance in its mean
                let k = members.len() as f64;
                for (member, d_new) in members.iter().zip(&dists) {
                    let old = tables.level_mean(*member, level)?.unwrap_or(0.0);
                    let updated = (old * (k - 1.0) + f64::from(*d_new)) / k;
                    tables.set_level_mean(*member, level, Some(updated))?;
                }
            }
        }
    }

    let address = SnpAddress::new(final_levels);
    tables.insert_sample_clusters(sample, address, means)?;
    Ok(address)
}
