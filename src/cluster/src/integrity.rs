use std::collections::BTreeMap;

use ahash::AHashSet;
use log::{debug, info};

use distance::DistanceMemo;
use store::{ClusterId, Level, MemberFilter, SampleId, SnpAddress, Tables};

use crate::error::ClusterError;

/// Two samples that were connected through the removee and have no remaining
/// chain within their cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenPair {
    pub cluster: ClusterId,
    pub a      : SampleId,
    pub b      : SampleId,
}

/// Check whether removing a sample breaks any of its clusters apart.
///
/// For each level, the members that were within the threshold of the removee
/// are the ones it may have been bridging. Every such pair that is not
/// directly within the threshold must still be reachable through a chain of
/// remaining non-outlier members; pairs with no chain are reported per
/// level. Distances are computed on demand into the operation's memo.
pub fn check_cluster_integrity(
    tables : &Tables,
    removee: SampleId,
    address: SnpAddress,
    memo   : &mut DistanceMemo,
) -> Result<BTreeMap<Level, Vec<BrokenPair>>, ClusterError> {
    let mut splits = BTreeMap::new();

    for level in Level::ALL {
        let cluster = address.level(level);
        info!("Checking cluster integrity for cluster {cluster} on level {level}");

        let members: Vec<SampleId> = tables
            .members(level, cluster, MemberFilter::ExcludeOutliers)
            .into_iter()
            .filter(|&m| m != removee)
            .collect();

        // members connected to the cluster through the removee
        let mut connected = Vec::new();
        for &member in &members {
            if memo.get(tables, removee, member)? <= level.threshold() {
                connected.push(member);
            }
        }
        debug!("Samples connected via removee: {connected:?}");

        let mut potentially_broken = Vec::new();
        for (i, &a) in connected.iter().enumerate() {
            for &b in &connected[i + 1..] {
                if memo.get(tables, a, b)? > level.threshold() {
                    potentially_broken.push((a, b));
                }
            }
        }
        if potentially_broken.is_empty() {
            continue;
        }
        debug!("Samples potentially no longer connected via removee: {potentially_broken:?}");

        let mut broken = Vec::new();
        for (a, b) in potentially_broken {
            let reachable = expand_from_node(tables, memo, a, &members, level.threshold())?;
            if !reachable.contains(&b) {
                broken.push(BrokenPair { cluster, a, b });
            }
        }
        if !broken.is_empty() {
            splits.insert(level, broken);
        }
    }

    Ok(splits)
}

/// The connected component of `seed` within `members`, using the threshold
/// as the edge predicate. Plain breadth-first expansion; every distance goes
/// through the memo.
pub fn expand_from_node(
    tables   : &Tables,
    memo     : &mut DistanceMemo,
    seed     : SampleId,
    members  : &[SampleId],
    threshold: u32,
) -> Result<Vec<SampleId>, ClusterError> {
    debug!("Expanding from sample {seed}");
    let mut component = vec![seed];
    let mut seen: AHashSet<SampleId> = component.iter().copied().collect();
    let mut cursor = 0;

    while cursor < component.len() {
        let pivot = component[cursor];
        for &other in members {
            if !seen.contains(&other) && memo.get(tables, pivot, other)? <= threshold {
                seen.insert(other);
                component.push(other);
            }
        }
        cursor += 1;
    }

    component.sort_unstable();
    debug!("Samples connected to sample {seed}: {component:?}");
    Ok(component)
}

/// The connected components of the remaining members, seeded from the broken
/// pairs' endpoints and ordered largest first (ties to the smallest member
/// id). The first component keeps the cluster's id.
pub fn split_components(
    tables : &Tables,
    memo   : &mut DistanceMemo,
    broken : &[BrokenPair],
    members: &[SampleId],
    level  : Level,
) -> Result<Vec<Vec<SampleId>>, ClusterError> {
    let mut groups: Vec<Vec<SampleId>> = Vec::new();
    let mut covered: AHashSet<SampleId> = AHashSet::new();

    for pair in broken {
        for node in [pair.a, pair.b] {
            if covered.contains(&node) {
                continue;
            }
            let group = expand_from_node(tables, memo, node, members, level.threshold())?;
            covered.extend(group.iter().copied());
            groups.push(group);
        }
        if covered.len() == members.len() {
            break;
        }
    }

    groups.sort_by_key(|g| (std::cmp::Reverse(g.len()), g.first().copied()));
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::testutil::{custom_sample, interval_sample, populated_store, ClusterSeed};

    /// A chain P1-P2-P3-P4-P5 spaced 4 apart on a line, the removee R
    /// hanging off P3 at distance 3. Removing R keeps the chain intact.
    #[test]
    fn leaf_removal_does_not_split() -> Result<(), ClusterError> {
        let r_positions: Vec<u32> = (0..8).chain([900, 901, 902]).collect();
        let (tables, ids) = populated_store(&[ClusterSeed::shared_from(
            &["P1", "P2", "P3", "P4", "P5", "R"],
            vec![
                interval_sample(0),
                interval_sample(4),
                interval_sample(8),
                interval_sample(12),
                interval_sample(16),
                custom_sample(&r_positions),
            ],
            Level::T5,
            2,
        )]);
        let removee = ids[5];
        let mut memo = DistanceMemo::new();

        let splits =
            check_cluster_integrity(&tables, removee, tables.lookup(removee)?, &mut memo)?;
        assert!(splits.is_empty());
        Ok(())
    }

    /// R is the only ≤5 link between {P1, P2} and
    /// {P3, P4, P5}; removing it breaks the t5 cluster in two.
    fn bridge_fixture() -> (Tables, Vec<SampleId>) {
        populated_store(&[ClusterSeed::shared_from(
            &["P1", "P2", "P3", "P4", "P5", "R"],
            vec![
                interval_sample(0),
                interval_sample(4),
                interval_sample(12),
                interval_sample(16),
                interval_sample(20),
                interval_sample(8),
            ],
            Level::T5,
            2,
        )])
    }

    #[test]
    fn bridge_removal_is_detected_per_level() -> Result<(), ClusterError> {
        let (tables, ids) = bridge_fixture();
        let removee = ids[5];
        let mut memo = DistanceMemo::new();

        let splits =
            check_cluster_integrity(&tables, removee, tables.lookup(removee)?, &mut memo)?;
        // only t5 breaks: at t10 the P2-P3 gap of 8 is a valid edge
        assert_eq!(splits.len(), 1);
        let broken = splits.get(&Level::T5).expect("t5 split");
        assert_eq!(broken.len(), 1);
        assert_eq!((broken[0].a, broken[0].b), (ids[1], ids[2]));
        Ok(())
    }

    #[test]
    fn components_are_largest_first() -> Result<(), ClusterError> {
        let (tables, ids) = bridge_fixture();
        let removee = ids[5];
        let mut memo = DistanceMemo::new();
        let members: Vec<SampleId> = ids[..5].to_vec();

        let broken = [BrokenPair { cluster: 2, a: ids[1], b: ids[2] }];
        let groups = split_components(&tables, &mut memo, &broken, &members, Level::T5)?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec![ids[2], ids[3], ids[4]]);
        assert_eq!(groups[1], vec![ids[0], ids[1]]);
        Ok(())
    }

    #[test]
    fn expansion_walks_chains() -> Result<(), ClusterError> {
        let (tables, ids) = bridge_fixture();
        let mut memo = DistanceMemo::new();
        let members: Vec<SampleId> = ids[..5].to_vec();

        // from P1, everything is reachable at t25 (largest gap is 8)
        let all = expand_from_node(&tables, &mut memo, ids[0], &members, 25)?;
        assert_eq!(all.len(), 5);

        // at t5 only P2 is reachable from P1 once R is out of the picture
        let small = expand_from_node(&tables, &mut memo, ids[0], &members, 5)?;
        assert_eq!(small, vec![ids[0], ids[1]]);
        Ok(())
    }
}
