//! Fixture helpers shared by the cluster-crate tests.
//!
//! Distances are controlled through position-set construction:
//! every non-reference sample carries a shared "far" block of 300 positions
//! (cancelling pairwise, keeping everyone > 250 from the reference), plus
//! sample-specific blocks of 20 positions. Two samples are 20 apart per
//! block found in exactly one of them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use distance::CancelToken;
use genome::{PositionSet, VariantSet};
use store::{ClusterId, Level, MemberFilter, SampleId, SnpAddress, Tables};

use crate::stats::ClusterStats;

const FAR_POSITIONS: u32 = 300;
const BLOCK_BASE: u32 = 10_000;
const BLOCK_LEN: u32 = 20;
const CUSTOM_BASE: u32 = 50_000;

pub fn now() -> DateTime<Utc> {
    "2024-03-01T12:00:00Z".parse().expect("valid timestamp")
}

fn a_only(positions: Vec<u32>) -> VariantSet {
    VariantSet::new(
        PositionSet::from_unsorted(positions),
        PositionSet::new(),
        PositionSet::new(),
        PositionSet::new(),
        PositionSet::new(),
        PositionSet::new(),
    )
    .expect("disjoint fixture sets")
}

/// A sample made of the shared far block plus the given 20-position blocks:
/// d(a, b) = 20 · |blocks(a) △ blocks(b)|, d(·, reference) > 250.
pub fn block_sample(blocks: &[u32]) -> VariantSet {
    let mut positions: Vec<u32> = (1..=FAR_POSITIONS).collect();
    for &block in blocks {
        let start = BLOCK_BASE + block * BLOCK_LEN;
        positions.extend(start..start + BLOCK_LEN);
    }
    a_only(positions)
}

/// A sample made of the shared far block plus individually chosen positions:
/// d(a, b) = |positions(a) △ positions(b)|.
pub fn custom_sample(positions: &[u32]) -> VariantSet {
    let mut all: Vec<u32> = (1..=FAR_POSITIONS).collect();
    all.extend(positions.iter().map(|p| CUSTOM_BASE + p));
    a_only(all)
}

/// A sample on a 1-D line: d(interval_sample(i), interval_sample(j)) = |i − j|.
pub fn interval_sample(k: u32) -> VariantSet {
    custom_sample(&(0..k).collect::<Vec<u32>>())
}

/// One seeded cluster: samples plus the per-level cluster ids they share.
/// A `0` slot means "allocate a unique id per sample at this level".
pub struct ClusterSeed<'a> {
    pub names   : &'a [&'a str],
    pub variants: Vec<VariantSet>,
    pub address : [ClusterId; 7],
}

impl<'a> ClusterSeed<'a> {
    /// Samples sharing ids at `shared` and every wider level, unique below.
    pub fn shared_from(
        names   : &'a [&'a str],
        variants: Vec<VariantSet>,
        shared  : Level,
        cluster : ClusterId,
    ) -> Self {
        let mut address = [0; 7];
        for level in Level::ALL {
            if level >= shared {
                address[level.index()] = cluster;
            }
        }
        Self { names, variants, address }
    }
}

/// A store holding the reference plus the given seeded clusters, with every
/// cluster_stats row and per-member mean computed from the actual pairwise
/// distances so the fixture starts internally consistent.
pub fn populated_store(seeds: &[ClusterSeed]) -> (Tables, Vec<SampleId>) {
    let mut tables = Tables::default();
    tables
        .put_reference("ref", &[("chr".to_string(), 1_000_000)], &BTreeMap::new(), now())
        .expect("empty store accepts a reference");

    let mut unique = 1_000;
    let mut ids = Vec::new();
    for seed in seeds {
        assert_eq!(seed.names.len(), seed.variants.len(), "seed names/variants mismatch");
        for (name, variant) in seed.names.iter().zip(seed.variants.iter()) {
            let sets = BTreeMap::from([("chr".to_string(), variant.clone())]);
            let id = tables.put_sample(name, sets, now()).expect("fresh name");
            let mut levels = [0; 7];
            for (slot, &cluster) in levels.iter_mut().zip(seed.address.iter()) {
                *slot = if cluster == 0 {
                    unique += 1;
                    unique
                } else {
                    cluster
                };
            }
            tables
                .insert_sample_clusters(id, SnpAddress::new(levels), [None; 7])
                .expect("not yet clustered");
            ids.push(id);
        }
    }

    refresh_stats(&mut tables);
    tables.check_address_monotonicity().expect("fixture addresses are monotone");
    (tables, ids)
}

/// Recompute every cluster_stats row and per-member mean from scratch.
pub fn refresh_stats(tables: &mut Tables) {
    let token = CancelToken::new();
    for level in Level::ALL {
        for cluster in tables.cluster_ids(level) {
            let members = tables.members(level, cluster, MemberFilter::ExcludeOutliers);
            let dists =
                distance::all_pair_dists(tables, &members, &token).expect("fixture distances");
            let stats = ClusterStats::from_distances(members.len() as u32, &dists)
                .expect("consistent fixture cluster");
            tables.put_stats(level, cluster, stats.to_row());

            for &member in &members {
                let others: Vec<SampleId> =
                    members.iter().copied().filter(|&m| m != member).collect();
                let mean = if others.is_empty() {
                    None
                } else {
                    let dists = distance::one_to_many(tables, member, &others, &token)
                        .expect("fixture distances");
                    Some(dists.iter().map(|(_, d)| f64::from(*d)).sum::<f64>() / dists.len() as f64)
                };
                tables.set_level_mean(member, level, mean).expect("clustered member");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn block_samples_have_block_distances() {
        let mut tables = Tables::default();
        tables
            .put_reference("ref", &[("chr".to_string(), 1_000_000)], &BTreeMap::new(), now())
            .expect("empty store accepts a reference");
        let a = tables
            .put_sample("a", BTreeMap::from([("chr".to_string(), block_sample(&[0, 1]))]), now())
            .expect("fresh name");
        let b = tables
            .put_sample("b", BTreeMap::from([("chr".to_string(), block_sample(&[0, 2]))]), now())
            .expect("fresh name");
        let ref_id = tables.reference_id().expect("initialised");

        assert_eq!(distance::pair(&tables, a, b).expect("known samples"), 40);
        assert_eq!(distance::pair(&tables, a, ref_id).expect("known samples"), 340);
    }

    #[test]
    fn interval_samples_live_on_a_line() {
        let mut tables = Tables::default();
        tables
            .put_reference("ref", &[("chr".to_string(), 1_000_000)], &BTreeMap::new(), now())
            .expect("empty store accepts a reference");
        let mut ids = Vec::new();
        for (name, k) in [("i0", 0), ("i4", 4), ("i9", 9)] {
            let sets = BTreeMap::from([("chr".to_string(), interval_sample(k))]);
            ids.push(tables.put_sample(name, sets, now()).expect("fresh name"));
        }
        assert_eq!(distance::pair(&tables, ids[0], ids[1]).expect("known"), 4);
        assert_eq!(distance::pair(&tables, ids[1], ids[2]).expect("known"), 5);
        assert_eq!(distance::pair(&tables, ids[0], ids[2]).expect("known"), 9);
    }

    #[test]
    fn populated_store_seeds_consistent_stats() {
        let (tables, ids) = populated_store(&[ClusterSeed::shared_from(
            &["a", "b", "c"],
            vec![block_sample(&[0, 1]), block_sample(&[0, 2]), block_sample(&[0, 3])],
            Level::T50,
            2,
        )]);
        assert_eq!(ids.len(), 3);
        let stats = tables.stats(Level::T50, 2).expect("seeded");
        assert_eq!(stats.nof_members, 3);
        assert_eq!(stats.nof_pairwise_dists, 3);
        assert_eq!(stats.mean_pwise_dist, Some(40.0));
        assert_eq!(
            tables.level_mean(ids[0], Level::T50).expect("clustered"),
            Some(40.0),
        );
    }
}
