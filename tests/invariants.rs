//! Universal invariants checked over a realistic workload: admissions, a
//! forced merge, an outlier demotion and a splitting removal.

mod common;

use common::{add_sample, admit, custom_sample, interval_sample, reference_store};

use pretty_assertions::assert_eq;

use cluster::RemovalMode;
use store::{Level, MemberFilter, SampleId, Store};

/// A second community of samples, > 250 from the chain fixture and the
/// reference through a shared block of 300 positions of its own.
fn w_sample(own: &[std::ops::Range<u32>]) -> genome::VariantSet {
    let positions: Vec<u32> =
        (1_000..1_300).chain(own.iter().cloned().flatten()).collect();
    custom_sample(&positions)
}

/// A population that exercises every mutation path once.
fn workload() -> Store {
    let mut store = reference_store();

    // a tight chain that will later lose its bridge
    for (name, k) in [("ch1", 0u32), ("ch2", 4), ("ch3", 12), ("ch4", 16)] {
        let id = add_sample(&mut store, name, interval_sample(k));
        admit(&mut store, id, true);
    }
    let bridge = add_sample(&mut store, "bridge", interval_sample(8));
    admit(&mut store, bridge, true);

    // a second community: {w1, w2} share a t50 cluster, w3 sits 60 away,
    // and "link" lands within 50 of both sides, forcing a t50 merge
    for (name, own) in [
        ("w1", vec![2_000..2_020]),
        ("w2", vec![2_020..2_040]),
        ("w3", vec![2_100..2_140]),
    ] {
        let id = add_sample(&mut store, name, w_sample(&own));
        admit(&mut store, id, true);
    }
    let link = add_sample(&mut store, "link", w_sample(&[2_000..2_010, 2_100..2_110]));
    admit(&mut store, link, true);

    // one member becomes a known outlier
    let outlier = store.sample_by_name("w2").expect("added").id;
    let mut tx = store.begin();
    let when = tx.now();
    cluster::remover::remove(&mut tx, outlier, RemovalMode::KnownOutlier, when)
        .expect("demotable");
    tx.commit().expect("monotone addresses");

    // and the chain's bridge goes away, splitting the t5 cluster
    let mut tx = store.begin();
    let when = tx.now();
    cluster::remover::remove(&mut tx, bridge, RemovalMode::HardDelete, when).expect("removable");
    tx.commit().expect("monotone addresses");

    store
}

#[test]
fn addresses_stay_monotone() {
    let store = workload();
    store.check_address_monotonicity().expect("monotone after the whole workload");
}

#[test]
fn stats_counts_match_membership() {
    let store = workload();
    for level in Level::ALL {
        for cluster in store.cluster_ids(level) {
            let n = store.members(level, cluster, MemberFilter::ExcludeOutliers).len() as u64;
            let stats = store.stats(level, cluster).unwrap_or_else(|_| {
                panic!("cluster {cluster} at {level} has members but no stats row")
            });
            assert_eq!(u64::from(stats.nof_members), n, "member count at {level}/{cluster}");
            assert_eq!(
                stats.nof_pairwise_dists,
                n * n.saturating_sub(1) / 2,
                "pairwise count at {level}/{cluster}"
            );
            if n < 2 {
                assert_eq!(stats.mean_pwise_dist, None);
                assert_eq!(stats.stddev, None);
            } else {
                assert!(stats.mean_pwise_dist.is_some());
                assert!(stats.stddev.is_some());
            }
        }
    }
}

/// Every pair of non-outlier co-members is connected by a chain of members
/// with all consecutive distances within the level's threshold.
#[test]
fn clusters_are_connected_components() {
    let store = workload();
    for level in Level::ALL {
        for cluster in store.cluster_ids(level) {
            let members = store.members(level, cluster, MemberFilter::ExcludeOutliers);
            if members.len() < 2 {
                continue;
            }
            let mut component: Vec<SampleId> = vec![members[0]];
            let mut cursor = 0;
            while cursor < component.len() {
                let pivot = component[cursor];
                for &other in &members {
                    if !component.contains(&other)
                        && distance::pair(&store, pivot, other).expect("known samples")
                            <= level.threshold()
                    {
                        component.push(other);
                    }
                }
                cursor += 1;
            }
            assert_eq!(
                component.len(),
                members.len(),
                "cluster {cluster} at {level} is not a single connected component"
            );
        }
    }
}

/// Every rename is audited: each sample's history rows chain onto one
/// another and end at its current address.
#[test]
fn history_reconstructs_addresses() {
    let store = workload();
    for sample in store.relevant_samples() {
        let history = store.history_for(sample);
        for pair in history.windows(2) {
            assert_eq!(
                pair[0].new, pair[1].old,
                "history of sample {sample} does not chain"
            );
        }
        if let Some(last) = history.last() {
            assert_eq!(
                last.new,
                store.lookup(sample).expect("clustered"),
                "history of sample {sample} does not end at its current address"
            );
        }
    }
    // the workload produced at least one merge and one split rename
    assert!(!store.merge_entries().is_empty());
    assert!(store.relevant_samples().iter().any(|&s| !store.history_for(s).is_empty()));
}

/// Log entries written inside one transaction share its timestamp.
#[test]
fn log_entries_share_the_transaction_timestamp() {
    let store = workload();
    let merge_times: Vec<_> = store.merge_entries().iter().map(|m| m.time_of_merge).collect();
    for time in &merge_times {
        // every history row written by the same merge carries the same stamp
        let matching = store
            .relevant_samples()
            .iter()
            .flat_map(|&s| store.history_for(s))
            .filter(|row| row.renamed_at == *time)
            .count();
        assert!(matching > 0, "merge log entry with no matching history rows");
    }
}

/// The whole store, workload included, survives a save/open round trip.
#[test]
fn persistence_round_trip() {
    let store = workload();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("store.json");

    let mut on_disk = Store::create(&path).expect("fresh file");
    let mut tx = on_disk.begin();
    *tx = store.tables().clone();
    tx.commit().expect("monotone addresses");
    on_disk.save().expect("writable temp dir");

    let reopened = Store::open(&path).expect("valid file");
    assert_eq!(reopened.relevant_samples(), store.relevant_samples());
    for sample in store.relevant_samples() {
        assert_eq!(
            reopened.lookup(sample).expect("clustered"),
            store.lookup(sample).expect("clustered")
        );
    }
    for level in Level::ALL {
        assert_eq!(reopened.cluster_ids(level), store.cluster_ids(level));
    }
    assert_eq!(reopened.merge_entries(), store.merge_entries());
}
