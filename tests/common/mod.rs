//! Shared fixtures for the end-to-end scenarios: a store is built through
//! the public ingest/admission path only, with distances controlled through
//! position-set construction. Every non-reference sample carries a shared
//! far block of 300 positions, keeping it > 250 from the reference while
//! cancelling out of every pairwise distance.
#![allow(dead_code)] // each test binary uses its own subset of the fixtures

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use cluster::AdmissionOptions;
use distance::CancelToken;
use genome::{PositionSet, VariantSet};
use store::{SampleId, SnpAddress, Store};

pub const FAR_POSITIONS: u32 = 300;

pub fn now() -> DateTime<Utc> {
    "2024-03-01T12:00:00Z".parse().expect("valid timestamp")
}

/// far block ∪ the given extra positions (offset into their own range).
pub fn custom_sample(extra: &[u32]) -> VariantSet {
    let positions: Vec<u32> =
        (1..=FAR_POSITIONS).chain(extra.iter().map(|p| 50_000 + p)).collect();
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

/// far block ∪ 20-position blocks: d = 20 · |blocks(a) △ blocks(b)|.
pub fn block_sample(blocks: &[u32]) -> VariantSet {
    let extra: Vec<u32> =
        blocks.iter().flat_map(|&b| 10_000 + b * 20..10_000 + (b + 1) * 20).collect();
    let positions: Vec<u32> = (1..=FAR_POSITIONS).chain(extra).collect();
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

/// Samples on a line: d(interval(i), interval(j)) = |i − j|.
pub fn interval_sample(k: u32) -> VariantSet {
    custom_sample(&(0..k).collect::<Vec<u32>>())
}

/// A store holding only the reference.
pub fn reference_store() -> Store {
    let mut store = Store::in_memory();
    let mut tx = store.begin();
    let when = tx.now();
    tx.put_reference("ref_v1", &[("chr".to_string(), 1_000_000)], &BTreeMap::new(), when)
        .expect("empty store accepts a reference");
    tx.commit().expect("monotone addresses");
    store
}

/// Add a sample's variants through the ingest path.
pub fn add_sample(store: &mut Store, name: &str, variant: VariantSet) -> SampleId {
    let mut tx = store.begin();
    let when = tx.now();
    let sets = BTreeMap::from([("chr".to_string(), variant)]);
    let id = tx.put_sample(name, sets, when).expect("fresh name");
    tx.commit().expect("monotone addresses");
    id
}

/// Admit and register a sample, committing the transaction.
pub fn admit(store: &mut Store, sample: SampleId, force_merge: bool) -> SnpAddress {
    let mut tx = store.begin();
    let when = tx.now();
    let admission = cluster::registrar::admit(
        &mut tx,
        sample,
        AdmissionOptions { force_merge, register: true, ..Default::default() },
        &CancelToken::new(),
        when,
    )
    .expect("admissible sample");
    tx.commit().expect("monotone addresses");
    admission.address.expect("registered")
}

/// Add and admit in one go.
pub fn add_and_admit(store: &mut Store, name: &str, variant: VariantSet) -> SampleId {
    let id = add_sample(store, name, variant);
    admit(store, id, false);
    id
}
