use ahash::AHashMap;

use store::{SampleId, Tables};

use crate::error::DistanceError;
use crate::pair;

/// A pairwise-distance cache scoped to one remove operation.
///
/// Integrity checks and splits revisit the same pairs many times while
/// walking connectivity chains; the memo computes each distance once and
/// serves both orientations afterwards. It is owned by the operation and
/// never outlives it.
#[derive(Debug, Default)]
pub struct DistanceMemo {
    cache: AHashMap<(SampleId, SampleId), u32>,
}

impl DistanceMemo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: SampleId, b: SampleId) -> (SampleId, SampleId) {
        (a.min(b), a.max(b))
    }

    /// The distance between `a` and `b`, computed on demand.
    pub fn get(&mut self, tables: &Tables, a: SampleId, b: SampleId) -> Result<u32, DistanceError> {
        if let Some(&d) = self.cache.get(&Self::key(a, b)) {
            return Ok(d);
        }
        let d = pair(tables, a, b)?;
        self.cache.insert(Self::key(a, b), d);
        Ok(d)
    }

    /// Seed the memo with a distance obtained elsewhere.
    pub fn insert(&mut self, a: SampleId, b: SampleId, d: u32) {
        self.cache.insert(Self::key(a, b), d);
    }

    /// Distances from `a` to every target, sorted ascending by distance with
    /// ties broken by id. Cached pairs are served from memory.
    pub fn one_to_many(
        &mut self,
        tables : &Tables,
        a      : SampleId,
        targets: &[SampleId],
    ) -> Result<Vec<(SampleId, u32)>, DistanceError> {
        let mut result = Vec::with_capacity(targets.len());
        for &target in targets {
            result.push((target, self.get(tables, a, target)?));
        }
        result.sort_unstable_by_key(|&(id, d)| (d, id));
        Ok(result)
    }

    /// The mean distance from `a` to the targets; `None` when there are none.
    pub fn mean_to(
        &mut self,
        tables : &Tables,
        a      : SampleId,
        targets: &[SampleId],
    ) -> Result<Option<f64>, DistanceError> {
        if targets.is_empty() {
            return Ok(None);
        }
        let mut sum = 0u64;
        for &target in targets {
            sum += u64::from(self.get(tables, a, target)?);
        }
        Ok(Some(sum as f64 / targets.len() as f64))
    }

    /// All pairwise distances within a group, as a flat list of length
    /// n(n−1)/2.
    pub fn all_pair_dists(
        &mut self,
        tables : &Tables,
        samples: &[SampleId],
    ) -> Result<Vec<u32>, DistanceError> {
        let mut dists = Vec::with_capacity(samples.len() * (samples.len().saturating_sub(1)) / 2);
        for (i, &a) in samples.iter().enumerate() {
            for &b in &samples[i + 1..] {
                dists.push(self.get(tables, a, b)?);
            }
        }
        Ok(dists)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use std::collections::BTreeMap;

    use genome::{PositionSet, VariantSet};

    fn variant(a: &[u32]) -> VariantSet {
        VariantSet::new(
            PositionSet::from_unsorted(a.to_vec()),
            PositionSet::new(),
            PositionSet::new(),
            PositionSet::new(),
            PositionSet::new(),
            PositionSet::new(),
        )
        .expect("disjoint test sets")
    }

    fn fixture() -> (Tables, Vec<SampleId>) {
        let mut tables = Tables::default();
        let now = "2024-03-01T12:00:00Z".parse().expect("valid timestamp");
        tables
            .put_reference("ref", &[("chr".to_string(), 10_000)], &BTreeMap::new(), now)
            .expect("empty store accepts a reference");
        let mut ids = Vec::new();
        for (i, positions) in [vec![1u32, 2], vec![2, 3], vec![9, 10, 11]].into_iter().enumerate() {
            let sets = BTreeMap::from([("chr".to_string(), variant(&positions))]);
            ids.push(tables.put_sample(&format!("s{i}"), sets, now).expect("fresh name"));
        }
        (tables, ids)
    }

    #[test]
    fn both_orientations_hit_the_same_entry() -> Result<(), DistanceError> {
        let (tables, ids) = fixture();
        let mut memo = DistanceMemo::new();
        let forward = memo.get(&tables, ids[0], ids[1])?;
        let backward = memo.get(&tables, ids[1], ids[0])?;
        assert_eq!(forward, backward);
        assert_eq!(memo.len(), 1);
        Ok(())
    }

    #[test]
    fn seeded_entries_shadow_computation() -> Result<(), DistanceError> {
        let (tables, ids) = fixture();
        let mut memo = DistanceMemo::new();
        memo.insert(ids[1], ids[0], 42);
        assert_eq!(memo.get(&tables, ids[0], ids[1])?, 42);
        Ok(())
    }

    #[test]
    fn one_to_many_sorts_like_the_engine() -> Result<(), DistanceError> {
        let (tables, ids) = fixture();
        let mut memo = DistanceMemo::new();
        let result = memo.one_to_many(&tables, ids[0], &[ids[2], ids[1]])?;
        let direct = crate::one_to_many(&tables, ids[0], &[ids[2], ids[1]], &crate::CancelToken::new())?;
        assert_eq!(result, direct);
        Ok(())
    }

    #[test]
    fn mean_to_is_none_for_empty_targets() -> Result<(), DistanceError> {
        let (tables, ids) = fixture();
        let mut memo = DistanceMemo::new();
        assert_eq!(memo.mean_to(&tables, ids[0], &[])?, None);
        Ok(())
    }

    #[test]
    fn all_pair_dists_has_triangle_length() -> Result<(), DistanceError> {
        let (tables, ids) = fixture();
        let mut memo = DistanceMemo::new();
        let dists = memo.all_pair_dists(&tables, &ids)?;
        assert_eq!(dists.len(), 3);
        Ok(())
    }
}
