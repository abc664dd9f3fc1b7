use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// A set of 1-based positions on a single contig, kept strictly increasing.
///
/// Variant position sets are large and often dense, so the set algebra the
/// distance engine relies on (union, difference, symmetric difference) is
/// implemented as linear merges over the sorted backing vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionSet(Vec<u32>);

impl PositionSet {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a set from arbitrary input. Duplicates collapse.
    #[must_use]
    pub fn from_unsorted(mut positions: Vec<u32>) -> Self {
        positions.sort_unstable();
        positions.dedup();
        Self(positions)
    }

    /// Wrap a vector which is already strictly increasing.
    /// Falls back to sorting when the caller got it wrong.
    #[must_use]
    pub fn from_sorted(positions: Vec<u32>) -> Self {
        if positions.windows(2).all(|w| w[0] < w[1]) {
            Self(positions)
        } else {
            Self::from_unsorted(positions)
        }
    }

    #[must_use]
    pub fn contains(&self, position: u32) -> bool {
        self.0.binary_search(&position).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn max(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// self ∪ other
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let (mut i, mut j) = (0, 0);
        let (a, b) = (&self.0, &other.0);
        let mut merged = Vec::with_capacity(a.len() + b.len());
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less    => { merged.push(a[i]); i += 1; }
                std::cmp::Ordering::Greater => { merged.push(b[j]); j += 1; }
                std::cmp::Ordering::Equal   => { merged.push(a[i]); i += 1; j += 1; }
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);
        Self(merged)
    }

    /// self ∖ other
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut j = 0;
        let b = &other.0;
        let kept = self.0.iter().copied().filter(|&pos| {
            while j < b.len() && b[j] < pos {
                j += 1;
            }
            !(j < b.len() && b[j] == pos)
        });
        Self(kept.collect())
    }

    /// self △ other
    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let (mut i, mut j) = (0, 0);
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::new();
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less    => { out.push(a[i]); i += 1; }
                std::cmp::Ordering::Greater => { out.push(b[j]); j += 1; }
                std::cmp::Ordering::Equal   => { i += 1; j += 1; }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        Self(out)
    }

    /// |self ∩ other|
    #[must_use]
    pub fn intersection_len(&self, other: &Self) -> usize {
        let (mut i, mut j, mut count) = (0, 0, 0);
        let (a, b) = (&self.0, &other.0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less    => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal   => { count += 1; i += 1; j += 1; }
            }
        }
        count
    }
}

impl Deref for PositionSet {
    type Target = [u32];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<u32> for PositionSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl From<PositionSet> for Vec<u32> {
    fn from(set: PositionSet) -> Self {
        set.0
    }
}
