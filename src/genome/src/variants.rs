use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GenomeError;
use crate::positions::PositionSet;

/// The four confident base states a sample can report at a reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Base { A, C, G, T }

impl Base {
    pub const ALL: [Base; 4] = [Base::A, Base::C, Base::G, Base::T];
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Base::A => write!(f, "A"),
            Base::C => write!(f, "C"),
            Base::G => write!(f, "G"),
            Base::T => write!(f, "T"),
        }
    }
}

/// The variant record of one sample on one contig: the positions at which the
/// sample differs from the reference, split per base call, plus the positions
/// at which the sample provides no evidence (N or gap).
///
/// The six sets are pairwise disjoint; [`VariantSet::new`] enforces this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    pub a  : PositionSet,
    pub c  : PositionSet,
    pub g  : PositionSet,
    pub t  : PositionSet,
    pub n  : PositionSet,
    pub gap: PositionSet,
}

impl VariantSet {
    pub fn new(
        a  : PositionSet,
        c  : PositionSet,
        g  : PositionSet,
        t  : PositionSet,
        n  : PositionSet,
        gap: PositionSet,
    ) -> Result<Self, GenomeError> {
        let set = Self { a, c, g, t, n, gap };
        set.check_disjoint()?;
        Ok(set)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A reference record: every listed position is treated as N.
    #[must_use]
    pub fn reference_ignored(ignored: PositionSet) -> Self {
        Self { n: ignored, ..Self::default() }
    }

    #[must_use]
    pub fn base(&self, base: Base) -> &PositionSet {
        match base {
            Base::A => &self.a,
            Base::C => &self.c,
            Base::G => &self.g,
            Base::T => &self.t,
        }
    }

    /// Positions at which this sample provides no evidence: N ∪ gap.
    #[must_use]
    pub fn masked(&self) -> PositionSet {
        self.n.union(&self.gap)
    }

    /// Remove the reference-ignored positions from every set. Applied once at
    /// write time so that ignored positions never enter distance calculations.
    #[must_use]
    pub fn subtract(&self, ignored: &PositionSet) -> Self {
        Self {
            a  : self.a.difference(ignored),
            c  : self.c.difference(ignored),
            g  : self.g.difference(ignored),
            t  : self.t.difference(ignored),
            n  : self.n.difference(ignored),
            gap: self.gap.difference(ignored),
        }
    }

    #[must_use]
    pub fn total_positions(&self) -> usize {
        self.sets().iter().map(|s| s.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets().iter().all(|s| s.is_empty())
    }

    fn sets(&self) -> [&PositionSet; 6] {
        [&self.a, &self.c, &self.g, &self.t, &self.n, &self.gap]
    }

    fn check_disjoint(&self) -> Result<(), GenomeError> {
        let mut all: Vec<u32> = self.sets().iter().flat_map(|s| s.iter()).collect();
        all.sort_unstable();
        if let Some(dup) = all.windows(2).find(|w| w[0] == w[1]) {
            return Err(GenomeError::OverlappingPosition(dup[0]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(positions: &[u32]) -> PositionSet {
        PositionSet::from_unsorted(positions.to_vec())
    }

    #[test]
    fn disjoint_sets_are_accepted() -> Result<(), GenomeError> {
        let v = VariantSet::new(
            set(&[1, 2]),
            set(&[3]),
            set(&[4]),
            set(&[5]),
            set(&[6, 7]),
            set(&[8]),
        )?;
        assert_eq!(v.total_positions(), 8);
        Ok(())
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        let result = VariantSet::new(
            set(&[1, 2]),
            set(&[2]),
            set(&[]),
            set(&[]),
            set(&[]),
            set(&[]),
        );
        assert_eq!(result, Err(GenomeError::OverlappingPosition(2)));
    }

    #[test]
    fn overlap_between_base_and_mask_is_rejected() {
        let result = VariantSet::new(
            set(&[1]),
            set(&[]),
            set(&[]),
            set(&[]),
            set(&[1]),
            set(&[]),
        );
        assert_eq!(result, Err(GenomeError::OverlappingPosition(1)));
    }

    #[test]
    fn subtract_hits_every_set() -> Result<(), GenomeError> {
        let v = VariantSet::new(
            set(&[1, 10]),
            set(&[2, 11]),
            set(&[3, 12]),
            set(&[4, 13]),
            set(&[5, 14]),
            set(&[6, 15]),
        )?;
        let trimmed = v.subtract(&set(&[10, 11, 12, 13, 14, 15]));
        assert_eq!(trimmed.a, set(&[1]));
        assert_eq!(trimmed.c, set(&[2]));
        assert_eq!(trimmed.g, set(&[3]));
        assert_eq!(trimmed.t, set(&[4]));
        assert_eq!(trimmed.n, set(&[5]));
        assert_eq!(trimmed.gap, set(&[6]));
        Ok(())
    }

    #[test]
    fn masked_is_n_union_gap() -> Result<(), GenomeError> {
        let v = VariantSet::new(
            set(&[]),
            set(&[]),
            set(&[]),
            set(&[]),
            set(&[5, 9]),
            set(&[7]),
        )?;
        assert_eq!(v.masked(), set(&[5, 7, 9]));
        Ok(())
    }
}
