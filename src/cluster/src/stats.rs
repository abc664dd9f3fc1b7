use std::fmt;

use store::StatsRow;

use crate::error::StatsError;

/// Per-cluster running statistics over the pairwise distances between the
/// cluster's non-outlier members.
///
/// The moments are kept in Welford form (count, mean, M2 = sum of squared
/// deviations), so members can be added and removed online without
/// revisiting every distance. The standard deviation is the population
/// form, sqrt(M2 / nof_pw_dists).
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    members     : u32,
    nof_pw_dists: u64,
    mean        : Option<f64>,
    m2          : f64,
}

impl ClusterStats {
    /// Build from the full list of pairwise distances. The member count and
    /// list length must be consistent: |dists| = n(n−1)/2.
    pub fn from_distances(members: u32, dists: &[u32]) -> Result<Self, StatsError> {
        let expected = u64::from(members) * u64::from(members.saturating_sub(1)) / 2;
        if dists.len() as u64 != expected {
            return Err(StatsError::Inconsistent { members, dists: dists.len() });
        }
        if dists.is_empty() {
            // single-member (or empty) cluster: no distances, no moments
            return Ok(Self { members, nof_pw_dists: 0, mean: None, m2: 0.0 });
        }
        let n = dists.len() as f64;
        let mean = dists.iter().map(|&d| f64::from(d)).sum::<f64>() / n;
        let m2 = dists.iter().map(|&d| (f64::from(d) - mean).powi(2)).sum::<f64>();
        Ok(Self { members, nof_pw_dists: dists.len() as u64, mean: Some(mean), m2 })
    }

    /// Re-seed from moments stored in a cluster_stats row.
    #[must_use]
    pub fn from_moments(members: u32, mean: Option<f64>, stddev: Option<f64>) -> Self {
        let nof_pw_dists = u64::from(members) * u64::from(members.saturating_sub(1)) / 2;
        let m2 = stddev.map_or(0.0, |sd| sd * sd * nof_pw_dists as f64);
        Self { members, nof_pw_dists, mean, m2 }
    }

    #[must_use]
    pub fn from_row(row: &StatsRow) -> Self {
        Self::from_moments(row.nof_members, row.mean_pwise_dist, row.stddev)
    }

    #[must_use]
    pub fn to_row(&self) -> StatsRow {
        StatsRow {
            nof_members       : self.members,
            nof_pairwise_dists: self.nof_pw_dists,
            mean_pwise_dist   : self.mean,
            stddev            : self.stddev(),
        }
    }

    /// Add one member. `new_dists` holds its distances to every current
    /// member, so its length must equal the current member count.
    pub fn add_member(&mut self, new_dists: &[u32]) -> Result<(), StatsError> {
        if new_dists.len() != self.members as usize {
            return Err(StatsError::WrongDistanceCount {
                expected: self.members as usize,
                got     : new_dists.len(),
            });
        }
        for &d in new_dists {
            let d = f64::from(d);
            match self.mean {
                None => {
                    // first distance: streaming from an empty state is
                    // numerically unstable, seed the moments directly
                    self.mean = Some(d);
                    self.m2 = 0.0;
                    self.nof_pw_dists = 1;
                }
                Some(prev_mean) => {
                    let k = self.nof_pw_dists + 1;
                    let mean = prev_mean + (d - prev_mean) / k as f64;
                    self.m2 += (d - prev_mean) * (d - mean);
                    self.mean = Some(mean);
                    self.nof_pw_dists = k;
                }
            }
        }
        self.members += 1;
        Ok(())
    }

    /// Remove one member: the exact algebraic inverse of [`add_member`],
    /// popping the distances in reverse order.
    ///
    /// [`add_member`]: ClusterStats::add_member
    pub fn remove_member(&mut self, old_dists: &[u32]) -> Result<(), StatsError> {
        if self.members < 2 {
            return Err(StatsError::RemoveFromSingleton);
        }
        if old_dists.len() != self.members as usize - 1 {
            return Err(StatsError::WrongDistanceCount {
                expected: self.members as usize - 1,
                got     : old_dists.len(),
            });
        }
        for &d in old_dists.iter().rev() {
            let d = f64::from(d);
            let k = self.nof_pw_dists;
            let mean = self.mean.ok_or(StatsError::MissingMoments)?;
            if k == 1 {
                self.mean = None;
                self.m2 = 0.0;
                self.nof_pw_dists = 0;
            } else {
                let prev_mean = (mean * k as f64 - d) / (k - 1) as f64;
                self.m2 -= (d - prev_mean) * (d - mean);
                if self.m2 < 0.0 {
                    // rounding residue from the reversed updates
                    self.m2 = 0.0;
                }
                self.mean = Some(prev_mean);
                self.nof_pw_dists = k - 1;
            }
        }
        self.members -= 1;
        Ok(())
    }

    #[must_use]
    pub fn members(&self) -> u32 {
        self.members
    }

    #[must_use]
    pub fn nof_pairwise_dists(&self) -> u64 {
        self.nof_pw_dists
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    #[must_use]
    pub fn variance(&self) -> Option<f64> {
        (self.nof_pw_dists > 0).then(|| self.m2 / self.nof_pw_dists as f64)
    }

    #[must_use]
    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

impl fmt::Display for ClusterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "members: {}, nof_pw_dists: {}, mean_pw_dist: {:?}, stddev_pw_dist: {:?}",
            self.members,
            self.nof_pw_dists,
            self.mean,
            self.stddev(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn from_distances_checks_consistency() {
        assert!(matches!(
            ClusterStats::from_distances(3, &[1, 2]),
            Err(StatsError::Inconsistent { members: 3, dists: 2 })
        ));
        assert!(ClusterStats::from_distances(3, &[1, 2, 3]).is_ok());
    }

    #[test]
    fn singleton_has_no_moments() -> Result<(), StatsError> {
        let stats = ClusterStats::from_distances(1, &[])?;
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.stddev(), None);
        assert_eq!(stats.nof_pairwise_dists(), 0);
        Ok(())
    }

    #[test]
    fn direct_moments_match_a_hand_example() -> Result<(), StatsError> {
        let stats = ClusterStats::from_distances(3, &[4, 3, 3])?;
        assert_approx_eq!(f64, stats.mean().expect("two members"), 10.0 / 3.0, epsilon = 1e-12);
        // population variance of [4, 3, 3]
        let variance = stats.variance().expect("two members");
        assert_approx_eq!(f64, variance, 2.0 / 9.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn add_member_to_singleton_uses_the_shortcut() -> Result<(), StatsError> {
        let mut stats = ClusterStats::from_distances(1, &[])?;
        stats.add_member(&[7])?;
        assert_eq!(stats.members(), 2);
        assert_eq!(stats.nof_pairwise_dists(), 1);
        assert_approx_eq!(f64, stats.mean().expect("one dist"), 7.0);
        assert_approx_eq!(f64, stats.stddev().expect("one dist"), 0.0);
        Ok(())
    }

    #[test]
    fn add_member_rejects_wrong_distance_count() -> Result<(), StatsError> {
        let mut stats = ClusterStats::from_distances(2, &[5])?;
        assert!(matches!(
            stats.add_member(&[1]),
            Err(StatsError::WrongDistanceCount { expected: 2, got: 1 })
        ));
        Ok(())
    }

    /// Iteratively adding members matches building from the full distance
    /// list within 1e-9 relative error.
    #[test]
    fn streaming_matches_direct_construction() -> Result<(), StatsError> {
        // five members: distances indexed as d(i, j) for i < j
        let d = |i: usize, j: usize| -> u32 { (3 * i + 2 * j + (i * j) % 5) as u32 };

        let mut streamed = ClusterStats::from_distances(1, &[])?;
        for new in 1..5usize {
            let dists: Vec<u32> = (0..new).map(|old| d(old, new)).collect();
            streamed.add_member(&dists)?;
        }

        let mut all = Vec::new();
        for i in 0..5usize {
            for j in (i + 1)..5 {
                all.push(d(i, j));
            }
        }
        let direct = ClusterStats::from_distances(5, &all)?;

        assert_eq!(streamed.members(), direct.members());
        assert_eq!(streamed.nof_pairwise_dists(), direct.nof_pairwise_dists());
        let (sm, dm) = (streamed.mean().expect("moments"), direct.mean().expect("moments"));
        assert_approx_eq!(f64, sm, dm, epsilon = dm.abs() * 1e-9);
        let (ss, ds) = (streamed.stddev().expect("moments"), direct.stddev().expect("moments"));
        assert_approx_eq!(f64, ss, ds, epsilon = ds.abs() * 1e-9);
        Ok(())
    }

    /// remove_member is the exact inverse of add_member.
    #[test]
    fn remove_reverses_add() -> Result<(), StatsError> {
        let base = ClusterStats::from_distances(4, &[2, 5, 9, 4, 8, 3])?;
        let mut stats = base.clone();

        stats.add_member(&[6, 1, 7, 2])?;
        stats.remove_member(&[6, 1, 7, 2])?;

        assert_eq!(stats.members(), base.members());
        assert_eq!(stats.nof_pairwise_dists(), base.nof_pairwise_dists());
        let (got, want) = (stats.mean().expect("moments"), base.mean().expect("moments"));
        assert_approx_eq!(f64, got, want, epsilon = 1e-9);
        let (got, want) = (stats.stddev().expect("moments"), base.stddev().expect("moments"));
        assert_approx_eq!(f64, got, want, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn remove_down_to_singleton_clears_the_moments() -> Result<(), StatsError> {
        let mut stats = ClusterStats::from_distances(2, &[5])?;
        stats.remove_member(&[5])?;
        assert_eq!(stats.members(), 1);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.stddev(), None);
        Ok(())
    }

    #[test]
    fn remove_from_singleton_is_refused() -> Result<(), StatsError> {
        let mut stats = ClusterStats::from_distances(1, &[])?;
        assert!(matches!(stats.remove_member(&[]), Err(StatsError::RemoveFromSingleton)));
        Ok(())
    }

    #[test]
    fn row_round_trip_preserves_the_moments() -> Result<(), StatsError> {
        let stats = ClusterStats::from_distances(4, &[2, 5, 9, 4, 8, 3])?;
        let row = stats.to_row();
        let back = ClusterStats::from_row(&row);
        assert_eq!(back.members(), 4);
        let (got, want) = (back.mean().expect("moments"), stats.mean().expect("moments"));
        assert_approx_eq!(f64, got, want, epsilon = 1e-9);
        let (got, want) = (back.stddev().expect("moments"), stats.stddev().expect("moments"));
        assert_approx_eq!(f64, got, want, epsilon = 1e-9);
        Ok(())
    }
}
