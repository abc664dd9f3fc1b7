//! The SNP distance engine.
//!
//! The distance between two samples is the number of reference positions at
//! which both give a definite base and the bases differ, summed across
//! contigs. On position sets this is a pure set identity: the union of the
//! per-base symmetric differences, minus every position that is N or gap in
//! either sample. Positions where both samples agree cancel inside the
//! symmetric differences; positions without evidence are masked out
//! explicitly.

pub mod cancel;
pub mod memo;

mod error;

pub use cancel::CancelToken;
pub use error::DistanceError;
pub use memo::DistanceMemo;

use std::time::Instant;

use ahash::AHashMap;
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use genome::{Base, VariantSet};
use store::{SampleId, Tables};

/// The SNP distance between two variant records on one contig.
#[must_use]
pub fn contig_distance(x: &VariantSet, y: &VariantSet) -> u32 {
    let masked = x.masked().union(&y.masked());
    let diffs = Base::ALL.map(|base| x.base(base).symmetric_difference(y.base(base)));
    diffs
        .iter()
        .map(|set| set.iter())
        .kmerge()
        .dedup()
        .filter(|position| !masked.contains(*position))
        .count() as u32
}

/// The SNP distance between two samples, summed over every contig.
pub fn pair(tables: &Tables, a: SampleId, b: SampleId) -> Result<u32, DistanceError> {
    let a_sets = tables.sample_sets(a)?;
    let b_sets = tables.sample_sets(b)?;
    let mut total = 0;
    for contig in tables.contigs() {
        let (Some(x), Some(y)) = (a_sets.get(&contig.id), b_sets.get(&contig.id)) else {
            continue;
        };
        total += contig_distance(x, y);
    }
    Ok(total)
}

/// Distances from one sample to many targets, sorted ascending by distance
/// with ties broken by sample id.
///
/// Targets are fanned out across threads; the result is deterministic
/// because the final ordering is imposed by the sort. Cancellation is
/// checked per target.
pub fn one_to_many(
    tables : &Tables,
    sample : SampleId,
    targets: &[SampleId],
    token  : &CancelToken,
) -> Result<Vec<(SampleId, u32)>, DistanceError> {
    tables.sample_sets(sample)?;

    let start = Instant::now();
    let mut distances = targets
        .par_iter()
        .map(|&target| {
            if token.is_cancelled() {
                return Err(DistanceError::Cancelled);
            }
            pair(tables, sample, target).map(|d| (target, d))
        })
        .collect::<Result<Vec<_>, _>>()?;
    distances.sort_unstable_by_key(|&(id, d)| (d, id));

    info!(
        "Calculated {} distances for sample {sample} in {:.3} seconds",
        distances.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(distances)
}

/// Distances from a sample to every clustered, non-ignored sample.
pub fn relevant(
    tables: &Tables,
    sample: SampleId,
    token : &CancelToken,
) -> Result<Vec<(SampleId, u32)>, DistanceError> {
    let targets: Vec<SampleId> =
        tables.relevant_samples().into_iter().filter(|&id| id != sample).collect();
    info!("Found {} samples in the store relevant for clustering", targets.len());
    one_to_many(tables, sample, &targets, token)
}

/// All pairwise distances between the given samples, keyed by the unordered
/// pair (smaller id first). Only the upper triangle is computed.
pub fn all_pairs(
    tables : &Tables,
    samples: &[SampleId],
    token  : &CancelToken,
) -> Result<AHashMap<(SampleId, SampleId), u32>, DistanceError> {
    let mut wanted: Vec<(SampleId, SampleId)> = Vec::new();
    for (i, &a) in samples.iter().enumerate() {
        for &b in &samples[i + 1..] {
            if a != b {
                wanted.push((a.min(b), a.max(b)));
            }
        }
    }
    wanted.sort_unstable();
    wanted.dedup();

    debug!("Computing {} pairwise distances", wanted.len());
    let computed = wanted
        .par_iter()
        .map(|&(a, b)| {
            if token.is_cancelled() {
                return Err(DistanceError::Cancelled);
            }
            pair(tables, a, b).map(|d| ((a, b), d))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(computed.into_iter().collect())
}

/// The flat list of all pairwise distances within a sample set, as consumed
/// by the statistics constructors. Length is n(n−1)/2.
pub fn all_pair_dists(
    tables : &Tables,
    samples: &[SampleId],
    token  : &CancelToken,
) -> Result<Vec<u32>, DistanceError> {
    Ok(all_pairs(tables, samples, token)?.into_values().collect())
}

/// A full symmetric distance matrix with zero diagonal, indexed like the
/// input slice.
pub fn matrix(
    tables : &Tables,
    samples: &[SampleId],
    token  : &CancelToken,
) -> Result<Vec<Vec<u32>>, DistanceError> {
    let pairs = all_pairs(tables, samples, token)?;
    let n = samples.len();
    let mut out = vec![vec![0u32; n]; n];
    for (i, &a) in samples.iter().enumerate() {
        for (j, &b) in samples.iter().enumerate().skip(i + 1) {
            if a == b {
                continue;
            }
            let d = pairs[&(a.min(b), a.max(b))];
            out[i][j] = d;
            out[j][i] = d;
        }
    }
    Ok(out)
}
