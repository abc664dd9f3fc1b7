//! Read-only interrogation of the clustering: nearest neighbours, distance
//! windows, addresses, bands and rename history. Nothing in here mutates
//! the store, so queries may run concurrently with each other.

use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;

use distance::CancelToken;
use store::{Level, MemberFilter, SampleId, Tables};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Distance(#[from] distance::DistanceError),
}

/// One rename in a sample's past, rendered in address form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub old : String,
    pub new : String,
    pub time: DateTime<Utc>,
}

/// A sample's current address plus every rename that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleHistory {
    pub current: String,
    pub events : Vec<HistoryEvent>,
}

/// The k nearest samples by SNP distance, ties on the k-th distance
/// included, sorted ascending.
///
/// Candidates are accumulated from the sample's own clusters, narrowest
/// level first, until at least k are available; when even the widest
/// cluster is too small the whole non-ignored population is scanned.
pub fn closest(
    tables: &Tables,
    name  : &str,
    k     : usize,
    token : &CancelToken,
) -> Result<Vec<(String, u32)>, QueryError> {
    let sample = tables.sample_by_name(name)?.id;
    let address = tables.lookup(sample)?;

    let mut pool: Vec<SampleId> = Vec::new();
    for level in Level::ALL {
        pool = tables.members(level, address.level(level), MemberFilter::IncludeOutliers);
        pool.retain(|&id| id != sample);
        info!("Number of samples in same {level} cluster: {}", pool.len());
        if pool.len() >= k {
            break;
        }
    }

    let distances = if pool.len() < k {
        distance::relevant(tables, sample, token)?
    } else {
        distance::one_to_many(tables, sample, &pool, token)?
    };

    let mut result: Vec<(SampleId, u32)> = distances.iter().copied().take(k).collect();
    if let Some(&(_, cutoff)) = result.last() {
        result.extend(distances.iter().copied().skip(k).take_while(|&(_, d)| d == cutoff));
    }

    result
        .into_iter()
        .filter(|&(id, _)| id != sample)
        .map(|(id, d)| Ok((tables.sample(id)?.name.clone(), d)))
        .collect()
}

/// Every sample within the given SNP distance of the named one, sorted
/// ascending by distance.
///
/// The candidate pool is the sample's cluster at the narrowest threshold
/// at least as wide as the requested distance; beyond 250 the whole
/// non-ignored population is used.
pub fn within(
    tables      : &Tables,
    name        : &str,
    max_distance: u32,
    token       : &CancelToken,
) -> Result<Vec<(String, u32)>, QueryError> {
    let sample = tables.sample_by_name(name)?.id;
    let address = tables.lookup(sample)?;

    let neighbours: Vec<SampleId> = match Level::smallest_containing(max_distance) {
        Some(level) => tables
            .members(level, address.level(level), MemberFilter::IncludeOutliers)
            .into_iter()
            .filter(|&id| id != sample)
            .collect(),
        None => tables.relevant_samples().into_iter().filter(|&id| id != sample).collect(),
    };
    if neighbours.is_empty() {
        info!("No samples found this close to the query sample.");
        return Ok(Vec::new());
    }

    info!("Calculating distances to {} samples.", neighbours.len());
    let distances = distance::one_to_many(tables, sample, &neighbours, token)?;
    distances
        .into_iter()
        .filter(|&(_, d)| d <= max_distance)
        .map(|(id, d)| Ok((tables.sample(id)?.name.clone(), d)))
        .collect()
}

/// The sample's SNP address in textual form, widest threshold first.
pub fn snp_address(tables: &Tables, name: &str) -> Result<String, QueryError> {
    let sample = tables.sample_by_name(name)?.id;
    Ok(tables.lookup(sample)?.to_string())
}

/// The half-open SNP-distance band containing the sample's nearest
/// neighbour, derived from the address alone: the widest level at which the
/// sample is still alone bounds the nearest distance from below.
pub fn nearest_band(tables: &Tables, name: &str) -> Result<String, QueryError> {
    let sample = tables.sample_by_name(name)?.id;
    let address = tables.lookup(sample)?;

    let mut widest_first = Level::ALL;
    widest_first.reverse();
    for (index, level) in widest_first.iter().enumerate() {
        let members =
            tables.members(*level, address.level(*level), MemberFilter::IncludeOutliers);
        if members.len() == 1 {
            return Ok(match index {
                0 => "x>250".to_string(),
                _ => format!("{}>=x>{}", widest_first[index - 1].threshold(), level.threshold()),
            });
        }
    }
    Ok("x=0".to_string())
}

/// The sample's current address and all its past renames.
pub fn history(tables: &Tables, name: &str) -> Result<SampleHistory, QueryError> {
    let sample = tables.sample_by_name(name)?.id;
    let current = tables.lookup(sample)?.to_string();
    let events = tables
        .history_for(sample)
        .into_iter()
        .map(|row| HistoryEvent {
            old : row.old.to_string(),
            new : row.new.to_string(),
            time: row.renamed_at,
        })
        .collect();
    Ok(SampleHistory { current, events })
}
