use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use genome::PositionSet;

use crate::error::IngestError;

/// Read exclude regions from a bed file and expand them into per-contig
/// position sets. Bed starts are 0-based half-open; the stored positions
/// are 1-based inclusive.
pub fn exclude_regions_from_bed(
    path        : &Path,
    contig_names: &[String],
) -> Result<BTreeMap<String, PositionSet>, IngestError> {
    let open_err = |source| IngestError::Open { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(open_err)?;

    let mut regions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(open_err)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || IngestError::MalformedBed {
            path: path.to_path_buf(),
            line: line.to_string(),
        };

        let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
        if columns.len() < 3 {
            return Err(malformed());
        }
        let contig = columns[0];
        if !contig_names.iter().any(|name| name == contig) {
            return Err(IngestError::UnknownBedContig(contig.to_string()));
        }
        let start: u32 = columns[1].parse().map_err(|_| malformed())?;
        let stop: u32 = columns[2].parse().map_err(|_| malformed())?;

        regions.entry(contig.to_string()).or_default().extend(start + 1..=stop);
    }

    Ok(regions.into_iter().map(|(contig, positions)| {
        (contig, PositionSet::from_unsorted(positions))
    }).collect())
}
