use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::IngestError;
use crate::payload::{PayloadSets, VariantPayload};

/// Read a fasta file into contig → sequence, keyed by the header up to the
/// first space. Gzip-compressed input is handled transparently.
pub fn read_fasta(path: &Path) -> Result<BTreeMap<String, String>, IngestError> {
    let open_err = |source| IngestError::Open { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(open_err)?;
    let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut sequences = BTreeMap::new();
    let mut header = String::new();
    let mut sequence = String::new();
    for line in reader.lines() {
        let line = line.map_err(open_err)?;
        let line = line.trim();
        if let Some(rest) = line.strip_prefix('>') {
            if !header.is_empty() {
                sequences.insert(header.clone(), std::mem::take(&mut sequence));
            }
            header = rest.split_whitespace().next().unwrap_or("").to_string();
        } else {
            sequence.push_str(line);
        }
    }
    if !header.is_empty() {
        sequences.insert(header, sequence);
    }
    Ok(sequences)
}

/// Build a variant payload by comparing a sample's whole-genome fasta
/// against the reference, position by position.
///
/// Contig names and lengths must match; a single-contig reference matches
/// on length alone. Every position where the sample differs from the
/// reference lands in the set of the sample's character; anything outside
/// [A,C,G,T,N,-] is an error. Positions are 1-based.
pub fn payload_from_sequences(
    sample   : &BTreeMap<String, String>,
    reference: &BTreeMap<String, String>,
) -> Result<VariantPayload, IngestError> {
    if sample.len() != reference.len() {
        return Err(IngestError::ContigMismatch);
    }
    if reference.len() > 1 {
        if !sample.keys().eq(reference.keys()) {
            return Err(IngestError::ContigMismatch);
        }
        if sample.iter().zip(reference.values()).any(|((_, s), r)| s.len() != r.len()) {
            return Err(IngestError::LengthMismatch);
        }
    } else if sample.values().zip(reference.values()).any(|(s, r)| s.len() != r.len()) {
        return Err(IngestError::LengthMismatch);
    }

    let mut payload = VariantPayload::default();
    for ((ref_name, ref_seq), sam_seq) in reference.iter().zip(sample.values()) {
        let mut sets = PayloadSets::default();
        let pairs = ref_seq.chars().zip(sam_seq.chars()).enumerate();
        for (index, (r, s)) in pairs {
            let (r, s) = (r.to_ascii_uppercase(), s.to_ascii_uppercase());
            if r == s {
                continue;
            }
            let position = index as u32 + 1;
            match s {
                'A' => sets.a.push(position),
                'C' => sets.c.push(position),
                'G' => sets.g.push(position),
                'T' => sets.t.push(position),
                'N' => sets.n.push(position),
                '-' => sets.gap.push(position),
                other => {
                    return Err(IngestError::UnknownCharacter {
                        contig   : ref_name.clone(),
                        character: other,
                    })
                }
            }
        }
        payload.positions.insert(ref_name.clone(), sets);
    }
    Ok(payload)
}

/// The N50 of the N-less stretches of the sample's genome: the payload's
/// N positions cut each contig into runs, and the N50 is the length at
/// which half the summed run length is reached.
#[must_use]
pub fn nless_n50(payload: &VariantPayload, contig_lengths: &BTreeMap<String, u32>) -> u32 {
    let mut runs: Vec<u32> = Vec::new();
    for (contig, sets) in &payload.positions {
        let Some(&length) = contig_lengths.get(contig) else {
            continue;
        };
        let mut n_positions = sets.n.clone();
        n_positions.sort_unstable();

        let mut previous = 0; // position of the last N seen, 1-based
        for &n in &n_positions {
            runs.push(n.saturating_sub(previous + 1));
            previous = n;
        }
        runs.push(length.saturating_sub(previous));
    }

    runs.retain(|&r| r > 0);
    if runs.is_empty() {
        return 0;
    }
    runs.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = runs.iter().map(|&r| u64::from(r)).sum();
    let mut seen = 0u64;
    for &run in &runs {
        seen += u64::from(run);
        if seen * 2 >= total {
            return run;
        }
    }
    0
}
