use store::{SampleId, Tables};

use crate::error::IngestError;
use crate::payload::{PayloadSets, VariantPayload};

/// Rebuild the ingest payload from a sample's stored variant sets.
///
/// This is the store's view of the sample: reference-ignored positions were
/// subtracted at write time and do not come back.
pub fn payload_from_store(tables: &Tables, sample: SampleId) -> Result<VariantPayload, IngestError> {
    let sets = tables.sample_sets(sample)?;
    let mut payload = VariantPayload::default();

    for contig in tables.contigs() {
        let Some(variant) = sets.get(&contig.id) else {
            continue;
        };
        payload.positions.insert(contig.name.clone(), PayloadSets {
            a  : variant.a.iter().collect(),
            c  : variant.c.iter().collect(),
            g  : variant.g.iter().collect(),
            t  : variant.t.iter().collect(),
            n  : variant.n.iter().collect(),
            gap: variant.gap.iter().collect(),
        });
    }
    Ok(payload)
}
