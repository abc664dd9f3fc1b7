use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use genome::{Contig, ContigId, PositionSet, VariantSet};

use crate::address::{Level, SnpAddress};
use crate::error::StoreError;
use crate::tables::{ClusterRow, SampleId, SampleRow, StatsRow, Tables};

/// VariantStore operations: the store exclusively owns the per-sample,
/// per-contig position sets; everything else reads them by sample id.
impl Tables {
    /// Initialise an empty store with the reference.
    ///
    /// The reference's per-contig ignored set (positions with no mapping,
    /// gap positions, and any user-supplied exclude intervals; the caller
    /// unions these) is stored as the reference N-set and subtracted from
    /// every sample added later. The reference is registered as a sample
    /// with address 1.1.1.1.1.1.1 and singleton stats at every level.
    pub fn put_reference(
        &mut self,
        name   : &str,
        contigs: &[(String, u32)],
        ignored: &BTreeMap<String, PositionSet>,
        now    : DateTime<Utc>,
    ) -> Result<SampleId, StoreError> {
        if self.is_initialised() || !self.samples.is_empty() {
            return Err(StoreError::AlreadyInitialised);
        }

        for (index, (contig_name, length)) in contigs.iter().enumerate() {
            self.contigs.push(Contig::new(index as ContigId + 1, contig_name, *length));
        }

        let ref_id = self.next_sample_id();
        self.samples.insert(ref_id, SampleRow {
            id           : ref_id,
            name         : name.to_string(),
            date_added   : now,
            ignore_sample: false,
            ignore_zscore: false,
        });

        let mut sets = BTreeMap::new();
        for contig in &self.contigs {
            let ignored_here = ignored.get(&contig.name).cloned().unwrap_or_default();
            debug!("Reference contig {}: {} ignored positions", contig.name, ignored_here.len());
            sets.insert(contig.id, VariantSet::reference_ignored(ignored_here));
        }
        self.variants.insert(ref_id, sets);

        self.sample_clusters.insert(ref_id, ClusterRow {
            address: SnpAddress::REFERENCE,
            means  : [None; 7],
        });
        for level in Level::ALL {
            self.cluster_stats.entry(level).or_default().insert(1, StatsRow::singleton());
        }

        info!("Initialised store with reference '{name}' ({} contigs)", self.contigs.len());
        Ok(ref_id)
    }

    /// Store the variant sets of a new sample, one row per contig.
    ///
    /// The reference-ignored positions are subtracted from every input set
    /// before storage, so ignored positions never enter a distance
    /// calculation. Contigs absent from the input are stored as empty sets.
    pub fn put_sample(
        &mut self,
        name: &str,
        sets: BTreeMap<String, VariantSet>,
        now : DateTime<Utc>,
    ) -> Result<SampleId, StoreError> {
        if !self.is_initialised() {
            return Err(StoreError::MissingReference);
        }
        self.assert_name_free(name)?;

        for contig_name in sets.keys() {
            if self.contig_by_name(contig_name).is_none() {
                return Err(StoreError::UnknownContig(contig_name.clone()));
            }
        }

        let sample_id = self.next_sample_id();
        let mut stored = BTreeMap::new();
        for contig in &self.contigs {
            let row = match sets.get(&contig.name) {
                Some(input) => {
                    let ignored = self.reference_ignored(contig.id)?;
                    let trimmed = input.subtract(ignored);
                    debug!(
                        "Sample '{name}' contig {}: As: {}, Cs: {}, Gs: {}, Ts: {}, Ns: {}, gaps: {}",
                        contig.name,
                        trimmed.a.len(), trimmed.c.len(), trimmed.g.len(),
                        trimmed.t.len(), trimmed.n.len(), trimmed.gap.len(),
                    );
                    trimmed
                }
                None => VariantSet::empty(),
            };
            stored.insert(contig.id, row);
        }

        self.samples.insert(sample_id, SampleRow {
            id           : sample_id,
            name         : name.to_string(),
            date_added   : now,
            ignore_sample: false,
            ignore_zscore: false,
        });
        self.variants.insert(sample_id, stored);

        info!("Created new sample '{name}' with id {sample_id}");
        Ok(sample_id)
    }

    /// All variant sets of one sample, keyed by contig.
    pub fn sample_sets(&self, id: SampleId) -> Result<&BTreeMap<ContigId, VariantSet>, StoreError> {
        self.variants.get(&id).ok_or(StoreError::UnknownSampleId(id))
    }

    pub fn sample_contig_sets(
        &self,
        id    : SampleId,
        contig: ContigId,
    ) -> Result<&VariantSet, StoreError> {
        self.sample_sets(id)?
            .get(&contig)
            .ok_or(StoreError::MissingVariants { sample: id, contig })
    }

    /// Batched read used by the distance engine: one contig, many samples.
    pub fn contig_sets(
        &self,
        contig : ContigId,
        samples: &[SampleId],
    ) -> Result<Vec<(SampleId, &VariantSet)>, StoreError> {
        samples
            .iter()
            .map(|&id| self.sample_contig_sets(id, contig).map(|sets| (id, sets)))
            .collect()
    }

    /// The reference's globally-ignored positions on one contig.
    pub fn reference_ignored(&self, contig: ContigId) -> Result<&PositionSet, StoreError> {
        let ref_id = self.reference.ok_or(StoreError::MissingReference)?;
        Ok(&self.sample_contig_sets(ref_id, contig)?.n)
    }

    /// Drop the sample's variant rows and its samples-table row.
    pub fn drop_sample(&mut self, id: SampleId) -> Result<(), StoreError> {
        info!("Removing sample {id} from the samples and variants tables");
        self.variants.remove(&id);
        self.samples.remove(&id).map(|_| ()).ok_or(StoreError::UnknownSampleId(id))
    }

    pub fn set_ignore_sample(&mut self, id: SampleId, value: bool) -> Result<(), StoreError> {
        self.samples
            .get_mut(&id)
            .map(|row| row.ignore_sample = value)
            .ok_or(StoreError::UnknownSampleId(id))
    }

    pub fn set_ignore_zscore(&mut self, id: SampleId, value: bool) -> Result<(), StoreError> {
        self.samples
            .get_mut(&id)
            .map(|row| row.ignore_zscore = value)
            .ok_or(StoreError::UnknownSampleId(id))
    }
}
