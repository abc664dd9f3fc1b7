//! Variant ingest and export: the JSON payload schema, whole-genome fasta
//! comparison, bed exclude regions and annotation quality gates.

pub mod bed;
pub mod export;
pub mod fasta;
pub mod payload;

mod error;

pub use bed::exclude_regions_from_bed;
pub use error::IngestError;
pub use export::payload_from_store;
pub use fasta::{nless_n50, payload_from_sequences, read_fasta};
pub use payload::{PayloadSets, VariantPayload};

/// Fail when a gated value falls below its threshold.
pub fn check_gate(what: &'static str, value: f64, threshold: f64) -> Result<(), IngestError> {
    if value < threshold {
        return Err(IngestError::BelowThreshold { what, value, threshold });
    }
    Ok(())
}
