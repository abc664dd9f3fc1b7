use std::path::PathBuf;

use thiserror::Error;

use crate::address::Level;
use crate::tables::SampleId;

/// Coarse classification used to map errors onto process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or contradictory input from the caller.
    Input,
    /// The operation does not apply to the store's current state.
    State,
    /// An invariant violation discovered at runtime. Fatal for the
    /// in-flight transaction.
    Integrity,
    /// The backing storage failed.
    Store,
}

#[derive(Error, Debug)]
pub enum StoreError {
    // ---- input
    #[error("A sample named '{0}' already exists in the store")]
    DuplicateSample(String),

    #[error("No sample named '{0}' exists in the store")]
    UnknownSample(String),

    #[error("No sample with id {0} exists in the store")]
    UnknownSampleId(SampleId),

    #[error("Contig '{0}' does not belong to this reference. Does this sample belong in this store?")]
    UnknownContig(String),

    #[error("'{0}' is not a valid SNP address")]
    InvalidAddress(String),

    // ---- state
    #[error("The store already holds a reference; it can only be initialised once")]
    AlreadyInitialised,

    #[error("The store holds no reference yet; add one before adding samples")]
    MissingReference,

    #[error("Sample {0} has no clustering information")]
    NotClustered(SampleId),

    #[error("Sample {sample} is already clustered with SNP address {address}")]
    AlreadyClustered { sample: SampleId, address: String },

    // ---- integrity
    #[error(transparent)]
    Variant(#[from] genome::GenomeError),

    #[error("Cluster stats for {level} cluster {cluster} not found")]
    MissingStats { level: Level, cluster: u32 },

    #[error(
        "Address monotonicity violated at {narrow}/{wide}: samples sharing {narrow} cluster \
         {cluster} map to both {wide} clusters {first} and {second}"
    )]
    AddressMonotonicity { narrow: Level, wide: Level, cluster: u32, first: u32, second: u32 },

    #[error("Variant sets for sample {sample} on contig {contig} not found")]
    MissingVariants { sample: SampleId, contig: u32 },

    // ---- storage
    #[error("Failed to {action} store file '{path}'")]
    Io { action: &'static str, path: PathBuf, #[source] source: std::io::Error },

    #[error("Store file '{path}' is corrupted")]
    Corrupted { path: PathBuf, #[source] source: serde_json::Error },
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use StoreError::*;
        match self {
            DuplicateSample(_) | UnknownSample(_) | UnknownSampleId(_) | UnknownContig(_)
            | InvalidAddress(_) => ErrorKind::Input,
            AlreadyInitialised | MissingReference | NotClustered(_) | AlreadyClustered { .. } => {
                ErrorKind::State
            }
            Variant(_) | MissingStats { .. } | AddressMonotonicity { .. }
            | MissingVariants { .. } => ErrorKind::Integrity,
            Io { .. } | Corrupted { .. } => ErrorKind::Store,
        }
    }
}
