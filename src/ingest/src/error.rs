use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Could not open file '{path}'")]
    Open { path: PathBuf, #[source] source: std::io::Error },

    #[error("Data in '{path}' is corrupted")]
    Corrupted { path: PathBuf, #[source] source: serde_json::Error },

    #[error(
        "Data in '{0}' is not in the expected format: every contig must carry \
         exactly the A, C, G, T, N and - position lists"
    )]
    WrongShape(PathBuf),

    #[error("Unknown character '{character}' in sample sequence on contig '{contig}'. Only [A,C,G,T,N,-] are allowed")]
    UnknownCharacter { contig: String, character: char },

    #[error("Not the same contigs in sample and reference. Is this the right reference?")]
    ContigMismatch,

    #[error("Sequence lengths differ between sample and reference. Is this the right reference?")]
    LengthMismatch,

    #[error("Was asked to check {gate} but no {annotation} annotation was found")]
    MissingAnnotation { gate: &'static str, annotation: &'static str },

    #[error("The {what} annotation is malformed: '{text}'")]
    MalformedAnnotation { what: &'static str, text: String },

    #[error("The {what} for this sample ({value}) is below the required threshold ({threshold})")]
    BelowThreshold { what: &'static str, value: f64, threshold: f64 },

    #[error("Bed line '{line}' in '{path}' is malformed")]
    MalformedBed { path: PathBuf, line: String },

    #[error("The contig name '{0}' in the bed file does not correspond to the reference provided")]
    UnknownBedContig(String),

    #[error(transparent)]
    Variant(#[from] genome::GenomeError),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}
