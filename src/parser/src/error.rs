use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("--reference is REQUIRED when using fasta format input")]
    MissingReferenceFasta,

    #[error("--min-coverage only applies to json format input")]
    CoverageGateNeedsJson,
}
