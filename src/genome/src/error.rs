use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GenomeError {
    #[error("Position {0} is recorded for more than one base state")]
    OverlappingPosition(u32),

    #[error("Position {position} lies beyond the end of contig '{contig}' (length {length})")]
    PositionOutOfRange { contig: String, position: u32, length: u32 },
}
