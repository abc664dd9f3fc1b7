use std::fmt;

use serde::{Deserialize, Serialize};

pub type ContigId = u32;

/// A reference contig. Contigs are created once, when the reference is added,
/// and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
    pub id    : ContigId,
    pub name  : String,
    pub length: u32,
}

impl Contig {
    #[must_use]
    pub fn new(id: ContigId, name: &str, length: u32) -> Self {
        Self { id, name: name.to_string(), length }
    }
}

impl fmt::Display for Contig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bp)", self.name, self.length)
    }
}
