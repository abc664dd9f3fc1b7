pub mod contig;
pub mod positions;
pub mod variants;

mod error;

pub use contig::{Contig, ContigId};
pub use error::GenomeError;
pub use positions::PositionSet;
pub use variants::{Base, VariantSet};
