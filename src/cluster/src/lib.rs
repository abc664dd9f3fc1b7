//! Incremental SNP-address clustering: admission, merging, removal and the
//! per-cluster running statistics that every path keeps consistent.

pub mod integrity;
pub mod merge;
pub mod registrar;
pub mod remover;
pub mod stats;

mod error;

#[cfg(test)]
mod testutil;

pub use error::{ClusterError, StatsError, ZscoreReport};
pub use integrity::BrokenPair;
pub use merge::ClusterMerge;
pub use registrar::{Admission, AdmissionOptions, ProposedAddress};
pub use remover::{RemovalMode, RemovalOutcome};
pub use stats::ClusterStats;
