use thiserror::Error;

use store::{ErrorKind, Level, SampleId};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Number of members ({members}) and number of distances ({dists}) inconsistent")]
    Inconsistent { members: u32, dists: usize },

    #[error("Expected {expected} distances for this update, got {got}")]
    WrongDistanceCount { expected: usize, got: usize },

    #[error("Cannot remove a member from a cluster of fewer than two members")]
    RemoveFromSingleton,

    #[error("Stats object is missing its moments")]
    MissingMoments,
}

/// The per-level z-score report produced when an admission fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZscoreReport(pub Vec<String>);

impl std::fmt::Display for ZscoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.0 {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Distance(#[from] distance::DistanceError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("Sample {0} is not clusterable: it is flagged ignore_sample")]
    SampleIgnored(SampleId),

    #[error("z-score check for this assignment failed; the store was not updated:\n{0}")]
    StatisticalReject(ZscoreReport),

    #[error(
        "Admitting this sample requires merging clusters at {0} level(s); \
         pass --force-merge to admit it anyway"
    )]
    MergeRequired(usize),

    #[error("A sample that was never clustered cannot be made a known outlier")]
    OutlierNotClustered,

    #[error("{level} cluster {cluster}: {detail}")]
    DataInconsistency { level: Level, cluster: u32, detail: String },
}

impl ClusterError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::Store(e) => e.kind(),
            ClusterError::Distance(distance::DistanceError::Store(e)) => e.kind(),
            ClusterError::Distance(distance::DistanceError::Cancelled) => ErrorKind::State,
            ClusterError::Stats(_) | ClusterError::DataInconsistency { .. } => ErrorKind::Integrity,
            ClusterError::StatisticalReject(_)
            | ClusterError::MergeRequired(_)
            | ClusterError::SampleIgnored(_)
            | ClusterError::OutlierNotClustered => ErrorKind::State,
        }
    }
}
