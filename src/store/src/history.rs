use chrono::{DateTime, Utc};
use log::warn;

use crate::address::{Level, SnpAddress};
use crate::tables::{ClusterId, HistoryRow, MergeRow, SampleId, Tables};

/// Append-only audit logs. Entries written inside one transaction share the
/// transaction's timestamp and become visible iff the transaction commits.
impl Tables {
    pub fn push_merge(
        &mut self,
        level : Level,
        source: ClusterId,
        target: ClusterId,
        time  : DateTime<Utc>,
    ) {
        warn!("Cluster {source} on level {level} has been MERGED into cluster {target}");
        self.merge_log.push(MergeRow { level, source, target, time_of_merge: time });
    }

    pub fn push_history(
        &mut self,
        sample_id: SampleId,
        old      : SnpAddress,
        new      : SnpAddress,
        time     : DateTime<Utc>,
    ) {
        warn!("Clustering for sample {sample_id} will be changed from {old} to {new}");
        self.sample_history.push(HistoryRow { sample_id, old, new, renamed_at: time });
    }

    #[must_use]
    pub fn merge_entries(&self) -> &[MergeRow] {
        &self.merge_log
    }

    #[must_use]
    pub fn history_for(&self, sample_id: SampleId) -> Vec<&HistoryRow> {
        self.sample_history.iter().filter(|row| row.sample_id == sample_id).collect()
    }

    pub fn delete_history_for(&mut self, sample_id: SampleId) {
        self.sample_history.retain(|row| row.sample_id != sample_id);
    }
}
