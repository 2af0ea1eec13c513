use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn from_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut stats, status| {
            stats.total += 1;
            match status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::InFlight => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats
        })
    }

    /// True once every job has either completed or failed.
    pub fn is_batch_complete(&self) -> bool {
        self.total > 0 && self.completed + self.failed == self.total
    }
}
