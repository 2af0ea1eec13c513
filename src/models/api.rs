use garde::Validate;
use serde::{Deserialize, Serialize};

use super::job::JobSummary;
use super::stats::QueueStats;
use crate::services::scheduler::RunState;

/// Rows per page when listing jobs.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Query string for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListJobsQuery {
    #[garde(range(min = 1))]
    pub page: Option<usize>,

    #[garde(range(min = 1, max = 500))]
    pub per_page: Option<usize>,
}

impl ListJobsQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Zero-based offset and page size. Pages past the end yield an empty
    /// window rather than overflowing.
    pub fn window(&self) -> (usize, usize) {
        let per_page = self.per_page();
        ((self.page() - 1).saturating_mul(per_page), per_page)
    }
}

/// Response after uploading a batch of images.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub jobs: Vec<JobSummary>,
    pub skipped: Vec<String>,
    pub message: String,
}

/// One page of jobs in submission order.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

/// Counts plus run state, for dashboards.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub queue_depth: usize,
    pub run_state: RunState,
    pub batch_complete: bool,
}

/// Response after clearing the session.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub discarded: usize,
}
