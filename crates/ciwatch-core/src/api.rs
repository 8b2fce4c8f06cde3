use crate::cursor::MonthCursor;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("auth error: {0}")]
    Auth(String),
}

/// Summary of one workflow run as returned by the listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSummary {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub head_sha: String,
    pub html_url: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
}

/// One sub-job of a workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDetail {
    pub name: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobDetail {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    /// Wall-clock duration in whole seconds, when both endpoints are known.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_seconds()),
            _ => None,
        }
    }
}

/// Remote listing capability consumed by the ingestion engine.
///
/// `list_runs` returns one page (1-indexed) of successfully completed runs
/// created within the given month on the given branch; an empty page means
/// pagination for that branch/month is exhausted. `list_jobs` returns the
/// sub-jobs of a single run.
pub trait RunsApi {
    fn list_runs(
        &self,
        branch: &str,
        month: MonthCursor,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RunSummary>, ApiError>;

    fn list_jobs(&self, run_id: u64) -> Result<Vec<JobDetail>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_duration_is_whole_seconds() {
        let job = JobDetail {
            name: "Test on PHP 8.2".into(),
            status: "completed".into(),
            started_at: Some(Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap()),
            completed_at: Some(Utc.with_ymd_and_hms(2026, 8, 1, 10, 12, 34).unwrap()),
        };
        assert_eq!(job.duration_seconds(), Some(754));
    }

    #[test]
    fn in_progress_job_has_no_duration() {
        let job = JobDetail {
            name: "E2E Chrome".into(),
            status: "in_progress".into(),
            started_at: Some(Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap()),
            completed_at: None,
        };
        assert!(!job.is_completed());
        assert_eq!(job.duration_seconds(), None);
    }
}
