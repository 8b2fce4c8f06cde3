pub mod api;
pub mod config;
pub mod cursor;
pub mod entry;

pub use api::{ApiError, JobDetail, PullRequestRef, RunSummary, RunsApi};
pub use config::{CategorySpec, TrackerConfig};
pub use cursor::{MonthCursor, ParseMonthError};
pub use entry::Entry;
