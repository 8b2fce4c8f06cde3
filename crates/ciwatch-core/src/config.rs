use serde::{Deserialize, Serialize};

/// Logical grouping of sub-jobs, identified by one or more name prefixes.
/// Durations of every completed sub-job matching any prefix are summed into
/// a single entry for the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub label: String,
    pub prefixes: Vec<String>,
}

impl CategorySpec {
    pub fn new(label: impl Into<String>, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label: label.into(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, job_name: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| job_name.starts_with(prefix.as_str()))
    }
}

/// Tracker configuration, loadable from `ciwatch.json`.
///
/// Defaults mirror the deployment this tool was built for; every field can be
/// overridden by the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub owner: String,
    pub repo: String,
    pub workflow_id: u64,
    pub branches: Vec<String>,
    pub categories: Vec<CategorySpec>,
    pub page_size: u32,
    /// Aggregates shorter than this are treated as noise (instant failures,
    /// cache-only reruns) and not recorded.
    pub min_duration_seconds: i64,
    /// Backfill horizon: months before now at which the backward walk stops.
    pub backfill_months: u32,
    pub recent_runs: usize,
    pub baseline_days: i64,
    pub spike_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            owner: "glpi-project".to_string(),
            repo: "glpi".to_string(),
            workflow_id: 22080,
            branches: vec!["main".to_string(), "11.0/bugfixes".to_string()],
            categories: vec![
                CategorySpec::new("PHP Tests", ["Test on PHP"]),
                CategorySpec::new("E2E Tests", ["E2E"]),
            ],
            page_size: 100,
            min_duration_seconds: 60,
            backfill_months: 12,
            recent_runs: 3,
            baseline_days: 14,
            spike_threshold: 0.10,
        }
    }
}
