use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed workflow execution, aggregated per category.
///
/// Entries are append-only: once written they are never mutated or deleted,
/// and the pair (`id`, `job_category`) is unique across the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub sha: String,
    pub url: String,
    #[serde(default)]
    pub pr: Option<u64>,
    pub display_title: String,
    /// Comma-joined names of the sub-jobs that matched the category prefixes.
    pub job_name: String,
    pub job_category: String,
    pub branch: String,
}

impl Entry {
    pub fn composite_key(&self) -> String {
        composite_key(self.id, &self.job_category)
    }
}

/// Key guaranteeing at most one entry per run per category.
pub fn composite_key(run_id: u64, category: &str) -> String {
    format!("{run_id}_{category}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn composite_key_combines_run_and_category() {
        let entry = Entry {
            id: 42,
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
            duration_seconds: 120,
            sha: "abc".into(),
            url: "https://example.invalid/run/42".into(),
            pr: None,
            display_title: "fix things".into(),
            job_name: "Test on PHP 8.2".into(),
            job_category: "PHP Tests".into(),
            branch: "main".into(),
        };
        assert_eq!(entry.composite_key(), "42_PHP Tests");
    }

    #[test]
    fn pr_field_defaults_to_none_when_absent() {
        let raw = r#"{
            "id": 7,
            "created_at": "2026-08-02T10:00:00Z",
            "duration_seconds": 300,
            "sha": "deadbeef",
            "url": "https://example.invalid/run/7",
            "display_title": "chore",
            "job_name": "E2E suite",
            "job_category": "E2E Tests",
            "branch": "main"
        }"#;
        let entry: Entry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.pr, None);
        assert_eq!(entry.duration_seconds, 300);
    }
}
