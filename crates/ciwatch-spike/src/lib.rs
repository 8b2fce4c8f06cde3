use chrono::{DateTime, Duration, Utc};
use ciwatch_core::config::CategorySpec;
use ciwatch_core::entry::Entry;
use tracing::info;

/// Minimum number of baseline records required for a meaningful average.
const MIN_BASELINE_RECORDS: usize = 3;
/// Records required beyond the recent window before a category is evaluated.
const MIN_EXTRA_RECORDS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeConfig {
    /// Number of newest runs averaged into the recent window.
    pub recent_runs: usize,
    /// Days of history that feed the baseline average.
    pub baseline_days: i64,
    /// Fractional increase over the baseline that triggers an anomaly.
    pub threshold: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            recent_runs: 3,
            baseline_days: 14,
            threshold: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAnomaly {
    pub category: String,
    pub recent_avg_seconds: f64,
    pub baseline_avg_seconds: f64,
    /// Fractional change, e.g. 0.15 for a 15% increase.
    pub change: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Too few records overall; informational, never an error.
    InsufficientData { records: usize },
    /// Too few (or all-zero) baseline records inside the window.
    InsufficientBaseline { records: usize },
    Normal {
        recent_avg_seconds: f64,
        baseline_avg_seconds: f64,
        change: f64,
    },
    Spike(SpikeAnomaly),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub category: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpikeReport {
    pub categories: Vec<CategoryReport>,
}

impl SpikeReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &SpikeAnomaly> {
        self.categories.iter().filter_map(|report| match &report.verdict {
            Verdict::Spike(anomaly) => Some(anomaly),
            _ => None,
        })
    }

    pub fn spike_detected(&self) -> bool {
        self.anomalies().next().is_some()
    }

    /// Multi-line summary for notifications, one line per anomalous category,
    /// durations rendered in minutes.
    pub fn details(&self) -> String {
        self.anomalies()
            .map(|anomaly| {
                format!(
                    "**{}**: {:.1} min (was {:.1} min, +{:.1}%)",
                    anomaly.category,
                    anomaly.recent_avg_seconds / 60.0,
                    anomaly.baseline_avg_seconds / 60.0,
                    anomaly.change * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Compares the newest runs of each category against its rolling baseline.
#[derive(Debug, Default)]
pub struct SpikeDetector {
    config: SpikeConfig,
}

impl SpikeDetector {
    pub fn new(config: SpikeConfig) -> Self {
        Self { config }
    }

    pub fn detect(
        &self,
        categories: &[CategorySpec],
        entries: &[Entry],
        now: DateTime<Utc>,
    ) -> SpikeReport {
        let categories = categories
            .iter()
            .map(|category| CategoryReport {
                category: category.label.clone(),
                verdict: self.evaluate(&category.label, entries, now),
            })
            .collect();
        SpikeReport { categories }
    }

    fn evaluate(&self, category: &str, entries: &[Entry], now: DateTime<Utc>) -> Verdict {
        let mut data: Vec<&Entry> = entries
            .iter()
            .filter(|entry| entry.job_category == category)
            .collect();
        data.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if data.len() < self.config.recent_runs + MIN_EXTRA_RECORDS {
            info!(category, records = data.len(), "not enough data for analysis");
            return Verdict::InsufficientData {
                records: data.len(),
            };
        }

        let recent = &data[..self.config.recent_runs];
        let recent_avg = mean(recent);

        let baseline_start = now - Duration::days(self.config.baseline_days);
        let baseline: Vec<&Entry> = data[self.config.recent_runs..]
            .iter()
            .copied()
            .filter(|entry| entry.created_at > baseline_start)
            .collect();

        if baseline.len() < MIN_BASELINE_RECORDS {
            info!(
                category,
                records = baseline.len(),
                window_days = self.config.baseline_days,
                "not enough baseline data"
            );
            return Verdict::InsufficientBaseline {
                records: baseline.len(),
            };
        }

        let baseline_avg = mean(&baseline);
        if baseline_avg <= 0.0 {
            // A zero baseline would make the percentage change undefined.
            info!(category, "baseline average is zero, skipping");
            return Verdict::InsufficientBaseline {
                records: baseline.len(),
            };
        }

        let change = (recent_avg - baseline_avg) / baseline_avg;
        info!(
            category,
            recent_avg_min = recent_avg / 60.0,
            baseline_avg_min = baseline_avg / 60.0,
            change_pct = change * 100.0,
            "category evaluated"
        );

        if change > self.config.threshold {
            Verdict::Spike(SpikeAnomaly {
                category: category.to_string(),
                recent_avg_seconds: recent_avg,
                baseline_avg_seconds: baseline_avg,
                change,
                threshold: self.config.threshold,
            })
        } else {
            Verdict::Normal {
                recent_avg_seconds: recent_avg,
                baseline_avg_seconds: baseline_avg,
                change,
            }
        }
    }
}

fn mean(entries: &[&Entry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let total: i64 = entries.iter().map(|entry| entry.duration_seconds).sum();
    total as f64 / entries.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap()
    }

    fn entry(id: u64, category: &str, seconds: i64, days_ago: i64) -> Entry {
        Entry {
            id,
            created_at: now() - Duration::days(days_ago),
            duration_seconds: seconds,
            sha: format!("sha-{id}"),
            url: format!("https://example.invalid/run/{id}"),
            pr: None,
            display_title: format!("run {id}"),
            job_name: "Test on PHP 8.2".to_string(),
            job_category: category.to_string(),
            branch: "main".to_string(),
        }
    }

    fn php_category() -> Vec<CategorySpec> {
        vec![CategorySpec::new("PHP Tests", ["Test on PHP"])]
    }

    /// Three recent runs at `recent` seconds plus five baseline runs at
    /// `baseline` seconds, all inside the 14-day window.
    fn dataset(recent: i64, baseline: i64) -> Vec<Entry> {
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(entry(i, "PHP Tests", recent, i as i64));
        }
        for i in 0..5 {
            entries.push(entry(100 + i, "PHP Tests", baseline, 4 + i as i64));
        }
        entries
    }

    #[test]
    fn increase_above_threshold_is_flagged() {
        let detector = SpikeDetector::default();
        let report = detector.detect(&php_category(), &dataset(115, 100), now());

        assert!(report.spike_detected());
        let anomaly = report.anomalies().next().unwrap();
        assert_eq!(anomaly.category, "PHP Tests");
        assert!((anomaly.recent_avg_seconds - 115.0).abs() < 1e-9);
        assert!((anomaly.baseline_avg_seconds - 100.0).abs() < 1e-9);
        assert!((anomaly.change - 0.15).abs() < 1e-9);
        assert!((anomaly.threshold - 0.10).abs() < 1e-9);
    }

    #[test]
    fn increase_below_threshold_is_not_flagged() {
        let detector = SpikeDetector::default();
        let report = detector.detect(&php_category(), &dataset(105, 100), now());

        assert!(!report.spike_detected());
        match &report.categories[0].verdict {
            Verdict::Normal { change, .. } => assert!((change - 0.05).abs() < 1e-9),
            other => panic!("expected normal verdict, got {other:?}"),
        }
    }

    #[test]
    fn too_few_records_is_an_informational_skip() {
        let detector = SpikeDetector::default();
        let entries: Vec<Entry> = (0..4)
            .map(|i| entry(i, "PHP Tests", 100, i as i64))
            .collect();
        let report = detector.detect(&php_category(), &entries, now());

        assert!(!report.spike_detected());
        assert_eq!(
            report.categories[0].verdict,
            Verdict::InsufficientData { records: 4 }
        );
    }

    #[test]
    fn baseline_outside_the_window_is_insufficient() {
        let detector = SpikeDetector::default();
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(entry(i, "PHP Tests", 120, i as i64));
        }
        // Enough records overall, but only two of them inside the window.
        for i in 0..2 {
            entries.push(entry(100 + i, "PHP Tests", 100, 5 + i as i64));
        }
        for i in 0..3 {
            entries.push(entry(200 + i, "PHP Tests", 100, 20 + i as i64));
        }
        let report = detector.detect(&php_category(), &entries, now());

        assert!(!report.spike_detected());
        assert_eq!(
            report.categories[0].verdict,
            Verdict::InsufficientBaseline { records: 2 }
        );
    }

    #[test]
    fn zero_baseline_never_divides() {
        let detector = SpikeDetector::default();
        let report = detector.detect(&php_category(), &dataset(115, 0), now());

        assert!(!report.spike_detected());
        assert_eq!(
            report.categories[0].verdict,
            Verdict::InsufficientBaseline { records: 5 }
        );
    }

    #[test]
    fn categories_are_evaluated_independently() {
        let detector = SpikeDetector::default();
        let categories = vec![
            CategorySpec::new("PHP Tests", ["Test on PHP"]),
            CategorySpec::new("E2E Tests", ["E2E"]),
        ];
        let entries = dataset(115, 100);
        let report = detector.detect(&categories, &entries, now());

        assert!(report.spike_detected());
        assert_eq!(report.categories.len(), 2);
        assert!(matches!(report.categories[0].verdict, Verdict::Spike(_)));
        assert_eq!(
            report.categories[1].verdict,
            Verdict::InsufficientData { records: 0 }
        );
    }

    #[test]
    fn details_render_minutes_per_anomalous_category() {
        let detector = SpikeDetector::default();
        let report = detector.detect(&php_category(), &dataset(690, 600), now());

        assert_eq!(
            report.details(),
            "**PHP Tests**: 11.5 min (was 10.0 min, +15.0%)"
        );
    }
}
