use chrono::{DateTime, Utc};
use ciwatch_core::api::{ApiError, JobDetail, RunSummary, RunsApi};
use ciwatch_core::config::{CategorySpec, TrackerConfig};
use ciwatch_core::cursor::MonthCursor;
use ciwatch_core::entry::Entry;
use ciwatch_storage::{CursorStore, DedupIndex, RecordStore, StorageError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Process only the current calendar month; the cursor is untouched.
    Newer,
    /// Walk backward from the persisted cursor month until the horizon.
    Older,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub months_processed: usize,
    pub pages_fetched: usize,
    pub runs_seen: usize,
    pub entries_added: usize,
    pub runs_failed: usize,
}

/// Walks calendar months of workflow runs, aggregating per-category durations
/// into the record store.
///
/// Progress is checkpointed at two granularities: the full dataset after every
/// page, and the backfill cursor after every month. A crash therefore redoes
/// at most one page of remote calls, which the dedup index makes idempotent.
pub struct IngestionEngine<'a, A: RunsApi> {
    api: &'a A,
    config: &'a TrackerConfig,
    records: &'a RecordStore,
    cursor: &'a CursorStore,
}

impl<'a, A: RunsApi> IngestionEngine<'a, A> {
    pub fn new(
        api: &'a A,
        config: &'a TrackerConfig,
        records: &'a RecordStore,
        cursor: &'a CursorStore,
    ) -> Self {
        Self {
            api,
            config,
            records,
            cursor,
        }
    }

    pub fn ingest(
        &self,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, IngestError> {
        let mut entries = self.records.load()?;
        let mut index = DedupIndex::from_entries(&entries);
        let mut report = IngestReport::default();

        let current = MonthCursor::from_datetime(now);
        let horizon = current.minus_months(self.config.backfill_months);
        let mut month = match direction {
            Direction::Newer => current,
            Direction::Older => self.cursor.load()?.unwrap_or(current),
        };

        loop {
            if direction == Direction::Older && month < horizon {
                info!(%horizon, "reached backfill horizon");
                break;
            }

            info!(%month, "processing month");
            self.ingest_month(month, &mut entries, &mut index, &mut report)?;
            report.months_processed += 1;

            match direction {
                Direction::Newer => break,
                Direction::Older => {
                    month = month.prev();
                    // Month checkpoint: a crash resumes at the next month.
                    self.cursor.save(month)?;
                }
            }
        }

        self.records.save(&mut entries)?;
        info!(
            total = entries.len(),
            added = report.entries_added,
            failed_runs = report.runs_failed,
            "ingestion complete"
        );
        Ok(report)
    }

    fn ingest_month(
        &self,
        month: MonthCursor,
        entries: &mut Vec<Entry>,
        index: &mut DedupIndex,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        for branch in &self.config.branches {
            info!(%month, branch, "fetching branch");
            let mut page = 1u32;
            loop {
                let runs = self
                    .api
                    .list_runs(branch, month, page, self.config.page_size)?;
                if runs.is_empty() {
                    break;
                }

                for run in &runs {
                    report.runs_seen += 1;
                    self.ingest_run(run, branch, entries, index, report);
                }

                report.pages_fetched += 1;
                // Page checkpoint: at most one page of work is redone after
                // an interruption.
                self.records.save(entries)?;
                page += 1;
            }
        }
        Ok(())
    }

    fn ingest_run(
        &self,
        run: &RunSummary,
        branch: &str,
        entries: &mut Vec<Entry>,
        index: &mut DedupIndex,
        report: &mut IngestReport,
    ) {
        let pending: Vec<&CategorySpec> = self
            .config
            .categories
            .iter()
            .filter(|category| !index.contains(run.id, &category.label))
            .collect();
        if pending.is_empty() {
            return;
        }

        // One remote call per run; a failure here skips the run but never
        // aborts the month.
        let jobs = match self.api.list_jobs(run.id) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(run_id = run.id, error = %err, "failed to fetch jobs, skipping run");
                report.runs_failed += 1;
                return;
            }
        };

        for category in pending {
            if let Some(entry) = aggregate(run, branch, category, &jobs, self.config) {
                index.insert(run.id, &category.label);
                entries.push(entry);
                report.entries_added += 1;
            }
        }
    }
}

/// Sums the durations of all completed sub-jobs matching the category's
/// prefixes. Returns `None` when nothing matched or the total is below the
/// noise threshold.
fn aggregate(
    run: &RunSummary,
    branch: &str,
    category: &CategorySpec,
    jobs: &[JobDetail],
    config: &TrackerConfig,
) -> Option<Entry> {
    let matched: Vec<&JobDetail> = jobs
        .iter()
        .filter(|job| job.is_completed() && category.matches(&job.name))
        .collect();
    if matched.is_empty() {
        return None;
    }

    let duration_seconds: i64 = matched
        .iter()
        .filter_map(|job| job.duration_seconds())
        .sum();
    if duration_seconds < config.min_duration_seconds {
        return None;
    }

    let job_name = matched
        .iter()
        .map(|job| job.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Some(Entry {
        id: run.id,
        created_at: run.created_at,
        duration_seconds,
        sha: run.head_sha.clone(),
        url: run.html_url.clone(),
        pr: run.pull_requests.first().map(|pr| pr.number),
        display_title: run.display_title.clone(),
        job_name,
        job_category: category.label.clone(),
        branch: branch.to_string(),
    })
}
