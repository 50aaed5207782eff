//! Record store for targets, capture jobs and capture runs.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::model::{CaptureJob, CaptureRun, JobStatus, Target};
use anyhow::Result;

/// Persistence consumed by the scheduler, worker and CLI.
///
/// Implementations must make [`RecordStore::enqueue_due`] and
/// [`RecordStore::claim_next_job`] atomic; everything else is per-row.
pub trait RecordStore: Send + Sync {
    fn insert_target(&self, target: &Target) -> Result<()>;

    fn get_target(&self, id: &str) -> Result<Option<Target>>;

    fn list_targets(&self) -> Result<Vec<Target>>;

    /// Enable or disable a target. Returns false when it does not exist.
    fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool>;

    /// Enabled targets whose next run is at or before `now`, oldest first.
    fn due_targets(&self, now: i64, limit: usize) -> Result<Vec<Target>>;

    /// In one transaction, queue a job for each due target (unless it
    /// already has an open job) and advance its `next_run_at` to
    /// `now + cadence`. Returns the jobs created.
    fn enqueue_due(&self, now: i64, limit: usize) -> Result<Vec<CaptureJob>>;

    fn get_job(&self, id: i64) -> Result<Option<CaptureJob>>;

    /// Move the oldest runnable queued job to `running` and count the
    /// attempt.
    fn claim_next_job(&self, now: i64) -> Result<Option<CaptureJob>>;

    /// Mark a job terminal.
    fn complete_job(&self, id: i64, status: JobStatus, error: Option<&str>, now: i64) -> Result<()>;

    /// Put a job back in the queue, runnable from `run_after`.
    fn retry_job(&self, id: i64, run_after: i64, error: &str, now: i64) -> Result<()>;

    /// Requeue jobs stuck in `running` since before `cutoff`.
    fn requeue_stale_jobs(&self, cutoff: i64, now: i64) -> Result<usize>;

    fn insert_run(&self, run: &CaptureRun) -> Result<()>;

    /// Most recent succeeded run of a target, the baseline for diffs.
    fn latest_succeeded_run(&self, target_id: &str) -> Result<Option<CaptureRun>>;

    /// Runs of a target, newest first.
    fn recent_runs(&self, target_id: &str, limit: usize) -> Result<Vec<CaptureRun>>;
}
