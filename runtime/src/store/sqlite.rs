//! SQLite-backed [`RecordStore`].

use super::RecordStore;
use crate::config::ArgusConfig;
use crate::model::{minutes_ms, CaptureJob, CaptureRun, JobStatus, Subject, Target};
use anyhow::{anyhow, bail, Context, Result};
use argus_core::{ContentHash, TargetKind};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    subject TEXT NOT NULL,
    marketplace TEXT NOT NULL,
    tracked TEXT NOT NULL DEFAULT '[]',
    label TEXT,
    cadence_minutes INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    next_run_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_targets_due ON targets (enabled, next_run_at);

CREATE TABLE IF NOT EXISTS capture_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id TEXT NOT NULL REFERENCES targets (id),
    scheduled_at INTEGER NOT NULL,
    run_after INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_queue ON capture_jobs (status, run_after);
CREATE INDEX IF NOT EXISTS idx_jobs_target ON capture_jobs (target_id, status);

CREATE TABLE IF NOT EXISTS capture_runs (
    id TEXT PRIMARY KEY,
    target_id TEXT NOT NULL REFERENCES targets (id),
    job_id INTEGER,
    started_at INTEGER NOT NULL,
    finished_at INTEGER NOT NULL,
    status TEXT NOT NULL,
    final_url TEXT NOT NULL,
    raw TEXT,
    normalized TEXT,
    content_hash TEXT,
    changed INTEGER NOT NULL,
    changes TEXT NOT NULL DEFAULT '[]',
    notes TEXT,
    artifacts TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_runs_target ON capture_runs (target_id, started_at);
";

const TARGET_COLUMNS: &str =
    "id, kind, subject, marketplace, tracked, label, cadence_minutes, enabled, next_run_at, created_at";

const JOB_COLUMNS: &str =
    "id, target_id, scheduled_at, run_after, status, attempts, last_error, created_at, updated_at";

const RUN_COLUMNS: &str = "id, target_id, job_id, started_at, finished_at, status, final_url, raw, \
     normalized, content_hash, changed, changes, notes, artifacts";

/// Record store in a single SQLite database file.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let db = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;
        db.busy_timeout(Duration::from_secs(5))?;
        // Scheduler and worker run as separate processes on the same file.
        db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("failed to enable WAL journal")?;

        Self::init(db)
    }

    /// Open the database configured in `config`.
    pub fn from_config(config: &ArgusConfig) -> Result<Self> {
        Self::open(&config.database_path())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)
            .context("failed to create record store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn opt_json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| serde_json::from_str(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    let kind: String = row.get(1)?;
    let kind: TargetKind = kind.parse().map_err(|e: String| conversion_error(1, e))?;
    Ok(Target {
        id: row.get(0)?,
        subject: Subject::from_parts(kind, row.get(2)?),
        marketplace: row.get(3)?,
        tracked: json_column(row, 4)?,
        label: row.get(5)?,
        cadence_minutes: row.get(6)?,
        enabled: row.get(7)?,
        next_run_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<CaptureJob> {
    let status: String = row.get(4)?;
    Ok(CaptureJob {
        id: row.get(0)?,
        target_id: row.get(1)?,
        scheduled_at: row.get(2)?,
        run_after: row.get(3)?,
        status: status.parse().map_err(|e: String| conversion_error(4, e))?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<CaptureRun> {
    let status: String = row.get(5)?;
    let content_hash: Option<String> = row.get(9)?;
    let content_hash = content_hash
        .map(|h| ContentHash::from_hex(&h).ok_or_else(|| conversion_error(9, format!("invalid content hash {h}"))))
        .transpose()?;
    Ok(CaptureRun {
        id: row.get(0)?,
        target_id: row.get(1)?,
        job_id: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: status.parse().map_err(|e: String| conversion_error(5, e))?,
        final_url: row.get(6)?,
        raw: opt_json_column(row, 7)?,
        normalized: opt_json_column(row, 8)?,
        content_hash,
        changed: row.get(10)?,
        changes: json_column(row, 11)?,
        notes: row.get(12)?,
        artifacts: json_column(row, 13)?,
    })
}

fn query_due(db: &Connection, now: i64, limit: usize) -> Result<Vec<Target>> {
    let mut stmt = db.prepare(&format!(
        "SELECT {TARGET_COLUMNS} FROM targets
         WHERE enabled = 1 AND next_run_at <= ?1
         ORDER BY next_run_at, id LIMIT ?2"
    ))?;
    let targets = stmt
        .query_map(params![now, limit as i64], target_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(targets)
}

fn query_job(db: &Connection, id: i64) -> Result<Option<CaptureJob>> {
    let job = db
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM capture_jobs WHERE id = ?1"),
            params![id],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

// ── RecordStore ─────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
    fn insert_target(&self, target: &Target) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            &format!(
                "INSERT INTO targets ({TARGET_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                target.id,
                target.kind().as_str(),
                target.subject.value(),
                target.marketplace,
                serde_json::to_string(&target.tracked)?,
                target.label,
                target.cadence_minutes,
                target.enabled,
                target.next_run_at,
                target.created_at,
            ],
        )
        .with_context(|| format!("failed to insert target {}", target.id))?;
        Ok(())
    }

    fn get_target(&self, id: &str) -> Result<Option<Target>> {
        let db = self.conn()?;
        let result = db.query_row(
            &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1"),
            params![id],
            target_from_row,
        );

        match result {
            Ok(target) => Ok(Some(target)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_targets(&self) -> Result<Vec<Target>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets ORDER BY created_at, id"
        ))?;
        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE targets SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(rows > 0)
    }

    fn due_targets(&self, now: i64, limit: usize) -> Result<Vec<Target>> {
        let db = self.conn()?;
        query_due(&db, now, limit)
    }

    fn enqueue_due(&self, now: i64, limit: usize) -> Result<Vec<CaptureJob>> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let due = query_due(&tx, now, limit)?;
        let mut created = Vec::with_capacity(due.len());
        for target in &due {
            let open: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM capture_jobs
                 WHERE target_id = ?1 AND status IN ('queued', 'running'))",
                params![target.id],
                |row| row.get(0),
            )?;

            if open {
                debug!(target_id = %target.id, "open job exists, not enqueuing");
            } else {
                tx.execute(
                    "INSERT INTO capture_jobs
                     (target_id, scheduled_at, run_after, status, attempts, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?3, ?3)",
                    params![target.id, target.next_run_at, now, JobStatus::Queued.as_str()],
                )?;
                created.push(CaptureJob {
                    id: tx.last_insert_rowid(),
                    target_id: target.id.clone(),
                    scheduled_at: target.next_run_at,
                    run_after: now,
                    status: JobStatus::Queued,
                    attempts: 0,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                });
            }

            tx.execute(
                "UPDATE targets SET next_run_at = ?1 WHERE id = ?2",
                params![now + minutes_ms(target.cadence_minutes), target.id],
            )?;
        }

        tx.commit().context("failed to commit enqueue batch")?;
        Ok(created)
    }

    fn get_job(&self, id: i64) -> Result<Option<CaptureJob>> {
        let db = self.conn()?;
        query_job(&db, id)
    }

    fn claim_next_job(&self, now: i64) -> Result<Option<CaptureJob>> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM capture_jobs
                 WHERE status = 'queued' AND run_after <= ?1
                 ORDER BY run_after, id LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE capture_jobs
             SET status = 'running', attempts = attempts + 1, updated_at = ?1
             WHERE id = ?2",
            params![now, id],
        )?;
        let job = query_job(&tx, id)?.ok_or_else(|| anyhow!("claimed job {id} vanished"))?;
        tx.commit()?;
        Ok(Some(job))
    }

    fn complete_job(&self, id: i64, status: JobStatus, error: Option<&str>, now: i64) -> Result<()> {
        if !status.is_terminal() {
            bail!("cannot complete job {id} with non-terminal status {status}");
        }
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE capture_jobs SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error, now, id],
        )?;
        if rows == 0 {
            bail!("no capture job with id {id}");
        }
        Ok(())
    }

    fn retry_job(&self, id: i64, run_after: i64, error: &str, now: i64) -> Result<()> {
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE capture_jobs
             SET status = 'queued', run_after = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4",
            params![run_after, error, now, id],
        )?;
        if rows == 0 {
            bail!("no capture job with id {id}");
        }
        Ok(())
    }

    fn requeue_stale_jobs(&self, cutoff: i64, now: i64) -> Result<usize> {
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE capture_jobs
             SET status = 'queued', run_after = ?2, updated_at = ?2,
                 last_error = 'requeued: worker stopped responding'
             WHERE status = 'running' AND updated_at < ?1",
            params![cutoff, now],
        )?;
        Ok(rows)
    }

    fn insert_run(&self, run: &CaptureRun) -> Result<()> {
        let raw = run.raw.as_ref().map(serde_json::to_string).transpose()?;
        let normalized = run.normalized.as_ref().map(serde_json::to_string).transpose()?;
        let db = self.conn()?;
        db.execute(
            &format!(
                "INSERT INTO capture_runs ({RUN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                run.id,
                run.target_id,
                run.job_id,
                run.started_at,
                run.finished_at,
                run.status.as_str(),
                run.final_url,
                raw,
                normalized,
                run.content_hash.as_ref().map(ContentHash::to_hex),
                run.changed,
                serde_json::to_string(&run.changes)?,
                run.notes,
                serde_json::to_string(&run.artifacts)?,
            ],
        )
        .with_context(|| format!("failed to insert run {}", run.id))?;
        Ok(())
    }

    fn latest_succeeded_run(&self, target_id: &str) -> Result<Option<CaptureRun>> {
        let db = self.conn()?;
        let run = db
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM capture_runs
                     WHERE target_id = ?1 AND status = 'succeeded'
                     ORDER BY started_at DESC, rowid DESC LIMIT 1"
                ),
                params![target_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn recent_runs(&self, target_id: &str, limit: usize) -> Result<Vec<CaptureRun>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM capture_runs
             WHERE target_id = ?1
             ORDER BY started_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let runs = stmt
            .query_map(params![target_id, limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
