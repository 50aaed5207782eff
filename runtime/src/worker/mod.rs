//! Capture job worker.
//!
//! Claims queued jobs, runs their captures concurrently through the
//! context pool, and records what happened: a run row for every capture
//! that reached the page, an artifact directory, an audit line, and the
//! job's next state. Failed and blocked attempts go back to the queue
//! with backoff until the attempt budget is spent.

pub mod retry;

pub use retry::Backoff;

use crate::audit::{AuditEvent, AuditLogger};
use crate::capture::{ArtifactStore, CaptureError, CaptureOrchestrator};
use crate::config::ArgusConfig;
use crate::model::{now_ms, CaptureJob, JobStatus, Target};
use crate::pool::RateLimiter;
use crate::runs::{build_run, RunContext};
use crate::store::RecordStore;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What became of one job after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    Succeeded { changed: bool },
    /// Terminal block after the last attempt.
    Blocked,
    /// Terminal failure.
    Failed,
    /// Back in the queue for another attempt.
    Retrying,
}

/// Totals for one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: usize,
    pub succeeded: usize,
    pub changed: usize,
    pub blocked: usize,
    pub failed: usize,
    pub retried: usize,
}

impl WorkerReport {
    fn record(&mut self, result: JobResult) {
        self.processed += 1;
        match result {
            JobResult::Succeeded { changed } => {
                self.succeeded += 1;
                if changed {
                    self.changed += 1;
                }
            }
            JobResult::Blocked => self.blocked += 1,
            JobResult::Failed => self.failed += 1,
            JobResult::Retrying => self.retried += 1,
        }
    }
}

pub struct Worker {
    store: Arc<dyn RecordStore>,
    orchestrator: Arc<CaptureOrchestrator>,
    artifacts: ArtifactStore,
    audit: Mutex<AuditLogger>,
    limiter: RateLimiter,
    backoff: Backoff,
    config: Arc<ArgusConfig>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        orchestrator: Arc<CaptureOrchestrator>,
        config: Arc<ArgusConfig>,
    ) -> Result<Self> {
        let audit = AuditLogger::open(&config.audit_log_path())?;
        Ok(Self {
            store,
            orchestrator,
            artifacts: ArtifactStore::new(config.artifacts_dir()),
            audit: Mutex::new(audit),
            limiter: RateLimiter::from_worker_config(&config.worker),
            backoff: Backoff::from_config(&config.worker),
            config,
        })
    }

    /// Claim up to `concurrency` runnable jobs and process them together.
    pub async fn run_once(&self) -> Result<WorkerReport> {
        let now = now_ms();
        let mut jobs = Vec::new();
        while jobs.len() < self.config.worker.concurrency {
            match self.store.claim_next_job(now)? {
                Some(job) => jobs.push(job),
                None => break,
            }
        }
        if jobs.is_empty() {
            return Ok(WorkerReport::default());
        }
        debug!(count = jobs.len(), "claimed capture jobs");

        let mut report = WorkerReport::default();
        for (job_id, result) in join_all(jobs.into_iter().map(|job| async move {
            let id = job.id;
            (id, self.process_job(job).await)
        }))
        .await
        {
            match result {
                Ok(result) => report.record(result),
                // The job stays `running`; the stale-job sweep returns it to the queue.
                Err(e) => error!(job_id, error = %e, "failed to record capture job"),
            }
        }
        Ok(report)
    }

    /// Work the queue until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let idle = Duration::from_millis(self.config.worker.poll_interval_ms);
        info!(concurrency = self.config.worker.concurrency, "worker started");
        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(report) if report.processed > 0 => {
                    info!(
                        processed = report.processed,
                        succeeded = report.succeeded,
                        changed = report.changed,
                        blocked = report.blocked,
                        failed = report.failed,
                        retried = report.retried,
                        "worker pass finished"
                    );
                    continue;
                }
                Ok(_) => idle,
                Err(e) => {
                    error!(error = %e, "worker pass failed");
                    idle
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("worker stopped");
    }

    /// Run one claimed job to its next state.
    pub async fn process_job(&self, job: CaptureJob) -> Result<JobResult> {
        let Some(target) = self.store.get_target(&job.target_id)? else {
            warn!(job_id = job.id, target_id = %job.target_id, "job references a missing target");
            self.store
                .complete_job(job.id, JobStatus::Failed, Some("target not found"), now_ms())?;
            return Ok(JobResult::Failed);
        };
        let previous = self.store.latest_succeeded_run(&target.id)?;

        let started_at = now_ms();
        let result = {
            let _slot = self.limiter.acquire().await?;
            self.orchestrator.capture(&target).await
        };
        let finished_at = now_ms();
        let ctx = RunContext {
            target: &target,
            job_id: Some(job.id),
            started_at,
            finished_at,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return self.capture_failed(&job, &target, ctx, e),
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let stored = match self.artifacts.save_all(&target.id, &run_id, outcome.artifacts()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(target_id = %target.id, error = %e, "failed to save artifacts");
                Vec::new()
            }
        };
        let blocked = outcome.is_blocked();
        let run = build_run(ctx, run_id, outcome, stored, previous.as_ref())?;
        self.store.insert_run(&run)?;

        let mut event = self.event(&job, &target, ctx, run.status.as_str());
        event.url = Some(run.final_url.clone());
        event.content_hash = run.content_hash.as_ref().map(|h| h.to_hex());
        event.notes = run.notes.clone();

        if blocked {
            let reason = run.notes.as_deref().unwrap_or("blocked");
            let result = self.settle_failure(&job, JobStatus::Blocked, reason, true)?;
            if result == JobResult::Retrying {
                event.status = "retrying".into();
            }
            self.audit(&event);
            return Ok(result);
        }

        self.store
            .complete_job(job.id, JobStatus::Succeeded, None, now_ms())?;
        event.changed = Some(run.changed);
        self.audit(&event);
        info!(
            target_id = %target.id,
            run_id = %run.id,
            changed = run.changed,
            changes = run.changes.len(),
            "capture run recorded"
        );
        Ok(JobResult::Succeeded { changed: run.changed })
    }

    fn capture_failed(
        &self,
        job: &CaptureJob,
        target: &Target,
        ctx: RunContext<'_>,
        error: CaptureError,
    ) -> Result<JobResult> {
        let message = error.to_string();
        warn!(target_id = %target.id, job_id = job.id, attempt = job.attempts, error = %message, "capture failed");
        let result = self.settle_failure(job, JobStatus::Failed, &message, error.is_retryable())?;

        let status = if result == JobResult::Retrying { "retrying" } else { "failed" };
        let mut event = self.event(job, target, ctx, status);
        event.notes = Some(message);
        self.audit(&event);
        Ok(result)
    }

    /// Requeue with backoff while attempts remain, otherwise finish the job
    /// with `terminal`.
    fn settle_failure(
        &self,
        job: &CaptureJob,
        terminal: JobStatus,
        reason: &str,
        retryable: bool,
    ) -> Result<JobResult> {
        let now = now_ms();
        if retryable && self.backoff.should_retry(job.attempts) {
            let delay = self.backoff.delay_ms(job.attempts);
            self.store
                .retry_job(job.id, now + delay as i64, reason, now)?;
            debug!(job_id = job.id, attempt = job.attempts, delay_ms = delay, "job requeued");
            return Ok(JobResult::Retrying);
        }

        self.store.complete_job(job.id, terminal, Some(reason), now)?;
        Ok(match terminal {
            JobStatus::Blocked => JobResult::Blocked,
            _ => JobResult::Failed,
        })
    }

    fn event(&self, job: &CaptureJob, target: &Target, ctx: RunContext<'_>, status: &str) -> AuditEvent {
        let mut event = AuditEvent::now(&target.id, Some(job.id), target.kind().as_str(), status);
        event.duration_ms = (ctx.finished_at - ctx.started_at).max(0) as u64;
        event
    }

    fn audit(&self, event: &AuditEvent) {
        let written = self
            .audit
            .lock()
            .map_err(|_| anyhow!("audit logger lock poisoned"))
            .and_then(|mut logger| logger.log(event));
        if let Err(e) = written {
            warn!(error = %e, "failed to write audit event");
        }
    }
}
