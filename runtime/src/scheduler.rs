//! Scheduler: turns due targets into queued capture jobs.
//!
//! [`Scheduler::tick`] is the whole unit of work and takes the current time
//! as an argument, so tests drive it directly. [`Scheduler::run`] is the
//! production driver: a fixed interval, one tick at a time, errors logged
//! and never propagated. No state survives a restart except what is in the
//! store, and the due-target query recomputes everything from it.

use crate::config::SchedulerConfig;
use crate::model::now_ms;
use crate::store::RecordStore;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Periodic maintenance run on the sync interval.
#[async_trait]
pub trait SyncTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, now: i64) -> Result<()>;
}

/// Returns jobs stuck in `running` (a worker died mid-capture) to the queue.
pub struct StaleJobSweep {
    store: Arc<dyn RecordStore>,
    stale_after: Duration,
}

impl StaleJobSweep {
    pub fn new(store: Arc<dyn RecordStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }
}

#[async_trait]
impl SyncTask for StaleJobSweep {
    fn name(&self) -> &str {
        "stale-job-sweep"
    }

    async fn run(&self, now: i64) -> Result<()> {
        let cutoff = now - self.stale_after.as_millis() as i64;
        let requeued = self.store.requeue_stale_jobs(cutoff, now)?;
        if requeued > 0 {
            warn!(requeued, "requeued stale capture jobs");
        }
        Ok(())
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub enqueued: usize,
    /// Names of sync tasks that ran this tick.
    pub synced: Vec<String>,
}

pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    config: SchedulerConfig,
    tasks: Vec<Box<dyn SyncTask>>,
    last_sync: Option<i64>,
}

impl Scheduler {
    /// Scheduler with the default stale-job sweep installed.
    pub fn new(store: Arc<dyn RecordStore>, config: SchedulerConfig) -> Self {
        let sweep = StaleJobSweep::new(Arc::clone(&store), config.stale_after());
        Self {
            store,
            config,
            tasks: vec![Box::new(sweep)],
            last_sync: None,
        }
    }

    pub fn with_task(mut self, task: Box<dyn SyncTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// One scheduling pass.
    ///
    /// Enqueue failures are returned; sync task failures are logged, since
    /// one broken task must not stop job creation.
    pub async fn tick(&mut self, now: i64) -> Result<TickReport> {
        let mut report = TickReport::default();

        let jobs = self.store.enqueue_due(now, self.config.batch_limit)?;
        report.enqueued = jobs.len();
        for job in &jobs {
            debug!(job_id = job.id, target_id = %job.target_id, "capture job queued");
        }

        if self.sync_due(now) {
            self.last_sync = Some(now);
            for task in &self.tasks {
                match task.run(now).await {
                    Ok(()) => report.synced.push(task.name().to_string()),
                    Err(e) => error!(task = task.name(), error = %e, "sync task failed"),
                }
            }
        }
        Ok(report)
    }

    fn sync_due(&self, now: i64) -> bool {
        match self.last_sync {
            None => true,
            Some(last) => now - last >= self.config.sync_interval().as_millis() as i64,
        }
    }

    /// Tick on the configured interval until `shutdown` flips to true.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_secs = self.config.tick_secs, "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match self.tick(now_ms()).await {
                Ok(report) if report.enqueued > 0 || !report.synced.is_empty() => {
                    info!(enqueued = report.enqueued, synced = ?report.synced, "scheduler tick");
                }
                Ok(_) => debug!("scheduler tick, nothing due"),
                Err(e) => error!(error = %e, "scheduler tick failed"),
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{minutes_ms, JobStatus, Target};
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SyncTask for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, _now: i64) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("sync backend unavailable");
            }
            Ok(())
        }
    }

    fn store_with_targets(n: usize) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..n {
            store
                .insert_target(&Target::product("US", &format!("B000{i}"), 0).with_cadence(60))
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_tick_enqueues_due_targets_once() {
        let store = store_with_targets(3);
        let mut scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());

        let first = scheduler.tick(1_000).await.unwrap();
        assert_eq!(first.enqueued, 3);

        let second = scheduler.tick(2_000).await.unwrap();
        assert_eq!(second.enqueued, 0);

        let next = 1_000 + minutes_ms(60);
        let later = scheduler.tick(next).await.unwrap();
        // The first jobs are still queued, so no duplicates are created.
        assert_eq!(later.enqueued, 0);
    }

    #[tokio::test]
    async fn test_tick_respects_batch_limit() {
        let store = store_with_targets(5);
        let config = SchedulerConfig {
            batch_limit: 2,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::new(store, config);
        assert_eq!(scheduler.tick(1_000).await.unwrap().enqueued, 2);
        assert_eq!(scheduler.tick(1_001).await.unwrap().enqueued, 2);
        assert_eq!(scheduler.tick(1_002).await.unwrap().enqueued, 1);
    }

    #[tokio::test]
    async fn test_sync_runs_first_tick_then_on_interval() {
        let store = store_with_targets(0);
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(store, SchedulerConfig::default()).with_task(Box::new(
            CountingTask {
                runs: runs.clone(),
                fail: false,
            },
        ));

        let report = scheduler.tick(0).await.unwrap();
        assert_eq!(report.synced, vec!["stale-job-sweep", "counting"]);
        scheduler.tick(60_000).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        scheduler.tick(900_000).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failing_sync_task_does_not_fail_tick() {
        let store = store_with_targets(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(store, SchedulerConfig::default())
            .with_task(Box::new(CountingTask { runs: runs.clone(), fail: true }));

        let report = scheduler.tick(1_000).await.unwrap();
        assert_eq!(report.enqueued, 1);
        assert_eq!(report.synced, vec!["stale-job-sweep"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_sweep_requeues_abandoned_jobs() {
        let store = store_with_targets(1);
        let mut scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());
        scheduler.tick(0).await.unwrap();
        let job = store.claim_next_job(0).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);

        let sweep = StaleJobSweep::new(store.clone(), Duration::from_secs(600));
        sweep.run(599_000).await.unwrap();
        assert_eq!(store.get_job(job.id).unwrap().unwrap().status, JobStatus::Running);

        sweep.run(600_001).await.unwrap();
        assert_eq!(store.get_job(job.id).unwrap().unwrap().status, JobStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let store = store_with_targets(2);
        let mut scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(90)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(scheduler.run(rx), stopper);

        assert!(store.claim_next_job(now_ms()).unwrap().is_some());
    }
}
