//! Run the capture worker against a local Chromium.

use crate::capture::CaptureOrchestrator;
use crate::cli::output::{self, Styled};
use crate::cli::{open_store, shutdown_signal};
use crate::config::ArgusConfig;
use crate::pool::PoolManager;
use crate::renderer::{ChromiumRenderer, Renderer};
use crate::worker::Worker;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

pub async fn run(config: Arc<ArgusConfig>, once: bool) -> Result<()> {
    let s = Styled::new();
    let store = open_store(&config)?;
    let renderer: Arc<dyn Renderer> =
        Arc::new(ChromiumRenderer::launch(&config.browser, &config.home).await?);
    let pool = Arc::new(PoolManager::new(Arc::clone(&renderer), config.worker.concurrency));
    let orchestrator = Arc::new(CaptureOrchestrator::new(pool, Arc::clone(&config)));
    let worker = Worker::new(store, orchestrator, Arc::clone(&config))?;

    let result = if once {
        worker.run_once().await.map(|report| {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "processed": report.processed,
                    "succeeded": report.succeeded,
                    "changed": report.changed,
                    "blocked": report.blocked,
                    "failed": report.failed,
                    "retried": report.retried,
                }));
            } else if !output::is_quiet() {
                eprintln!(
                    "  {} {} job(s): {} succeeded ({} changed), {} blocked, {} failed, {} retrying",
                    s.ok_sym(),
                    report.processed,
                    report.succeeded,
                    report.changed,
                    report.blocked,
                    report.failed,
                    report.retried
                );
            }
        })
    } else {
        if !output::is_quiet() {
            eprintln!(
                "  {} Worker running ({} concurrent captures), Ctrl-C to stop",
                s.ok_sym(),
                config.worker.concurrency
            );
        }
        worker.run(shutdown_signal()).await;
        Ok(())
    };

    if let Err(e) = renderer.shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }
    result
}
