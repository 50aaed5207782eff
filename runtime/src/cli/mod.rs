//! CLI subcommand implementations for the `argus` binary.

pub mod diff_cmd;
pub mod doctor;
pub mod output;
pub mod parse_cmd;
pub mod runs_cmd;
pub mod scheduler_cmd;
pub mod target_cmd;
pub mod worker_cmd;

use crate::config::ArgusConfig;
use crate::store::SqliteStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Open the configured record store.
pub fn open_store(config: &ArgusConfig) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::from_config(config)?))
}

/// Receiver that flips to true on Ctrl-C.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        let _ = tx.send(true);
    });
    rx
}
