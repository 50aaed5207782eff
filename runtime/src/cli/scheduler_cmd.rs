//! Run the scheduler loop in the foreground.

use crate::cli::output::{self, Styled};
use crate::cli::{open_store, shutdown_signal};
use crate::config::ArgusConfig;
use crate::scheduler::Scheduler;
use anyhow::Result;

pub async fn run(config: &ArgusConfig) -> Result<()> {
    let s = Styled::new();
    let store = open_store(config)?;
    let mut scheduler = Scheduler::new(store, config.scheduler.clone());

    if !output::is_quiet() {
        eprintln!(
            "  {} Scheduler running (tick {}s, batch {}), Ctrl-C to stop",
            s.ok_sym(),
            config.scheduler.tick_secs,
            config.scheduler.batch_limit
        );
    }
    scheduler.run(shutdown_signal()).await;

    if !output::is_quiet() {
        eprintln!("  {} Scheduler stopped.", s.ok_sym());
    }
    Ok(())
}
