//! Show recent capture runs of a target.

use crate::cli::open_store;
use crate::cli::output::{self, Styled};
use crate::config::ArgusConfig;
use crate::model::{CaptureRun, RunStatus};
use crate::store::RecordStore;
use anyhow::{bail, Result};
use argus_core::FieldChange;

pub fn run(config: &ArgusConfig, target_id: &str, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let Some(target) = store.get_target(target_id)? else {
        bail!("no target with id {target_id}");
    };
    let runs = store.recent_runs(target_id, limit)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "target": target,
            "runs": runs,
        }));
        return Ok(());
    }

    let s = Styled::new();
    println!("{}", s.bold(&target.describe()));
    if runs.is_empty() {
        println!("  no runs yet");
        return Ok(());
    }
    for run in &runs {
        for line in render_run(&s, run) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Text lines for one run: a summary line, then one line per change.
pub fn render_run(s: &Styled, run: &CaptureRun) -> Vec<String> {
    let status = match run.status {
        RunStatus::Succeeded if run.changed => s.yellow("changed  "),
        RunStatus::Succeeded => s.green("unchanged"),
        RunStatus::Blocked => s.red("blocked  "),
    };
    let hash = run
        .content_hash
        .as_ref()
        .map(|h| h.to_hex()[..12].to_string())
        .unwrap_or_else(|| "-".repeat(12));
    let took = output::format_duration_ms((run.finished_at - run.started_at).max(0) as u64);

    let mut lines = vec![format!(
        "  {}  {status}  {}  {took:>6}  {} artifact(s)",
        output::format_timestamp(run.started_at),
        s.dim(&hash),
        run.artifacts.len()
    )];
    if let Some(notes) = &run.notes {
        lines.push(format!("      {}", s.dim(notes)));
    }
    for change in &run.changes {
        lines.push(format!("      {}", describe_change(change)));
    }
    lines
}

/// One-line description of a field change.
pub fn describe_change(change: &FieldChange) -> String {
    match change {
        FieldChange::Value(c) => {
            let show = |v: &Option<serde_json::Value>| match v {
                Some(v) => v.to_string(),
                None => "(absent)".to_string(),
            };
            format!("{}: {} -> {}", c.path, show(&c.before), show(&c.after))
        }
        FieldChange::List { path, summary } => {
            let mut parts = vec![format!("{} items", summary.count)];
            if summary.added_count > 0 {
                parts.push(format!("+{}", summary.added_count));
            }
            if summary.removed_count > 0 {
                parts.push(format!("-{}", summary.removed_count));
            }
            if summary.reordered {
                parts.push("reordered".to_string());
            }
            if summary.primary_changed {
                parts.push("first changed".to_string());
            }
            format!("{path}: {}", parts.join(", "))
        }
    }
}
