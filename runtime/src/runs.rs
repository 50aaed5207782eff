//! Turning capture outcomes into immutable run records.

use crate::capture::{CaptureOutcome, StoredArtifact};
use crate::model::{CaptureRun, RunStatus, Target};
use anyhow::Result;
use argus_core::summarize_changes;

/// Timing and provenance of one capture attempt.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub target: &'a Target,
    pub job_id: Option<i64>,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Build the run record for `outcome`.
///
/// `previous` is the latest succeeded run of the same target. Matching
/// fingerprints short-circuit the diff; with no previous run the capture
/// is the first observation and counts as changed.
pub fn build_run(
    ctx: RunContext<'_>,
    run_id: String,
    outcome: CaptureOutcome,
    artifacts: Vec<StoredArtifact>,
    previous: Option<&CaptureRun>,
) -> Result<CaptureRun> {
    let mut run = CaptureRun {
        id: run_id,
        target_id: ctx.target.id.clone(),
        job_id: ctx.job_id,
        started_at: ctx.started_at,
        finished_at: ctx.finished_at,
        status: RunStatus::Succeeded,
        final_url: outcome.final_url().to_string(),
        raw: None,
        normalized: None,
        content_hash: None,
        changed: false,
        changes: Vec::new(),
        notes: outcome.notes().map(str::to_string),
        artifacts,
    };

    match outcome {
        CaptureOutcome::Blocked { .. } => {
            run.status = RunStatus::Blocked;
        }
        CaptureOutcome::Succeeded {
            content_hash,
            raw_extracted,
            normalized_extracted,
            ..
        } => {
            let baseline = previous.and_then(|p| Some((p.content_hash.as_ref()?, p.normalized.as_ref()?)));
            match baseline {
                Some((hash, _)) if *hash == content_hash => {}
                Some((_, before)) => {
                    run.changes = summarize_changes(before, &normalized_extracted)?;
                    run.changed = true;
                }
                None => run.changed = true,
            }
            run.raw = Some(raw_extracted);
            run.normalized = Some(normalized_extracted);
            run.content_hash = Some(content_hash);
        }
    }
    Ok(run)
}
