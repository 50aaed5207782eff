//! JSONL audit logger — one line per capture attempt.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// A single audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: String,
    pub target_id: String,
    pub job_id: Option<i64>,
    /// Target kind: product, search or ranking.
    pub kind: String,
    pub url: Option<String>,
    /// succeeded, blocked, failed, or retrying.
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AuditEvent {
    /// Event stamped with the current time; fill in the rest by field.
    pub fn now(target_id: &str, job_id: Option<i64>, kind: &str, status: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            target_id: target_id.to_string(),
            job_id,
            kind: kind.to_string(),
            url: None,
            status: status.to_string(),
            duration_ms: 0,
            content_hash: None,
            changed: None,
            notes: None,
        }
    }
}

/// Append-only JSONL audit logger.
pub struct AuditLogger {
    file: File,
}

impl AuditLogger {
    /// Open or create the audit log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        Ok(Self { file })
    }

    pub fn log(&mut self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}")?;
        Ok(())
    }
}
