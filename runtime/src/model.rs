//! Persisted records: targets, capture jobs and capture runs.
//!
//! Timestamps are Unix milliseconds (UTC) throughout.

use crate::capture::artifacts::StoredArtifact;
use argus_core::{ContentHash, FieldChange, NormalizedSignal, RawFields, TargetKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Minutes to milliseconds.
pub fn minutes_ms(minutes: u32) -> i64 {
    i64::from(minutes) * 60_000
}

// ── Target ──────────────────────────────────────────────────────────────

/// What a target points at. The variant fixes the target kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    Product { item_id: String },
    Search { keyword: String },
    Ranking { source_url: String },
}

impl Subject {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Product { .. } => TargetKind::Product,
            Self::Search { .. } => TargetKind::Search,
            Self::Ranking { .. } => TargetKind::Ranking,
        }
    }

    /// The single value stored alongside the kind.
    pub fn value(&self) -> &str {
        match self {
            Self::Product { item_id } => item_id,
            Self::Search { keyword } => keyword,
            Self::Ranking { source_url } => source_url,
        }
    }

    /// Rebuild from the stored kind and value.
    pub fn from_parts(kind: TargetKind, value: String) -> Self {
        match kind {
            TargetKind::Product => Self::Product { item_id: value },
            TargetKind::Search => Self::Search { keyword: value },
            TargetKind::Ranking => Self::Ranking { source_url: value },
        }
    }
}

/// A monitored subject with its capture cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub subject: Subject,
    /// Marketplace code, e.g. `US`.
    pub marketplace: String,
    /// Identifiers annotated in search and ranking results (uppercase).
    pub tracked: Vec<String>,
    pub label: Option<String>,
    pub cadence_minutes: u32,
    pub enabled: bool,
    pub next_run_at: i64,
    pub created_at: i64,
}

impl Target {
    /// Default capture cadence.
    pub const DEFAULT_CADENCE_MINUTES: u32 = 360;

    fn new(subject: Subject, marketplace: &str, tracked: Vec<String>, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            marketplace: marketplace.trim().to_ascii_uppercase(),
            tracked: argus_core::signal::normalize_tracked(&tracked),
            label: None,
            cadence_minutes: Self::DEFAULT_CADENCE_MINUTES,
            enabled: true,
            next_run_at: now,
            created_at: now,
        }
    }

    /// A single product page. Due immediately.
    pub fn product(marketplace: &str, item_id: &str, now: i64) -> Self {
        let item_id = item_id.trim().to_ascii_uppercase();
        Self::new(Subject::Product { item_id }, marketplace, Vec::new(), now)
    }

    /// A keyword search results page.
    pub fn search(marketplace: &str, keyword: &str, tracked: Vec<String>, now: i64) -> Self {
        let keyword = keyword.trim().to_string();
        Self::new(Subject::Search { keyword }, marketplace, tracked, now)
    }

    /// A ranked list page at a fixed URL.
    pub fn ranking(marketplace: &str, source_url: &str, tracked: Vec<String>, now: i64) -> Self {
        let source_url = source_url.trim().to_string();
        Self::new(Subject::Ranking { source_url }, marketplace, tracked, now)
    }

    pub fn with_cadence(mut self, minutes: u32) -> Self {
        self.cadence_minutes = minutes.max(1);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> TargetKind {
        self.subject.kind()
    }

    /// Short human description, e.g. `product B0001 @ US`.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{label} ({} @ {})", self.kind(), self.marketplace),
            None => format!("{} {} @ {}", self.kind(), self.subject.value(), self.marketplace),
        }
    }
}

// ── Jobs ────────────────────────────────────────────────────────────────

/// Lifecycle of a capture job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Blocked,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// One scheduled attempt to observe a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJob {
    pub id: i64,
    pub target_id: String,
    pub scheduled_at: i64,
    /// Earliest time the job may be claimed; moves forward on retry.
    pub run_after: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

// ── Runs ────────────────────────────────────────────────────────────────

/// Outcome of an executed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Blocked,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Durable, immutable record of one executed capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRun {
    pub id: String,
    pub target_id: String,
    pub job_id: Option<i64>,
    pub started_at: i64,
    pub finished_at: i64,
    pub status: RunStatus,
    pub final_url: String,
    /// Debug-only extraction payload.
    pub raw: Option<RawFields>,
    pub normalized: Option<NormalizedSignal>,
    pub content_hash: Option<ContentHash>,
    /// False when the fingerprint matches the previous succeeded run.
    pub changed: bool,
    pub changes: Vec<FieldChange>,
    pub notes: Option<String>,
    pub artifacts: Vec<StoredArtifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_constructors_normalize_inputs() {
        let t = Target::product(" us ", " b00abc ", 1_000);
        assert_eq!(t.marketplace, "US");
        assert_eq!(t.subject, Subject::Product { item_id: "B00ABC".into() });
        assert_eq!(t.next_run_at, 1_000);
        assert!(t.enabled);

        let s = Target::search("de", "  usb c kabel ", vec!["b01".into(), " B01".into(), "".into()], 0)
            .with_cadence(0);
        assert_eq!(s.kind(), TargetKind::Search);
        assert_eq!(s.subject.value(), "usb c kabel");
        assert_eq!(s.tracked, vec!["B01"]);
        assert_eq!(s.cadence_minutes, 1);
    }

    #[test]
    fn test_subject_roundtrip_through_parts() {
        let subject = Subject::Ranking {
            source_url: "https://www.amazon.com/gp/bestsellers/electronics".into(),
        };
        let rebuilt = Subject::from_parts(subject.kind(), subject.value().to_string());
        assert_eq!(rebuilt, subject);
    }

    #[test]
    fn test_job_status_parse() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Blocked,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_describe() {
        let t = Target::product("US", "B0001", 0);
        assert_eq!(t.describe(), "product B0001 @ US");
        assert_eq!(t.with_label("Widget").describe(), "Widget (product @ US)");
    }
}
