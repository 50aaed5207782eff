//! Screenshot artifacts produced by captures and their on-disk store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What an artifact shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    /// Full product page.
    FullPage,
    /// Search results page.
    SearchTop,
    /// Ranking page.
    RankingTop,
    /// One result card of a tracked identifier.
    ResultCard,
    /// A page classified as blocked.
    BlockedPage,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullPage => "full-page",
            Self::SearchTop => "search-top",
            Self::RankingTop => "ranking-top",
            Self::ResultCard => "result-card",
            Self::BlockedPage => "blocked-page",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image produced by a capture, not yet stored.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub marketplace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("kind", &self.kind)
            .field("marketplace", &self.marketplace)
            .field("item_id", &self.item_id)
            .field("position", &self.position)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Reference to a stored artifact, kept on the run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub kind: ArtifactKind,
    pub marketplace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Path relative to the artifact root.
    pub path: String,
    pub size: u64,
}

/// Writes artifacts under `<root>/<target>/<run>/`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist every artifact of a run, in order.
    pub async fn save_all(
        &self,
        target_id: &str,
        run_id: &str,
        artifacts: &[Artifact],
    ) -> Result<Vec<StoredArtifact>> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }

        let relative_dir = Path::new(target_id).join(run_id);
        let dir = self.root.join(&relative_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

        let mut stored = Vec::with_capacity(artifacts.len());
        for (index, artifact) in artifacts.iter().enumerate() {
            let name = file_name(index, artifact);
            let path = dir.join(&name);
            tokio::fs::write(&path, &artifact.bytes)
                .await
                .with_context(|| format!("failed to write artifact: {}", path.display()))?;
            stored.push(StoredArtifact {
                kind: artifact.kind,
                marketplace: artifact.marketplace.clone(),
                item_id: artifact.item_id.clone(),
                position: artifact.position,
                path: relative_dir.join(&name).to_string_lossy().into_owned(),
                size: artifact.bytes.len() as u64,
            });
        }
        Ok(stored)
    }
}

fn file_name(index: usize, artifact: &Artifact) -> String {
    match &artifact.item_id {
        Some(id) => format!("{index:02}-{}-{id}.png", artifact.kind),
        None => format!("{index:02}-{}.png", artifact.kind),
    }
}
