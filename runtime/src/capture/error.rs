use argus_core::CoreError;
use thiserror::Error;

/// Why a capture attempt did not produce an outcome.
///
/// A detected block is not an error; it is returned as
/// [`CaptureOutcome::Blocked`](super::CaptureOutcome::Blocked).
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unknown marketplace '{0}'")]
    UnknownMarketplace(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("required field '{field}' missing on {final_url}")]
    MissingField {
        field: &'static str,
        final_url: String,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} timed out after {after_ms} ms")]
    Timeout { url: String, after_ms: u64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Renderer(#[from] anyhow::Error),
}

impl CaptureError {
    /// Whether another attempt could succeed. Configuration problems never
    /// fix themselves.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownMarketplace(_) | Self::InvalidTarget(_))
    }
}
