//! Error types for the core library.

use thiserror::Error;

/// Errors produced while extracting or hashing a signal.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A CSS selector failed to compile.
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A value could not be converted to JSON.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A field the signal cannot exist without was not found on the page.
    #[error("required field `{0}` not found")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, CoreError>;
