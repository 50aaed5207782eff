//! Append-only record of capture attempts.

pub mod logger;

pub use logger::{AuditEvent, AuditLogger};
