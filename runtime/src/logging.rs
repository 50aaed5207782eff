//! Tracing subscriber setup for the `argus` binary.

use crate::config::{LogFormat, LogLevel, LoggingConfig};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Crates whose events the configured level applies to.
const ARGUS_TARGETS: &[&str] = &["argus", "argus_runtime", "argus_core"];

/// Filter directives for a level, e.g. `argus=info,argus_runtime=info,...`.
pub fn directives(level: LogLevel) -> String {
    ARGUS_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level; `quiet` lowers the default to warnings.
pub fn init(config: &LoggingConfig, quiet: bool) -> Result<()> {
    let level = if quiet { LogLevel::Warn } else { config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_cover_all_crates() {
        let d = directives(LogLevel::Debug);
        assert_eq!(d, "argus=debug,argus_runtime=debug,argus_core=debug");
        assert!(EnvFilter::try_new(&d).is_ok());
    }
}
