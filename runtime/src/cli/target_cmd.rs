//! Manage monitored targets.

use crate::capture::urls::target_url;
use crate::cli::open_store;
use crate::cli::output::{self, Styled};
use crate::config::ArgusConfig;
use crate::model::{now_ms, Target};
use crate::store::RecordStore;
use anyhow::{anyhow, bail, Result};
use argus_core::TargetKind;

/// A target as described on the command line.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub kind: TargetKind,
    /// Item id, keyword, or ranking URL.
    pub value: String,
    pub marketplace: String,
    pub tracked: Vec<String>,
    pub cadence_minutes: u32,
    pub label: Option<String>,
}

/// Validate a spec against the configured marketplaces and build the target.
pub fn build_target(config: &ArgusConfig, spec: TargetSpec, now: i64) -> Result<Target> {
    let marketplace = config
        .marketplace(&spec.marketplace)
        .ok_or_else(|| anyhow!("unknown marketplace '{}'", spec.marketplace))?;

    let target = match spec.kind {
        TargetKind::Product => {
            if !spec.tracked.is_empty() {
                bail!("--track applies to search and ranking targets only");
            }
            Target::product(&spec.marketplace, &spec.value, now)
        }
        TargetKind::Search => Target::search(&spec.marketplace, &spec.value, spec.tracked, now),
        TargetKind::Ranking => Target::ranking(&spec.marketplace, &spec.value, spec.tracked, now),
    };
    target_url(&target, marketplace)?;

    let target = target.with_cadence(spec.cadence_minutes);
    Ok(match spec.label {
        Some(label) => target.with_label(label),
        None => target,
    })
}

pub fn add(config: &ArgusConfig, spec: TargetSpec) -> Result<()> {
    let target = build_target(config, spec, now_ms())?;
    let store = open_store(config)?;
    store.insert_target(&target)?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&target)?);
    } else if !output::is_quiet() {
        let s = Styled::new();
        eprintln!("  {} Added {}", s.ok_sym(), target.describe());
        eprintln!("    id:      {}", target.id);
        eprintln!("    cadence: every {} min", target.cadence_minutes);
        if !target.tracked.is_empty() {
            eprintln!("    tracked: {}", target.tracked.join(", "));
        }
    }
    Ok(())
}

pub fn list(config: &ArgusConfig) -> Result<()> {
    let store = open_store(config)?;
    let targets = store.list_targets()?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&targets)?);
        return Ok(());
    }

    let s = Styled::new();
    if targets.is_empty() {
        eprintln!("  No targets. Add one with 'argus target add'.");
        return Ok(());
    }
    for target in &targets {
        let state = if target.enabled {
            s.green("enabled ")
        } else {
            s.dim("disabled")
        };
        println!(
            "{}  {state}  every {:>4}m  next {}  {}",
            target.id,
            target.cadence_minutes,
            output::format_timestamp(target.next_run_at),
            target.describe()
        );
    }
    Ok(())
}

pub fn set_enabled(config: &ArgusConfig, id: &str, enabled: bool) -> Result<()> {
    let store = open_store(config)?;
    if !store.set_enabled(id, enabled)? {
        bail!("no target with id {id}");
    }
    if !output::is_quiet() {
        let s = Styled::new();
        let verb = if enabled { "Enabled" } else { "Disabled" };
        eprintln!("  {} {verb} {id}", s.ok_sym());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;
    use tokio_test::{assert_err, assert_ok};

    fn spec(kind: TargetKind, value: &str) -> TargetSpec {
        TargetSpec {
            kind,
            value: value.to_string(),
            marketplace: "us".to_string(),
            tracked: Vec::new(),
            cadence_minutes: 120,
            label: None,
        }
    }

    #[test]
    fn test_build_search_target() {
        let mut s = spec(TargetKind::Search, "usb hub");
        s.tracked = vec!["b0002".into()];
        s.label = Some("hubs".into());
        let target = assert_ok!(build_target(&ArgusConfig::default(), s, 5));
        assert_eq!(target.marketplace, "US");
        assert_eq!(target.tracked, vec!["B0002"]);
        assert_eq!(target.cadence_minutes, 120);
        assert_eq!(target.next_run_at, 5);
        assert_eq!(target.describe(), "hubs (search @ US)");
    }

    #[test]
    fn test_rejects_unknown_marketplace_and_bad_ids() {
        let config = ArgusConfig::default();
        let mut s = spec(TargetKind::Product, "B0001");
        s.marketplace = "XX".into();
        assert_err!(build_target(&config, s, 0));

        assert_err!(build_target(&config, spec(TargetKind::Product, "B0 01"), 0));
        assert_err!(build_target(&config, spec(TargetKind::Ranking, "ftp://example.com/list"), 0));

        let mut tracked_product = spec(TargetKind::Product, "B0001");
        tracked_product.tracked = vec!["B0002".into()];
        assert_err!(build_target(&config, tracked_product, 0));
    }

    #[test]
    fn test_build_ranking_target() {
        let target = build_target(
            &ArgusConfig::default(),
            spec(TargetKind::Ranking, "https://www.amazon.com/gp/bestsellers/electronics"),
            0,
        )
        .unwrap();
        assert_eq!(
            target.subject,
            Subject::Ranking {
                source_url: "https://www.amazon.com/gp/bestsellers/electronics".into()
            }
        );
    }
}
