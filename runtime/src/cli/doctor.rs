//! Environment readiness check.
//!
//! Covers configuration, browser discovery and storage. Every failure
//! includes a fix instruction.

use crate::cli::output::{self, Styled};
use crate::config::ArgusConfig;
use crate::renderer::chromium::find_chromium;
use crate::store::{RecordStore, SqliteStore};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn run(config: &ArgusConfig) -> Result<()> {
    let chromium = chromium_path(config);
    let chromium_version = chromium.as_deref().and_then(chromium_version);
    let targets = SqliteStore::from_config(config).and_then(|store| store.list_targets());
    let free_mb = free_disk_mb(&config.home);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "home": config.home.display().to_string(),
            "database": config.database_path().display().to_string(),
            "artifacts": config.artifacts_dir().display().to_string(),
            "marketplaces": config.marketplaces.keys().collect::<Vec<_>>(),
            "chromium_path": chromium.as_ref().map(|p| p.display().to_string()),
            "chromium_version": chromium_version,
            "targets": targets.as_ref().ok().map(|t| t.len()),
            "database_error": targets.as_ref().err().map(|e| format!("{e:#}")),
            "disk_free_mb": free_mb,
        }));
        return Ok(());
    }

    let s = Styled::new();
    let mut ready = true;
    let mut has_warning = false;
    output::print_header(&s);

    // ── Config ──────────────────────────────────────────────────────────
    output::print_section(&s, "Config");
    output::print_check(s.ok_sym(), "Home:", &config.home.display().to_string());
    let codes: Vec<&str> = config.marketplaces.keys().map(String::as_str).collect();
    output::print_check(s.ok_sym(), "Marketplaces:", &codes.join(", "));
    output::print_check(
        s.info_sym(),
        "Schedule:",
        &format!(
            "tick {}s, batch {}, {} worker(s), {} attempt(s)",
            config.scheduler.tick_secs,
            config.scheduler.batch_limit,
            config.worker.concurrency,
            config.worker.max_attempts
        ),
    );
    eprintln!();

    // ── Browser ─────────────────────────────────────────────────────────
    output::print_section(&s, "Browser");
    match &chromium {
        Some(path) => {
            let version = chromium_version.as_deref().unwrap_or("unknown version");
            output::print_check(s.ok_sym(), "Chromium:", &format!("{version} at {}", path.display()));
            if config.browser.no_sandbox {
                output::print_check(s.warn_sym(), "Sandbox:", "disabled");
                has_warning = true;
            }
        }
        None => {
            output::print_check(s.fail_sym(), "Chromium:", "NOT FOUND");
            output::print_detail("Fix: install chromium, or set ARGUS_CHROMIUM_PATH=/path/to/chrome");
            ready = false;
        }
    }
    eprintln!();

    // ── Storage ─────────────────────────────────────────────────────────
    output::print_section(&s, "Storage");
    match &targets {
        Ok(targets) => {
            let enabled = targets.iter().filter(|t| t.enabled).count();
            output::print_check(
                s.ok_sym(),
                "Database:",
                &format!(
                    "{} ({} targets, {enabled} enabled)",
                    config.database_path().display(),
                    targets.len()
                ),
            );
        }
        Err(e) => {
            output::print_check(s.fail_sym(), "Database:", &format!("{e:#}"));
            output::print_detail("Fix: check permissions on ARGUS_DATABASE or ARGUS_HOME");
            ready = false;
        }
    }
    match free_mb {
        Some(mb) if mb >= 500 => {
            output::print_check(
                s.ok_sym(),
                "Disk:",
                &format!("{} free", output::format_size(mb * 1_048_576)),
            );
        }
        Some(mb) => {
            output::print_check(s.warn_sym(), "Disk:", &format!("{mb} MB free (screenshots need room)"));
            has_warning = true;
        }
        None => {
            output::print_check(s.warn_sym(), "Disk:", "could not determine free space");
            has_warning = true;
        }
    }

    let (status, msg) = match (ready, has_warning) {
        (false, _) => (s.red("NOT READY"), "fix the failures above"),
        (true, true) => (s.yellow("READY"), "with warnings"),
        (true, false) => (s.green("READY"), "all checks passed"),
    };
    output::print_status(&s, &status, msg);
    Ok(())
}

fn chromium_path(config: &ArgusConfig) -> Option<PathBuf> {
    match &config.browser.chromium_path {
        Some(path) if path.exists() => Some(path.clone()),
        Some(_) => None,
        None => find_chromium(&config.home),
    }
}

fn chromium_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    if output.status.success() {
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Some(raw.replace("Google Chrome ", "").replace("Chromium ", ""))
    } else {
        None
    }
}

/// Free space in MB on the filesystem holding `path` (or its nearest
/// existing ancestor).
fn free_disk_mb(path: &Path) -> Option<u64> {
    let check = path.ancestors().find(|p| p.exists())?;
    let output = Command::new("df")
        .args(["-m", &check.display().to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().nth(1)?;
    line.split_whitespace().nth(3)?.parse().ok()
}
