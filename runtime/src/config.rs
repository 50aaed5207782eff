//! Runtime configuration.
//!
//! Everything the scheduler, worker and capture path need is carried in an
//! [`ArgusConfig`] value that is built once by the binary and passed down
//! explicitly. Values come from an optional JSON file and are then
//! overridden by `ARGUS_*` variables through an injected lookup, so tests
//! never touch the process environment.

use anyhow::{bail, Context, Result};
use argus_core::DecimalMark;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the config file looked up in the home directory.
pub const CONFIG_FILE: &str = "config.json";

/// Default home directory: `~/.argus`.
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".argus")
}

// ── Sections ────────────────────────────────────────────────────────────

/// Headless browser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit Chromium binary; discovered on `PATH` when unset.
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    /// Pass `--no-sandbox` (needed in most containers).
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
            no_sandbox: false,
            window_width: 1366,
            window_height: 900,
        }
    }
}

/// Per-capture limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub navigation_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub search_limit: usize,
    pub ranking_limit: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 45_000,
            ready_timeout_ms: 15_000,
            search_limit: argus_core::parse::search::DEFAULT_SEARCH_LIMIT,
            ranking_limit: argus_core::parse::ranking::DEFAULT_RANKING_LIMIT,
        }
    }
}

impl CaptureConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Scheduler loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    /// Maximum targets enqueued per tick.
    pub batch_limit: usize,
    pub sync_interval_secs: u64,
    /// Running jobs older than this are considered abandoned.
    pub stale_job_after_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            batch_limit: 50,
            sync_interval_secs: 900,
            stale_job_after_secs: 600,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_job_after_secs)
    }
}

/// Capture worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent captures (browser contexts).
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Minimum spacing between two navigations.
    pub min_delay_ms: u64,
    /// Idle sleep when the queue is empty.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 3,
            retry_base_ms: 30_000,
            retry_max_ms: 30 * 60_000,
            min_delay_ms: 2_000,
            poll_interval_ms: 5_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format '{other}' (expected text or json)"),
        }
    }
}

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => bail!("unknown log level '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Info,
        }
    }
}

/// Regional storefront profile used to build URLs and emulate a local
/// visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marketplace {
    pub host: String,
    pub locale: String,
    pub timezone: String,
    pub accept_language: String,
    /// How prices and counts are written on this storefront.
    #[serde(default)]
    pub decimal_mark: DecimalMark,
}

impl Marketplace {
    fn new(host: &str, locale: &str, timezone: &str, accept_language: &str) -> Self {
        Self {
            host: host.to_string(),
            locale: locale.to_string(),
            timezone: timezone.to_string(),
            accept_language: accept_language.to_string(),
            decimal_mark: DecimalMark::Point,
        }
    }

    fn with_decimal_comma(mut self) -> Self {
        self.decimal_mark = DecimalMark::Comma;
        self
    }
}

/// Built-in storefronts keyed by marketplace code.
pub fn default_marketplaces() -> BTreeMap<String, Marketplace> {
    [
        ("US", Marketplace::new("www.amazon.com", "en-US", "America/New_York", "en-US,en;q=0.9")),
        ("UK", Marketplace::new("www.amazon.co.uk", "en-GB", "Europe/London", "en-GB,en;q=0.9")),
        (
            "DE",
            Marketplace::new("www.amazon.de", "de-DE", "Europe/Berlin", "de-DE,de;q=0.9,en;q=0.8")
                .with_decimal_comma(),
        ),
        (
            "FR",
            Marketplace::new("www.amazon.fr", "fr-FR", "Europe/Paris", "fr-FR,fr;q=0.9,en;q=0.8")
                .with_decimal_comma(),
        ),
        ("JP", Marketplace::new("www.amazon.co.jp", "ja-JP", "Asia/Tokyo", "ja-JP,ja;q=0.9,en;q=0.8")),
        ("CA", Marketplace::new("www.amazon.ca", "en-CA", "America/Toronto", "en-CA,en;q=0.9")),
    ]
    .into_iter()
    .map(|(code, m)| (code.to_string(), m))
    .collect()
}

// ── Root ────────────────────────────────────────────────────────────────

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgusConfig {
    /// State directory; other paths default to files inside it.
    pub home: PathBuf,
    pub database_path: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub browser: BrowserConfig,
    pub capture: CaptureConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
    pub marketplaces: BTreeMap<String, Marketplace>,
}

impl Default for ArgusConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            database_path: None,
            artifacts_dir: None,
            audit_log: None,
            browser: BrowserConfig::default(),
            capture: CaptureConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
            marketplaces: default_marketplaces(),
        }
    }
}

impl ArgusConfig {
    /// Load configuration for the binary: the given file, or
    /// `<home>/config.json` when present, then `ARGUS_*` overrides from the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`ArgusConfig::load`] with an explicit variable lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let home = lookup("ARGUS_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_home);
                let candidate = home.join(CONFIG_FILE);
                if candidate.exists() {
                    Self::from_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Apply `ARGUS_*` overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ARGUS_HOME") {
            self.home = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARGUS_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ARGUS_ARTIFACTS_DIR") {
            self.artifacts_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ARGUS_AUDIT_LOG") {
            self.audit_log = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ARGUS_CHROMIUM_PATH") {
            self.browser.chromium_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ARGUS_HEADLESS") {
            self.browser.headless = parse_bool("ARGUS_HEADLESS", &v)?;
        }
        if let Some(v) = lookup("ARGUS_CHROMIUM_NO_SANDBOX") {
            self.browser.no_sandbox = parse_bool("ARGUS_CHROMIUM_NO_SANDBOX", &v)?;
        }
        if let Some(v) = lookup("ARGUS_NAV_TIMEOUT_MS") {
            self.capture.navigation_timeout_ms = parse_var("ARGUS_NAV_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("ARGUS_TICK_SECS") {
            self.scheduler.tick_secs = parse_var("ARGUS_TICK_SECS", &v)?;
        }
        if let Some(v) = lookup("ARGUS_BATCH_LIMIT") {
            self.scheduler.batch_limit = parse_var("ARGUS_BATCH_LIMIT", &v)?;
        }
        if let Some(v) = lookup("ARGUS_WORKER_CONCURRENCY") {
            self.worker.concurrency = parse_var("ARGUS_WORKER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("ARGUS_MAX_ATTEMPTS") {
            self.worker.max_attempts = parse_var("ARGUS_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("ARGUS_LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }
        if let Some(v) = lookup("ARGUS_LOG_LEVEL") {
            self.logging.level = v.parse()?;
        }
        Ok(())
    }

    /// Check value ranges, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.scheduler.tick_secs == 0 {
            errors.push("scheduler.tick_secs must be positive".to_string());
        }
        if self.scheduler.batch_limit == 0 {
            errors.push("scheduler.batch_limit must be positive".to_string());
        }
        if self.worker.concurrency == 0 {
            errors.push("worker.concurrency must be positive".to_string());
        }
        if self.worker.max_attempts == 0 {
            errors.push("worker.max_attempts must be at least 1".to_string());
        }
        if self.worker.retry_base_ms > self.worker.retry_max_ms {
            errors.push("worker.retry_base_ms must not exceed worker.retry_max_ms".to_string());
        }
        if self.capture.navigation_timeout_ms == 0 {
            errors.push("capture.navigation_timeout_ms must be positive".to_string());
        }
        if self.marketplaces.is_empty() {
            errors.push("at least one marketplace must be configured".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.home.join("argus.db"))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts_dir
            .clone()
            .unwrap_or_else(|| self.home.join("artifacts"))
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.home.join("audit.jsonl"))
    }

    /// Marketplace profile by code, case-insensitive.
    pub fn marketplace(&self, code: &str) -> Option<&Marketplace> {
        self.marketplaces.get(&code.trim().to_ascii_uppercase())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {name} ({value:?}): {e}"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid value for {name} ({value:?}): expected a boolean"),
    }
}
