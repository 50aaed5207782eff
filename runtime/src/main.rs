//! Argus: marketplace listing capture and change detection.

use anyhow::Result;
use argus_core::TargetKind;
use argus_runtime::cli::target_cmd::TargetSpec;
use argus_runtime::cli::{
    diff_cmd, doctor, parse_cmd, runs_cmd, scheduler_cmd, target_cmd, worker_cmd,
};
use argus_runtime::config::ArgusConfig;
use argus_runtime::logging;
use argus_runtime::model::Target;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Capture marketplace listings on a schedule and report what changed")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <home>/config.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop until Ctrl-C
    Scheduler,

    /// Run the capture worker
    Worker {
        /// Process one batch of jobs and exit
        #[arg(long)]
        once: bool,
    },

    /// Manage monitored targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Show recent runs of a target
    Runs {
        target_id: String,

        /// Number of runs
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Parse a saved HTML page offline
    Parse {
        /// Page kind: product, search or ranking
        kind: TargetKind,

        file: PathBuf,

        /// Marketplace whose number formatting the page uses
        #[arg(short, long, default_value = "US")]
        marketplace: String,

        /// Identifier to report on (repeatable)
        #[arg(short, long = "track")]
        track: Vec<String>,

        /// Result cap for search and ranking pages
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Diff two JSON documents
    Diff { before: PathBuf, after: PathBuf },

    /// Check configuration, browser and storage
    Doctor,
}

#[derive(Subcommand)]
enum TargetAction {
    /// Add a target
    Add {
        #[command(subcommand)]
        kind: AddTarget,
    },
    /// List targets
    List,
    /// Resume scheduling a target
    Enable { id: String },
    /// Stop scheduling a target
    Disable { id: String },
}

#[derive(Subcommand)]
enum AddTarget {
    /// A product detail page
    Product {
        item_id: String,
        #[command(flatten)]
        opts: TargetOpts,
    },
    /// A keyword search results page
    Search {
        keyword: String,
        #[command(flatten)]
        opts: TargetOpts,
    },
    /// A ranked list page (best sellers and similar)
    Ranking {
        url: String,
        #[command(flatten)]
        opts: TargetOpts,
    },
}

#[derive(Args)]
struct TargetOpts {
    /// Marketplace code
    #[arg(short, long, default_value = "US")]
    marketplace: String,

    /// Minutes between captures
    #[arg(long, default_value_t = Target::DEFAULT_CADENCE_MINUTES)]
    cadence: u32,

    /// Display label
    #[arg(long)]
    label: Option<String>,

    /// Identifier to report on in result lists (repeatable)
    #[arg(short, long = "track")]
    track: Vec<String>,
}

impl AddTarget {
    fn into_spec(self) -> TargetSpec {
        let (kind, value, opts) = match self {
            Self::Product { item_id, opts } => (TargetKind::Product, item_id, opts),
            Self::Search { keyword, opts } => (TargetKind::Search, keyword, opts),
            Self::Ranking { url, opts } => (TargetKind::Ranking, url, opts),
        };
        TargetSpec {
            kind,
            value,
            marketplace: opts.marketplace,
            tracked: opts.track,
            cadence_minutes: opts.cadence,
            label: opts.label,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Output helpers read these.
    if cli.json {
        std::env::set_var("ARGUS_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("ARGUS_QUIET", "1");
    }

    let config = Arc::new(ArgusConfig::load(cli.config.as_deref())?);
    logging::init(&config.logging, cli.quiet)?;

    match cli.command {
        Commands::Scheduler => scheduler_cmd::run(&config).await,
        Commands::Worker { once } => worker_cmd::run(config, once).await,
        Commands::Target { action } => match action {
            TargetAction::Add { kind } => target_cmd::add(&config, kind.into_spec()),
            TargetAction::List => target_cmd::list(&config),
            TargetAction::Enable { id } => target_cmd::set_enabled(&config, &id, true),
            TargetAction::Disable { id } => target_cmd::set_enabled(&config, &id, false),
        },
        Commands::Runs { target_id, limit } => runs_cmd::run(&config, &target_id, limit),
        Commands::Parse {
            kind,
            file,
            marketplace,
            track,
            limit,
        } => parse_cmd::run(&config, kind, &file, &marketplace, &track, limit),
        Commands::Diff { before, after } => diff_cmd::run(&before, &after),
        Commands::Doctor => doctor::run(&config),
    }
}
