//! fairshare-cli: command-line front end for the fairshare usage ledger.
//!
//! Builds a ledger (banks and associations), runs update passes against a
//! JSON-lines job archive, clears bank usage, and prints the usage tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fairshare_core::types::AssociationKey;
use fairshare_ledger::{JsonlJobSource, LedgerConfig, RocksLedger, UsageLedger, UsageReport};
use tracing::info;

/// Fairshare usage ledger.
#[derive(Parser, Debug)]
#[command(
    name = "fairshare-cli",
    version,
    about = "Half-life usage decay and bank-tree aggregation ledger"
)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new ledger.
    Init(InitArgs),
    /// Add a bank to the tree.
    AddBank(AddBankArgs),
    /// Add a user to a bank.
    AddAssociation(AddAssociationArgs),
    /// Enable or disable an association. Usage history is kept.
    SetActive(SetActiveArgs),
    /// Fold completed jobs into usage, decay, and re-aggregate.
    UpdateUsage(UpdateUsageArgs),
    /// Reset the usage of one bank's associations.
    ClearUsage(ClearUsageArgs),
    /// Print the bank tree with usage.
    ViewUsage(ViewUsageArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Decay half-life in weeks (default from config).
    #[arg(long)]
    half_life: Option<u32>,

    /// Usage periods kept per association (default from config).
    #[arg(long)]
    usage_periods: Option<usize>,
}

#[derive(Args, Debug)]
struct AddBankArgs {
    /// Bank name.
    name: String,

    /// Parent bank; omit for the root bank.
    #[arg(long)]
    parent: Option<String>,

    /// Bank priority.
    #[arg(long, default_value_t = 1.0)]
    priority: f64,
}

#[derive(Args, Debug)]
struct AddAssociationArgs {
    /// Username.
    username: String,

    /// Bank the user is added to.
    bank: String,

    /// Numeric user id, as recorded on jobs.
    #[arg(long)]
    userid: u32,

    /// Make this the user's default bank.
    #[arg(long)]
    default: bool,
}

#[derive(Args, Debug)]
struct SetActiveArgs {
    username: String,
    bank: String,

    /// Disable instead of enable.
    #[arg(long)]
    inactive: bool,
}

#[derive(Args, Debug)]
struct UpdateUsageArgs {
    /// JSON-lines archive of completed jobs.
    #[arg(long)]
    jobs: PathBuf,

    /// Decay half-life in weeks (default from config).
    #[arg(long)]
    half_life: Option<u32>,

    /// Print the pass report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ClearUsageArgs {
    /// Bank whose usage is reset.
    bank: String,
}

#[derive(Args, Debug)]
struct ViewUsageArgs {
    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

type DiskLedger = UsageLedger<RocksLedger, JsonlJobSource>;

impl Cli {
    /// Layer command-line flags over the file and environment config.
    fn load_config(&self) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

fn open_ledger(config: &LedgerConfig, jobs: JsonlJobSource) -> Result<DiskLedger> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
    let store = RocksLedger::open(config.db_path())
        .with_context(|| format!("opening ledger at {}", config.db_path().display()))?;
    Ok(UsageLedger::new(store, jobs))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&config.log_level, &cli.log_format);
    info!(data_dir = %config.data_dir.display(), "fairshare-cli v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init(args) => init(&config, args),
        Commands::AddBank(args) => add_bank(&config, args),
        Commands::AddAssociation(args) => add_association(&config, args),
        Commands::SetActive(args) => set_active(&config, args),
        Commands::UpdateUsage(args) => update_usage(&config, args),
        Commands::ClearUsage(args) => clear_usage(&config, args),
        Commands::ViewUsage(args) => view_usage(&config, args),
    }
}

fn init(config: &LedgerConfig, args: InitArgs) -> Result<()> {
    let half_life = args.half_life.unwrap_or(config.priority_decay_half_life);
    let usage_periods = args.usage_periods.unwrap_or(config.usage_periods);
    let mut ledger = open_ledger(config, JsonlJobSource::default())?;
    let header = ledger
        .initialize(half_life, usage_periods)
        .context("initializing ledger")?;
    println!(
        "Ledger initialized: half-life {} week(s), {} usage periods, first period ends at {:.0}",
        header.priority_decay_half_life, header.usage_periods, header.end_half_life_period
    );
    Ok(())
}

fn add_bank(config: &LedgerConfig, args: AddBankArgs) -> Result<()> {
    let mut ledger = open_ledger(config, JsonlJobSource::default())?;
    ledger
        .add_bank(&args.name, args.parent.as_deref(), args.priority)
        .with_context(|| format!("adding bank {}", args.name))?;
    println!("Added bank {}", args.name);
    Ok(())
}

fn add_association(config: &LedgerConfig, args: AddAssociationArgs) -> Result<()> {
    let mut ledger = open_ledger(config, JsonlJobSource::default())?;
    let association = ledger
        .add_association(&args.username, args.userid, &args.bank, args.default)
        .with_context(|| format!("adding {} to bank {}", args.username, args.bank))?;
    println!(
        "Added {} (default bank {})",
        association.key(),
        association.default_bank
    );
    Ok(())
}

fn set_active(config: &LedgerConfig, args: SetActiveArgs) -> Result<()> {
    let mut ledger = open_ledger(config, JsonlJobSource::default())?;
    let key = AssociationKey::new(args.username, args.bank);
    ledger
        .set_association_active(&key, !args.inactive)
        .with_context(|| format!("updating {key}"))?;
    println!("{key} is now {}", if args.inactive { "inactive" } else { "active" });
    Ok(())
}

fn update_usage(config: &LedgerConfig, args: UpdateUsageArgs) -> Result<()> {
    let jobs = JsonlJobSource::open(&args.jobs)
        .with_context(|| format!("reading job archive {}", args.jobs.display()))?;
    let half_life = args.half_life.unwrap_or(config.priority_decay_half_life);
    let mut ledger = open_ledger(config, jobs)?;
    let report = ledger.update_usage(half_life).context("update pass failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("=== USAGE PASS ===");
        println!("New window:    {}", report.new_window);
        println!("Associations:  {}", report.associations);
        println!(
            "  no change {} / decay only {} / append {} / append across window {}",
            report.no_change_in_window,
            report.decay_only,
            report.append_in_window,
            report.append_across_window
        );
        println!("Jobs folded:   {}", report.jobs_folded);
        println!("Jobs skipped:  {}", report.jobs_skipped);
        println!("Root usage:    {:.5}", report.root_usage);
        println!("Period ends:   {:.0}", report.end_half_life_period);
    }
    Ok(())
}

fn clear_usage(config: &LedgerConfig, args: ClearUsageArgs) -> Result<()> {
    let mut ledger = open_ledger(config, JsonlJobSource::default())?;
    ledger
        .clear_usage(&args.bank)
        .with_context(|| format!("clearing usage of bank {}", args.bank))?;
    println!("Cleared usage of bank {}", args.bank);
    Ok(())
}

fn view_usage(config: &LedgerConfig, args: ViewUsageArgs) -> Result<()> {
    let ledger = open_ledger(config, JsonlJobSource::default())?;
    let report = ledger.usage_report().context("building usage report")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &UsageReport) {
    for bank in &report.banks {
        let indent = "  ".repeat(bank.depth);
        println!("{indent}{:<20} {:>16.5}", bank.name, bank.job_usage);
        for assoc in &bank.associations {
            let periods: Vec<String> = assoc.periods.iter().map(|p| format!("{p:.5}")).collect();
            println!(
                "{indent}  - {:<16} {:>16.5}  [{}]{}",
                assoc.username,
                assoc.job_usage,
                periods.join(", "),
                if assoc.active { "" } else { " (inactive)" }
            );
        }
    }
}

/// Initialize the tracing subscriber with the given log level and format.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
