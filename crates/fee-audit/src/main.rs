//! Agent Fee Audit
//!
//! Collects per-day agent fees from the dated STE report tree and the fee
//! portal, then builds the weekly audit workbook with one section per run.

mod config;
mod constants;
mod costs;
mod discovery;
mod extract;
mod formula;
mod ingest;
mod layout;
mod portal;
mod records;
mod report;
mod sink;
mod store;
mod styles;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use config::{Config, FileConfig, Overrides};
use ingest::IngestPlan;
use sink::XlsxSink;

/// Load config file or exit with helpful message
///
/// A missing file is fine when the command line names a report root.
fn load_config_file(path: &Path, root_dir: Option<&Path>) -> Result<FileConfig> {
    if !path.exists() {
        if let Some(root) = root_dir {
            log::info!("No {} found, using defaults for {}", path.display(), root.display());
            return Ok(FileConfig::default());
        }
        anyhow::bail!(
            "Config file '{}' not found.\n\n\
            To get started:\n\
            1. Copy config.toml.example to config.toml\n\
            2. Set sources.root_dir and, if used, the [portal] credentials\n\n\
            See config.toml.example for the required format.",
            path.display()
        );
    }

    FileConfig::load(path)
}

#[derive(Parser, Debug)]
#[command(name = "fee-audit")]
#[command(about = "Weekly agent fee audit workbook from STE reports and the fee portal")]
struct Args {
    /// Path to config.toml
    #[arg(short, long, default_value = constants::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Root folder of the STE report tree (overrides sources.root_dir)
    #[arg(long, global = true)]
    root_dir: Option<PathBuf>,

    /// Output workbook path (overrides report.output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// First report date to include (YYYY-MM-DD)
    #[arg(long, global = true)]
    start_date: Option<String>,

    /// Last report date to include (YYYY-MM-DD)
    #[arg(long, global = true)]
    end_date: Option<String>,

    /// Choose the date range on the terminal
    #[arg(long, conflicts_with_all = ["start_date", "end_date"])]
    interactive: bool,

    /// Do not contact the fee portal
    #[arg(long)]
    skip_portal: bool,

    /// Do not read local reports
    #[arg(long)]
    skip_local: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the local reports that would be read, with their dates
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let file_config = load_config_file(&args.config, args.root_dir.as_deref())?;
    let scan_only = matches!(args.command, Some(Command::Scan));
    let (start_date, end_date) = if args.interactive {
        config::prompt_date_range(&mut std::io::stdin().lock(), &mut std::io::stdout())?
    } else {
        (args.start_date, args.end_date)
    };
    let overrides = Overrides {
        root_dir: args.root_dir,
        output: args.output,
        start_date,
        end_date,
        skip_local: args.skip_local,
        // Scanning never touches the portal
        skip_portal: args.skip_portal || scan_only,
    };
    let config = Config::from_file(&file_config, overrides)?;

    if scan_only {
        return run_scan(&config);
    }

    run_report_generation(config).await
}

/// List discovered documents without building a report
fn run_scan(config: &Config) -> Result<()> {
    let local = config
        .local
        .as_ref()
        .context("Scan needs a local report root (sources.root_dir or --root-dir)")?;

    println!("Searching for reports in: {}", local.root.display());
    let documents = discovery::discover(&local.root, &local.filter);

    if documents.is_empty() {
        println!("No {} files found.", local.filter.marker);
        return Ok(());
    }

    println!("\n{:<12} Path", "Date");
    println!("{}", "-".repeat(70));
    for doc in &documents {
        let date = doc
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<12} {}", date, doc.path.display());
    }
    println!("{}", "-".repeat(70));

    let undated = documents.iter().filter(|d| d.date.is_none()).count();
    println!("\nFound {} {} files", documents.len(), local.filter.marker);
    if undated > 0 {
        println!("  {} without a date in their path (will be skipped)", undated);
    }

    Ok(())
}

/// Main pipeline: ingest, aggregate, plan, write
async fn run_report_generation(config: Config) -> Result<()> {
    println!("Agent Fee Audit");
    println!("=============================================\n");

    if let Some(local) = &config.local {
        println!("Local reports: {}", local.root.display());
    }
    if let Some(portal) = &config.portal {
        println!("Fee portal: {} ({} run(s))", portal.base_url, portal.runs.len());
    }
    if config.start_date.is_some() || config.end_date.is_some() {
        let show = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "...".to_string());
        println!("Date range: {} to {}", show(config.start_date), show(config.end_date));
    }
    println!();

    // Step 1: Ingest both sources concurrently
    println!("Collecting agent fees...");
    let plan = IngestPlan {
        local: config.local.clone(),
        portal: config.portal.clone(),
        from: config.start_date,
        to: config.end_date,
    };
    let (store, outcomes) = ingest::ingest_all(plan, config.sentinels.clone()).await;
    for outcome in &outcomes {
        let unit = match outcome.kind {
            records::SourceKind::Local => "report(s)",
            records::SourceKind::Portal => "page(s)",
        };
        println!(
            "  {}: {} {}, {} fee rows accepted, {} dropped",
            outcome.kind, outcome.units, unit, outcome.accepted, outcome.dropped
        );
    }

    log::debug!("Merged {} fee records", store.record_count());
    let snapshot = store.snapshot();
    if snapshot.is_empty() {
        println!("\nNo valid fee records found. Nothing to write.");
        return Ok(());
    }
    println!("\nFound data for {} runs\n", snapshot.run_count());

    // Step 2: Lay out and write the workbook
    println!("Creating audit report: {}", config.output.display());
    let report_plan = layout::plan(&snapshot, &config.costs);

    let output_dir = match config.output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut sink = XlsxSink::new(constants::AUDIT_SHEET_NAME)?;
    let stats = report::synthesize(&report_plan, &config.borders, &mut sink)?;
    sink.save(&config.output)
        .with_context(|| format!("Failed to write {}", config.output.display()))?;
    println!(
        "  Generated: {} ({} sections, {} cells, {} merged bands)",
        config.output.display(),
        stats.sections,
        stats.cells,
        stats.merges
    );

    report::write_fee_ledger(&output_dir, &snapshot)?;

    report::print_summary(&snapshot, &outcomes);

    Ok(())
}
