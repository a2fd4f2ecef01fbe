use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fibertrack::{report, FiberTracker, GroupDimension, RunOptions, Sheet};

#[derive(Parser)]
#[command(name = "fibertrack", about = "Fiber install tracker: archive completed jobs and report metrics")]
struct Cli {
    /// Database path (default: ~/.fibertrack/fibertrack.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up, archive old completed jobs and recompute both metrics tables
    Run {
        /// Reference date (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        as_of: Option<chrono::NaiveDate>,
        /// Skip the pre-run backup
        #[arg(long)]
        no_backup: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the metrics tables written by the last run
    Metrics {
        #[command(subcommand)]
        target: MetricsTarget,
    },
    /// Load rows from a JSON array of objects keyed by column header
    Import {
        /// Sheet to load into: active or archive
        #[arg(long, default_value = "active")]
        sheet: Sheet,
        /// Replace the sheet instead of appending to it
        #[arg(long)]
        replace: bool,
        /// Input file, or - for stdin
        file: String,
    },
    /// Write a sheet as a JSON array of objects keyed by column header
    Export {
        /// Sheet to dump: active or archive
        #[arg(long, default_value = "active")]
        sheet: Sheet,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show tracker status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List recent runs
    Runs {
        /// Maximum runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MetricsTarget {
    /// Metrics per work area
    Area {
        #[arg(long)]
        json: bool,
    },
    /// Metrics per install month
    Month {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List stored config values and the effective settings
    List,
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate, String> {
    fibertrack::date_util::parse_iso_date(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => fibertrack::Database::open_at(path).await?,
        None => fibertrack::Database::open().await?,
    };
    let tracker = FiberTracker::new(db);

    match cli.command {
        Commands::Run {
            as_of,
            no_backup,
            json,
        } => {
            let options = RunOptions {
                as_of,
                backup: !no_backup,
            };
            let run = tracker.run_daily(&options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run_report(&run);
            }
        }
        Commands::Metrics { target } => {
            let (dimension, json) = match target {
                MetricsTarget::Area { json } => (GroupDimension::Area, json),
                MetricsTarget::Month { json } => (GroupDimension::Month, json),
            };
            let rows = tracker.metrics(dimension).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report::rate_table(dimension, &rows))?);
            } else {
                print!("{}", report::render_table(dimension, &rows));
            }
        }
        Commands::Import {
            sheet,
            replace,
            file,
        } => {
            let input = if file == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&file)?
            };
            let count = tracker.import_json(sheet, &input, replace).await?;
            println!("{} now has {count} rows.", sheet.title());
        }
        Commands::Export { sheet, output } => {
            let json = tracker.export_json(sheet).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    eprintln!("Wrote {} to {}", sheet.title(), path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Status { json } => {
            let status = tracker.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Commands::Runs { limit, json } => {
            let runs = tracker.runs(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                print_runs(&runs);
            }
        }
        Commands::Config { action } => {
            handle_config(&tracker, action).await?;
        }
    }

    Ok(())
}

async fn handle_config(tracker: &FiberTracker, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match tracker.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            tracker.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = tracker.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
            let effective = tracker.config().await?;
            println!();
            println!("Effective settings");
            println!("  Archive after:   {} days", effective.archive_policy.after_days);
            println!(
                "  Supported years: {}-{}",
                effective.years.first(),
                effective.years.last()
            );
            println!(
                "  Backup dir:      {}",
                effective
                    .backup_dir
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
        }
    }
    Ok(())
}

fn print_run_report(run: &fibertrack::RunReport) {
    let m = &run.migration;
    println!("Run {} ({})", run.run_id, m.reference_date);
    println!("  Before:   {} active, {} archived", m.active_before, m.archive_before);
    println!("  Moved:    {}", m.moved);
    println!("  After:    {} active, {} archived", m.active_after, m.archive_after);
    match &run.backup_path {
        Some(path) => println!("  Backup:   {}", path.display()),
        None => println!("  Backup:   skipped"),
    }
    println!("  Run time: {} ms", run.run_time_ms);
    println!();
    print!("{}", report::render_table(GroupDimension::Area, &run.area_metrics));
    println!();
    print!("{}", report::render_table(GroupDimension::Month, &run.month_metrics));
}

fn print_status(status: &fibertrack::TrackerStatus) {
    println!("Tracker Status");
    println!("  {}: {} rows", Sheet::Active.title(), status.active_rows);
    println!("  {}: {} rows", Sheet::Archive.title(), status.archive_rows);
    println!("  Area groups:   {}", status.area_groups);
    println!("  Month groups:  {}", status.month_groups);
    println!(
        "  Metrics as of: {}",
        status.metrics_computed_at.as_deref().unwrap_or("never")
    );
    match &status.last_run {
        Some(run) => println!(
            "  Last run:      {} ({}, reference {})",
            run.started_at, run.status, run.reference_date
        ),
        None => println!("  Last run:      never"),
    }
}

fn print_runs(runs: &[fibertrack::RunLogEntry]) {
    if runs.is_empty() {
        println!("No runs recorded.");
        return;
    }
    let mut current_month: Option<String> = None;
    for run in runs {
        let month = run.month_key();
        if month != current_month {
            println!("{}", month.as_deref().unwrap_or("(unknown month)"));
            current_month = month;
        }
        let duration = run
            .run_time_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        print!(
            "  #{:<4} {}  ref {}  {:<9} {:>8}",
            run.id, run.started_at, run.reference_date, run.status, duration
        );
        if let Some(moved) = run.moved {
            print!("  moved {moved}");
        }
        if let Some(err) = &run.error_message {
            print!("  error: {err}");
        }
        println!();
    }
}
