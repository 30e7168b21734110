use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use railreport::config::RailReportConfig;
use railreport::pipeline;
use railreport::testrail::{TestRailClient, TestRailSource};

#[derive(Parser)]
#[command(
    name = "railreport",
    about = "TestRail execution velocity and run/plan summaries",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config (default: $RAILREPORT_CONFIG, then ./railreport.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Window settings shared by `report` and `offline`.
#[derive(Args)]
struct WindowArgs {
    /// Number of local calendar days in the window
    #[arg(long)]
    days: Option<u32>,

    /// IANA timezone name or fixed offset (e.g. +02:00)
    #[arg(long)]
    timezone: Option<String>,

    /// Directory for results.json and per-plan payloads
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Pin the clock (RFC 3339), for reproducible output
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

impl WindowArgs {
    fn apply(&self, config: &mut RailReportConfig) {
        if let Some(days) = self.days {
            config.report.days = days;
        }
        if let Some(tz) = &self.timezone {
            config.report.timezone = tz.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch from TestRail and write the report payloads
    Report {
        #[command(flatten)]
        window: WindowArgs,

        /// Also save the fetched data as a snapshot
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },

    /// Rebuild the report payloads from a saved snapshot
    Offline {
        /// Snapshot written by `report --save-snapshot`
        #[arg(long)]
        snapshot: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// List the plans of a project as JSON
    Plans {
        /// TestRail project id
        #[arg(long)]
        project_id: u64,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Preview the configured milestones
    Milestones,

    /// Validate a payload file and print its series
    Check {
        /// Payload JSON (e.g. output/results.json)
        #[arg(long)]
        from_json: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut config = RailReportConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Report { window, save_snapshot } => {
            window.apply(&mut config);
            let outcome = pipeline::run_report(&config, window.now(), save_snapshot.as_deref()).await?;
            print_outcome(&outcome);
        }
        Commands::Offline { snapshot, window } => {
            window.apply(&mut config);
            let outcome = pipeline::run_offline(&config, &snapshot, window.now())?;
            print_outcome(&outcome);
        }
        Commands::Plans { project_id, out } => {
            tracing::info!(project_id, "Listing plans");
            let client = TestRailClient::new(&config.testrail)?;
            let plans = client
                .plans(project_id)
                .await
                .with_context(|| format!("failed to list plans of project {}", project_id))?;
            let json = serde_json::to_string_pretty(&plans)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {} plans to {}", plans.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Milestones => {
            let rows = pipeline::milestone_preview(&config, Utc::now()).await?;
            println!("{:<40} | {:<12} | {:<10} | {:<10}", "Milestone", "Status", "Start", "Due");
            println!("{:-<40}-|-{:-<12}-|-{:-<10}-|-{:-<10}", "", "", "", "");
            for row in &rows {
                println!(
                    "{:<40} | {:<12} | {:<10} | {:<10}",
                    row.name,
                    row.status.to_string(),
                    row.start,
                    row.due
                );
            }
        }
        Commands::Check { from_json } => {
            let payload = pipeline::check_payload(&from_json)?;
            println!("{} OK ({} days, {})", from_json.display(), payload.dates.len(), payload.timezone);
            println!("{:<10} | {:>7} | {:>10}", "Date", "Daily", "Cumulative");
            println!("{:-<10}-|-{:->7}-|-{:->10}", "", "", "");
            for (date, daily, cumulative) in payload.series_rows() {
                println!("{:<10} | {:>7} | {:>10}", date, daily, cumulative);
            }
            println!(
                "Executed {} of {} planned (source discrepancy {})",
                payload.grand.executed, payload.grand.planned, payload.source_discrepancy
            );
        }
    }

    Ok(())
}

fn print_outcome(outcome: &pipeline::ReportOutcome) {
    println!("Report {}", outcome.report_id);
    for file in &outcome.files {
        println!("  wrote {}", file.display());
    }
    let g = &outcome.global;
    println!(
        "Executed {} of {} planned, {} passed, {} failed (source discrepancy {})",
        g.grand.executed, g.grand.planned, g.grand.passed, g.grand.failed, g.source_discrepancy
    );
}
