//! Top-level CLI definition and dispatch.
//!
//! `run` is the only long-running subcommand; every other subcommand opens
//! the store, does one thing, and exits.

#![allow(missing_docs)]

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

use crate::core::config::Config;
use crate::core::errors::{PctrError, Result};
use crate::daemon::loop_main::{Daemon, DaemonArgs};
use crate::export::{DailyExporter, RetentionSweeper, RollingExporter};
use crate::gate::{FrameSource, StdinFrameSource};
use crate::phase::{phase_at, PhaseBounds};
use crate::store::Store;

/// Single-camera gate-occupancy monitor.
#[derive(Debug, Parser)]
#[command(name = "pctr", author, version, about = "Single-camera gate-occupancy monitor", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitoring daemon in the foreground.
    Run(RunArgs),
    /// Print current phase, baseline, and missing count.
    Status,
    /// Force a one-off export.
    Export(ExportArgs),
    /// Configuration introspection.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Identifies the camera in every stored event.
    #[arg(long, default_value = "camera_1")]
    camera_id: String,
    /// Systemd watchdog timeout in seconds (0 disables).
    #[arg(long, default_value_t = 0)]
    watchdog_sec: u64,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(subcommand)]
    command: ExportCommand,
}

#[derive(Debug, Subcommand)]
enum ExportCommand {
    /// Run `DailyExporter` for a single date (default: today).
    Daily {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
    /// Run `RollingExporter` once.
    Rolling,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as JSON.
    Show,
    /// Load and validate the configuration, then exit.
    Validate,
    /// Print the resolved configuration file path.
    Path,
}

#[derive(Debug, Args)]
struct CompletionsArgs {
    shell: Shell,
}

/// Dispatch a parsed [`Cli`] to its subcommand.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Run(args) => run_daemon(cli, args),
        Command::Status => run_status(cli),
        Command::Export(args) => run_export(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => run_completions(args),
    }
}

fn run_daemon(cli: &Cli, args: &RunArgs) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let daemon_args = DaemonArgs {
        camera_id: args.camera_id.clone(),
        watchdog_sec: args.watchdog_sec,
    };
    let mut daemon = Daemon::init(config, &daemon_args)?;
    let frame_source: Box<dyn FrameSource> =
        Box::new(StdinFrameSource::new(std::io::BufReader::new(std::io::stdin())));
    daemon.run(frame_source, &daemon_args)
}

fn run_status(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let tz = config.phase.tz()?;
    let bounds = PhaseBounds::from_config(&config.phase)?;
    let store = Store::open(&config.paths.sqlite_db, &config.store)?;

    let now = Utc::now().with_timezone(&tz);
    let date = now.date_naive();
    let phase = phase_at(now, &bounds);

    let state = store.daily_state(date)?;
    let baseline = state.as_ref().map_or(0, |s| s.total_morning);
    let (in_today, out_today) = store.event_counts_for_date(date)?;
    let present = (in_today - out_today).max(0);
    let missing = (baseline - present).max(0);

    println!("date: {date}");
    println!("phase: {phase:?}");
    println!("baseline (total_morning): {baseline}");
    println!("present: {present}");
    println!("missing: {missing}");
    match store.last_alert_for_date(date)? {
        Some(alert) => println!(
            "last alert: {} ({})",
            alert.alert_time.to_rfc3339(),
            alert.status.as_db_str()
        ),
        None => println!("last alert: none"),
    }
    Ok(())
}

fn run_export(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let tz = config.phase.tz()?;
    let store = Store::open(&config.paths.sqlite_db, &config.store)?;

    match &args.command {
        ExportCommand::Daily { date } => {
            let now = Utc::now().with_timezone(&tz);
            let date = match date {
                Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    PctrError::InvalidConfig {
                        details: format!("--date {raw:?} is not YYYY-MM-DD"),
                    }
                })?,
                None => now.date_naive(),
            };
            let bounds = PhaseBounds::from_config(&config.phase)?;
            let outcome =
                DailyExporter::new(config.export.daily_dir.clone(), bounds, tz).export(&store, date, now)?;
            println!("daily export for {date}: {outcome:?}");
        }
        ExportCommand::Rolling => {
            let outcome = RollingExporter::new(
                config.export.daily_dir.clone(),
                config.export.summary_dir.clone(),
                config.export.rolling_window_days,
            )
            .export()?;
            let today = Utc::now().with_timezone(&tz).date_naive();
            let removed = RetentionSweeper::new(config.export.daily_dir.clone(), config.export.retention_days)
                .sweep(today)?;
            if !removed.is_empty() {
                println!("retention: removed {} workbook(s)", removed.len());
            }
            println!("rolling export: {outcome:?}");
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    match &args.command {
        ConfigCommand::Show => {
            let config = Config::load(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Validate => {
            Config::load(cli.config.as_deref())?;
            println!("config is valid");
        }
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_completions(args: &CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
