pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use tierwatch_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "tierwatch",
    about = "Tierwatch periodic tier assessment CLI",
    long_about = "Run half-year tier assessments, review the results, and confirm or demote managers.",
    after_help = "Examples:\n  tierwatch migrate\n  tierwatch assess --period 2026H1 --executed-by cron\n  tierwatch assessments --status pending\n  tierwatch demote <ASSESSMENT_ID> --by admin"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load deterministic demo tiers, managers and monthly sales")]
    Seed {
        #[arg(long, help = "Period to place the demo sales in, e.g. 2026H1 (default: current)")]
        period: Option<String>,
    },
    #[command(about = "Show the current half-year period or an explicit one")]
    Period {
        #[arg(long, requires = "half")]
        year: Option<i32>,
        #[arg(long, requires = "year", value_parser = clap::value_parser!(u8).range(1..=2))]
        half: Option<u8>,
    },
    #[command(about = "Evaluate every tier-holding manager for a period")]
    Assess {
        #[arg(long, help = "Period to assess, e.g. 2026H1 (default: current)")]
        period: Option<String>,
        #[arg(long, help = "Actor recorded on each assessment")]
        executed_by: String,
    },
    #[command(about = "List assessments for a period")]
    Assessments {
        #[arg(long, help = "Period to list, e.g. 2026H1 (default: current)")]
        period: Option<String>,
        #[arg(long, help = "Filter by status: pending, confirmed or demoted")]
        status: Option<String>,
    },
    #[command(about = "Confirm a pending assessment")]
    Confirm {
        assessment_id: String,
        #[arg(long = "by", help = "Actor confirming the assessment")]
        confirmed_by: String,
        #[arg(long, help = "Record the confirmation without moving the manager's tier")]
        no_apply_tier: bool,
    },
    #[command(about = "Demote the manager behind a pending demotion candidate")]
    Demote {
        assessment_id: String,
        #[arg(long = "by", help = "Actor performing the demotion")]
        demoted_by: String,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { period } => commands::seed::run(period.as_deref()),
        Command::Period { year, half } => commands::period::run(year, half),
        Command::Assess { period, executed_by } => {
            commands::assess::run(period.as_deref(), &executed_by)
        }
        Command::Assessments { period, status } => {
            commands::assessments::run(period.as_deref(), status.as_deref())
        }
        Command::Confirm { assessment_id, confirmed_by, no_apply_tier } => {
            commands::confirm::run(&assessment_id, &confirmed_by, !no_apply_tier)
        }
        Command::Demote { assessment_id, demoted_by } => {
            commands::demote::run(&assessment_id, &demoted_by)
        }
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the stderr subscriber so stdout carries only the JSON payload.
/// A config that fails to load falls back to defaults here; the command
/// itself reports the config error.
fn init_logging() {
    use tracing::Level;

    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
