pub mod simulate;
pub mod status;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use simulate::{process_simulate_command, SimulateCommand};
use status::{process_status_command, StatusCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::ReminderConfig,
    utils::logging::{enable_logging, CLI_PREFIX},
};

#[derive(Parser, Debug)]
#[command(name = "Shiftminder", version, long_about = None)]
#[command(about = "Mid-shift reminders through live activities or scheduled notifications", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(long = "log-dir", help = "Also write logs into daily rotated files in this directory")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "JSON configuration file. Missing fields use defaults")]
    config: Option<PathBuf>,
    #[arg(
        long = "lead-time-minutes",
        help = "How long before a scheduled event the notification fires. Defaults to 15"
    )]
    lead_time_minutes: Option<u64>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show which reminder surfaces are available on this device")]
    Status {
        #[command(flatten)]
        command: StatusCommand,
    },
    #[command(about = "Run a reminder through start, update and end against in-memory providers")]
    Simulate {
        #[command(flatten)]
        command: SimulateCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, args.log_dir.as_deref(), logging_level, args.log)?;

    let config = load_config(args.config, args.lead_time_minutes)?;

    match args.commands {
        Commands::Status { command } => process_status_command(command, &config).await,
        Commands::Simulate { command } => process_simulate_command(command, &config).await,
    }
}

fn load_config(path: Option<PathBuf>, lead_time_minutes: Option<u64>) -> Result<ReminderConfig> {
    let config = path.map_or_else(|| Ok(ReminderConfig::default()), |path| ReminderConfig::load(&path))?;
    Ok(match lead_time_minutes {
        Some(minutes) => config.with_lead_time(Duration::from_secs(minutes.saturating_mul(60))),
        None => config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_LEAD_TIME;

    #[test]
    fn flags_override_the_defaults() -> Result<()> {
        let config = load_config(None, Some(5))?;
        assert_eq!(config.lead_time(), Duration::from_secs(300));
        assert_eq!(config.schedule_retries, 1);
        Ok(())
    }

    #[test]
    fn huge_lead_time_flag_is_capped() -> Result<()> {
        let config = load_config(None, Some(u64::MAX))?;
        assert_eq!(config.lead_time(), MAX_LEAD_TIME);
        Ok(())
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from([
            "shiftminder",
            "--lead-time-minutes",
            "10",
            "simulate",
            "--subject",
            "shift-42",
            "--in-minutes",
            "20",
            "--activity",
        ])
        .unwrap();
        assert_eq!(args.lead_time_minutes, Some(10));
        assert!(matches!(args.commands, Commands::Simulate { .. }));
    }
}
