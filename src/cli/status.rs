use std::sync::Arc;

use ansi_term::Colour::{Green, Red};
use anyhow::Result;
use clap::Parser;

use crate::{
    activity::ActivityGateway,
    capability::CapabilityProbe,
    config::ReminderConfig,
    notification::NotificationGateway,
    providers::memory::InMemoryNotificationProvider,
    support::{SupportReport, SupportReporter},
    utils::clock::DefaultClock,
};

#[derive(Debug, Parser)]
pub struct StatusCommand {
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

/// Reports reminder support of the machine running the command. There is no native activity
/// module or notification service bound to the command line, so the report reflects the
/// platform gate and the in-process notification service.
pub async fn process_status_command(
    StatusCommand { json }: StatusCommand,
    config: &ReminderConfig,
) -> Result<()> {
    let probe = Arc::new(CapabilityProbe::for_current_platform(
        &config.activity_min_version,
    ));
    let notifications = Arc::new(NotificationGateway::new(
        Arc::new(InMemoryNotificationProvider::new()),
        Arc::new(DefaultClock),
        config,
    ));
    let reporter = SupportReporter::new(probe, Arc::new(ActivityGateway::unavailable()), notifications);

    let report = reporter.log_report().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn flag(value: bool) -> String {
    if value {
        Green.paint("yes").to_string()
    } else {
        Red.paint("no").to_string()
    }
}

fn print_report(report: &SupportReport) {
    println!(
        "Platform:        {} {}",
        report.platform.family,
        report.platform.version.as_deref().unwrap_or("(unknown version)")
    );
    println!("Live activities: {}", flag(report.status.activity_supported));
    println!("Notifications:   {}", flag(report.status.notifications_supported));
}
