use std::sync::Arc;

use ansi_term::Colour::{Green, Red, Yellow};
use anyhow::Result;
use chrono::Duration;
use clap::Parser;

use crate::{
    activity::ActivityGateway,
    capability::{CapabilityProbe, PlatformFamily, PlatformIdentity},
    config::ReminderConfig,
    notification::NotificationGateway,
    providers::memory::{InMemoryActivityProvider, InMemoryNotificationProvider},
    reminder::{orchestrator::ReminderOrchestrator, ReminderContent, ReminderRequest},
    utils::clock::{Clock, DefaultClock},
};

#[derive(Debug, Parser)]
pub struct SimulateCommand {
    #[arg(long, default_value = "shift-1", help = "Subject id of the simulated reminder")]
    subject: String,
    #[arg(
        long = "in-minutes",
        help = "Minutes until the shift event. Without it the reminder fires immediately"
    )]
    in_minutes: Option<i64>,
    #[arg(long, help = "Pretend to run on a device with live activities")]
    activity: bool,
    #[arg(
        long = "fail-schedules",
        default_value_t = 0,
        help = "Number of schedule calls the notification service rejects"
    )]
    fail_schedules: u32,
    #[arg(long, help = "Amount shown on the reminder, e.g. the expected deposit")]
    amount: Option<f64>,
}

/// Drives one reminder through its lifecycle and prints what happened at every step.
pub async fn process_simulate_command(
    SimulateCommand {
        subject,
        in_minutes,
        activity,
        fail_schedules,
        amount,
    }: SimulateCommand,
    config: &ReminderConfig,
) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let (probe, activity_gateway) = if activity {
        (
            CapabilityProbe::new(
                PlatformIdentity::new(PlatformFamily::Ios, "17.0"),
                &config.activity_min_version,
            ),
            ActivityGateway::with_provider(Arc::new(InMemoryActivityProvider::new())),
        )
    } else {
        (
            CapabilityProbe::for_current_platform(&config.activity_min_version),
            ActivityGateway::unavailable(),
        )
    };
    let notifications =
        Arc::new(InMemoryNotificationProvider::new().failing_schedules(fail_schedules));
    let orchestrator = ReminderOrchestrator::new(
        Arc::new(probe),
        Arc::new(activity_gateway),
        Arc::new(NotificationGateway::new(
            notifications.clone(),
            clock.clone(),
            config,
        )),
        clock.clone(),
        config,
    );

    let status = orchestrator.support().log_report().await.status;
    println!(
        "Support: activity={} notifications={}",
        status.activity_supported, status.notifications_supported
    );

    let mut content = ReminderContent::new("Shift in progress", "Remember to check out");
    if let Some(amount) = amount {
        content = content.with_amount(amount);
    }
    let mut request = ReminderRequest::new(subject.as_str(), content);
    if let Some(minutes) = in_minutes {
        request = request.scheduled_at(clock.time() + Duration::minutes(minutes));
    }

    match orchestrator.start_reminder(request).await {
        Ok(started) => println!(
            "{} {} through {}",
            Green.paint("started"),
            started.subject_id,
            started.handle
        ),
        Err(e) => {
            println!("{} {e}", Red.paint("failed"));
            if e.is_permission_denied() {
                println!("Notifications are disabled, enable them in the system settings");
            }
            return Ok(());
        }
    }
    for scheduled in notifications.scheduled().await {
        let trigger = notifications.trigger_of(&scheduled.id).await;
        println!("  scheduled {} with {trigger:?}", scheduled.id);
    }

    let outcome = orchestrator
        .update_reminder(
            &subject,
            ReminderContent::new("Shift almost over", "Check out in a few minutes"),
        )
        .await;
    match outcome {
        Ok(outcome) => println!("{} {outcome:?}", Yellow.paint("updated")),
        Err(e) => println!("{} {e}", Red.paint("update failed")),
    }

    for reminder in orchestrator.get_active_reminders().await {
        println!("  active {} -> {}", reminder.subject_id, reminder.handle);
    }

    orchestrator.end_reminder(&subject).await;
    println!(
        "{} {subject}, {} reminder(s) left",
        Green.paint("ended"),
        orchestrator.get_active_reminders().await.len()
    );
    Ok(())
}
