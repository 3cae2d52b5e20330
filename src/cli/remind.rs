use crate::reminder::{parse_delay, schedule, ReminderOutcome};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Run the remind command, blocking until the reminder fires
pub fn run_remind(message: &str, delay: &str) -> Result<(), String> {
    let delay = parse_delay(delay)?;
    let fire_at = fire_time(Local::now(), delay)?;

    let handle = schedule(message, fire_at, |m| {
        println!("\n!!! REMINDER: {} !!!\n", m);
    });

    if delay.is_zero() {
        println!("Reminder time is now. Displaying immediately.");
    } else {
        println!(
            "Reminder set for {} (in {} seconds).",
            handle.fire_at().format("%H:%M:%S"),
            delay.as_secs()
        );
    }

    match handle.wait() {
        ReminderOutcome::Fired => Ok(()),
        ReminderOutcome::Cancelled => Err("Reminder was cancelled".to_string()),
    }
}

fn fire_time(now: DateTime<Local>, delay: Duration) -> Result<DateTime<Local>, String> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| format!("Delay too large: {}s", delay.as_secs()))
}
