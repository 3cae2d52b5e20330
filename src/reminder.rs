use chrono::{DateTime, Local};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// How a reminder ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Fired,
    Cancelled,
}

/// Handle to a scheduled reminder
///
/// Dropping the handle detaches the reminder; it still fires on time.
pub struct ReminderHandle {
    cancel_tx: mpsc::Sender<()>,
    thread: JoinHandle<ReminderOutcome>,
    fire_at: DateTime<Local>,
}

impl ReminderHandle {
    pub fn fire_at(&self) -> DateTime<Local> {
        self.fire_at
    }

    /// Stop the reminder if it has not fired yet
    #[allow(dead_code)]
    pub fn cancel(self) -> ReminderOutcome {
        let _ = self.cancel_tx.send(());
        self.thread.join().unwrap_or(ReminderOutcome::Cancelled)
    }

    /// Block until the reminder fires
    pub fn wait(self) -> ReminderOutcome {
        let ReminderHandle {
            cancel_tx, thread, ..
        } = self;
        // Keep the channel open so waiting is never mistaken for a cancel
        let outcome = thread.join().unwrap_or(ReminderOutcome::Cancelled);
        drop(cancel_tx);
        outcome
    }
}

/// Run `on_fire(message)` at `fire_at`; a time in the past fires immediately
pub fn schedule<F>(message: impl Into<String>, fire_at: DateTime<Local>, on_fire: F) -> ReminderHandle
where
    F: FnOnce(&str) + Send + 'static,
{
    let message = message.into();
    let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
    let deadline = Instant::now() + delay;
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

    debug!("Reminder scheduled in {:?}", delay);

    let thread = thread::spawn(move || {
        match cancel_rx.recv_timeout(delay) {
            Ok(()) => return ReminderOutcome::Cancelled,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
            }
        }
        on_fire(&message);
        ReminderOutcome::Fired
    });

    ReminderHandle {
        cancel_tx,
        thread,
        fire_at,
    }
}

/// Parse a delay like `90s`, `10m`, `1h` or a bare number of seconds
pub fn parse_delay(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let (digits, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => input.split_at(idx),
        None => (input, "s"),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid delay: {}", input))?;

    let factor = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("Invalid delay unit in {} (use s, m or h)", input)),
    };

    amount
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Delay too large: {}", input))
}
