//! Clock-driven background sweeps.
//!
//! The sweeps themselves take their dates as parameters; only this module
//! reads the wall clock.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Timelike, Utc};

use crate::AppState;

/// Spawn the sweep loops enabled by configuration.
pub fn spawn(state: &AppState) {
    let enabled = state.config.scheduler.clone().unwrap_or_default();

    if enabled.auto_absence {
        tokio::spawn(absence_loop(state.clone()));
    }
    if enabled.reminders {
        tokio::spawn(reminder_loop(state.clone()));
    }

    tracing::info!(
        auto_absence = enabled.auto_absence,
        reminders = enabled.reminders,
        "scheduler started"
    );
}

/// Close the previous group day right after each midnight.
async fn absence_loop(state: AppState) {
    let sweep = state.absence_sweep();

    loop {
        tokio::time::sleep(until_next_midnight(Utc::now())).await;

        let now = Utc::now();
        let previous_day = now.date_naive() - Days::new(1);
        if let Err(err) = sweep.run(previous_day, now).await {
            tracing::error!(error = %err, %previous_day, "absence sweep failed");
        }
    }
}

/// Dispatch reminders at the top of every minute. Preferences are matched
/// on the exact hour:minute, so a coarser tick would skip them.
async fn reminder_loop(state: AppState) {
    let sweep = state.reminder_sweep();

    loop {
        tokio::time::sleep(until_next_minute(Utc::now())).await;

        if let Err(err) = sweep.run(Utc::now()).await {
            tracing::error!(error = %err, "reminder sweep failed");
        }
    }
}

fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next = (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc();
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}

fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let seconds = 60 - u64::from(now.second()) % 60;
    Duration::from_secs(seconds.max(1))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_wait_until_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 23, 59, 30).unwrap();
        assert_eq!(until_next_midnight(now), Duration::from_secs(30));

        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        assert_eq!(
            until_next_midnight(now),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn test_wait_until_next_minute() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 18, 29, 45).unwrap();
        assert_eq!(until_next_minute(now), Duration::from_secs(15));

        // Never a zero-length sleep, even on the boundary.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 18, 30, 0).unwrap();
        assert_eq!(until_next_minute(now), Duration::from_secs(60));
    }
}
