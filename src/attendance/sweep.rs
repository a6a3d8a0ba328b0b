//! Scheduled sweeps closing past days and nudging unmarked members.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use uuid::Uuid;

use crate::attendance::{
    AUTO_MARK_REASON, AttendanceRecord, AttendanceStore, DateRange,
    SYSTEM_MARKER, Status,
};
use crate::error::Result;
use crate::notify::Notifier;
use crate::user::{DayGroup, Role, User, UserStore};

/// What one absence sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Absent records created by this run.
    pub marked: usize,
    /// Users that could not be processed.
    pub failures: usize,
}

/// What one reminder sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReminderReport {
    /// Users reminded by this run.
    pub reminded: usize,
    /// Users that could not be processed.
    pub failures: usize,
}

/// Closes one past weekday by recording absences for unmarked members.
#[derive(Clone)]
pub struct AbsenceSweep {
    users: Arc<dyn UserStore>,
    attendance: Arc<dyn AttendanceStore>,
    notifier: Notifier,
}

impl AbsenceSweep {
    /// Create a new [`AbsenceSweep`].
    pub fn new(
        users: Arc<dyn UserStore>,
        attendance: Arc<dyn AttendanceStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            users,
            attendance,
            notifier,
        }
    }

    /// Record `Absent` for every Member of `day`'s group without a record.
    ///
    /// No group meets on weekends, so those days are skipped. Re-running a
    /// fully marked day is a no-op; a partial failure leaves gaps the next
    /// run fills. One failing user never stops the rest.
    pub async fn run(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let Some(group) = DayGroup::for_date(day) else {
            tracing::debug!(%day, "no group meets on this day, sweep skipped");
            return Ok(SweepReport::default());
        };

        let members =
            self.users.list_by_group(group, Some(Role::Member)).await?;
        let marked: HashSet<Uuid> = self
            .attendance
            .find_range(DateRange::day(day), None)
            .await?
            .into_iter()
            .map(|record| record.user_id)
            .collect();

        let mut report = SweepReport::default();
        for member in members {
            if marked.contains(&member.id) {
                continue;
            }
            match self.mark_absent(&member, day, now).await {
                Ok(created) => report.marked += usize::from(created),
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        user_id = %member.id,
                        "auto-absence failed for user"
                    );
                    report.failures += 1;
                },
            }
        }

        tracing::info!(
            %day,
            group = group.as_str(),
            marked = report.marked,
            failures = report.failures,
            "absence sweep finished"
        );

        Ok(report)
    }

    async fn mark_absent(
        &self,
        member: &User,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let record = AttendanceRecord::new(
            member.id,
            day,
            Status::Absent,
            SYSTEM_MARKER,
            true,
            AUTO_MARK_REASON,
            now,
        );
        let outcome = self.attendance.upsert(&record).await?;

        // A manual mark racing the sweep resolves through the same upsert;
        // only fresh rows count and notify.
        if !outcome.is_created() {
            return Ok(false);
        }

        if let Err(err) = self.notifier.absence_recorded(member, day).await {
            tracing::error!(
                error = %err,
                user_id = %member.id,
                "absence notification failed"
            );
        }

        Ok(true)
    }
}

/// Sends the daily "mark your attendance" nudge.
#[derive(Clone)]
pub struct ReminderSweep {
    users: Arc<dyn UserStore>,
    notifier: Notifier,
}

impl ReminderSweep {
    /// Create a new [`ReminderSweep`].
    pub fn new(users: Arc<dyn UserStore>, notifier: Notifier) -> Self {
        Self { users, notifier }
    }

    /// Remind every user whose preferred minute is `now` and who was not
    /// reminded yet today, then advance their watermark.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderReport> {
        let time_of_day = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0)
            .unwrap_or(NaiveTime::MIN);
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        let due = self.users.due_reminders(time_of_day, day_start).await?;
        let today = now.date_naive();

        let mut report = ReminderReport::default();
        for user in due {
            match self.remind(&user, today, now).await {
                Ok(()) => report.reminded += 1,
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        user_id = %user.id,
                        "reminder failed for user"
                    );
                    report.failures += 1;
                },
            }
        }

        if report.reminded > 0 || report.failures > 0 {
            tracing::info!(
                reminded = report.reminded,
                failures = report.failures,
                "reminder sweep finished"
            );
        }

        Ok(report)
    }

    async fn remind(
        &self,
        user: &User,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.notifier.reminder(user, today).await?;
        self.users.record_reminder(user.id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{INITIAL_REASON, MemoryAttendanceStore};
    use crate::notify::{Channel, Template};
    use crate::user::{MemoryUserStore, NotificationSettings};
    use chrono::TimeZone;

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 4).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 5, 0, 0, 0).unwrap()
    }

    fn member(name: &str, group: DayGroup) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            day_group: group,
            ..Default::default()
        }
    }

    fn stores() -> (Arc<MemoryUserStore>, Arc<MemoryAttendanceStore>) {
        (
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryAttendanceStore::default()),
        )
    }

    #[tokio::test]
    async fn test_unmarked_members_become_absent() {
        let (users, attendance) = stores();
        let (notifier, log) = Notifier::recording();
        let sweep =
            AbsenceSweep::new(users.clone(), attendance.clone(), notifier);

        let names = ["Ana", "Bob", "Cal", "Dee", "Eli"];
        let people: Vec<User> = names
            .iter()
            .map(|name| member(name, DayGroup::Wednesday))
            .collect();
        for person in &people {
            users.insert(person).await.unwrap();
        }
        // Two of the five are already marked Present.
        for person in &people[..2] {
            let record = AttendanceRecord::new(
                person.id,
                wednesday(),
                Status::Present,
                Uuid::new_v4(),
                false,
                INITIAL_REASON,
                now(),
            );
            attendance.upsert(&record).await.unwrap();
        }

        let report = sweep.run(wednesday(), now()).await.unwrap();
        assert_eq!(report, SweepReport { marked: 3, failures: 0 });

        let records = attendance
            .find_range(DateRange::day(wednesday()), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
        let auto: Vec<_> =
            records.iter().filter(|r| r.auto_marked).collect();
        assert_eq!(auto.len(), 3);
        for record in auto {
            assert_eq!(record.status, Status::Absent);
            assert_eq!(record.marked_by, SYSTEM_MARKER);
            assert_eq!(record.audit_trail[0].reason, AUTO_MARK_REASON);
        }

        // One email per freshly absent member, nothing else.
        let events = log.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|event| {
            event.template == Template::AbsenceRecorded
                && event.channel == Channel::Email
        }));
    }

    #[tokio::test]
    async fn test_rerun_is_a_noop() {
        let (users, attendance) = stores();
        let (notifier, log) = Notifier::recording();
        let sweep =
            AbsenceSweep::new(users.clone(), attendance.clone(), notifier);

        let ana = member("Ana", DayGroup::Wednesday);
        users.insert(&ana).await.unwrap();

        let report = sweep.run(wednesday(), now()).await.unwrap();
        assert_eq!(report.marked, 1);

        let report = sweep.run(wednesday(), now()).await.unwrap();
        assert_eq!(report.marked, 0);

        let records = attendance
            .find_range(DateRange::day(wednesday()), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].audit_trail.len(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_weekends_and_non_members_skipped() {
        let (users, attendance) = stores();
        let (notifier, log) = Notifier::recording();
        let sweep =
            AbsenceSweep::new(users.clone(), attendance.clone(), notifier);

        let ana = member("Ana", DayGroup::Wednesday);
        let mut leo = member("Leo", DayGroup::Wednesday);
        leo.role = Role::Leader;
        users.insert(&ana).await.unwrap();
        users.insert(&leo).await.unwrap();

        let saturday = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let report = sweep.run(saturday, now()).await.unwrap();
        assert_eq!(report, SweepReport::default());

        // Only Members of the day's group are auto-marked.
        let report = sweep.run(wednesday(), now()).await.unwrap();
        assert_eq!(report.marked, 1);
        assert!(
            attendance
                .find_by_user_and_date(leo.id, wednesday())
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reminders_dispatch_and_advance_watermark() {
        let users = Arc::new(MemoryUserStore::default());
        let (notifier, log) = Notifier::recording();
        let sweep = ReminderSweep::new(users.clone(), notifier);

        let mut ana = member("Ana", DayGroup::Monday);
        ana.phone = "+15550001111".into();
        ana.notifications = NotificationSettings {
            sms: true,
            ..Default::default()
        };
        let mut late = member("Bob", DayGroup::Monday);
        late.notifications.reminder_time =
            NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        users.insert(&ana).await.unwrap();
        users.insert(&late).await.unwrap();

        // Default preference slot is 18:30.
        let tick = Utc.with_ymd_and_hms(2025, 6, 2, 18, 30, 0).unwrap();
        let report = sweep.run(tick).await.unwrap();
        assert_eq!(report, ReminderReport { reminded: 1, failures: 0 });

        {
            let events = log.lock().unwrap();
            assert_eq!(events.len(), 2);
            assert!(events.iter().all(|e| e.template == Template::Reminder));
            assert!(events.iter().any(|e| e.channel == Channel::Sms));
        }

        // Same tick again: the watermark holds the reminder back.
        let report = sweep.run(tick).await.unwrap();
        assert_eq!(report.reminded, 0);

        // Next day it fires again.
        let next_day = Utc.with_ymd_and_hms(2025, 6, 3, 18, 30, 0).unwrap();
        let report = sweep.run(next_day).await.unwrap();
        assert_eq!(report.reminded, 1);
    }
}
