//! Apply marking requests under role and group-day rules.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attendance::{
    AttendanceRecord, AttendanceStore, INITIAL_REASON, Status, UPDATE_REASON,
};
use crate::error::{Result, ServerError};
use crate::notify::Notifier;
use crate::user::{DayGroup, Role, User, UserStore};

/// One marking request inside a batch.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub user_id: Uuid,
    pub status: Status,
    /// Custom audit note; when absent the entry describes a create or an
    /// update.
    pub reason: Option<String>,
}

/// A target that could not be marked.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkFailure {
    pub user_id: Uuid,
    pub error: String,
}

/// Per-target results of a marking batch.
///
/// Entries are applied best-effort: one bad target never rolls back the
/// records written before it.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub records: Vec<AttendanceRecord>,
    pub failures: Vec<MarkFailure>,
}

/// Writes attendance on behalf of leaders and administrators.
#[derive(Clone)]
pub struct MarkingEngine {
    users: Arc<dyn UserStore>,
    attendance: Arc<dyn AttendanceStore>,
    notifier: Notifier,
}

impl MarkingEngine {
    /// Create a new [`MarkingEngine`].
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

    /// Mark every entry for `today` on behalf of `marker`.
    ///
    /// Members cannot mark at all. Leaders only act on their own group's
    /// weekday, so the whole batch is rejected before any write when `today`
    /// is another day or a weekend. Per-entry checks (unknown target, Leader
    /// marking outside their group) fail that entry alone.
    pub async fn mark_batch(
        &self,
        marker: &User,
        entries: &[MarkEntry],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        if marker.role == Role::Member {
            return Err(ServerError::Forbidden {
                details: "Only leaders and administrators can mark \
                          attendance."
                    .into(),
            });
        }

        if marker.role == Role::Leader
            && DayGroup::for_date(today) != Some(marker.day_group)
        {
            return Err(ServerError::Forbidden {
                details: "Leaders can only mark attendance on their group \
                          day."
                    .into(),
            });
        }

        let mut outcome = BatchOutcome::default();
        for entry in entries {
            match self.mark_one(marker, entry, today, now).await {
                Ok(record) => outcome.records.push(record),
                Err(err) => outcome.failures.push(MarkFailure {
                    user_id: entry.user_id,
                    error: err.to_string(),
                }),
            }
        }

        tracing::info!(
            marker = %marker.id,
            marked = outcome.records.len(),
            failed = outcome.failures.len(),
            "attendance batch processed"
        );

        Ok(outcome)
    }

    async fn mark_one(
        &self,
        marker: &User,
        entry: &MarkEntry,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord> {
        let target = self
            .users
            .find_by_id(entry.user_id)
            .await?
            .ok_or(ServerError::NotFound { resource: "user" })?;

        if marker.role == Role::Leader && target.day_group != marker.day_group
        {
            return Err(ServerError::Forbidden {
                details: "Leaders can only mark members of their own group."
                    .into(),
            });
        }

        // The probe only labels the audit entry; the write itself stays a
        // single atomic upsert.
        let reason = match entry.reason.as_deref() {
            Some(reason) => reason,
            None => match self
                .attendance
                .find_by_user_and_date(target.id, today)
                .await?
            {
                Some(_) => UPDATE_REASON,
                None => INITIAL_REASON,
            },
        };

        let record = AttendanceRecord::new(
            target.id,
            today,
            entry.status,
            marker.id,
            false,
            reason,
            now,
        );
        let outcome = self.attendance.upsert(&record).await?;

        if outcome.is_created() {
            if let Err(err) = self
                .notifier
                .status_changed(&target, entry.status, today, &marker.name)
                .await
            {
                tracing::error!(
                    error = %err,
                    user_id = %target.id,
                    "status notification failed"
                );
            }
        }

        Ok(outcome.into_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::MemoryAttendanceStore;
    use crate::notify::Recorded;
    use crate::user::MemoryUserStore;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn person(name: &str, role: Role, group: DayGroup) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: format!("+1555{}", name.len() * 1111),
            role,
            day_group: group,
            ..Default::default()
        }
    }

    fn entry(user: &User, status: Status) -> MarkEntry {
        MarkEntry {
            user_id: user.id,
            status,
            reason: None,
        }
    }

    type Log = Arc<Mutex<Vec<Recorded>>>;

    fn engine() -> (
        MarkingEngine,
        Arc<MemoryUserStore>,
        Arc<MemoryAttendanceStore>,
        Log,
    ) {
        let users = Arc::new(MemoryUserStore::default());
        let attendance = Arc::new(MemoryAttendanceStore::default());
        let (notifier, log) = Notifier::recording();
        let engine =
            MarkingEngine::new(users.clone(), attendance.clone(), notifier);
        (engine, users, attendance, log)
    }

    #[tokio::test]
    async fn test_leader_marks_then_corrects() {
        let (engine, users, attendance, log) = engine();
        let leader = person("Leo", Role::Leader, DayGroup::Monday);
        let ana = person("Ana", Role::Member, DayGroup::Monday);
        let bob = person("Bob", Role::Member, DayGroup::Monday);
        for user in [&leader, &ana, &bob] {
            users.insert(user).await.unwrap();
        }

        let entries =
            vec![entry(&ana, Status::Present), entry(&bob, Status::Present)];
        let outcome = engine
            .mark_batch(&leader, &entries, monday(), now())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            outcome.records[0].audit_trail[0].reason,
            INITIAL_REASON
        );
        // Default settings enable email only, so one event per member.
        assert_eq!(log.lock().unwrap().len(), 2);

        // Correcting a member updates the same record without renotifying.
        let outcome = engine
            .mark_batch(&leader, &[entry(&ana, Status::Absent)], monday(), now())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].status, Status::Absent);
        assert_eq!(outcome.records[0].audit_trail.len(), 2);
        assert_eq!(outcome.records[0].audit_trail[1].reason, UPDATE_REASON);
        assert_eq!(log.lock().unwrap().len(), 2);

        let stored = attendance
            .find_by_user_and_date(ana.id, monday())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.marked_by, leader.id);
        assert!(!stored.auto_marked);
    }

    #[tokio::test]
    async fn test_leader_rejected_off_their_day() {
        let (engine, users, attendance, log) = engine();
        let leader = person("Leo", Role::Leader, DayGroup::Monday);
        let ana = person("Ana", Role::Member, DayGroup::Monday);
        users.insert(&leader).await.unwrap();
        users.insert(&ana).await.unwrap();

        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let entries = vec![entry(&ana, Status::Present)];
        let err = engine
            .mark_batch(&leader, &entries, tuesday, now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden { .. }));

        // Weekends resolve to no group and fail the same way.
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let err = engine
            .mark_batch(&leader, &entries, saturday, now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden { .. }));

        assert!(
            attendance
                .find_by_user_and_date(ana.id, tuesday)
                .await
                .unwrap()
                .is_none()
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_entry_scoping() {
        let (engine, users, _attendance, _log) = engine();
        let leader = person("Leo", Role::Leader, DayGroup::Monday);
        let tia = person("Tia", Role::Member, DayGroup::Tuesday);
        users.insert(&leader).await.unwrap();
        users.insert(&tia).await.unwrap();

        // A foreign-group member fails that entry alone.
        let entries = vec![entry(&tia, Status::Present)];
        let outcome = engine
            .mark_batch(&leader, &entries, monday(), now())
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].user_id, tia.id);

        // Admins are scoped to neither group nor day.
        let admin = person("Ada", Role::Admin, DayGroup::Friday);
        users.insert(&admin).await.unwrap();
        let ghost = MarkEntry {
            user_id: Uuid::new_v4(),
            status: Status::Present,
            reason: None,
        };
        let entries = vec![entry(&tia, Status::Present), ghost.clone()];
        let outcome = engine
            .mark_batch(&admin, &entries, monday(), now())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].user_id, ghost.user_id);
        assert!(outcome.failures[0].error.contains("not found"));
    }

    #[tokio::test]
    async fn test_member_cannot_mark() {
        let (engine, users, _attendance, _log) = engine();
        let member = person("Mo", Role::Member, DayGroup::Monday);
        users.insert(&member).await.unwrap();

        let err = engine
            .mark_batch(&member, &[], monday(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden { .. }));
    }
}
