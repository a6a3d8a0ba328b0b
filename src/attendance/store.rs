//! Handle database requests for attendance records.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::attendance::{AttendanceRecord, AuditEntry};
use crate::error::{Result, ServerError};

const RECORD_COLUMNS: &str = "id, user_id, date, status, marked_by, \
     auto_marked, last_modified, audit_trail";

/// Inclusive date window; open ends mean all time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Window covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: Some(date),
            end: Some(date),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start)
            && self.end.is_none_or(|end| date <= end)
    }
}

/// Outcome of [`AttendanceStore::upsert`].
#[derive(Clone, Debug, PartialEq)]
pub enum Upsert {
    Created(AttendanceRecord),
    Updated(AttendanceRecord),
}

impl Upsert {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            Upsert::Created(record) | Upsert::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> AttendanceRecord {
        match self {
            Upsert::Created(record) | Upsert::Updated(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

/// Storage port for [`AttendanceRecord`] rows.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Find a record using `id` field.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AttendanceRecord>>;

    /// The single record of one user for one day, if marked.
    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>>;

    /// Records inside the window, optionally restricted to the given users,
    /// sorted by date descending.
    async fn find_range(
        &self,
        range: DateRange,
        user_ids: Option<&[Uuid]>,
    ) -> Result<Vec<AttendanceRecord>>;

    /// Atomic create-or-update keyed on `(user_id, date)`.
    ///
    /// On conflict the stored row takes the record's status, marker,
    /// auto-marked flag and last-modified timestamp, and only the record's
    /// final audit entry is appended to the stored trail. Two concurrent
    /// marks therefore resolve to one create and one update, and the trail
    /// stays append-only.
    async fn upsert(&self, record: &AttendanceRecord) -> Result<Upsert>;
}

/// PostgreSQL-backed [`AttendanceStore`].
#[derive(Clone)]
pub struct PgAttendanceStore {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    user_id: Uuid,
    date: NaiveDate,
    status: String,
    marked_by: Uuid,
    auto_marked: bool,
    last_modified: DateTime<Utc>,
    #[sqlx(json)]
    audit_trail: Vec<AuditEntry>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = sqlx::Error;

    fn try_from(row: AttendanceRow) -> std::result::Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            status: row
                .status
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            marked_by: row.marked_by,
            auto_marked: row.auto_marked,
            last_modified: row.last_modified,
            audit_trail: row.audit_trail,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    row: AttendanceRow,
    inserted: bool,
}

impl PgAttendanceStore {
    /// Create a new [`PgAttendanceStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for PgAttendanceStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AttendanceRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = $1"
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AttendanceRecord::try_from).transpose()?)
    }

    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records
                WHERE user_id = $1 AND date = $2"
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AttendanceRecord::try_from).transpose()?)
    }

    async fn find_range(
        &self,
        range: DateRange,
        user_ids: Option<&[Uuid]>,
    ) -> Result<Vec<AttendanceRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records
                WHERE ($1::date IS NULL OR date >= $1)
                AND ($2::date IS NULL OR date <= $2)
                AND ($3::uuid[] IS NULL OR user_id = ANY($3))
                ORDER BY date DESC, user_id"
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(range.start)
            .bind(range.end)
            .bind(user_ids.map(<[Uuid]>::to_vec))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| AttendanceRecord::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn upsert(&self, record: &AttendanceRecord) -> Result<Upsert> {
        let Some(last_entry) = record.audit_trail.last() else {
            return Err(ServerError::Internal {
                details: "attendance record without audit entry".into(),
                source: None,
            });
        };

        let query = format!(
            "INSERT INTO attendance_records
                (id, user_id, date, status, marked_by, auto_marked,
                 last_modified, audit_trail)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_id, date) DO UPDATE SET
                    status = EXCLUDED.status,
                    marked_by = EXCLUDED.marked_by,
                    auto_marked = EXCLUDED.auto_marked,
                    last_modified = EXCLUDED.last_modified,
                    audit_trail = attendance_records.audit_trail || $9
                RETURNING {RECORD_COLUMNS}, (xmax = 0) AS inserted"
        );
        let row = sqlx::query_as::<_, UpsertRow>(&query)
            .bind(record.id)
            .bind(record.user_id)
            .bind(record.date)
            .bind(record.status.as_str())
            .bind(record.marked_by)
            .bind(record.auto_marked)
            .bind(record.last_modified)
            .bind(Json(&record.audit_trail))
            .bind(Json(last_entry))
            .fetch_one(&self.pool)
            .await?;

        let inserted = row.inserted;
        let record = AttendanceRecord::try_from(row.row)?;

        Ok(if inserted {
            Upsert::Created(record)
        } else {
            Upsert::Updated(record)
        })
    }
}

/// In-memory [`AttendanceStore`] with the same semantics as Postgres.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAttendanceStore {
    records: std::sync::Mutex<
        std::collections::HashMap<(Uuid, NaiveDate), AttendanceRecord>,
    >,
}

#[cfg(test)]
#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AttendanceRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        Ok(self.records.lock().unwrap().get(&(user_id, date)).cloned())
    }

    async fn find_range(
        &self,
        range: DateRange,
        user_ids: Option<&[Uuid]>,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| range.contains(r.date))
            .filter(|r| user_ids.is_none_or(|ids| ids.contains(&r.user_id)))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.date.cmp(&a.date).then(a.user_id.cmp(&b.user_id))
        });
        Ok(records)
    }

    async fn upsert(&self, record: &AttendanceRecord) -> Result<Upsert> {
        let Some(last_entry) = record.audit_trail.last() else {
            return Err(ServerError::Internal {
                details: "attendance record without audit entry".into(),
                source: None,
            });
        };

        let mut records = self.records.lock().unwrap();
        match records.entry((record.user_id, record.date)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                stored.status = record.status;
                stored.marked_by = record.marked_by;
                stored.auto_marked = record.auto_marked;
                stored.last_modified = record.last_modified;
                stored.audit_trail.push(last_entry.clone());
                Ok(Upsert::Updated(stored.clone()))
            },
            std::collections::hash_map::Entry::Vacant(entry) => {
                Ok(Upsert::Created(entry.insert(record.clone()).clone()))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{
        INITIAL_REASON, Status, UPDATE_REASON,
    };
    use chrono::TimeZone;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_create_then_update() {
        let store = MemoryAttendanceStore::default();
        let user = Uuid::new_v4();
        let marker = Uuid::new_v4();

        let first = AttendanceRecord::new(
            user,
            date(2),
            Status::Present,
            marker,
            false,
            INITIAL_REASON,
            now(),
        );
        let outcome = store.upsert(&first).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(outcome.record().audit_trail.len(), 1);

        let second = AttendanceRecord::new(
            user,
            date(2),
            Status::Absent,
            marker,
            false,
            UPDATE_REASON,
            now(),
        );
        let outcome = store.upsert(&second).await.unwrap();
        assert!(!outcome.is_created());

        let stored = outcome.into_record();
        // Row identity survives the re-mark; only the trail grows.
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.status, Status::Absent);
        assert_eq!(stored.audit_trail.len(), 2);
        assert_eq!(stored.audit_trail[0].reason, INITIAL_REASON);
        assert_eq!(stored.audit_trail[1].reason, UPDATE_REASON);
        assert_eq!(stored.audit_trail[1].status, Status::Absent);

        // Still a single row for the pair.
        let all = store
            .find_range(DateRange::day(date(2)), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_find_range_bounds_inclusive() {
        let store = MemoryAttendanceStore::default();
        let user = Uuid::new_v4();

        for day in [1, 2, 3, 4] {
            let record = AttendanceRecord::new(
                user,
                date(day),
                Status::Present,
                user,
                false,
                INITIAL_REASON,
                now(),
            );
            store.upsert(&record).await.unwrap();
        }

        let range =
            DateRange::new(Some(date(2)), Some(date(3)));
        let records = store.find_range(range, None).await.unwrap();
        let days: Vec<u32> = records
            .iter()
            .map(|r| chrono::Datelike::day(&r.date))
            .collect();
        // Both bounds included, newest first.
        assert_eq!(days, vec![3, 2]);

        let open = store.find_range(DateRange::default(), None).await.unwrap();
        assert_eq!(open.len(), 4);

        let other = Uuid::new_v4();
        let scoped = store
            .find_range(DateRange::default(), Some(&[other]))
            .await
            .unwrap();
        assert!(scoped.is_empty());
    }
}
