mod analytics;
mod marking;
mod store;
mod sweep;

pub use analytics::*;
pub use marking::*;
pub use store::*;
pub use sweep::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity recorded as `marked_by` when a sweep writes the record.
/// Reserved; never a real user id.
pub const SYSTEM_MARKER: Uuid = Uuid::nil();

/// Audit reason written when a record is first created.
pub const INITIAL_REASON: &str = "Initial attendance marking";
/// Default audit reason when a record is marked again.
pub const UPDATE_REASON: &str = "Regular attendance update";
/// Audit reason written by the auto-absence sweep.
pub const AUTO_MARK_REASON: &str = "Auto-marked by system";

/// Daily outcome of one user.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "Present",
            Status::Absent => "Absent",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(Status::Present),
            "Absent" => Ok(Status::Absent),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// One change on an [`AttendanceRecord`]. The trail is append-only and its
/// last entry always carries the record's current status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub status: Status,
    pub modified_by: Uuid,
    pub modified_at: DateTime<Utc>,
    pub reason: String,
}

/// Attendance as saved on database, at most one row per (user, day).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub status: Status,
    pub marked_by: Uuid,
    pub auto_marked: bool,
    pub last_modified: DateTime<Utc>,
    pub audit_trail: Vec<AuditEntry>,
}

impl AttendanceRecord {
    /// Fresh record with a single audit entry.
    pub fn new(
        user_id: Uuid,
        date: NaiveDate,
        status: Status,
        marked_by: Uuid,
        auto_marked: bool,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            date,
            status,
            marked_by,
            auto_marked,
            last_modified: at,
            audit_trail: vec![AuditEntry {
                status,
                modified_by: marked_by,
                modified_at: at,
                reason: reason.to_owned(),
            }],
        }
    }
}
