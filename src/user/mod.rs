mod service;
mod store;

pub use service::*;
pub use store::*;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip)]
    pub password: String,
    pub role: Role,
    pub day_group: DayGroup,
    pub notifications: NotificationSettings,
    pub created_at: DateTime<Utc>,
}

/// Access level of a [`User`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum Role {
    Admin,
    Leader,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Leader => "Leader",
            Role::Member => "Member",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Leader" => Ok(Role::Leader),
            "Member" => Ok(Role::Member),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Weekday group a [`User`] attends. Weekends carry no group.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum DayGroup {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl DayGroup {
    /// Group attending on the given weekday, `None` on weekends.
    pub fn from_weekday(weekday: chrono::Weekday) -> Option<Self> {
        match weekday {
            chrono::Weekday::Mon => Some(DayGroup::Monday),
            chrono::Weekday::Tue => Some(DayGroup::Tuesday),
            chrono::Weekday::Wed => Some(DayGroup::Wednesday),
            chrono::Weekday::Thu => Some(DayGroup::Thursday),
            chrono::Weekday::Fri => Some(DayGroup::Friday),
            chrono::Weekday::Sat | chrono::Weekday::Sun => None,
        }
    }

    /// Group attending on the given date, `None` on weekends.
    pub fn for_date(date: chrono::NaiveDate) -> Option<Self> {
        use chrono::Datelike;
        Self::from_weekday(date.weekday())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayGroup::Monday => "Monday",
            DayGroup::Tuesday => "Tuesday",
            DayGroup::Wednesday => "Wednesday",
            DayGroup::Thursday => "Thursday",
            DayGroup::Friday => "Friday",
        }
    }
}

impl std::str::FromStr for DayGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Monday" => Ok(DayGroup::Monday),
            "Tuesday" => Ok(DayGroup::Tuesday),
            "Wednesday" => Ok(DayGroup::Wednesday),
            "Thursday" => Ok(DayGroup::Thursday),
            "Friday" => Ok(DayGroup::Friday),
            _ => Err(format!("unknown day group: {s}")),
        }
    }
}

/// Per-user notification channels and reminder preference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email: bool,
    pub sms: bool,
    pub reminder_time: NaiveTime,
    pub last_reminder: Option<DateTime<Utc>>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
            reminder_time: NaiveTime::from_hms_opt(18, 30, 0)
                .unwrap_or(NaiveTime::MIN),
            last_reminder: None,
        }
    }
}
