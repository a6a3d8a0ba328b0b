//! Read-only aggregation over users and attendance records.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Datelike;
use serde::Serialize;
use uuid::Uuid;

use crate::attendance::{AttendanceStore, DateRange, Status};
use crate::error::Result;
use crate::user::{DayGroup, Role, User, UserStore};

/// Absences in range from which a member is reported as frequently absent.
pub const ABSENCE_ALERT_THRESHOLD: usize = 3;

/// Count of records sharing one status.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: Status,
    pub count: usize,
}

/// Attendance rate of one weekday group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRate {
    pub group: DayGroup,
    pub rate: f64,
    pub total: usize,
    pub present: usize,
}

/// Member crossing [`ABSENCE_ALERT_THRESHOLD`] in range.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequentAbsentee {
    pub name: String,
    pub email: String,
    pub group: DayGroup,
    pub absence_count: usize,
}

/// Attendance rate of one ISO week.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRate {
    pub year: i32,
    pub week: u32,
    pub rate: f64,
}

/// Attendance rate of one group member.
///
/// `rate` is `None` for members without any record in range.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRate {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub rate: Option<f64>,
}

/// Aggregates attendance without ever mutating it.
#[derive(Clone)]
pub struct Analytics {
    users: Arc<dyn UserStore>,
    attendance: Arc<dyn AttendanceStore>,
}

impl Analytics {
    /// Create a new [`Analytics`] engine.
    pub fn new(
        users: Arc<dyn UserStore>,
        attendance: Arc<dyn AttendanceStore>,
    ) -> Self {
        Self { users, attendance }
    }

    /// Record counts grouped by status, in label order.
    pub async fn status_breakdown(
        &self,
        range: DateRange,
    ) -> Result<Vec<StatusCount>> {
        let records = self.attendance.find_range(range, None).await?;

        let mut counts: HashMap<Status, usize> = HashMap::new();
        for record in &records {
            *counts.entry(record.status).or_default() += 1;
        }

        let mut breakdown: Vec<StatusCount> = counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        breakdown.sort_by_key(|entry| entry.status.as_str());

        Ok(breakdown)
    }

    /// Present share of all records in range, `None` when there are none.
    pub async fn overall_rate(&self, range: DateRange) -> Result<Option<f64>> {
        let records = self.attendance.find_range(range, None).await?;
        let present = records
            .iter()
            .filter(|record| record.status == Status::Present)
            .count();

        Ok(rate(present, records.len()))
    }

    /// Per-group rates, joined through the owning user's group.
    ///
    /// Records whose owner no longer exists are skipped.
    pub async fn group_comparison(
        &self,
        range: DateRange,
    ) -> Result<Vec<GroupRate>> {
        let records = self.attendance.find_range(range, None).await?;
        let owners = self.owners().await?;

        let mut tallies: BTreeMap<DayGroup, Tally> = BTreeMap::new();
        for record in &records {
            let Some(owner) = owners.get(&record.user_id) else {
                continue;
            };
            tallies
                .entry(owner.day_group)
                .or_default()
                .add(record.status);
        }

        Ok(tallies
            .into_iter()
            .map(|(group, tally)| GroupRate {
                group,
                rate: tally.rate().unwrap_or(0.0),
                total: tally.total,
                present: tally.present,
            })
            .collect())
    }

    /// Members hitting [`ABSENCE_ALERT_THRESHOLD`] absences, worst first.
    pub async fn frequent_absentees(
        &self,
        range: DateRange,
    ) -> Result<Vec<FrequentAbsentee>> {
        let records = self.attendance.find_range(range, None).await?;
        let owners = self.owners().await?;

        let mut absences: HashMap<Uuid, usize> = HashMap::new();
        for record in &records {
            if record.status == Status::Absent {
                *absences.entry(record.user_id).or_default() += 1;
            }
        }

        let mut absentees: Vec<FrequentAbsentee> = absences
            .into_iter()
            .filter(|(_, count)| *count >= ABSENCE_ALERT_THRESHOLD)
            .filter_map(|(user_id, absence_count)| {
                owners.get(&user_id).map(|owner| FrequentAbsentee {
                    name: owner.name.clone(),
                    email: owner.email.clone(),
                    group: owner.day_group,
                    absence_count,
                })
            })
            .collect();
        absentees.sort_by(|a, b| {
            b.absence_count
                .cmp(&a.absence_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(absentees)
    }

    /// Weekly rates of the leader's group Members, ascending by (year,
    /// week). ISO weeks, so late-December days may land in week 1 of the
    /// next year.
    pub async fn weekly_trend(
        &self,
        leader: &User,
        range: DateRange,
    ) -> Result<Vec<WeeklyRate>> {
        let ids = self.group_member_ids(leader).await?;
        let records = self.attendance.find_range(range, Some(&ids)).await?;

        let mut weeks: BTreeMap<(i32, u32), Tally> = BTreeMap::new();
        for record in &records {
            let week = record.date.iso_week();
            weeks
                .entry((week.year(), week.week()))
                .or_default()
                .add(record.status);
        }

        Ok(weeks
            .into_iter()
            .map(|((year, week), tally)| WeeklyRate {
                year,
                week,
                rate: tally.rate().unwrap_or(0.0),
            })
            .collect())
    }

    /// Rate of every Member in the leader's group, unmarked ones included.
    pub async fn member_rates(
        &self,
        leader: &User,
        range: DateRange,
    ) -> Result<Vec<MemberRate>> {
        let members = self
            .users
            .list_by_group(leader.day_group, Some(Role::Member))
            .await?;
        let ids: Vec<Uuid> = members.iter().map(|member| member.id).collect();
        let records = self.attendance.find_range(range, Some(&ids)).await?;

        let mut tallies: HashMap<Uuid, Tally> = HashMap::new();
        for record in &records {
            tallies.entry(record.user_id).or_default().add(record.status);
        }

        Ok(members
            .into_iter()
            .map(|member| MemberRate {
                rate: tallies
                    .get(&member.id)
                    .and_then(|tally| tally.rate()),
                user_id: member.id,
                name: member.name,
                email: member.email,
            })
            .collect())
    }

    async fn owners(&self) -> Result<HashMap<Uuid, User>> {
        Ok(self
            .users
            .list()
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect())
    }

    async fn group_member_ids(&self, leader: &User) -> Result<Vec<Uuid>> {
        Ok(self
            .users
            .list_by_group(leader.day_group, Some(Role::Member))
            .await?
            .into_iter()
            .map(|member| member.id)
            .collect())
    }
}

#[derive(Clone, Copy, Default)]
struct Tally {
    total: usize,
    present: usize,
}

impl Tally {
    fn add(&mut self, status: Status) {
        self.total += 1;
        if status == Status::Present {
            self.present += 1;
        }
    }

    fn rate(&self) -> Option<f64> {
        rate(self.present, self.total)
    }
}

fn rate(present: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| present as f64 / total as f64 * 100.0)
}
