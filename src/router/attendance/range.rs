//! Attendance records over a date window.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::attendance::{AttendanceRecord, DateRange};
use crate::user::{DayGroup, Role, User};
use crate::{AppState, ServerError};

/// Expected query parameters. All optional.
#[derive(Debug, Deserialize)]
pub struct Params {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    group: Option<DayGroup>,
}

/// Handler to list records in a window, newest first. Leaders always get
/// their own group, whatever `group` they ask for.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<AttendanceRecord>>, ServerError> {
    let group = match caller.role {
        Role::Leader => Some(caller.day_group),
        _ => params.group,
    };

    let user_ids: Option<Vec<Uuid>> = match group {
        Some(group) => Some(
            state
                .users
                .list_by_group(group, None)
                .await?
                .into_iter()
                .map(|user| user.id)
                .collect(),
        ),
        None => None,
    };

    let records = state
        .attendance
        .find_range(
            DateRange::new(params.start, params.end),
            user_ids.as_deref(),
        )
        .await?;

    Ok(Json(records))
}
