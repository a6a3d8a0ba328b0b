//! Members of today's group still waiting for a record.

use std::collections::HashSet;

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::attendance::DateRange;
use crate::user::{DayGroup, Role, User};
use crate::{AppState, ServerError};

/// Expected response. `day` is `None` on weekends and the member list is
/// empty then.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    day: Option<DayGroup>,
    unmarked_count: usize,
    members: Vec<User>,
}

/// Handler to list today's unmarked members. Leaders and administrators.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
) -> Result<Json<Response>, ServerError> {
    if caller.role == Role::Member {
        return Err(ServerError::Forbidden {
            details: "Leader or administrator role required.".into(),
        });
    }

    let today = Utc::now().date_naive();
    let Some(group) = DayGroup::for_date(today) else {
        return Ok(Json(Response {
            day: None,
            unmarked_count: 0,
            members: Vec::new(),
        }));
    };

    let marked: HashSet<Uuid> = state
        .attendance
        .find_range(DateRange::day(today), None)
        .await?
        .into_iter()
        .map(|record| record.user_id)
        .collect();

    let members: Vec<User> = state
        .users
        .list_by_group(group, Some(Role::Member))
        .await?
        .into_iter()
        .filter(|member| !marked.contains(&member.id))
        .collect();

    Ok(Json(Response {
        day: Some(group),
        unmarked_count: members.len(),
        members,
    }))
}
