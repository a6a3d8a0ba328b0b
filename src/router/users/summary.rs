//! Per-user attendance history and totals.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::attendance::{
    AttendanceRecord, DateRange, Status, StatusCount,
};
use crate::user::{Role, User};
use crate::{AppState, ServerError};

/// Expected response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    user_id: Uuid,
    total: usize,
    counts: Vec<StatusCount>,
    /// Newest first.
    records: Vec<AttendanceRecord>,
}

/// Handler to read one member's attendance. Open to the member themselves,
/// administrators and the leader of the member's group.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Response>, ServerError> {
    let target = state.user_service().find(user_id).await?;

    let allowed = caller.id == target.id
        || caller.role == Role::Admin
        || (caller.role == Role::Leader
            && caller.day_group == target.day_group);
    if !allowed {
        return Err(ServerError::Forbidden {
            details: "You cannot view this member's attendance.".into(),
        });
    }

    let records = state
        .attendance
        .find_range(DateRange::default(), Some(&[target.id]))
        .await?;

    let mut tally: HashMap<Status, usize> = HashMap::new();
    for record in &records {
        *tally.entry(record.status).or_default() += 1;
    }
    let mut counts: Vec<StatusCount> = tally
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    counts.sort_unstable_by_key(|count| count.status.as_str());

    Ok(Json(Response {
        user_id: target.id,
        total: records.len(),
        counts,
        records,
    }))
}
