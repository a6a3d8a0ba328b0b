//! Fetch one attendance record.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::attendance::AttendanceRecord;
use crate::router::require_admin;
use crate::user::User;
use crate::{AppState, ServerError};

/// Handler to read a record with its audit trail. Administrators only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<AttendanceRecord>, ServerError> {
    require_admin(&caller)?;

    let record = state
        .attendance
        .find_by_id(record_id)
        .await?
        .ok_or(ServerError::NotFound {
            resource: "attendance record",
        })?;

    Ok(Json(record))
}
