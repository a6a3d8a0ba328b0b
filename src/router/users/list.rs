//! List every user.

use axum::extract::State;
use axum::{Extension, Json};

use crate::router::require_admin;
use crate::user::User;
use crate::{AppState, ServerError};

/// Handler to list all users. Administrators only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
) -> Result<Json<Vec<User>>, ServerError> {
    require_admin(&caller)?;

    Ok(Json(state.user_service().list().await?))
}
