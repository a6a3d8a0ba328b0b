//! Account creation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::Valid;
use crate::user::{DayGroup, NewUser, Role};
use crate::{AppState, ServerError};

/// RFC 6750 token type returned on every successful issuance.
pub const TOKEN_TYPE: &str = "Bearer";

/// Expected payload body.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    /// Displayed name.
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters long."))]
    pub name: String,
    /// Unique address used to log in.
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    /// Phone number reachable for text reminders.
    #[validate(
        length(min = 7, max = 20, message = "Phone must be 7 to 20 characters long."),
        custom(
            function = "crate::router::validate_phone",
            message = "Phone must be a dialable number."
        )
    )]
    pub phone: String,
    /// Plaintext password, hashed before storage.
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    /// Defaults to `Member` when omitted.
    pub role: Option<Role>,
    /// Weekday the account attends on.
    pub day_group: DayGroup,
}

/// Expected response.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always `Bearer`.
    pub token_type: String,
    /// Signed JWT.
    pub token: String,
    /// Validity window in seconds.
    pub expires_in: u64,
}

/// Handler to create a user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>), ServerError> {
    let user = state
        .user_service()
        .register(NewUser {
            name: body.name,
            email: body.email.to_lowercase(),
            phone: body.phone,
            password: body.password,
            role: body.role.unwrap_or_default(),
            day_group: body.day_group,
        })
        .await?;

    let token = state.token.create(&user.id.to_string(), user.role)?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(Response {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            expires_in: crate::token::EXPIRATION_TIME,
        }),
    ))
}
