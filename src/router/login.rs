//! Session token issuance.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::router::register::{Response, TOKEN_TYPE};
use crate::router::Valid;
use crate::{AppState, ServerError};

/// Expected payload body.
#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    /// Address chosen at registration.
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    /// Plaintext password, zeroed once checked.
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

/// Handler to authenticate a user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>, ServerError> {
    let user = state
        .user_service()
        .authenticate(&body.email.to_lowercase(), &body.password)
        .await?;

    let token = state.token.create(&user.id.to_string(), user.role)?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: crate::token::EXPIRATION_TIME,
    }))
}
