//! HTTP route handlers.

pub mod attendance;
pub mod login;
pub mod register;
pub mod status;
pub mod users;

use std::sync::LazyLock;

use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::response::Response;
use axum::{Json, middleware};
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::user::{Role, User};
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 .-]{5,18}$").unwrap());

/// Check that a phone number is dialable: an optional `+`, then digits with
/// spaces, dots or dashes between them.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE.is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

/// Reject callers that are not administrators.
pub(crate) fn require_admin(user: &User) -> Result<(), ServerError> {
    if user.role != Role::Admin {
        return Err(ServerError::Forbidden {
            details: "Administrator role required.".into(),
        });
    }
    Ok(())
}

/// JSON extractor running `validator` checks on the body.
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Custom middleware for authentification.
///
/// Resolves the bearer token to a stored user and exposes it as a request
/// extension for the guarded routes.
pub(crate) async fn authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;
    let token = token.replace(BEARER, "");
    let claims = state
        .token
        .decode(&token)
        .map_err(|_| ServerError::Unauthorized)?;
    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| ServerError::Unauthorized)?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ServerError::Unauthorized)?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// In-memory state. MUST NEVER be used in production.
#[cfg(test)]
pub fn state() -> AppState {
    use std::sync::Arc;

    use crate::attendance::MemoryAttendanceStore;
    use crate::config::{Argon2, Configuration};
    use crate::crypto::PasswordManager;
    use crate::notify::Notifier;
    use crate::token::TokenManager;
    use crate::user::MemoryUserStore;

    let crypto = PasswordManager::new(Some(Argon2 {
        memory_cost: 8,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .expect("test argon2 parameters are valid");

    AppState {
        config: Arc::new(Configuration::default()),
        users: Arc::new(MemoryUserStore::default()),
        attendance: Arc::new(MemoryAttendanceStore::default()),
        crypto: Arc::new(crypto),
        token: TokenManager::new("rollcall", "secret-under-test"),
        notify: Notifier::default(),
    }
}

/// Store `user` and mint a bearer token for them.
#[cfg(test)]
pub async fn login_as(state: &AppState, user: &User) -> String {
    state.users.insert(user).await.expect("insert test user");
    state
        .token
        .create(&user.id.to_string(), user.role)
        .expect("create test token")
}

#[cfg(test)]
pub(crate) mod tests {
    use uuid::Uuid;

    use crate::user::{DayGroup, Role, User};

    /// Fixture user with deterministic contact details.
    pub(crate) fn person(name: &str, role: Role, group: DayGroup) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: format!("+33612{name}"),
            role,
            day_group: group,
            ..Default::default()
        }
    }
}
