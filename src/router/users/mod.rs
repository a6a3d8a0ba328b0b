//! Users-related HTTP API.
mod delete;
mod get;
mod list;
mod summary;
mod update;

use axum::routing::{delete, get, patch};
use axum::{middleware, Router};

use crate::router::authorization;
use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users` goes to `list`. Administrators only.
        .route("/", get(list::handler))
        // `GET /users/:ID` goes to `get`.
        .route("/{user_id}", get(get::handler))
        // `PATCH /users/:ID` goes to `update`.
        .route("/{user_id}", patch(update::handler))
        // `DELETE /users/:ID` goes to `delete`. Administrators only.
        .route("/{user_id}", delete(delete::handler))
        // `GET /users/:ID/attendance` goes to `summary`.
        .route("/{user_id}/attendance", get(summary::handler))
        .route_layer(middleware::from_fn_with_state(state, authorization))
}
