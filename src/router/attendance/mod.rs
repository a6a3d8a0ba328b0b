//! Attendance-related HTTP API.
mod analytics;
mod mark;
mod range;
mod record;
mod statistics;
mod unmarked;

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::router::authorization;
use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /attendance/mark` goes to `mark`. Leaders and administrators.
        .route("/mark", post(mark::handler))
        // `GET /attendance/range` goes to `range`.
        .route("/range", get(range::handler))
        // `GET /attendance/unmarked` goes to `unmarked`. Leaders and administrators.
        .route("/unmarked", get(unmarked::handler))
        // `GET /attendance/statistics` goes to `statistics`. Administrators only.
        .route("/statistics", get(statistics::handler))
        // `GET /attendance/analytics/admin` goes to `analytics`. Administrators only.
        .route("/analytics/admin", get(analytics::admin))
        // `GET /attendance/analytics/leader` goes to `analytics`.
        .route("/analytics/leader", get(analytics::leader))
        // `GET /attendance/:ID` goes to `record`. Administrators only.
        .route("/{record_id}", get(record::handler))
        .route_layer(middleware::from_fn_with_state(state, authorization))
}
