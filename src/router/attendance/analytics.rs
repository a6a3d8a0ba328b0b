//! Aggregated attendance dashboards.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::attendance::{
    DateRange, FrequentAbsentee, GroupRate, MemberRate, WeeklyRate,
};
use crate::router::require_admin;
use crate::user::{Role, User};
use crate::{AppState, ServerError};

/// Expected query parameters. All optional.
#[derive(Debug, Deserialize)]
pub struct Params {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

/// Expected response of `admin`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    /// `None` when no record falls in range.
    overall_rate: Option<f64>,
    group_comparison: Vec<GroupRate>,
    frequent_absentees: Vec<FrequentAbsentee>,
}

/// Handler for the organization-wide dashboard. Administrators only.
pub async fn admin(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Query(params): Query<Params>,
) -> Result<Json<AdminResponse>, ServerError> {
    require_admin(&caller)?;

    let range = DateRange::new(params.start, params.end);
    let analytics = state.analytics();

    Ok(Json(AdminResponse {
        overall_rate: analytics.overall_rate(range).await?,
        group_comparison: analytics.group_comparison(range).await?,
        frequent_absentees: analytics.frequent_absentees(range).await?,
    }))
}

/// Expected response of `leader`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderResponse {
    weekly_trend: Vec<WeeklyRate>,
    member_rates: Vec<MemberRate>,
}

/// Handler for the group dashboard, scoped to the caller's own group.
/// Leaders and administrators.
pub async fn leader(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Query(params): Query<Params>,
) -> Result<Json<LeaderResponse>, ServerError> {
    if caller.role == Role::Member {
        return Err(ServerError::Forbidden {
            details: "Leader or administrator role required.".into(),
        });
    }

    let range = DateRange::new(params.start, params.end);
    let analytics = state.analytics();

    Ok(Json(LeaderResponse {
        weekly_trend: analytics.weekly_trend(&caller, range).await?,
        member_rates: analytics.member_rates(&caller, range).await?,
    }))
}
