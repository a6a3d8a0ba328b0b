//! Status totals over a window.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::attendance::{DateRange, StatusCount};
use crate::router::require_admin;
use crate::user::User;
use crate::{AppState, ServerError};

/// Expected query parameters. All optional.
#[derive(Debug, Deserialize)]
pub struct Params {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

/// Handler to count records per status. Administrators only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<StatusCount>>, ServerError> {
    require_admin(&caller)?;

    let breakdown = state
        .analytics()
        .status_breakdown(DateRange::new(params.start, params.end))
        .await?;

    Ok(Json(breakdown))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;

    use super::*;
    use crate::attendance::{AttendanceRecord, Status, INITIAL_REASON};
    use crate::router::tests::person;
    use crate::user::{DayGroup, Role};
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_statistics_breakdown() {
        let state = router::state();
        let app = app(state.clone());

        let admin = person("root", Role::Admin, DayGroup::Monday);
        let member = person("ana", Role::Member, DayGroup::Monday);
        let token = router::login_as(&state, &admin).await;
        state.users.insert(&member).await.unwrap();

        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        for (offset, status) in
            [Status::Present, Status::Absent, Status::Present]
                .iter()
                .enumerate()
        {
            state
                .attendance
                .upsert(&AttendanceRecord::new(
                    member.id,
                    monday + chrono::Days::new(offset as u64),
                    *status,
                    admin.id,
                    false,
                    INITIAL_REASON,
                    Utc::now(),
                ))
                .await
                .unwrap();
        }

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::GET,
            "/attendance/statistics?start=2025-06-02&end=2025-06-03",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!([
                { "status": "Absent", "count": 1 },
                { "status": "Present", "count": 1 },
            ])
        );

        // Members are shut out.
        let token = router::login_as(
            &state,
            &person("bob", Role::Member, DayGroup::Monday),
        )
        .await;
        let response = make_request(
            Some(&token),
            app,
            Method::GET,
            "/attendance/statistics",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
