//! Record attendance for a batch of members.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::attendance::{BatchOutcome, MarkEntry};
use crate::router::Valid;
use crate::user::User;
use crate::{AppState, ServerError};

/// Expected payload body.
#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "At least one entry is required."))]
    entries: Vec<MarkEntry>,
}

/// Handler to mark a batch of members for the current day.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<Json<BatchOutcome>, ServerError> {
    let now = Utc::now();
    let outcome = state
        .marking()
        .mark_batch(&caller, &body.entries, now.date_naive(), now)
        .await?;

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::router::tests::person;
    use crate::user::{DayGroup, Role};
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_mark_batch_as_admin() {
        let state = router::state();
        let app = app(state.clone());

        // Admins mark any day, so the wall clock cannot break this test.
        let admin = person("root", Role::Admin, DayGroup::Monday);
        let ana = person("ana", Role::Member, DayGroup::Monday);
        let bob = person("bob", Role::Member, DayGroup::Tuesday);
        let token = router::login_as(&state, &admin).await;
        state.users.insert(&ana).await.unwrap();
        state.users.insert(&bob).await.unwrap();

        let response = make_request(
            Some(&token),
            app,
            Method::POST,
            "/attendance/mark",
            json!({
                "entries": [
                    { "userId": ana.id, "status": "Present" },
                    { "userId": bob.id, "status": "Absent", "reason": "Sick leave" },
                ],
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["records"].as_array().unwrap().len(), 2);
        assert_eq!(body["failures"].as_array().unwrap().len(), 0);
        assert_eq!(body["records"][1]["status"], "Absent");
        assert_eq!(body["records"][1]["auditTrail"][0]["reason"], "Sick leave");
    }

    #[tokio::test]
    async fn test_mark_reports_unknown_targets() {
        let state = router::state();
        let app = app(state.clone());

        let admin = person("root", Role::Admin, DayGroup::Monday);
        let token = router::login_as(&state, &admin).await;

        let response = make_request(
            Some(&token),
            app,
            Method::POST,
            "/attendance/mark",
            json!({
                "entries": [
                    { "userId": uuid::Uuid::new_v4(), "status": "Present" },
                ],
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["records"].as_array().unwrap().len(), 0);
        assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_rejects_members_and_bad_payloads() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, DayGroup::Monday);
        let token = router::login_as(&state, &member).await;

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/attendance/mark",
            json!({
                "entries": [{ "userId": member.id, "status": "Present" }],
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Unknown status label never reaches the engine.
        let admin = person("root", Role::Admin, DayGroup::Monday);
        let token = router::login_as(&state, &admin).await;
        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/attendance/mark",
            json!({
                "entries": [{ "userId": member.id, "status": "Late" }],
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Empty batch is refused too.
        let response = make_request(
            Some(&token),
            app,
            Method::POST,
            "/attendance/mark",
            json!({ "entries": [] }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
