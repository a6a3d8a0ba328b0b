//! Update user data.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::router::Valid;
use crate::user::{DayGroup, Role, User, UserPatch};
use crate::{AppState, ServerError};

/// Expected payload body. Absent fields stay untouched.
#[derive(Debug, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters long."))]
    name: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    #[validate(
        length(min = 7, max = 20, message = "Phone must be 7 to 20 characters long."),
        custom(
            function = "crate::router::validate_phone",
            message = "Phone must be a dialable number."
        )
    )]
    phone: Option<String>,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    password: Option<String>,
    /// Administrators only.
    role: Option<Role>,
    /// Administrators only.
    day_group: Option<DayGroup>,
    email_notifications: Option<bool>,
    sms_notifications: Option<bool>,
    reminder_time: Option<NaiveTime>,
}

/// Handler to update a profile. Non-administrators may only patch their own
/// profile, and never role or group.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<Uuid>,
    Valid(body): Valid<Body>,
) -> Result<Json<User>, ServerError> {
    let patch = UserPatch {
        name: body.name,
        email: body.email.map(|email| email.to_lowercase()),
        phone: body.phone,
        password: body.password,
        role: body.role,
        day_group: body.day_group,
        email_notifications: body.email_notifications,
        sms_notifications: body.sms_notifications,
        reminder_time: body.reminder_time,
    };

    let user = state.user_service().update(&caller, user_id, patch).await?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::router::tests::person;
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_update_own_preferences() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, DayGroup::Monday);
        let token = router::login_as(&state, &member).await;

        let response = make_request(
            Some(&token),
            app,
            Method::PATCH,
            &format!("/users/{}", member.id),
            json!({
                "name": "Ana D.",
                "smsNotifications": true,
                "reminderTime": "20:00:00",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], "Ana D.");
        assert_eq!(body["notifications"]["sms"], true);
        assert_eq!(body["notifications"]["reminderTime"], "20:00:00");
    }

    #[tokio::test]
    async fn test_member_cannot_change_role() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, DayGroup::Monday);
        let token = router::login_as(&state, &member).await;

        let response = make_request(
            Some(&token),
            app,
            Method::PATCH,
            &format!("/users/{}", member.id),
            json!({ "role": "Admin" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_reassigns_group() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, DayGroup::Monday);
        let admin = person("root", Role::Admin, DayGroup::Friday);
        state.users.insert(&member).await.unwrap();
        let token = router::login_as(&state, &admin).await;

        let response = make_request(
            Some(&token),
            app,
            Method::PATCH,
            &format!("/users/{}", member.id),
            json!({ "dayGroup": "Thursday" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.users.find_by_id(member.id).await.unwrap().unwrap();
        assert_eq!(stored.day_group, DayGroup::Thursday);
    }
}
